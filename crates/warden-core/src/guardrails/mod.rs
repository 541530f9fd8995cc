//! Guardrails pipeline.
//!
//! A [`Guardrails`] hook screens content at three stages of a run (input,
//! each tool call, final output) and answers allow or block. The hook is a
//! pure policy over `(context, content)`; [`enforce_guardrails`] turns a block
//! into the audit event and the `GUARDRAIL_BLOCKED` error.

mod patterns;
mod policy;

pub use patterns::{contains_credentials, contains_honor_code_violation, contains_prompt_injection};
pub use policy::{
    PolicyGuardrails, REASON_BLOCKED_PHRASE, REASON_CREDENTIAL_IN_OUTPUT,
    REASON_CREDENTIAL_IN_TOOL_ARGS, REASON_HONOR_CODE, REASON_PROMPT_INJECTION,
};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{GuardrailStage, RequestContext, SecurityEvent};

/// Content presented to a guardrails hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardrailInput<'a> {
    pub stage: GuardrailStage,
    pub content: &'a str,
}

/// Verdict of a guardrails hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuardrailDecision {
    Allow,
    Block { reason: String },
}

impl GuardrailDecision {
    pub fn block(reason: impl Into<String>) -> Self {
        GuardrailDecision::Block {
            reason: reason.into(),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, GuardrailDecision::Block { .. })
    }
}

/// Stage-gated allow/block policy.
///
/// Implementations must be pure and bounded: they run inline on the request
/// path and must scale linearly with content length.
pub trait Guardrails: Send + Sync {
    fn check(&self, ctx: &RequestContext, input: &GuardrailInput<'_>) -> GuardrailDecision;
}

impl<F> Guardrails for F
where
    F: Fn(&RequestContext, &GuardrailInput<'_>) -> GuardrailDecision + Send + Sync,
{
    fn check(&self, ctx: &RequestContext, input: &GuardrailInput<'_>) -> GuardrailDecision {
        self(ctx, input)
    }
}

/// Allows everything. Same as supplying no hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Guardrails for AllowAll {
    fn check(&self, _ctx: &RequestContext, _input: &GuardrailInput<'_>) -> GuardrailDecision {
        GuardrailDecision::Allow
    }
}

/// Receives security audit events at the moment a block occurs.
pub trait SecurityEventSink: Send + Sync {
    fn emit(&self, event: SecurityEvent);
}

impl<F> SecurityEventSink for F
where
    F: Fn(SecurityEvent) + Send + Sync,
{
    fn emit(&self, event: SecurityEvent) {
        self(event)
    }
}

/// Screen `content` at `stage`.
///
/// On block, emits exactly one [`SecurityEvent`] through `sink` and returns
/// `GUARDRAIL_BLOCKED`. Allows emit nothing. A missing hook allows.
pub fn enforce_guardrails(
    hook: Option<&dyn Guardrails>,
    sink: Option<&dyn SecurityEventSink>,
    ctx: &RequestContext,
    stage: GuardrailStage,
    content: &str,
) -> Result<(), AppError> {
    let Some(hook) = hook else {
        return Ok(());
    };
    match hook.check(ctx, &GuardrailInput { stage, content }) {
        GuardrailDecision::Allow => Ok(()),
        GuardrailDecision::Block { reason } => {
            tracing::warn!(
                request_id = %ctx.request_id,
                stage = %stage,
                reason = %reason,
                "Guardrail blocked content"
            );
            if let Some(sink) = sink {
                sink.emit(SecurityEvent::guardrail_blocked(
                    &ctx.request_id,
                    stage,
                    &reason,
                    content,
                ));
            }
            Err(AppError::guardrail_blocked(&ctx.request_id, stage, &reason))
        }
    }
}
