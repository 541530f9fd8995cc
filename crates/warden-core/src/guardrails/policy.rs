//! Built-in guardrail policy.

use regex::RegexSet;

use crate::contract::GuardrailsPolicy;
use crate::types::{GuardrailStage, RequestContext};

use super::patterns::{contains_credentials, contains_honor_code_violation, contains_prompt_injection};
use super::{GuardrailDecision, GuardrailInput, Guardrails};

pub const REASON_PROMPT_INJECTION: &str = "prompt_injection_detected";
pub const REASON_HONOR_CODE: &str = "honor_code_violation";
pub const REASON_CREDENTIAL_IN_TOOL_ARGS: &str = "credential_in_tool_arguments";
pub const REASON_CREDENTIAL_IN_OUTPUT: &str = "credential_in_output";
pub const REASON_BLOCKED_PHRASE: &str = "blocked_phrase";

/// Stage-aware policy built from a template's `guardrailsPolicy`.
///
/// | Stage       | Blocks                                                   |
/// |-------------|----------------------------------------------------------|
/// | `input`     | prompt injection, honor code (if enforced), phrases      |
/// | `tool_call` | credentials in arguments, phrases                        |
/// | `output`    | credentials, phrases                                     |
#[derive(Debug, Clone)]
pub struct PolicyGuardrails {
    enforce_honor_code: bool,
    blocked_phrases: Option<RegexSet>,
}

impl PolicyGuardrails {
    pub fn new(policy: GuardrailsPolicy) -> Self {
        Self {
            enforce_honor_code: policy.enforce_honor_code,
            blocked_phrases: None,
        }
    }

    /// Also block literal, case-insensitive phrases at every stage.
    ///
    /// Phrases are escaped before compilation, so the match stays linear.
    pub fn with_blocked_phrases<I, S>(mut self, phrases: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = phrases
            .into_iter()
            .map(|p| format!("(?i){}", regex::escape(p.as_ref())))
            .collect();
        self.blocked_phrases = if patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(patterns)?)
        };
        Ok(self)
    }

    fn matches_blocked_phrase(&self, content: &str) -> bool {
        self.blocked_phrases
            .as_ref()
            .map(|set| set.is_match(content))
            .unwrap_or(false)
    }
}

impl Guardrails for PolicyGuardrails {
    fn check(&self, _ctx: &RequestContext, input: &GuardrailInput<'_>) -> GuardrailDecision {
        if self.matches_blocked_phrase(input.content) {
            return GuardrailDecision::block(REASON_BLOCKED_PHRASE);
        }
        match input.stage {
            GuardrailStage::Input => {
                if contains_prompt_injection(input.content) {
                    return GuardrailDecision::block(REASON_PROMPT_INJECTION);
                }
                if self.enforce_honor_code && contains_honor_code_violation(input.content) {
                    return GuardrailDecision::block(REASON_HONOR_CODE);
                }
            }
            GuardrailStage::ToolCall => {
                if contains_credentials(input.content) {
                    return GuardrailDecision::block(REASON_CREDENTIAL_IN_TOOL_ARGS);
                }
            }
            GuardrailStage::Output => {
                if contains_credentials(input.content) {
                    return GuardrailDecision::block(REASON_CREDENTIAL_IN_OUTPUT);
                }
            }
        }
        GuardrailDecision::Allow
    }
}
