//! Core data shapes shared by every warden component.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::contract::validate_citation_schema;
use crate::error::{AppError, ValidationIssue};

/// Identity and scoping for one run.
///
/// `request_id` is the correlation key for every error message and
/// security event produced while the run is alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            tenant_id: tenant_id.into(),
            project_id: None,
            task_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Reject contexts that cannot correlate a run.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut issues = Vec::new();
        if self.request_id.trim().is_empty() {
            issues.push(ValidationIssue::new("/requestId", "must be non-empty"));
        }
        if self.tenant_id.trim().is_empty() {
            issues.push(ValidationIssue::new("/tenantId", "must be non-empty"));
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(self.request_id.clone(), issues))
        }
    }
}

/// The three points where content is screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStage {
    Input,
    ToolCall,
    Output,
}

impl GuardrailStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GuardrailStage::Input => "input",
            GuardrailStage::ToolCall => "tool_call",
            GuardrailStage::Output => "output",
        }
    }
}

impl fmt::Display for GuardrailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification status of a citation or evidence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CitationStatus {
    Verifiable,
    Degraded {
        #[serde(rename = "degradedReason")]
        degraded_reason: String,
    },
    Unavailable,
}

/// A model-asserted evidentiary reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub citation_id: String,
    pub source_type: String,
    pub project_id: String,
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(flatten)]
    pub status: CitationStatus,
}

/// Ground-truth record a citation must match. Same shape as [`Citation`].
pub type Evidence = Citation;

impl Citation {
    pub fn verifiable(
        citation_id: impl Into<String>,
        source_type: impl Into<String>,
        project_id: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            citation_id: citation_id.into(),
            source_type: source_type.into(),
            project_id: project_id.into(),
            locator: locator.into(),
            snippet: None,
            status: CitationStatus::Verifiable,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_status(mut self, status: CitationStatus) -> Self {
        self.status = status;
        self
    }

    /// Schema-validate and decode a citation from untrusted JSON.
    ///
    /// The degraded/degradedReason rule lives in the schema, so violating it
    /// is reported as a validation issue rather than a runtime check.
    pub fn from_value(value: &JsonValue) -> Result<Self, Vec<ValidationIssue>> {
        validate_citation_schema(value)?;
        serde_json::from_value(value.clone())
            .map_err(|e| vec![ValidationIssue::new("", e.to_string())])
    }
}

/// Kind of a security audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    GuardrailBlocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventPayload {
    pub stage: GuardrailStage,
    pub reason: String,

    /// Length of the screened content in UTF-16 code units
    pub content_length: usize,
}

/// Audit record emitted once per guardrail block decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub kind: SecurityEventKind,
    pub request_id: String,
    pub payload: SecurityEventPayload,
}

impl SecurityEvent {
    pub fn guardrail_blocked(
        request_id: impl Into<String>,
        stage: GuardrailStage,
        reason: impl Into<String>,
        content: &str,
    ) -> Self {
        Self {
            kind: SecurityEventKind::GuardrailBlocked,
            request_id: request_id.into(),
            payload: SecurityEventPayload {
                stage,
                reason: reason.into(),
                content_length: content.encode_utf16().count(),
            },
        }
    }
}

/// Fields common to every step event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMeta {
    pub task_id: String,
    pub step_id: String,
    pub step_name: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl StepMeta {
    /// Meta for a step of the run described by `ctx`, stamped now.
    pub fn for_step(ctx: &RequestContext, step_id: impl Into<String>, step_name: impl Into<String>) -> Self {
        Self {
            task_id: ctx.task_id.clone().unwrap_or_else(|| ctx.request_id.clone()),
            step_id: step_id.into(),
            step_name: step_name.into(),
            timestamp: Utc::now(),
            request_id: ctx.request_id.clone(),
        }
    }
}

/// A step event: common fields flattened next to a type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step<P> {
    #[serde(flatten)]
    pub meta: StepMeta,
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStartedPayload {
    pub step_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgressPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCalledPayload {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Redacted JSON summary of the call arguments. Never empty.
    pub args_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    pub tool_call_id: String,
    pub tool_name: String,
    pub ok: bool,
    pub result_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletedPayload {
    pub tool_calls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailedPayload {
    pub error: AppError,
}

/// Progress of a run, one variant per `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    StepStarted(Step<StepStartedPayload>),
    StepProgress(Step<StepProgressPayload>),
    ToolCalled(Step<ToolCalledPayload>),
    ToolResult(Step<ToolResultPayload>),
    StepCompleted(Step<StepCompletedPayload>),
    StepFailed(Step<StepFailedPayload>),
}

impl StepEvent {
    pub fn meta(&self) -> &StepMeta {
        match self {
            StepEvent::StepStarted(s) => &s.meta,
            StepEvent::StepProgress(s) => &s.meta,
            StepEvent::ToolCalled(s) => &s.meta,
            StepEvent::ToolResult(s) => &s.meta,
            StepEvent::StepCompleted(s) => &s.meta,
            StepEvent::StepFailed(s) => &s.meta,
        }
    }

    /// Wire value of the `type` discriminator.
    pub fn event_type(&self) -> &'static str {
        match self {
            StepEvent::StepStarted(_) => "step_started",
            StepEvent::StepProgress(_) => "step_progress",
            StepEvent::ToolCalled(_) => "tool_called",
            StepEvent::ToolResult(_) => "tool_result",
            StepEvent::StepCompleted(_) => "step_completed",
            StepEvent::StepFailed(_) => "step_failed",
        }
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let meta = self.meta();
        if meta.request_id.is_empty() {
            issues.push(ValidationIssue::new("/requestId", "must be non-empty"));
        }
        if meta.step_id.is_empty() {
            issues.push(ValidationIssue::new("/stepId", "must be non-empty"));
        }
        if let StepEvent::ToolCalled(step) = self {
            if step.payload.args_summary.is_empty() {
                issues.push(ValidationIssue::new(
                    "/payload/argsSummary",
                    "must be non-empty",
                ));
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::new("req-1", "tenant-a")
            .with_project("proj-1")
            .with_task("task-9")
    }

    #[test]
    fn test_context_validation() {
        assert!(ctx().validate().is_ok());

        let err = RequestContext::new("", "tenant").validate().unwrap_err();
        assert_eq!(err.issues()[0].path, "/requestId");
    }

    #[test]
    fn test_citation_wire_shape() {
        let citation = Citation::verifiable("c-1", "document", "proj-1", "page:3")
            .with_status(CitationStatus::Degraded {
                degraded_reason: "ocr quality".to_string(),
            });
        let value = serde_json::to_value(&citation).unwrap();
        assert_eq!(value["citationId"], "c-1");
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["degradedReason"], "ocr quality");

        let parsed = Citation::from_value(&value).unwrap();
        assert_eq!(parsed, citation);
    }

    #[test]
    fn test_degraded_without_reason_fails_schema() {
        let value = json!({
            "citationId": "c-1",
            "sourceType": "document",
            "projectId": "proj-1",
            "locator": "page:3",
            "status": "degraded"
        });
        let issues = Citation::from_value(&value).unwrap_err();
        assert!(!issues.is_empty());
    }

    #[test]
    fn test_degraded_with_empty_reason_fails_schema() {
        let value = json!({
            "citationId": "c-1",
            "sourceType": "document",
            "projectId": "proj-1",
            "locator": "page:3",
            "status": "degraded",
            "degradedReason": ""
        });
        assert!(Citation::from_value(&value).is_err());
    }

    #[test]
    fn test_security_event_shape() {
        let event = SecurityEvent::guardrail_blocked("req-1", GuardrailStage::Input, "nope", "héllo");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "guardrail_blocked");
        assert_eq!(value["payload"]["stage"], "input");
        assert_eq!(value["payload"]["contentLength"], 5);

        // Astral-plane characters count as two code units
        let event = SecurityEvent::guardrail_blocked("req-1", GuardrailStage::Output, "nope", "a🌍");
        assert_eq!(event.payload.content_length, 3);
    }

    #[test]
    fn test_step_event_tagging() {
        let event = StepEvent::ToolCalled(Step {
            meta: StepMeta::for_step(&ctx(), "step-0", "generate"),
            payload: ToolCalledPayload {
                tool_call_id: "call-1".to_string(),
                tool_name: "search".to_string(),
                args_summary: "{\"q\":\"rust\"}".to_string(),
            },
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_called");
        assert_eq!(value["taskId"], "task-9");
        assert_eq!(value["payload"]["argsSummary"], "{\"q\":\"rust\"}");

        let back: StepEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_tool_called_requires_args_summary() {
        let event = StepEvent::ToolCalled(Step {
            meta: StepMeta::for_step(&ctx(), "step-0", "generate"),
            payload: ToolCalledPayload {
                tool_call_id: "call-1".to_string(),
                tool_name: "search".to_string(),
                args_summary: String::new(),
            },
        });
        let issues = event.validate().unwrap_err();
        assert_eq!(issues[0].path, "/payload/argsSummary");
    }

    #[test]
    fn test_step_failed_carries_app_error() {
        let event = StepEvent::StepFailed(Step {
            meta: StepMeta::for_step(&ctx(), "step-1", "generate"),
            payload: StepFailedPayload {
                error: AppError::cancelled("req-1"),
            },
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["error"]["code"], "CANCELLED");
    }
}
