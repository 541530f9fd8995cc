//! The unified error envelope.
//!
//! Every failure that leaves a warden component is an [`AppError`]. The
//! constructors below are the only way to build one, and each of them embeds
//! `requestId=<id>` in the message so free-text logs can be correlated
//! without parsing the structured fields.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::types::GuardrailStage;

/// Closed set of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed template, definition or input shape
    ValidationError,

    /// A single provider call timed out
    UpstreamTimeout,

    /// Every provider in the routing chain failed
    UpstreamUnavailable,

    /// Citation verification or output-schema failure
    ContractViolation,

    /// A guardrails stage blocked the run
    GuardrailBlocked,

    /// Run aborted by the caller
    Cancelled,
}

impl ErrorCode {
    /// Whether a caller may re-invoke the whole run after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::UpstreamTimeout | ErrorCode::UpstreamUnavailable)
    }

    /// Wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorCode::ContractViolation => "CONTRACT_VIOLATION",
            ErrorCode::GuardrailBlocked => "GUARDRAIL_BLOCKED",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation problem, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending value ("" for the document root)
    pub path: String,

    /// What is wrong with it
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Prefix the path with a parent pointer (e.g. `/templateDefinition`).
    pub fn nested_under(mut self, parent: &str) -> Self {
        self.path = format!("{}{}", parent, self.path);
        self
    }
}

/// The single error envelope returned by every warden component.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl AppError {
    /// Build an error; `retryable` follows the code and the message is
    /// suffixed with the correlation id.
    pub fn new(code: ErrorCode, request_id: impl Into<String>, message: impl AsRef<str>) -> Self {
        let request_id = request_id.into();
        let message = format!("{} (requestId={})", message.as_ref(), request_id);
        Self {
            code,
            retryable: code.is_retryable(),
            message,
            request_id,
            details: None,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    /// `VALIDATION_ERROR` with a non-empty `details.issues` list.
    pub fn validation(request_id: impl Into<String>, mut issues: Vec<ValidationIssue>) -> Self {
        if issues.is_empty() {
            issues.push(ValidationIssue::new("", "invalid input"));
        }
        let summary = issues
            .iter()
            .map(|i| format!("{}: {}", display_path(&i.path), i.message))
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(
            ErrorCode::ValidationError,
            request_id,
            format!("Validation failed: {}", summary),
        )
        .with_details(json!({ "issues": issues }))
    }

    /// `UPSTREAM_TIMEOUT` for a single provider attempt.
    pub fn upstream_timeout(
        request_id: impl Into<String>,
        provider_id: &str,
        timeout: Duration,
    ) -> Self {
        Self::new(
            ErrorCode::UpstreamTimeout,
            request_id,
            format!("Provider '{}' timed out after {:?}", provider_id, timeout),
        )
        .with_details(json!({
            "providerId": provider_id,
            "timeoutMs": timeout.as_millis() as u64,
        }))
    }

    /// `UPSTREAM_UNAVAILABLE` once the whole routing chain is exhausted.
    pub fn upstream_unavailable(request_id: impl Into<String>, failures: JsonValue) -> Self {
        Self::new(
            ErrorCode::UpstreamUnavailable,
            request_id,
            "All providers in the routing chain failed",
        )
        .with_details(json!({ "failures": failures }))
    }

    /// `CONTRACT_VIOLATION` with caller-provided details.
    pub fn contract_violation(
        request_id: impl Into<String>,
        reason: &str,
        details: JsonValue,
    ) -> Self {
        Self::new(
            ErrorCode::ContractViolation,
            request_id,
            format!("Contract violation: {}", reason),
        )
        .with_details(details)
    }

    /// `GUARDRAIL_BLOCKED` for a block decision at `stage`.
    pub fn guardrail_blocked(
        request_id: impl Into<String>,
        stage: GuardrailStage,
        reason: &str,
    ) -> Self {
        Self::new(
            ErrorCode::GuardrailBlocked,
            request_id,
            format!("Guardrail blocked {} stage: {}", stage, reason),
        )
        .with_details(json!({ "reason": reason, "stage": stage }))
    }

    /// `CANCELLED` when the caller aborts the run.
    pub fn cancelled(request_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, request_id, "Run cancelled by caller")
    }

    /// Issues carried in `details.issues`, if any.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        self.details
            .as_ref()
            .and_then(|d| d.get("issues"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// A string field from `details`.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.as_ref()?.get(key)?.as_str()
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "(root)"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_embeds_request_id() {
        let err = AppError::cancelled("req-42");
        assert!(err.message.contains("requestId=req-42"));
        assert_eq!(err.to_string(), err.message);
    }

    #[test]
    fn test_retryable_follows_code() {
        assert!(AppError::upstream_unavailable("r", json!([])).retryable);
        assert!(AppError::upstream_timeout("r", "p", Duration::from_secs(1)).retryable);
        assert!(!AppError::guardrail_blocked("r", GuardrailStage::Input, "x").retryable);
        assert!(!AppError::contract_violation("r", "x", json!({})).retryable);
        assert!(!AppError::cancelled("r").retryable);
        assert!(!AppError::validation("r", vec![]).retryable);
    }

    #[test]
    fn test_validation_issues_never_empty() {
        let err = AppError::validation("r", vec![]);
        let issues = err.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "invalid input");
    }

    #[test]
    fn test_wire_shape() {
        let err = AppError::guardrail_blocked("req-1", GuardrailStage::ToolCall, "secret");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], "GUARDRAIL_BLOCKED");
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["retryable"], false);
        assert_eq!(value["details"]["reason"], "secret");
        assert_eq!(value["details"]["stage"], "tool_call");

        let back: AppError = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }
}
