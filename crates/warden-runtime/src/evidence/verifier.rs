//! Per-citation verification.
//!
//! Each asserted citation is checked in a fixed order and the first failing
//! check decides the outcome:
//! 1. Shape (the citation schema, including the degraded-reason rule)
//! 2. Project scope (`citation.projectId == ctx.projectId`)
//! 3. Evidence lookup (the id must map to a ground-truth record)

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use warden_core::contract::CitationMode;
use warden_core::{AppError, Citation, Evidence, RequestContext, ValidationIssue};

use super::EvidenceProvider;
use crate::providers::ProviderOutput;

pub const REASON_CITATION_SCHEMA: &str = "CitationSchema validation failed";
pub const REASON_PROJECT_MISMATCH: &str = "Citation project mismatch";
pub const REASON_UNKNOWN_CITATION: &str = "Citation not found in evidence";
pub const REASON_CITATIONS_REQUIRED: &str = "Citations required but none provided";

/// Why a set of citations was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CitationViolation {
    #[error("citation failed schema validation ({} issues)", issues.len())]
    Schema { issues: Vec<ValidationIssue> },

    #[error("citation {citation_id} belongs to project {actual:?}, expected {expected:?}")]
    ProjectMismatch {
        citation_id: String,
        expected: Option<String>,
        actual: String,
    },

    #[error("citation {citation_id} does not map to any evidence")]
    UnknownCitation { citation_id: String },

    #[error("citations are required but none were provided")]
    MissingCitations,
}

impl CitationViolation {
    /// Convert to the `CONTRACT_VIOLATION` envelope for `request_id`.
    pub fn into_app_error(self, request_id: &str) -> AppError {
        match self {
            CitationViolation::Schema { issues } => AppError::contract_violation(
                request_id,
                REASON_CITATION_SCHEMA,
                json!({ "reason": REASON_CITATION_SCHEMA, "issues": issues }),
            ),
            CitationViolation::ProjectMismatch {
                citation_id,
                expected,
                actual,
            } => AppError::contract_violation(
                request_id,
                REASON_PROJECT_MISMATCH,
                json!({
                    "citationId": citation_id,
                    "expectedProjectId": expected,
                    "actualProjectId": actual,
                }),
            ),
            CitationViolation::UnknownCitation { citation_id } => AppError::contract_violation(
                request_id,
                REASON_UNKNOWN_CITATION,
                json!({ "citationId": citation_id }),
            ),
            CitationViolation::MissingCitations => AppError::contract_violation(
                request_id,
                REASON_CITATIONS_REQUIRED,
                json!({ "reason": REASON_CITATIONS_REQUIRED }),
            ),
        }
    }
}

/// Pull asserted citations out of a model result.
///
/// Only structured output carries citations, under a top-level `citations`
/// array. A `citations` field of any other type is a shape failure.
pub fn extract_citations(output: &ProviderOutput) -> Result<Vec<JsonValue>, CitationViolation> {
    let Some(object) = output.as_object() else {
        return Ok(Vec::new());
    };
    match object.get("citations") {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => Ok(items.clone()),
        Some(_) => Err(CitationViolation::Schema {
            issues: vec![ValidationIssue::new("/citations", "must be an array")],
        }),
    }
}

/// Citation verification strategy used by the orchestrator.
#[async_trait]
pub trait CitationVerifier: Send + Sync {
    /// Verify every asserted citation, returning the matching evidence
    /// records in citation order.
    async fn verify(
        &self,
        ctx: &RequestContext,
        citations: &[JsonValue],
        mode: CitationMode,
        evidence: Option<&dyn EvidenceProvider>,
    ) -> Result<Vec<Evidence>, CitationViolation>;
}

/// Schema, project and evidence checks in that order, stopping at the first
/// failing citation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictCitationVerifier;

impl StrictCitationVerifier {
    async fn verify_one(
        &self,
        ctx: &RequestContext,
        index: usize,
        value: &JsonValue,
        evidence: Option<&dyn EvidenceProvider>,
    ) -> Result<Evidence, CitationViolation> {
        let citation = Citation::from_value(value).map_err(|issues| CitationViolation::Schema {
            issues: issues
                .into_iter()
                .map(|i| i.nested_under(&format!("/citations/{}", index)))
                .collect(),
        })?;

        if ctx.project_id.as_deref() != Some(citation.project_id.as_str()) {
            return Err(CitationViolation::ProjectMismatch {
                citation_id: citation.citation_id,
                expected: ctx.project_id.clone(),
                actual: citation.project_id,
            });
        }

        let found = match evidence {
            Some(provider) => provider.get_evidence(ctx, &citation.citation_id).await,
            None => None,
        };
        found.ok_or(CitationViolation::UnknownCitation {
            citation_id: citation.citation_id,
        })
    }
}

#[async_trait]
impl CitationVerifier for StrictCitationVerifier {
    async fn verify(
        &self,
        ctx: &RequestContext,
        citations: &[JsonValue],
        mode: CitationMode,
        evidence: Option<&dyn EvidenceProvider>,
    ) -> Result<Vec<Evidence>, CitationViolation> {
        if citations.is_empty() {
            return match mode {
                CitationMode::Required => Err(CitationViolation::MissingCitations),
                CitationMode::Optional => Ok(Vec::new()),
            };
        }

        let mut verified = Vec::with_capacity(citations.len());
        for (index, value) in citations.iter().enumerate() {
            let record = self.verify_one(ctx, index, value, evidence).await?;
            verified.push(record);
        }
        Ok(verified)
    }
}
