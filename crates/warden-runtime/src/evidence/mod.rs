//! Citation verification against ground-truth evidence.
//!
//! # Core Principle
//! "Models cite; evidence decides."
//!
//! A structured model answer may assert citations. None of them is trusted
//! until it has passed the schema, belongs to the caller's project, and maps
//! to a record the [`EvidenceProvider`] actually holds. Any failure is a
//! terminal `CONTRACT_VIOLATION`; there is no best-effort acceptance.

use std::collections::HashMap;

use async_trait::async_trait;

use warden_core::{Evidence, RequestContext};

mod verifier;

pub use verifier::{
    extract_citations, CitationVerifier, CitationViolation, StrictCitationVerifier,
    REASON_CITATION_SCHEMA, REASON_CITATIONS_REQUIRED, REASON_PROJECT_MISMATCH,
    REASON_UNKNOWN_CITATION,
};

/// Source of ground-truth evidence records.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Look up the record for `citation_id`; `None` when it does not exist.
    async fn get_evidence(&self, ctx: &RequestContext, citation_id: &str) -> Option<Evidence>;
}

/// Evidence held in memory, keyed by citation id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEvidence {
    records: HashMap<String, Evidence>,
}

impl InMemoryEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, evidence: Evidence) {
        self.records.insert(evidence.citation_id.clone(), evidence);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Evidence> for InMemoryEvidence {
    fn from_iter<I: IntoIterator<Item = Evidence>>(iter: I) -> Self {
        let mut store = Self::new();
        for evidence in iter {
            store.insert(evidence);
        }
        store
    }
}

#[async_trait]
impl EvidenceProvider for InMemoryEvidence {
    async fn get_evidence(&self, _ctx: &RequestContext, citation_id: &str) -> Option<Evidence> {
        self.records.get(citation_id).cloned()
    }
}
