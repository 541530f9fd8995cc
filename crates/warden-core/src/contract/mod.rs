//! Template contracts.
//!
//! Templates are structured data validated against an embedded JSON Schema.
//! This module handles decoding, resolution and content-addressed hashing.

mod canonical;
mod registry;
mod schema;
mod template;

pub use canonical::{canonical_json, content_hash, sha256_hex};
pub use registry::{
    create_template_ref_from_definition, default_template, resolve_template_selection,
    template_definition_hash, ResolvedTemplate, TemplateRegistry, TemplateSelection,
    DEFAULT_TEMPLATE_ID, DEFAULT_TEMPLATE_VERSION, INLINE_TEMPLATE_ID, INLINE_TEMPLATE_VERSION,
};
pub use schema::{
    is_valid_template, validate_against, validate_citation_schema, validate_template_schema,
    SchemaError,
};
pub use template::{
    CitationMode, CitationPolicy, GuardrailsPolicy, RetryPolicy, TemplateDefinition, TemplateRef,
    ToolDefinition, WorkflowPolicy,
};
