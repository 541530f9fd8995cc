//! # warden-core
//!
//! Deterministic building blocks of the warden agent proxy.
//!
//! This crate holds everything about a governed model run that can be
//! decided without I/O:
//! - Which template drives the run, and what is its content hash?
//! - Is this input, tool call or output allowed through?
//! - How is a run framed on the wire, and how is it read back?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same template always hashes the same
//! 2. **No async**: Every function here is synchronous and bounded
//! 3. **Correlated**: Every [`AppError`] message embeds `requestId=<id>`
//! 4. **Chunk-safe**: The stream decoder accepts bytes in any split
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_core::{StreamDecoder, TemplateRegistry, TemplateSelection};
//!
//! let registry = TemplateRegistry::new();
//! let resolved = registry.resolve("req-1", &TemplateSelection::default())?;
//! println!("{:?}", resolved.template_ref.template_definition_hash);
//!
//! let mut decoder = StreamDecoder::new();
//! let mut lines = Vec::new();
//! for chunk in chunks {
//!     decoder.push(&chunk, &mut lines)?;
//! }
//! decoder.finish()?;
//! ```

pub mod contract;
pub mod error;
pub mod guardrails;
pub mod redact;
pub mod stream;
pub mod types;

// Re-export main types at crate root
pub use contract::{
    create_template_ref_from_definition, resolve_template_selection, CitationMode,
    ResolvedTemplate, TemplateDefinition, TemplateRef, TemplateRegistry, TemplateSelection,
    ToolDefinition,
};
pub use error::{AppError, ErrorCode, ValidationIssue};
pub use guardrails::{
    enforce_guardrails, AllowAll, GuardrailDecision, GuardrailInput, Guardrails, PolicyGuardrails,
    SecurityEventSink,
};
pub use redact::{redact_value, summarize_tool_args, REDACTED};
pub use stream::{
    decode_data_stream, decode_sse_events, encode_data_stream, encode_sse_done_line,
    encode_sse_part, DataPart, FinishReason, LineKind, SseDecoder, SseEvent, StreamDecodeError,
    StreamDecoder, StreamLine, Usage,
};
pub use types::{
    Citation, CitationStatus, Evidence, GuardrailStage, RequestContext, SecurityEvent, StepEvent,
    StepMeta,
};
