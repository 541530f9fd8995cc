//! # warden-runtime
//!
//! The async half of the warden agent proxy.
//!
//! This crate wires the deterministic pieces of `warden-core` around real
//! model calls:
//! - Routed model: primary + fallbacks with bounded same-provider retry
//! - Response cache: LRU + TTL, tenant and project scoped
//! - Citation verification against an [`EvidenceProvider`]
//! - Async stream decoding with cancellation
//! - The [`AgentOrchestrator`] that sequences one governed run
//!
//! ## Important
//!
//! Providers are attempted one at a time, never concurrently. A run that
//! fails any stage is never cached and never streamed as a success.
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_runtime::{AgentOrchestrator, RunOptions, RunRequest, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("warden.yaml")?;
//! let orchestrator = AgentOrchestrator::from_config(&config, &registry)?;
//!
//! let template = templates.resolve(&ctx.request_id, &selection)?;
//! let options = RunOptions::new()
//!     .with_template_guardrails(&template.definition)
//!     .with_evidence(evidence);
//! let result = orchestrator.run(&RunRequest::new(ctx, template, input), &options).await;
//! let wire = render_run_stream(&result, "msg-1");
//! ```

pub mod cache;
pub mod config;
pub mod evidence;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod routed;
pub mod streaming;

pub use cache::{
    response_cache_key, CacheEvent, CacheEventKind, CacheEventSink, Clock, ManualClock,
    ResponseCache, SystemClock,
};
pub use config::{CacheConfig, ConfigError, ProviderRoute, RoutingConfig, RuntimeConfig};
pub use evidence::{
    CitationVerifier, CitationViolation, EvidenceProvider, InMemoryEvidence,
    StrictCitationVerifier,
};
pub use orchestrator::{
    AgentOrchestrator, RunOptions, RunRequest, RunResult, StepEventSink, ToolExecutor,
};
pub use providers::{
    ChatMessage, ProviderAdapter, ProviderError, ProviderFactory, ProviderInput, ProviderOutput,
    ProviderRegistry, ProviderResult, RegistryError, ToolCall,
};
pub use resilience::{BackoffConfig, CircuitBreaker, CircuitBreakerConfig, FallbackChain};
pub use routed::{RoutedGeneration, RoutedLanguageModel};
pub use streaming::{
    decode_byte_stream, encode_run_stream, forward_byte_stream, render_run_stream,
    DecodedStream, DecodedSummary, TransportError,
};
