//! Resilience patterns for warden-runtime.
//!
//! This module provides:
//! - Circuit breaker per provider
//! - Exponential backoff between same-provider retries
//! - The ordered fallback chain

mod backoff;
mod circuit_breaker;
mod fallback;

pub use backoff::BackoffConfig;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{FallbackChain, FallbackTarget};
