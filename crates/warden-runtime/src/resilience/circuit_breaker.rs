//! Circuit breaker to prevent cascade failures.
//!
//! When a provider fails repeatedly its circuit opens and the routed model
//! skips it without an attempt until the recovery timeout elapses.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::duration_human;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Off unless configured
    pub enabled: bool,

    /// Failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "duration_human")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all calls bypass
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// Circuit breaker keyed by provider id.
///
/// Each provider has its own circuit to allow independent recovery.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Check if the circuit is open for a provider.
    ///
    /// Returns true if the provider should be skipped.
    pub fn is_open(&self, provider_id: &str) -> bool {
        let states = self.states.read();
        match states.get(provider_id) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(provider_id);
                    false
                } else {
                    true
                }
            }
            // Half-open circuits let trial calls through
            _ => false,
        }
    }

    /// Record a successful provider call.
    pub fn record_success(&self, provider_id: &str) {
        let mut states = self.states.write();
        match states.get(provider_id).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(provider_id.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(provider = %provider_id, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        provider_id.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(provider_id.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed provider call.
    pub fn record_failure(&self, provider_id: &str) {
        let mut states = self.states.write();
        let failures = match states.get(provider_id).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    provider_id.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(provider = %provider_id, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                provider_id.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                provider = %provider_id,
                failures,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(provider_id.to_string(), CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, provider_id: &str) {
        let mut states = self.states.write();
        if matches!(states.get(provider_id), Some(CircuitState::Open { .. })) {
            states.insert(provider_id.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(provider = %provider_id, "Circuit transitioning to half-open for recovery test");
        }
    }

    /// Get current state of a circuit.
    pub fn state(&self, provider_id: &str) -> CircuitState {
        self.states
            .read()
            .get(provider_id)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("circuits", &self.states.read().len())
            .finish()
    }
}
