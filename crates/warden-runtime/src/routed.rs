//! Primary + fallback provider invocation.
//!
//! For one logical call the chain is walked in order. Each provider gets
//! one attempt plus up to `max_retries` retries (with backoff); once they are
//! spent the next provider is tried. The first success wins and is returned
//! as-is. When every provider has failed the caller sees a single
//! `UPSTREAM_UNAVAILABLE`, whatever the individual failures were.
//!
//! Providers are attempted strictly one at a time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use serde_json::{json, Value as JsonValue};

use warden_core::contract::RetryPolicy;
use warden_core::{AppError, RequestContext};

use crate::config::{RoutingConfig, RuntimeConfig};
use crate::providers::{ProviderAdapter, ProviderError, ProviderInput, ProviderRegistry, ProviderResult, RegistryError};
use crate::resilience::{BackoffConfig, CircuitBreaker, FallbackChain, FallbackTarget};

/// A successful routed call.
#[derive(Debug, Clone)]
pub struct RoutedGeneration {
    pub result: ProviderResult,

    /// Provider that produced the result
    pub provider_id: String,

    pub model_id: String,

    /// Attempts made across the whole chain, the winning one included
    pub attempts: u32,
}

/// Ordered provider chain with bounded same-provider retry.
#[derive(Debug)]
pub struct RoutedLanguageModel {
    chain: FallbackChain,
    retry_policy: RetryPolicy,
    backoff: BackoffConfig,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl RoutedLanguageModel {
    /// Bind each route in `routing` to the adapter with the same id.
    pub fn new(
        routing: &RoutingConfig,
        adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>,
    ) -> Result<Self, RegistryError> {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = adapters.into_iter().collect();
        let mut chain = FallbackChain::new();
        for route in routing.routes() {
            let adapter = adapters
                .iter()
                .find(|a| a.id() == route.provider_id)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownProvider {
                    provider_id: route.provider_id.clone(),
                    available: adapters.iter().map(|a| a.id().to_string()).collect(),
                })?;
            chain = chain.add(route.clone(), adapter);
        }
        Ok(Self::from_chain(chain, routing.retry_policy))
    }

    /// Build from an explicit chain.
    pub fn from_chain(chain: FallbackChain, retry_policy: RetryPolicy) -> Self {
        Self {
            chain,
            retry_policy,
            backoff: BackoffConfig::default(),
            circuit_breaker: None,
        }
    }

    /// Build the chain from runtime configuration, creating adapters
    /// through the registry.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, RegistryError> {
        let mut chain = FallbackChain::new();
        for route in config.routing.routes() {
            chain = chain.add(route.clone(), registry.create(route)?);
        }
        let mut model = Self::from_chain(chain, config.routing.retry_policy)
            .with_backoff(config.retry_backoff.clone());
        if config.circuit_breaker.enabled {
            model = model.with_circuit_breaker(Arc::new(CircuitBreaker::new(
                config.circuit_breaker.clone(),
            )));
        }
        Ok(model)
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Run one logical call with the configured retry budget.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        input: &ProviderInput,
    ) -> Result<RoutedGeneration, AppError> {
        self.generate_with_retries(ctx, input, self.retry_policy.max_retries)
            .await
    }

    /// Run one logical call allowing `max_retries` retries per provider.
    pub async fn generate_with_retries(
        &self,
        ctx: &RequestContext,
        input: &ProviderInput,
        max_retries: u32,
    ) -> Result<RoutedGeneration, AppError> {
        let attempts = AtomicU32::new(0);
        let mut failures: Vec<JsonValue> = Vec::new();

        for (index, target) in self.chain.targets().iter().enumerate() {
            let provider_id = target.provider_id();

            if let Some(breaker) = &self.circuit_breaker {
                if breaker.is_open(provider_id) {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        provider = %provider_id,
                        "Circuit open, skipping provider"
                    );
                    failures.push(json!({
                        "providerId": provider_id,
                        "modelId": target.route.model_id,
                        "kind": "circuit_open",
                        "attempts": 0,
                    }));
                    continue;
                }
            }

            if index > 0 {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    provider = %provider_id,
                    "Falling back to next provider"
                );
            }

            let mut routed_input = input.clone();
            routed_input.model_id = target.route.model_id.clone();

            let provider_attempts = AtomicU32::new(0);
            let input_ref = &routed_input;
            let counter = &provider_attempts;
            let outcome = (move || async move {
                counter.fetch_add(1, Ordering::Relaxed);
                self.attempt(ctx, target, input_ref).await
            })
            .retry(self.backoff.builder(max_retries))
            .notify(|err: &ProviderError, delay: Duration| {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    provider = %provider_id,
                    error = %err,
                    delay = ?delay,
                    "Provider call failed, retrying"
                );
            })
            .await;

            let made = provider_attempts.load(Ordering::Relaxed);
            attempts.fetch_add(made, Ordering::Relaxed);

            match outcome {
                Ok(result) => {
                    return Ok(RoutedGeneration {
                        result,
                        provider_id: provider_id.to_string(),
                        model_id: target.route.model_id.clone(),
                        attempts: attempts.load(Ordering::Relaxed),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        provider = %provider_id,
                        attempts = made,
                        error = %e,
                        "Provider exhausted its retry budget"
                    );
                    failures.push(failure_detail(target, &e, made));
                }
            }
        }

        tracing::warn!(
            request_id = %ctx.request_id,
            providers = self.chain.len(),
            "All providers in the routing chain failed"
        );
        Err(AppError::upstream_unavailable(
            &ctx.request_id,
            JsonValue::Array(failures),
        ))
    }

    /// One bounded attempt against one provider.
    async fn attempt(
        &self,
        ctx: &RequestContext,
        target: &FallbackTarget,
        input: &ProviderInput,
    ) -> Result<ProviderResult, ProviderError> {
        let timeout = target.route.timeout;
        let outcome =
            match tokio::time::timeout(timeout, target.adapter.generate_text(ctx, input)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::App(AppError::upstream_timeout(
                    &ctx.request_id,
                    target.provider_id(),
                    timeout,
                ))),
            };

        if let Some(breaker) = &self.circuit_breaker {
            match &outcome {
                Ok(_) => breaker.record_success(target.provider_id()),
                Err(_) => breaker.record_failure(target.provider_id()),
            }
        }
        outcome
    }
}

fn failure_detail(target: &FallbackTarget, err: &ProviderError, attempts: u32) -> JsonValue {
    let mut detail = json!({
        "providerId": target.route.provider_id,
        "modelId": target.route.model_id,
        "kind": err.kind(),
        "message": err.to_string(),
        "attempts": attempts,
    });
    if let ProviderError::App(app) = err {
        detail["code"] = json!(app.code);
    }
    detail
}
