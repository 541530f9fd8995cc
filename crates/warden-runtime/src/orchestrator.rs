//! Agent orchestrator: one governed run per request.
//!
//! A run is a straight line that stops at the first failure:
//!
//! ```text
//! guardrails(input) -> cache lookup -> model steps (tool-call guardrails)
//!   -> guardrails(output) -> output schema -> citations -> cache store
//! ```
//!
//! A hit short-circuits after the lookup. Nothing is stored unless every
//! stage passed, and a cancelled run never reaches the store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use warden_core::contract::{validate_against, TemplateDefinition};
use warden_core::types::{
    Step, StepCompletedPayload, StepFailedPayload, StepStartedPayload, ToolCalledPayload,
    ToolResultPayload,
};
use warden_core::{
    enforce_guardrails, summarize_tool_args, AppError, Evidence, FinishReason, GuardrailStage,
    Guardrails, PolicyGuardrails, RequestContext, ResolvedTemplate, SecurityEventSink, StepEvent,
    StepMeta, TemplateRef, Usage,
};

use crate::cache::{response_cache_key, CacheEvent, CacheEventKind, CacheEventSink, ResponseCache};
use crate::config::RuntimeConfig;
use crate::evidence::{extract_citations, CitationVerifier, EvidenceProvider, StrictCitationVerifier};
use crate::providers::{
    ChatMessage, ProviderInput, ProviderOutput, ProviderRegistry, RegistryError, ToolCall,
};
use crate::routed::RoutedLanguageModel;

pub const REASON_OUTPUT_SCHEMA: &str = "Output schema validation failed";

const STEP_NAME: &str = "generate";

/// Executes tool calls the model requests.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `call`. An error is reported back to the model, not to the caller.
    async fn execute(&self, ctx: &RequestContext, call: &ToolCall) -> Result<JsonValue, AppError>;
}

/// Receives step events as they happen.
pub trait StepEventSink: Send + Sync {
    fn emit(&self, event: &StepEvent);
}

impl<F> StepEventSink for F
where
    F: Fn(&StepEvent) + Send + Sync,
{
    fn emit(&self, event: &StepEvent) {
        self(event)
    }
}

/// Everything that identifies one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub ctx: RequestContext,
    pub template: ResolvedTemplate,
    pub input: String,
}

impl RunRequest {
    pub fn new(ctx: RequestContext, template: ResolvedTemplate, input: impl Into<String>) -> Self {
        Self {
            ctx,
            template,
            input: input.into(),
        }
    }
}

/// Per-run collaborators. All optional.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub evidence: Option<Arc<dyn EvidenceProvider>>,
    pub guardrails: Option<Arc<dyn Guardrails>>,
    pub security_sink: Option<Arc<dyn SecurityEventSink>>,
    pub cache_sink: Option<Arc<dyn CacheEventSink>>,
    pub step_sink: Option<Arc<dyn StepEventSink>>,
    pub tool_executor: Option<Arc<dyn ToolExecutor>>,
    pub cancellation: Option<CancellationToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evidence(mut self, evidence: Arc<dyn EvidenceProvider>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_guardrails(mut self, guardrails: Arc<dyn Guardrails>) -> Self {
        self.guardrails = Some(guardrails);
        self
    }

    /// Use the built-in policy configured by the template.
    pub fn with_template_guardrails(self, definition: &TemplateDefinition) -> Self {
        self.with_guardrails(Arc::new(PolicyGuardrails::new(definition.guardrails_policy)))
    }

    pub fn with_security_sink(mut self, sink: Arc<dyn SecurityEventSink>) -> Self {
        self.security_sink = Some(sink);
        self
    }

    pub fn with_cache_sink(mut self, sink: Arc<dyn CacheEventSink>) -> Self {
        self.cache_sink = Some(sink);
        self
    }

    pub fn with_step_sink(mut self, sink: Arc<dyn StepEventSink>) -> Self {
        self.step_sink = Some(sink);
        self
    }

    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("evidence", &self.evidence.is_some())
            .field("guardrails", &self.guardrails.is_some())
            .field("security_sink", &self.security_sink.is_some())
            .field("cache_sink", &self.cache_sink.is_some())
            .field("step_sink", &self.step_sink.is_some())
            .field("tool_executor", &self.tool_executor.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub template_ref: TemplateRef,

    /// Final model output
    pub output: ProviderOutput,

    /// Evidence records backing the verified citations
    pub citations: Vec<Evidence>,

    /// Step events of this run; empty when served from cache
    pub step_events: Vec<StepEvent>,

    /// Token usage summed over every step
    pub usage: Usage,

    pub finish_reason: FinishReason,

    /// Served from the response cache
    pub cached: bool,
}

impl RunResult {
    pub fn text(&self) -> String {
        self.output.as_text()
    }
}

/// Sequences guardrails, cache, model and verification for each run.
pub struct AgentOrchestrator {
    model: Arc<RoutedLanguageModel>,
    cache: Option<Arc<ResponseCache<String, RunResult>>>,
    verifier: Arc<dyn CitationVerifier>,
}

impl AgentOrchestrator {
    /// Create an orchestrator without a cache.
    pub fn new(model: Arc<RoutedLanguageModel>) -> Self {
        Self {
            model,
            cache: None,
            verifier: Arc::new(StrictCitationVerifier),
        }
    }

    /// Build model and cache from configuration.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, RegistryError> {
        let model = Arc::new(RoutedLanguageModel::from_config(config, registry)?);
        let mut orchestrator = Self::new(model);
        if config.cache.enabled {
            orchestrator =
                orchestrator.with_cache(Arc::new(ResponseCache::from_config(&config.cache)));
        }
        Ok(orchestrator)
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache<String, RunResult>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CitationVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache<String, RunResult>>> {
        self.cache.as_ref()
    }

    /// Execute one run.
    pub async fn run(&self, request: &RunRequest, options: &RunOptions) -> Result<RunResult, AppError> {
        let ctx = &request.ctx;
        ctx.validate()?;

        tracing::info!(
            request_id = %ctx.request_id,
            tenant_id = %ctx.tenant_id,
            template_id = %request.template.template_ref.template_id,
            "Run started"
        );

        let outcome = match &options.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(AppError::cancelled(&ctx.request_id)),
                    result = self.execute(request, options) => result,
                }
            }
            None => self.execute(request, options).await,
        };

        match &outcome {
            Ok(result) => tracing::info!(
                request_id = %ctx.request_id,
                cached = result.cached,
                citations = result.citations.len(),
                "Run finished"
            ),
            Err(e) => tracing::warn!(
                request_id = %ctx.request_id,
                code = %e.code,
                error = %e,
                "Run failed"
            ),
        }
        outcome
    }

    async fn execute(&self, request: &RunRequest, options: &RunOptions) -> Result<RunResult, AppError> {
        let ctx = &request.ctx;
        let definition = &request.template.definition;
        let guardrails = options.guardrails.as_deref();
        let security_sink = options.security_sink.as_deref();

        enforce_guardrails(guardrails, security_sink, ctx, GuardrailStage::Input, &request.input)?;

        let cache_key = self
            .cache
            .as_ref()
            .map(|_| response_cache_key(ctx, &request.template.template_ref, &request.input));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get_entry(key) {
                tracing::debug!(request_id = %ctx.request_id, cache_key = %key, "Response cache hit");
                emit_cache(options, CacheEvent::new(CacheEventKind::Hit, ctx, key).at(hit.stored_at_ms));
                return Ok(RunResult {
                    cached: true,
                    step_events: Vec::new(),
                    ..hit.value
                });
            }
            tracing::debug!(request_id = %ctx.request_id, cache_key = %key, "Response cache miss");
            emit_cache(options, CacheEvent::new(CacheEventKind::Miss, ctx, key));
        }

        let mut steps = StepRecorder::new(ctx, options.step_sink.as_deref());
        let generated = self.run_steps(request, options, &mut steps).await?;

        let text = generated.output.as_text();
        enforce_guardrails(guardrails, security_sink, ctx, GuardrailStage::Output, &text)?;

        if let (Some(schema), Some(object)) = (&definition.output_schema, generated.output.as_object()) {
            validate_against(schema, object).map_err(|issues| {
                tracing::warn!(request_id = %ctx.request_id, issues = issues.len(), "Output schema violation");
                AppError::contract_violation(
                    &ctx.request_id,
                    REASON_OUTPUT_SCHEMA,
                    json!({ "reason": REASON_OUTPUT_SCHEMA, "issues": issues }),
                )
            })?;
        }

        let citations = self.verify_citations(ctx, definition, &generated.output, options).await?;

        let result = RunResult {
            template_ref: request.template.template_ref.clone(),
            output: generated.output,
            citations,
            step_events: steps.into_events(),
            usage: generated.usage,
            finish_reason: generated.finish_reason,
            cached: false,
        };

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            let stored_at = cache.set(key.clone(), result.clone());
            tracing::debug!(request_id = %ctx.request_id, cache_key = %key, "Response cache store");
            emit_cache(options, CacheEvent::new(CacheEventKind::Store, ctx, &key).at(stored_at));
        }
        Ok(result)
    }

    /// The model step loop. Each step is one routed call; requested tool
    /// calls are screened, recorded and, with an executor, run and fed back.
    async fn run_steps(
        &self,
        request: &RunRequest,
        options: &RunOptions,
        steps: &mut StepRecorder<'_>,
    ) -> Result<Generated, AppError> {
        let ctx = &request.ctx;
        let definition = &request.template.definition;
        let max_steps = definition.workflow_policy.max_steps.max(1);
        let max_retries = definition
            .workflow_policy
            .effective_max_retries(self.model.retry_policy().max_retries);

        let mut messages = vec![ChatMessage::user(definition.render_prompt(&request.input))];
        let mut usage = Usage::default();
        let mut step_index = 0u32;

        loop {
            step_index += 1;
            let step_id = format!("step-{}", step_index);
            steps.started(&step_id, step_index);

            let input = ProviderInput {
                model_id: String::new(),
                system_prompt: definition.system_prompt.clone(),
                messages: messages.clone(),
                tools: definition.tools.clone(),
                output_schema: definition.output_schema.clone(),
            };
            let routed = match self.model.generate_with_retries(ctx, &input, max_retries).await {
                Ok(routed) => routed,
                Err(e) => {
                    steps.failed(&step_id, &e);
                    return Err(e);
                }
            };
            tracing::debug!(
                request_id = %ctx.request_id,
                provider = %routed.provider_id,
                step = step_index,
                tool_calls = routed.result.tool_calls.len(),
                "Model step finished"
            );

            let result = routed.result;
            usage = usage + result.usage;

            if result.tool_calls.is_empty() {
                steps.completed(&step_id, 0);
                return Ok(Generated {
                    output: result.output,
                    usage,
                    finish_reason: result.finish_reason,
                });
            }

            messages.push(ChatMessage::assistant(result.output.as_text()));
            for call in &result.tool_calls {
                let screened = json!({ "tool": call.name, "args": call.arguments }).to_string();
                if let Err(e) = enforce_guardrails(
                    options.guardrails.as_deref(),
                    options.security_sink.as_deref(),
                    ctx,
                    GuardrailStage::ToolCall,
                    &screened,
                ) {
                    steps.failed(&step_id, &e);
                    return Err(e);
                }
                steps.tool_called(&step_id, call);

                if let Some(executor) = &options.tool_executor {
                    let (ok, summary, reply) = match executor.execute(ctx, call).await {
                        Ok(value) => (true, summarize_tool_args(&value), value.to_string()),
                        Err(e) => {
                            tracing::warn!(
                                request_id = %ctx.request_id,
                                tool = %call.name,
                                error = %e,
                                "Tool execution failed"
                            );
                            (false, e.message.clone(), json!({ "error": e.message }).to_string())
                        }
                    };
                    steps.tool_result(&step_id, call, ok, summary);
                    messages.push(ChatMessage::tool(reply));
                }
            }
            steps.completed(&step_id, result.tool_calls.len() as u32);

            if options.tool_executor.is_none() || step_index >= max_steps {
                return Ok(Generated {
                    output: result.output,
                    usage,
                    finish_reason: result.finish_reason,
                });
            }
        }
    }

    async fn verify_citations(
        &self,
        ctx: &RequestContext,
        definition: &TemplateDefinition,
        output: &ProviderOutput,
        options: &RunOptions,
    ) -> Result<Vec<Evidence>, AppError> {
        let asserted = extract_citations(output);
        let outcome = match asserted {
            Ok(citations) => {
                self.verifier
                    .verify(
                        ctx,
                        &citations,
                        definition.citation_policy.mode,
                        options.evidence.as_deref(),
                    )
                    .await
            }
            Err(violation) => Err(violation),
        };
        outcome.map_err(|violation| {
            tracing::warn!(
                request_id = %ctx.request_id,
                violation = %violation,
                "Citation verification failed"
            );
            violation.into_app_error(&ctx.request_id)
        })
    }
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("model", &self.model)
            .field("cache", &self.cache)
            .finish()
    }
}

struct Generated {
    output: ProviderOutput,
    usage: Usage,
    finish_reason: FinishReason,
}

fn emit_cache(options: &RunOptions, event: CacheEvent) {
    if let Some(sink) = &options.cache_sink {
        sink.emit(event);
    }
}

/// Collects step events and forwards each to the sink as it is recorded.
struct StepRecorder<'a> {
    ctx: &'a RequestContext,
    sink: Option<&'a dyn StepEventSink>,
    events: Vec<StepEvent>,
}

impl<'a> StepRecorder<'a> {
    fn new(ctx: &'a RequestContext, sink: Option<&'a dyn StepEventSink>) -> Self {
        Self {
            ctx,
            sink,
            events: Vec::new(),
        }
    }

    fn meta(&self, step_id: &str) -> StepMeta {
        StepMeta::for_step(self.ctx, step_id, STEP_NAME)
    }

    fn record(&mut self, event: StepEvent) {
        if let Some(sink) = self.sink {
            sink.emit(&event);
        }
        self.events.push(event);
    }

    fn started(&mut self, step_id: &str, step_index: u32) {
        let meta = self.meta(step_id);
        self.record(StepEvent::StepStarted(Step {
            meta,
            payload: StepStartedPayload { step_index },
        }));
    }

    fn tool_called(&mut self, step_id: &str, call: &ToolCall) {
        let meta = self.meta(step_id);
        self.record(StepEvent::ToolCalled(Step {
            meta,
            payload: ToolCalledPayload {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                args_summary: summarize_tool_args(&call.arguments),
            },
        }));
    }

    fn tool_result(&mut self, step_id: &str, call: &ToolCall, ok: bool, result_summary: String) {
        let meta = self.meta(step_id);
        self.record(StepEvent::ToolResult(Step {
            meta,
            payload: ToolResultPayload {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                ok,
                result_summary,
            },
        }));
    }

    fn completed(&mut self, step_id: &str, tool_calls: u32) {
        let meta = self.meta(step_id);
        self.record(StepEvent::StepCompleted(Step {
            meta,
            payload: StepCompletedPayload { tool_calls },
        }));
    }

    fn failed(&mut self, step_id: &str, error: &AppError) {
        let meta = self.meta(step_id);
        self.record(StepEvent::StepFailed(Step {
            meta,
            payload: StepFailedPayload {
                error: error.clone(),
            },
        }));
    }

    fn into_events(self) -> Vec<StepEvent> {
        self.events
    }
}
