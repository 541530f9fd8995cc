#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};

use warden_core::{
    AppError, RequestContext, ResolvedTemplate, SecurityEvent, TemplateRegistry,
    TemplateSelection,
};
use warden_runtime::{
    AgentOrchestrator, CacheEvent, ProviderAdapter, ProviderError, ProviderInput, ProviderResult,
    ProviderRoute, ResponseCache, RoutedLanguageModel, RoutingConfig, RunRequest, RunResult,
    ToolCall, ToolExecutor,
};

/// Provider that replays scripted outcomes and records every input.
pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Result<ProviderResult, ProviderError>>>,
    inputs: Mutex<Vec<ProviderInput>>,
    calls: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(id: &str, script: Vec<Result<ProviderResult, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script.into()),
            inputs: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            delay: None,
        })
    }

    pub fn answering(id: &str, result: ProviderResult) -> Arc<Self> {
        Self::new(id, vec![Ok(result)])
    }

    pub fn slow(id: &str, delay: Duration, result: ProviderResult) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(vec![Ok(result)].into()),
            inputs: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<ProviderInput> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate_text(
        &self,
        _ctx: &RequestContext,
        input: &ProviderInput,
    ) -> Result<ProviderResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
    }
}

/// Tool executor that records calls and answers with a fixed value.
pub struct RecordingTools {
    pub calls: Mutex<Vec<ToolCall>>,
    pub reply: JsonValue,
}

impl RecordingTools {
    pub fn new(reply: JsonValue) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply,
        })
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ToolExecutor for RecordingTools {
    async fn execute(&self, _ctx: &RequestContext, call: &ToolCall) -> Result<JsonValue, AppError> {
        self.calls.lock().push(call.clone());
        Ok(self.reply.clone())
    }
}

/// Collects everything a sink receives.
#[derive(Default)]
pub struct Recorded {
    pub security: Mutex<Vec<SecurityEvent>>,
    pub cache: Mutex<Vec<CacheEvent>>,
}

impl Recorded {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub fn single_route(provider: Arc<ScriptedProvider>) -> RoutedLanguageModel {
    RoutedLanguageModel::new(
        &RoutingConfig::new(ProviderRoute::new(provider.id.clone(), "model-1")),
        [provider as Arc<dyn ProviderAdapter>],
    )
    .expect("route matches adapter")
}

pub fn orchestrator(provider: Arc<ScriptedProvider>) -> AgentOrchestrator {
    AgentOrchestrator::new(Arc::new(single_route(provider))).with_cache(Arc::new(
        ResponseCache::<String, RunResult>::new(32, Duration::from_secs(60)),
    ))
}

pub fn ctx(request_id: &str) -> RequestContext {
    RequestContext::new(request_id, "tenant-a")
        .with_project("proj-1")
        .with_task("task-1")
}

/// Inline template with the given policy overrides.
pub fn template(
    request_id: &str,
    max_steps: u32,
    citation_mode: &str,
    honor_code: bool,
    output_schema: Option<JsonValue>,
) -> ResolvedTemplate {
    let mut definition = json!({
        "schemaVersion": 1,
        "systemPrompt": "You answer questions about project documents.",
        "prompt": "Question: {{input}}",
        "tools": [{ "name": "search", "description": "Search project documents" }],
        "workflowPolicy": { "maxSteps": max_steps, "retry": { "maxRetries": 0 } },
        "citationPolicy": { "mode": citation_mode },
        "guardrailsPolicy": { "enforceHonorCode": honor_code }
    });
    if let Some(schema) = output_schema {
        definition["outputSchema"] = schema;
    }
    TemplateRegistry::new()
        .resolve(request_id, &TemplateSelection::inline(definition))
        .expect("valid inline template")
}

pub fn request(request_id: &str, template: ResolvedTemplate, input: &str) -> RunRequest {
    RunRequest::new(ctx(request_id), template, input)
}

pub fn citation(id: &str, project: &str) -> JsonValue {
    json!({
        "citationId": id,
        "sourceType": "document",
        "projectId": project,
        "locator": "page:4",
        "status": "verifiable"
    })
}
