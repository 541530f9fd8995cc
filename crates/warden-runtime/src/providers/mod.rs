//! Provider abstractions for warden-runtime.
//!
//! A [`ProviderAdapter`] is the only place a model call is made. Concrete
//! SDK integrations live outside this crate and plug in through
//! [`ProviderFactory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

use warden_core::contract::ToolDefinition;
use warden_core::stream::{FinishReason, Usage};
use warden_core::{AppError, RequestContext};

mod factory;

pub use factory::{ProviderFactory, ProviderRegistry, RegistryError};

/// Errors from providers.
///
/// Adapters may return anything here; the routed model normalizes every
/// variant into the unified error envelope.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// A typed failure the adapter already mapped
    #[error("{0}")]
    App(AppError),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Short failure class used in logs and failure details.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::HttpError(_) => "http",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::ApiError { .. } => "api",
            ProviderError::ParseError(_) => "parse",
            ProviderError::AuthError => "auth",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::App(_) => "app_error",
            ProviderError::Other(_) => "other",
        }
    }
}

impl From<AppError> for ProviderError {
    fn from(err: AppError) -> Self {
        ProviderError::App(err)
    }
}

/// A chat message for model input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Role: "user", "assistant" or "tool"; the system prompt travels in
    /// [`ProviderInput::system_prompt`]
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Create a tool-result message.
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
        }
    }
}

/// Everything a provider needs for one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderInput {
    /// Model id from the route being attempted
    pub model_id: String,

    pub system_prompt: String,

    /// Conversation so far, starting with the rendered user prompt
    pub messages: Vec<ChatMessage>,

    pub tools: Vec<ToolDefinition>,

    /// Structured output requested when present
    pub output_schema: Option<JsonValue>,
}

/// What the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOutput {
    Text(String),
    Object(JsonValue),
}

impl ProviderOutput {
    /// Text form, used for output screening and streaming.
    pub fn as_text(&self) -> String {
        match self {
            ProviderOutput::Text(text) => text.clone(),
            ProviderOutput::Object(value) => value.to_string(),
        }
    }

    pub fn as_object(&self) -> Option<&JsonValue> {
        match self {
            ProviderOutput::Object(value) => Some(value),
            ProviderOutput::Text(_) => None,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: JsonValue,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of one provider generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub output: ProviderOutput,

    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default)]
    pub usage: Usage,

    pub finish_reason: FinishReason,
}

impl ProviderResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            output: ProviderOutput::Text(text.into()),
            tool_calls: Vec::new(),
            usage: Usage::default(),
            finish_reason: FinishReason::Stop,
        }
    }

    pub fn object(value: JsonValue) -> Self {
        Self {
            output: ProviderOutput::Object(value),
            tool_calls: Vec::new(),
            usage: Usage::default(),
            finish_reason: FinishReason::Stop,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self.finish_reason = FinishReason::ToolCalls;
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// Provider abstraction allows swapping model backends.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider id, matching `providerId` in routing config.
    fn id(&self) -> &str;

    /// Generate a response. May fail with any [`ProviderError`].
    async fn generate_text(
        &self,
        ctx: &RequestContext,
        input: &ProviderInput,
    ) -> Result<ProviderResult, ProviderError>;
}
