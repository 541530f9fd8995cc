//! Template definitions: the versioned behavioral contract of a run.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ValidationIssue;

use super::schema::validate_template_schema;

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the tool arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonValue>,
}

/// Same-provider retry budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
}

/// Step and retry limits for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPolicy {
    /// Maximum number of model steps (tool-call round trips + final answer)
    pub max_steps: u32,

    /// Narrows the routing retry budget; unset defers to routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl WorkflowPolicy {
    /// Same-provider retries allowed when routing permits `routing_max`.
    pub fn effective_max_retries(&self, routing_max: u32) -> u32 {
        match self.retry {
            Some(retry) => retry.max_retries.min(routing_max),
            None => routing_max,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CitationMode {
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitationPolicy {
    pub mode: CitationMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailsPolicy {
    pub enforce_honor_code: bool,
}

/// A template definition. Immutable once resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TemplateDefinition {
    pub schema_version: u32,

    pub system_prompt: String,

    /// User prompt; `{{input}}` is replaced with the run input
    pub prompt: String,

    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonValue>,

    pub workflow_policy: WorkflowPolicy,

    pub citation_policy: CitationPolicy,

    pub guardrails_policy: GuardrailsPolicy,
}

/// Content-addressed reference to a resolved template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub template_id: String,
    pub template_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_definition_hash: Option<String>,
}

impl TemplateDefinition {
    /// Decode an untrusted definition, reporting every schema issue.
    pub fn from_value(value: &JsonValue) -> Result<Self, Vec<ValidationIssue>> {
        validate_template_schema(value)?;
        serde_json::from_value(value.clone())
            .map_err(|e| vec![ValidationIssue::new("", e.to_string())])
    }

    /// Decode a definition from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Vec<ValidationIssue>> {
        let value: JsonValue = serde_json::from_str(json)
            .map_err(|e| vec![ValidationIssue::new("", format!("invalid JSON: {}", e))])?;
        Self::from_value(&value)
    }

    /// Render the user prompt for `input`.
    ///
    /// Templates without an `{{input}}` placeholder get the input appended
    /// after a blank line.
    pub fn render_prompt(&self, input: &str) -> String {
        if self.prompt.contains("{{input}}") {
            self.prompt.replace("{{input}}", input)
        } else if input.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\n\n{}", self.prompt, input)
        }
    }

    pub fn citations_required(&self) -> bool {
        self.citation_policy.mode == CitationMode::Required
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }
}
