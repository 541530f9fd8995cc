//! Template resolution.
//!
//! A run selects its template either by reference (`templateId`, optional
//! `templateVersion`) or by supplying a definition inline. With neither, the
//! built-in default template is used.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{AppError, ValidationIssue};

use super::canonical::content_hash;
use super::template::{
    CitationMode, CitationPolicy, GuardrailsPolicy, TemplateDefinition, TemplateRef,
    WorkflowPolicy,
};

/// Id of the built-in default template.
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Version of the built-in default template.
pub const DEFAULT_TEMPLATE_VERSION: &str = "1";

/// Id assigned to inline definitions that do not name themselves.
pub const INLINE_TEMPLATE_ID: &str = "inline";

/// Version assigned to inline definitions that do not name a version.
pub const INLINE_TEMPLATE_VERSION: &str = "inline";

lazy_static! {
    static ref DEFAULT_TEMPLATE: TemplateDefinition = TemplateDefinition {
        schema_version: 1,
        system_prompt: "You are a careful assistant. Answer only from the evidence you are given \
                        and cite it."
            .to_string(),
        prompt: "{{input}}".to_string(),
        tools: Vec::new(),
        output_schema: None,
        workflow_policy: WorkflowPolicy {
            max_steps: 1,
            retry: None,
        },
        citation_policy: CitationPolicy {
            mode: CitationMode::Optional,
        },
        guardrails_policy: GuardrailsPolicy {
            enforce_honor_code: false,
        },
    };
}

/// The built-in default template.
pub fn default_template() -> &'static TemplateDefinition {
    &DEFAULT_TEMPLATE
}

/// Deterministic digest of the canonicalized definition.
pub fn template_definition_hash(definition: &TemplateDefinition) -> String {
    content_hash(definition)
}

/// Build a content-addressed reference for a definition.
pub fn create_template_ref_from_definition(
    template_id: impl Into<String>,
    template_version: impl Into<String>,
    definition: &TemplateDefinition,
) -> TemplateRef {
    TemplateRef {
        template_id: template_id.into(),
        template_version: template_version.into(),
        template_definition_hash: Some(template_definition_hash(definition)),
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<String>,

    /// Untrusted inline definition; validated during resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_definition: Option<JsonValue>,
}

impl TemplateSelection {
    pub fn by_id(template_id: impl Into<String>) -> Self {
        Self {
            template_id: Some(template_id.into()),
            ..Default::default()
        }
    }

    pub fn inline(definition: JsonValue) -> Self {
        Self {
            template_definition: Some(definition),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.template_version = Some(version.into());
        self
    }
}

/// A template ready to drive a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplate {
    pub template_ref: TemplateRef,
    pub definition: TemplateDefinition,
}

/// Caller-registered templates keyed by id and version.
///
/// Always contains the built-in default.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, BTreeMap<String, TemplateDefinition>>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let mut registry = Self {
            templates: BTreeMap::new(),
        };
        registry.register(
            DEFAULT_TEMPLATE_ID,
            DEFAULT_TEMPLATE_VERSION,
            default_template().clone(),
        );
        registry
    }
}

impl TemplateRegistry {
    /// Create a registry holding only the default template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Replaces an existing entry with the same
    /// id and version.
    pub fn register(
        &mut self,
        template_id: impl Into<String>,
        template_version: impl Into<String>,
        definition: TemplateDefinition,
    ) -> TemplateRef {
        let template_id = template_id.into();
        let template_version = template_version.into();
        let template_ref =
            create_template_ref_from_definition(&template_id, &template_version, &definition);
        self.templates
            .entry(template_id)
            .or_default()
            .insert(template_version, definition);
        template_ref
    }

    /// Look up a definition. Without a version the highest registered
    /// version wins.
    pub fn get(
        &self,
        template_id: &str,
        template_version: Option<&str>,
    ) -> Option<(&str, &TemplateDefinition)> {
        let versions = self.templates.get(template_id)?;
        match template_version {
            Some(v) => versions.get_key_value(v).map(|(k, d)| (k.as_str(), d)),
            None => versions.iter().next_back().map(|(k, d)| (k.as_str(), d)),
        }
    }

    /// Registered template ids.
    pub fn template_ids(&self) -> Vec<&str> {
        self.templates.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a selection against this registry.
    pub fn resolve(
        &self,
        request_id: &str,
        selection: &TemplateSelection,
    ) -> Result<ResolvedTemplate, AppError> {
        if let Some(raw) = &selection.template_definition {
            let definition = TemplateDefinition::from_value(raw).map_err(|issues| {
                AppError::validation(
                    request_id,
                    issues
                        .into_iter()
                        .map(|i| i.nested_under("/templateDefinition"))
                        .collect(),
                )
            })?;
            let template_id = selection
                .template_id
                .clone()
                .unwrap_or_else(|| INLINE_TEMPLATE_ID.to_string());
            let template_version = selection
                .template_version
                .clone()
                .unwrap_or_else(|| INLINE_TEMPLATE_VERSION.to_string());
            let template_ref =
                create_template_ref_from_definition(template_id, template_version, &definition);
            tracing::debug!(
                request_id,
                template_id = %template_ref.template_id,
                "Resolved inline template definition"
            );
            return Ok(ResolvedTemplate {
                template_ref,
                definition,
            });
        }

        let template_id = selection
            .template_id
            .as_deref()
            .unwrap_or(DEFAULT_TEMPLATE_ID);
        let template_version = match (&selection.template_id, &selection.template_version) {
            (None, None) => Some(DEFAULT_TEMPLATE_VERSION),
            (_, version) => version.as_deref(),
        };

        let Some((version, definition)) = self.get(template_id, template_version) else {
            let (path, message) = match template_version {
                Some(v) if self.templates.contains_key(template_id) => (
                    "/templateVersion",
                    format!("unknown version '{}' of template '{}'", v, template_id),
                ),
                _ => ("/templateId", format!("unknown template '{}'", template_id)),
            };
            return Err(AppError::validation(
                request_id,
                vec![ValidationIssue::new(path, message)],
            ));
        };

        Ok(ResolvedTemplate {
            template_ref: create_template_ref_from_definition(template_id, version, definition),
            definition: definition.clone(),
        })
    }
}

/// Resolve a caller's template selection.
pub fn resolve_template_selection(
    registry: &TemplateRegistry,
    request_id: &str,
    selection: &TemplateSelection,
) -> Result<ResolvedTemplate, AppError> {
    registry.resolve(request_id, selection)
}
