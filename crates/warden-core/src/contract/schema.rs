//! JSON Schema validation for templates, citations and declared output schemas.
//!
//! The template and citation schemas are embedded at compile time from
//! `schemas/` and compiled once. Validation failures are reported as
//! [`ValidationIssue`]s addressed by JSON pointer.

use std::sync::OnceLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::ValidationIssue;

const TEMPLATE_SCHEMA_JSON: &str = include_str!("../../schemas/template.schema.json");
const CITATION_SCHEMA_JSON: &str = include_str!("../../schemas/citation.schema.json");

static TEMPLATE_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static CITATION_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn compile(source: &str) -> Result<jsonschema::Validator, String> {
    let schema_value: JsonValue =
        serde_json::from_str(source).map_err(|e| format!("Invalid schema JSON: {}", e))?;
    jsonschema::options()
        .build(&schema_value)
        .map_err(|e| format!("Failed to compile schema: {}", e))
}

fn get_validator(
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    source: &'static str,
) -> Result<&'static jsonschema::Validator, SchemaError> {
    match cell.get_or_init(|| compile(source)) {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

fn collect_issues(validator: &jsonschema::Validator, instance: &JsonValue) -> Vec<ValidationIssue> {
    validator
        .iter_errors(instance)
        .map(|e| ValidationIssue::new(e.instance_path.to_string(), e.to_string()))
        .collect()
}

fn run(
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    source: &'static str,
    instance: &JsonValue,
) -> Result<(), Vec<ValidationIssue>> {
    let validator =
        get_validator(cell, source).map_err(|e| vec![ValidationIssue::new("", e.to_string())])?;
    let issues = collect_issues(validator, instance);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Validate a template definition document.
pub fn validate_template_schema(instance: &JsonValue) -> Result<(), Vec<ValidationIssue>> {
    run(&TEMPLATE_SCHEMA, TEMPLATE_SCHEMA_JSON, instance)
}

/// Validate a single citation document.
pub fn validate_citation_schema(instance: &JsonValue) -> Result<(), Vec<ValidationIssue>> {
    run(&CITATION_SCHEMA, CITATION_SCHEMA_JSON, instance)
}

/// Validate `instance` against a caller-supplied schema (a template's
/// `outputSchema`). A schema that does not compile is reported as an issue
/// at the root.
pub fn validate_against(schema: &JsonValue, instance: &JsonValue) -> Result<(), Vec<ValidationIssue>> {
    let validator = jsonschema::options()
        .build(schema)
        .map_err(|e| vec![ValidationIssue::new("", format!("invalid output schema: {}", e))])?;
    let issues = collect_issues(&validator, instance);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Check if a template document is valid. Use [`validate_template_schema`]
/// for the issue list.
pub fn is_valid_template(instance: &JsonValue) -> bool {
    get_validator(&TEMPLATE_SCHEMA, TEMPLATE_SCHEMA_JSON)
        .map(|v| v.is_valid(instance))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_template() -> JsonValue {
        json!({
            "schemaVersion": 1,
            "systemPrompt": "You are careful.",
            "prompt": "Answer: {{input}}",
            "workflowPolicy": { "maxSteps": 2, "retry": { "maxRetries": 1 } },
            "citationPolicy": { "mode": "optional" },
            "guardrailsPolicy": { "enforceHonorCode": false }
        })
    }

    #[test]
    fn test_valid_template_passes_schema() {
        assert!(validate_template_schema(&minimal_template()).is_ok());
        assert!(is_valid_template(&minimal_template()));
    }

    #[test]
    fn test_wrong_field_type_reports_path() {
        let mut value = minimal_template();
        value["workflowPolicy"]["maxSteps"] = json!("three");
        let issues = validate_template_schema(&value).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "/workflowPolicy/maxSteps"));
    }

    #[test]
    fn test_missing_required_field_fails() {
        let mut value = minimal_template();
        value.as_object_mut().unwrap().remove("citationPolicy");
        assert!(validate_template_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_field_fails() {
        let mut value = minimal_template();
        value["surprise"] = json!(true);
        assert!(validate_template_schema(&value).is_err());
    }

    #[test]
    fn test_non_object_template_fails_at_root() {
        let issues = validate_template_schema(&json!([1, 2, 3])).unwrap_err();
        assert!(issues[0].path.is_empty() || issues[0].path == "/");
    }

    #[test]
    fn test_citation_status_enum() {
        let value = json!({
            "citationId": "c-1",
            "sourceType": "doc",
            "projectId": "p",
            "locator": "l",
            "status": "made_up"
        });
        assert!(validate_citation_schema(&value).is_err());
    }

    #[test]
    fn test_validate_against_output_schema() {
        let schema = json!({
            "type": "object",
            "required": ["answer"],
            "properties": { "answer": { "type": "string" } }
        });
        assert!(validate_against(&schema, &json!({ "answer": "42" })).is_ok());
        let issues = validate_against(&schema, &json!({ "answer": 42 })).unwrap_err();
        assert_eq!(issues[0].path, "/answer");
    }

    #[test]
    fn test_uncompilable_output_schema_is_an_issue() {
        let schema = json!({ "type": 12 });
        assert!(validate_against(&schema, &json!({})).is_err());
    }
}
