//! Argument schema validation seam.
//!
//! Validation is a pluggable predicate the orchestrator consults; the
//! default implementation checks required fields and primitive types
//! against the tool's declared input schema. Richer JSON-Schema
//! semantics belong to whatever validator the host plugs in.

use serde_json::{Map, Value};

use px_domain::error::{Error, Result};
use px_domain::tool::ToolDefinition;

/// Pluggable per-tool argument check.
pub trait ArgumentValidator: Send + Sync {
    fn validate(&self, tool: &ToolDefinition, arguments: &Map<String, Value>) -> Result<()>;
}

/// Default validator: every `required` field must be present, and
/// properties with a declared primitive `type` must match it. Failures
/// enumerate the offending fields.
#[derive(Debug, Default)]
pub struct RequiredFieldsValidator;

impl ArgumentValidator for RequiredFieldsValidator {
    fn validate(&self, tool: &ToolDefinition, arguments: &Map<String, Value>) -> Result<()> {
        let schema = &tool.input_schema;
        let mut offending: Vec<String> = Vec::new();

        if let Some(required) = schema["required"].as_array() {
            for field in required.iter().filter_map(Value::as_str) {
                if !arguments.contains_key(field) {
                    offending.push(format!("'{field}' is required"));
                }
            }
        }

        if let Some(properties) = schema["properties"].as_object() {
            for (field, spec) in properties {
                let Some(value) = arguments.get(field) else {
                    continue;
                };
                let Some(expected) = spec["type"].as_str() else {
                    continue;
                };
                if !type_matches(expected, value) {
                    offending.push(format!("'{field}' must be a {expected}"));
                }
            }
        }

        if offending.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "tool '{}': {}",
                tool.name,
                offending.join(", ")
            )))
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ToolDefinition {
        serde_json::from_value(serde_json::json!({
            "name": "gemini_generate",
            "description": "Generate text",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "prompt": { "type": "string" },
                    "model": { "type": "string" }
                },
                "required": ["prompt"]
            }
        }))
        .unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn valid_arguments_pass() {
        let validator = RequiredFieldsValidator;
        validator
            .validate(&tool(), &args(serde_json::json!({ "prompt": "hi" })))
            .unwrap();
    }

    #[test]
    fn missing_required_field_is_named() {
        let validator = RequiredFieldsValidator;
        let err = validator
            .validate(&tool(), &args(serde_json::json!({})))
            .unwrap_err();
        assert!(err.to_string().contains("'prompt' is required"));
    }

    #[test]
    fn wrong_type_is_named() {
        let validator = RequiredFieldsValidator;
        let err = validator
            .validate(&tool(), &args(serde_json::json!({ "prompt": 42 })))
            .unwrap_err();
        assert!(err.to_string().contains("'prompt' must be a string"));
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let validator = RequiredFieldsValidator;
        validator
            .validate(
                &tool(),
                &args(serde_json::json!({ "prompt": "hi", "extra": true })),
            )
            .unwrap();
    }
}
