//! The static tool surface the gateway advertises.

use px_domain::tool::ToolDefinition;

/// Definitions for the built-in tool set, in discovery order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            "gemini_generate",
            "Generate text with the Google Gemini API",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The prompt to send" },
                    "model": { "type": "string", "description": "Model override" }
                },
                "required": ["prompt"]
            }),
        ),
        definition(
            "slack_send_message",
            "Post a message to a Slack channel",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "channel": { "type": "string", "description": "Channel id or name" },
                    "text": { "type": "string", "description": "Message text" }
                },
                "required": ["channel", "text"]
            }),
        ),
        definition(
            "gpg_sign",
            "Produce an armored detached GPG signature",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Data to sign" },
                    "key_id": { "type": "string", "description": "Signing key selector" }
                },
                "required": ["message"]
            }),
        ),
    ]
}

fn definition(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        input_schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_declares_an_object_schema() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 3);
        for def in &defs {
            assert_eq!(def.input_schema["type"], "object");
            assert!(def.input_schema["required"].is_array());
        }
    }
}
