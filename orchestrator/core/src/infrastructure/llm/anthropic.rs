// Anthropic Reasoning Engine Adapter
//
// Anti-Corruption Layer for the Anthropic Messages API, including tool-use
// blocks. Conversations map onto the wire format as follows: system turns
// are concatenated into the top-level system field, assistant turns carry
// text plus tool_use blocks, tool results ride in the following user turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::llm::{
    ChatMessage, EngineError, EngineTurn, ReasoningEngine, Role, ToolRequest,
};
use crate::domain::tool::ToolSchema;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContent>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContent {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

impl AnthropicEngine {
    pub fn new(api_key: String, model: String, max_tokens: u32, temperature: f32) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), api_key, model, max_tokens, temperature)
    }

    pub fn with_endpoint(
        endpoint: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            max_tokens,
            temperature,
        }
    }
}

/// Split a conversation into the system field and wire messages.
fn to_wire(messages: &[ChatMessage]) -> (Option<String>, Vec<ApiMessage>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut wire: Vec<ApiMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.clone()),
            Role::User => wire.push(ApiMessage {
                role: "user",
                content: vec![ApiContent::Text {
                    text: msg.content.clone(),
                }],
            }),
            Role::Assistant => {
                let mut content = Vec::new();
                if !msg.content.is_empty() {
                    content.push(ApiContent::Text {
                        text: msg.content.clone(),
                    });
                }
                for request in &msg.tool_requests {
                    content.push(ApiContent::ToolUse {
                        id: request.id.clone(),
                        name: request.name.clone(),
                        input: Value::Object(
                            request
                                .arguments
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                                .collect(),
                        ),
                    });
                }
                if content.is_empty() {
                    content.push(ApiContent::Text { text: String::new() });
                }
                wire.push(ApiMessage {
                    role: "assistant",
                    content,
                });
            }
            Role::Tool => {
                let block = ApiContent::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                };
                // Results of one assistant turn's requests share a single
                // user message; the API expects alternating roles.
                match wire.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|c| matches!(c, ApiContent::ToolResult { .. })) =>
                    {
                        last.content.push(block);
                    }
                    _ => wire.push(ApiMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, wire)
}

fn tool_to_wire(schema: &ToolSchema) -> ApiTool {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<Value> = Vec::new();
    for param in &schema.params {
        properties.insert(
            param.name.clone(),
            json!({ "type": "string", "description": param.description }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }
    ApiTool {
        name: schema.name.clone(),
        description: schema.description.clone(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn turn_from_response(response: AnthropicResponse) -> EngineTurn {
    let mut text_parts: Vec<String> = Vec::new();
    let mut requests: Vec<ToolRequest> = Vec::new();

    for block in response.content {
        match block {
            ResponseContent::Text { text } => text_parts.push(text),
            ResponseContent::ToolUse { id, name, input } => {
                let arguments = input
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .map(|(k, v)| {
                                let value = match v {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                };
                                (k.clone(), value)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                requests.push(ToolRequest { id, name, arguments });
            }
        }
    }

    let text = text_parts.join("\n");
    if requests.is_empty() {
        EngineTurn::FinalText(text)
    } else {
        EngineTurn::Act {
            thought: if text.trim().is_empty() { None } else { Some(text) },
            requests,
        }
    }
}

#[async_trait]
impl ReasoningEngine for AnthropicEngine {
    async fn converse(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<EngineTurn, EngineError> {
        let (system, wire_messages) = to_wire(messages);
        let request = AnthropicRequest {
            model: self.model.clone(),
            system,
            messages: wire_messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: tools.iter().map(tool_to_wire).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 401 || status == 403 {
                EngineError::Authentication(error_text)
            } else if status == 429 {
                EngineError::RateLimit
            } else if status == 404 {
                EngineError::ModelNotFound(self.model.clone())
            } else {
                EngineError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Provider(format!("Failed to parse response: {}", e)))?;

        Ok(turn_from_response(anthropic_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_system_turns_fold_into_system_field() {
        let messages = vec![
            ChatMessage::system("you are a hunter"),
            ChatMessage::user("analyze evil.exe"),
        ];
        let (system, wire) = to_wire(&messages);
        assert_eq!(system.as_deref(), Some("you are a hunter"));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_tool_results_share_one_user_turn() {
        let mut args = HashMap::new();
        args.insert("domain".to_string(), "evil.com".to_string());
        let requests = vec![
            ToolRequest {
                id: "t1".to_string(),
                name: "get_domain_report".to_string(),
                arguments: args,
            },
            ToolRequest {
                id: "t2".to_string(),
                name: "get_ip_address_report".to_string(),
                arguments: HashMap::new(),
            },
        ];
        let messages = vec![
            ChatMessage::user("go"),
            ChatMessage::assistant_with_requests("checking", requests),
            ChatMessage::tool_result("t1", "{}"),
            ChatMessage::tool_result("t2", "timeout"),
        ];

        let (_, wire) = to_wire(&messages);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].role, "assistant");
        assert_eq!(wire[1].content.len(), 3); // text + two tool_use blocks
        assert_eq!(wire[2].role, "user");
        assert_eq!(wire[2].content.len(), 2); // both results merged
    }

    #[test]
    fn test_response_with_tool_use_maps_to_act() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "let me check" },
                { "type": "tool_use", "id": "t1", "name": "get_file_report",
                  "input": { "hash": "abc", "limit": 10 } }
            ]
        });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        match turn_from_response(response) {
            EngineTurn::Act { thought, requests } => {
                assert_eq!(thought.as_deref(), Some("let me check"));
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].arguments["hash"], "abc");
                assert_eq!(requests[0].arguments["limit"], "10");
            }
            _ => panic!("expected Act"),
        }
    }

    #[test]
    fn test_response_without_tool_use_is_final_text() {
        let raw = json!({ "content": [ { "type": "text", "text": "{\"a\":1}" } ] });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        match turn_from_response(response) {
            EngineTurn::FinalText(text) => assert_eq!(text, "{\"a\":1}"),
            _ => panic!("expected FinalText"),
        }
    }

    #[test]
    fn test_tool_schema_wire_format() {
        let schema = ToolSchema::new("get_domain_report", "Get threat report for a domain.")
            .with_param("domain", "Domain to look up", true);
        let wire = tool_to_wire(&schema);
        assert_eq!(wire.input_schema["type"], "object");
        assert_eq!(wire.input_schema["required"][0], "domain");
        assert_eq!(wire.input_schema["properties"]["domain"]["type"], "string");
    }
}
