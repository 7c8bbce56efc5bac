use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use doctor_core::config::ModelConfig;
use doctor_core::dispatch::ToolSpec;
use doctor_core::error::AgentError;
use doctor_core::message::{Conversation, Message, Role, ToolCallRequest};

/// The model seam of the orchestration loop: given the conversation so far
/// and the tool catalog, produce the next assistant message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn next_message(
        &self,
        conversation: &Conversation,
        tools: &[ToolSpec],
    ) -> Result<Message, AgentError>;
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for &T {
    async fn next_message(
        &self,
        conversation: &Conversation,
        tools: &[ToolSpec],
    ) -> Result<Message, AgentError> {
        (**self).next_message(conversation, tools).await
    }
}

/// Chat-completions client for any OpenAI-compatible inference endpoint
/// (OCI Generative AI exposes one; so do local servers).
pub struct OpenAiChatModel {
    http: reqwest::Client,
    config: ModelConfig,
}

impl OpenAiChatModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn next_message(
        &self,
        conversation: &Conversation,
        tools: &[ToolSpec],
    ) -> Result<Message, AgentError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: to_wire_messages(conversation),
            tools: tools.iter().map(to_wire_tool).collect(),
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request);
        if let Some(compartment) = &self.config.compartment_id {
            builder = builder.header("CompartmentId", compartment);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Model(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Model(format!(
                "endpoint returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Model(format!("unparseable response: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Model("response contained no choices".to_string()))?;

        Ok(parse_assistant_message(choice.message))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireCall {
    name: String,
    /// JSON object encoded as a string, per the chat-completions wire format.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

fn to_wire_tool(spec: &ToolSpec) -> WireTool {
    WireTool {
        kind: "function",
        function: WireToolFunction {
            name: spec.name,
            description: spec.description,
            parameters: spec.parameters.clone(),
        },
    }
}

fn to_wire_messages(conversation: &Conversation) -> Vec<WireMessage> {
    conversation
        .messages()
        .iter()
        .map(|message| match message.role {
            Role::System => WireMessage {
                role: "system".to_string(),
                content: Some(message.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::User => WireMessage {
                role: "user".to_string(),
                content: Some(message.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant => WireMessage {
                role: "assistant".to_string(),
                content: Some(message.content.clone()),
                tool_calls: if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| WireToolCall {
                                id: call.id.clone(),
                                kind: "function".to_string(),
                                function: WireCall {
                                    name: call.name.clone(),
                                    arguments: Value::Object(call.arguments.clone()).to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: None,
            },
            Role::Tool => WireMessage {
                role: "tool".to_string(),
                content: Some(message.content.clone()),
                tool_calls: None,
                tool_call_id: message.call_id.clone(),
            },
        })
        .collect()
}

fn parse_assistant_message(wire: WireMessage) -> Message {
    let tool_calls = wire
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id,
            name: call.function.name,
            arguments: parse_arguments(&call.function.arguments),
        })
        .collect();
    Message::assistant(wire.content.unwrap_or_default(), tool_calls)
}

/// Arguments arrive as JSON-in-a-string. Anything unparseable becomes an
/// empty map so argument validation at the dispatch boundary reports it
/// instead of the loop crashing.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_maps_to_wire_roles() {
        let mut conv = Conversation::seeded("directive", "question");
        let request = ToolCallRequest::new("blocking_sessions", Map::new());
        conv.push(Message::assistant("", vec![request.clone()]));
        conv.push(Message::tool_result(
            &request,
            doctor_core::message::ToolOutcome::ok(json!({"total_blocked": 0})),
        ));

        let wire = to_wire_messages(&conv);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[2].role, "assistant");
        assert_eq!(
            wire[2].tool_calls.as_ref().unwrap()[0].function.name,
            "blocking_sessions"
        );
        assert_eq!(wire[3].role, "tool");
        assert_eq!(wire[3].tool_call_id.as_deref(), Some(request.id.as_str()));
    }

    #[test]
    fn response_tool_calls_are_parsed_into_requests() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {
                            "name": "cpu_saturation",
                            "arguments": "{\"start_time\":\"2026-08-30T12:00:00Z\",\"end_time\":\"2026-08-30T13:00:00Z\"}"
                        }
                    }]
                }
            }]
        });
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        let message = parse_assistant_message(parsed.choices.into_iter().next().unwrap().message);
        assert!(message.requests_tools());
        assert_eq!(message.tool_calls[0].name, "cpu_saturation");
        assert_eq!(
            message.tool_calls[0].arguments["start_time"],
            "2026-08-30T12:00:00Z"
        );
    }

    #[test]
    fn unparseable_arguments_degrade_to_an_empty_map() {
        assert!(parse_arguments("{not json").is_empty());
        assert!(parse_arguments("[1, 2]").is_empty());
        assert_eq!(parse_arguments("{\"a\": 1}")["a"], 1);
    }
}
