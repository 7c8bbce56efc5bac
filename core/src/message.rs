use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Who authored a message in a diagnostic exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation requested by the model. The id ties the eventual
/// tool-result message back to this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call-{}", Uuid::now_v7()),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of dispatching one tool invocation. Produced exactly once by the
/// dispatch boundary and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

impl ToolOutcome {
    pub fn ok(payload: Value) -> Self {
        Self {
            status: ToolStatus::Ok,
            payload,
        }
    }

    pub fn error(payload: Value) -> Self {
        Self {
            status: ToolStatus::Error,
            payload,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// A message in the conversation log.
///
/// Assistant messages may carry requested tool invocations; tool messages
/// reference exactly one prior request via `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ToolOutcome>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            call_id: None,
            tool_name: None,
            outcome: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            call_id: None,
            tool_name: None,
            outcome: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            call_id: None,
            tool_name: None,
            outcome: None,
        }
    }

    pub fn tool_result(request: &ToolCallRequest, outcome: ToolOutcome) -> Self {
        Self {
            role: Role::Tool,
            content: serde_json::to_string(&outcome.payload).unwrap_or_default(),
            tool_calls: Vec::new(),
            call_id: Some(request.id.clone()),
            tool_name: Some(request.name.clone()),
            outcome: Some(outcome),
        }
    }

    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Append-only message log for one question-answer exchange.
///
/// Steps never rewrite history; each loop iteration only pushes new
/// messages, which keeps the result aggregator a pure function of the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Seed a fresh exchange: system directive first, then the question.
    /// The directive is never counted as user content.
    pub fn seeded(directive: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(directive), Message::user(question)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
