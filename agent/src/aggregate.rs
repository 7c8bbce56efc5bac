use serde::Serialize;
use serde_json::Value;

use doctor_core::message::{Conversation, Role, ToolStatus};

/// One tool invocation as presented to the caller. `status` comes from
/// the dispatch boundary and is authoritative; no sniffing of payload
/// text for the word "error".
#[derive(Debug, Clone, Serialize)]
pub struct ToolTrace {
    pub tool: String,
    pub status: ToolStatus,
    pub output: Value,
}

/// The aggregated answer for one exchange. Derived from the conversation,
/// never stored; recomputing it from the same history yields the same
/// value.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub answer: String,
    pub tool_results: Vec<ToolTrace>,
}

/// Walk the history and extract the final answer plus the ordered tool
/// invocations. Only messages after the most recent occurrence of the
/// question are considered, so a duplicate of an earlier question never
/// resurfaces stale results. Pure: no tool is re-invoked.
pub fn aggregate(conversation: &Conversation, question: &str) -> Exchange {
    let messages = conversation.messages();
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User && m.content == question)
        .map(|index| index + 1)
        .unwrap_or(0);

    let mut answer = String::new();
    let mut tool_results = Vec::new();

    for message in &messages[start..] {
        match message.role {
            Role::Tool => {
                if let Some(outcome) = &message.outcome {
                    tool_results.push(ToolTrace {
                        tool: message
                            .tool_name
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                        status: outcome.status,
                        output: trace_output(outcome.status, &outcome.payload),
                    });
                }
            }
            Role::Assistant if !message.content.trim().is_empty() => {
                answer = message.content.clone();
            }
            _ => {}
        }
    }

    Exchange {
        answer,
        tool_results,
    }
}

/// Errors surface as their raw message text; successes as the structured
/// result body.
fn trace_output(status: ToolStatus, payload: &Value) -> Value {
    match status {
        ToolStatus::Error => {
            let text = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            Value::String(text)
        }
        ToolStatus::Ok => payload.get("data").cloned().unwrap_or_else(|| payload.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctor_core::message::{Message, ToolCallRequest, ToolOutcome};
    use serde_json::{Map, json};

    fn history_with_tools() -> Conversation {
        let mut conv = Conversation::seeded("directive", "why slow?");
        let ok_call = ToolCallRequest::new("blocking_sessions", Map::new());
        let bad_call = ToolCallRequest::new("nonexistent", Map::new());
        conv.push(Message::assistant("", vec![ok_call.clone(), bad_call.clone()]));
        conv.push(Message::tool_result(
            &ok_call,
            ToolOutcome::ok(json!({
                "tool": "blocking_sessions",
                "data": { "total_blocked": 3 }
            })),
        ));
        conv.push(Message::tool_result(
            &bad_call,
            ToolOutcome::error(json!({
                "tool": "nonexistent",
                "error": { "error": "unknown_tool", "message": "Unknown tool 'nonexistent'" }
            })),
        ));
        conv.push(Message::assistant("Three sessions are blocked.", Vec::new()));
        conv
    }

    #[test]
    fn answer_and_traces_are_extracted_in_order() {
        let conv = history_with_tools();
        let exchange = aggregate(&conv, "why slow?");
        assert_eq!(exchange.answer, "Three sessions are blocked.");
        assert_eq!(exchange.tool_results.len(), 2);
        assert_eq!(exchange.tool_results[0].tool, "blocking_sessions");
        assert_eq!(exchange.tool_results[0].status, ToolStatus::Ok);
        assert_eq!(exchange.tool_results[0].output["total_blocked"], 3);
    }

    #[test]
    fn error_trace_carries_the_raw_message_text() {
        let conv = history_with_tools();
        let exchange = aggregate(&conv, "why slow?");
        assert_eq!(exchange.tool_results[1].status, ToolStatus::Error);
        assert_eq!(
            exchange.tool_results[1].output,
            json!("Unknown tool 'nonexistent'")
        );
    }

    #[test]
    fn aggregation_is_idempotent_on_frozen_history() {
        let conv = history_with_tools();
        let first = aggregate(&conv, "why slow?");
        let second = aggregate(&conv, "why slow?");
        assert_eq!(first.answer, second.answer);
        assert_eq!(
            serde_json::to_value(&first.tool_results).unwrap(),
            serde_json::to_value(&second.tool_results).unwrap()
        );
    }

    #[test]
    fn duplicate_question_uses_the_most_recent_occurrence() {
        let mut conv = Conversation::seeded("directive", "status?");
        conv.push(Message::assistant("Old answer.", Vec::new()));
        conv.push(Message::user("status?"));
        conv.push(Message::assistant("Fresh answer.", Vec::new()));

        let exchange = aggregate(&conv, "status?");
        assert_eq!(exchange.answer, "Fresh answer.");
        assert!(exchange.tool_results.is_empty());
    }

    #[test]
    fn payload_containing_the_word_error_stays_ok() {
        // The status tag decides, not the payload text.
        let mut conv = Conversation::seeded("directive", "q");
        let call = ToolCallRequest::new("sql_monitoring", Map::new());
        conv.push(Message::assistant("", vec![call.clone()]));
        conv.push(Message::tool_result(
            &call,
            ToolOutcome::ok(json!({
                "tool": "sql_monitoring",
                "data": { "sessions": [{ "query": "SELECT * FROM error_log" }] }
            })),
        ));
        conv.push(Message::assistant("done", Vec::new()));

        let exchange = aggregate(&conv, "q");
        assert_eq!(exchange.tool_results[0].status, ToolStatus::Ok);
        assert!(exchange.tool_results[0].output["sessions"][0]["query"]
            .as_str()
            .unwrap()
            .contains("error_log"));
    }
}
