use futures::future::join_all;

use doctor_core::config::Limits;
use doctor_core::dispatch::ToolDispatch;
use doctor_core::error::AgentError;
use doctor_core::message::{Conversation, Message};

use crate::aggregate::{Exchange, aggregate};
use crate::model::ChatModel;
use crate::prompt::SYSTEM_DIRECTIVE;

/// The agent state machine: AWAIT_MODEL → DISPATCH_TOOLS → AWAIT_MODEL,
/// until the model answers without requesting tools (DONE).
///
/// Within one assistant turn all requested invocations run concurrently,
/// but their results are appended to history in request order, so a given
/// history is reproducible regardless of completion timing. The round-trip
/// budget and the end-to-end timeout guarantee termination against a model
/// that never stops asking for tools.
pub struct Orchestrator<M, D> {
    model: M,
    tools: D,
    limits: Limits,
}

impl<M: ChatModel, D: ToolDispatch> Orchestrator<M, D> {
    pub fn new(model: M, tools: D, limits: Limits) -> Self {
        Self {
            model,
            tools,
            limits,
        }
    }

    /// The single inbound entry point: one question, one aggregated answer.
    pub async fn ask(&self, question: &str) -> Result<Exchange, AgentError> {
        let seconds = self.limits.question_timeout.as_secs();
        match tokio::time::timeout(self.limits.question_timeout, self.run(question)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout { seconds }),
        }
    }

    async fn run(&self, question: &str) -> Result<Exchange, AgentError> {
        let conversation = self.drive(question).await?;
        Ok(aggregate(&conversation, question))
    }

    /// Drive the loop to completion and return the full history.
    pub async fn drive(&self, question: &str) -> Result<Conversation, AgentError> {
        let specs = self.tools.specs();
        let mut conversation = Conversation::seeded(SYSTEM_DIRECTIVE, question);
        let mut dispatch_cycles: u32 = 0;

        loop {
            // AWAIT_MODEL
            let message = self.model.next_message(&conversation, &specs).await?;
            let requests = message.tool_calls.clone();
            conversation.push(message);

            if requests.is_empty() {
                // DONE: the last assistant message is the final answer.
                tracing::debug!(cycles = dispatch_cycles, "exchange complete");
                return Ok(conversation);
            }

            if dispatch_cycles >= self.limits.max_round_trips {
                return Err(AgentError::BudgetExceeded {
                    limit: self.limits.max_round_trips,
                });
            }

            // DISPATCH_TOOLS: concurrent execution, results appended in
            // request order.
            let outcomes = join_all(
                requests
                    .iter()
                    .map(|call| self.tools.dispatch(&call.name, &call.arguments)),
            )
            .await;
            for (call, outcome) in requests.iter().zip(outcomes) {
                conversation.push(Message::tool_result(call, outcome));
            }

            dispatch_cycles += 1;
            tracing::debug!(
                cycle = dispatch_cycles,
                tools = requests.len(),
                "dispatch cycle complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Map, Value, json};

    use doctor_core::dispatch::ToolSpec;
    use doctor_core::message::{Role, ToolCallRequest, ToolOutcome, ToolStatus};

    /// Replays a fixed script of assistant messages.
    struct ScriptedModel {
        script: Mutex<VecDeque<Message>>,
        calls: Mutex<u32>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Message>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn next_message(
            &self,
            _conversation: &Conversation,
            _tools: &[ToolSpec],
        ) -> Result<Message, AgentError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AgentError::Model("script exhausted".to_string()))
        }
    }

    /// Always asks for one more tool call; used to exercise the budget.
    struct InsatiableModel;

    #[async_trait]
    impl ChatModel for InsatiableModel {
        async fn next_message(
            &self,
            _conversation: &Conversation,
            _tools: &[ToolSpec],
        ) -> Result<Message, AgentError> {
            Ok(Message::assistant(
                "",
                vec![ToolCallRequest::new("blocking_sessions", Map::new())],
            ))
        }
    }

    /// Never answers; used to exercise the end-to-end timeout.
    struct StalledModel;

    #[async_trait]
    impl ChatModel for StalledModel {
        async fn next_message(
            &self,
            _conversation: &Conversation,
            _tools: &[ToolSpec],
        ) -> Result<Message, AgentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Message::assistant("too late", Vec::new()))
        }
    }

    /// Completes each call after a per-tool latency and records both the
    /// dispatch count and the order completions actually happened in.
    #[derive(Default)]
    struct RecordingDispatch {
        latencies: Vec<(&'static str, u64)>,
        completions: Mutex<Vec<String>>,
        dispatched: Mutex<u32>,
    }

    impl RecordingDispatch {
        fn with_latencies(latencies: Vec<(&'static str, u64)>) -> Self {
            Self {
                latencies,
                ..Default::default()
            }
        }

        fn dispatch_count(&self) -> u32 {
            *self.dispatched.lock().unwrap()
        }

        fn completion_order(&self) -> Vec<String> {
            self.completions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolDispatch for RecordingDispatch {
        fn specs(&self) -> Vec<ToolSpec> {
            vec![ToolSpec {
                name: "blocking_sessions",
                description: "stub",
                parameters: json!({ "type": "object" }),
            }]
        }

        async fn dispatch(&self, name: &str, _arguments: &Map<String, Value>) -> ToolOutcome {
            *self.dispatched.lock().unwrap() += 1;
            let millis = self
                .latencies
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, ms)| *ms)
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.completions.lock().unwrap().push(name.to_string());

            if name.starts_with("missing_") {
                ToolOutcome::error(json!({
                    "tool": name,
                    "error": { "error": "unknown_tool", "message": format!("Unknown tool '{name}'") }
                }))
            } else {
                ToolOutcome::ok(json!({ "tool": name, "data": { "tool": name } }))
            }
        }
    }

    fn limits(budget: u32, timeout_secs: u64) -> Limits {
        Limits {
            max_round_trips: budget,
            question_timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest::new(name, Map::new())
    }

    #[tokio::test]
    async fn question_without_tools_terminates_in_one_model_step() {
        let model = ScriptedModel::new(vec![Message::assistant("No issues found.", Vec::new())]);
        let orchestrator = Orchestrator::new(&model, RecordingDispatch::default(), limits(8, 60));

        let exchange = orchestrator.ask("anything wrong?").await.unwrap();
        assert_eq!(model.call_count(), 1);
        assert_eq!(exchange.answer, "No issues found.");
        assert!(exchange.tool_results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tool_results_follow_request_order_not_completion_order() {
        let requests = vec![call("alpha"), call("beta"), call("gamma")];
        let model = ScriptedModel::new(vec![
            Message::assistant("", requests),
            Message::assistant("done", Vec::new()),
        ]);
        // alpha finishes last, gamma first.
        let dispatch = RecordingDispatch::with_latencies(vec![
            ("alpha", 50),
            ("beta", 20),
            ("gamma", 5),
        ]);
        let orchestrator = Orchestrator::new(&model, &dispatch, limits(8, 60));

        let conversation = orchestrator.drive("order check").await.unwrap();

        assert_eq!(
            dispatch.completion_order(),
            vec!["gamma", "beta", "alpha"],
            "latencies should have reordered completions"
        );
        let tool_names: Vec<&str> = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_name.as_deref().unwrap())
            .collect();
        assert_eq!(tool_names, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_outcome_and_loop_continues() {
        let model = ScriptedModel::new(vec![
            Message::assistant("", vec![call("missing_tool")]),
            Message::assistant("The requested diagnostic is unavailable.", Vec::new()),
        ]);
        let orchestrator = Orchestrator::new(&model, RecordingDispatch::default(), limits(8, 60));

        let exchange = orchestrator.ask("run the thing").await.unwrap();
        assert_eq!(model.call_count(), 2, "loop must continue past the error");
        assert_eq!(exchange.tool_results.len(), 1);
        assert_eq!(exchange.tool_results[0].status, ToolStatus::Error);
        assert_eq!(exchange.answer, "The requested diagnostic is unavailable.");
    }

    #[tokio::test]
    async fn budget_allows_exactly_n_dispatch_cycles_then_fails() {
        let dispatch = RecordingDispatch::default();
        let orchestrator = Orchestrator::new(InsatiableModel, &dispatch, limits(5, 60));

        let err = orchestrator.ask("never ends").await.unwrap_err();
        assert!(matches!(err, AgentError::BudgetExceeded { limit: 5 }));
        assert_eq!(dispatch.dispatch_count(), 5, "no sixth dispatch cycle");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_model_hits_the_question_timeout() {
        let orchestrator = Orchestrator::new(StalledModel, RecordingDispatch::default(), limits(8, 30));

        let err = orchestrator.ask("hello?").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout { seconds: 30 }));
    }

    #[tokio::test]
    async fn tool_errors_never_escape_as_exchange_failures() {
        let model = ScriptedModel::new(vec![
            Message::assistant("", vec![call("missing_one"), call("blocking_sessions")]),
            Message::assistant("Partial data gathered.", Vec::new()),
        ]);
        let orchestrator = Orchestrator::new(&model, RecordingDispatch::default(), limits(8, 60));

        let exchange = orchestrator.ask("mixed bag").await.unwrap();
        assert_eq!(exchange.tool_results.len(), 2);
        assert_eq!(exchange.tool_results[0].status, ToolStatus::Error);
        assert_eq!(exchange.tool_results[1].status, ToolStatus::Ok);
    }
}
