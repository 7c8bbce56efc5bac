use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use doctor_core::dispatch::{ToolDispatch, ToolSpec};
use doctor_core::message::ToolOutcome;

use crate::db::Db;
use crate::error::ToolError;
use crate::ops;

/// The fixed diagnostic operation catalog and its dispatch boundary.
///
/// Owns the shared database handle; nothing else in the process executes
/// diagnostic queries. Dispatch is total: unknown names and every runtime
/// failure come back as error-tagged outcomes, never as panics.
pub struct Catalog {
    db: Db,
}

impl Catalog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match name {
            "blocking_sessions" => {
                let rows = ops::blocking::fetch(self.db.pool().await?).await?;
                Ok(ops::blocking::summarize(&rows))
            }
            "long_running_operations" => {
                let rows = ops::longops::fetch(self.db.pool().await?).await?;
                Ok(ops::longops::summarize(&rows))
            }
            "cpu_saturation" => {
                // Validate the window before touching the database.
                let (start, end) = ops::cpu::parse_window(args)?;
                let rows = ops::cpu::fetch(self.db.pool().await?, start, end).await?;
                Ok(ops::cpu::summarize(&rows, start, end))
            }
            "sql_monitoring" => {
                let session_id = parse_optional_session_id(args)?;
                let rows = ops::monitoring::fetch(self.db.pool().await?, session_id).await?;
                Ok(ops::monitoring::summarize(&rows))
            }
            "parallel_execution_pressure" => {
                let rows = ops::parallel::fetch(self.db.pool().await?).await?;
                Ok(ops::parallel::summarize(&rows))
            }
            "full_scan_without_parallelism" => {
                let pool = self.db.pool().await?;
                let sessions = ops::scans::fetch_sessions(pool).await?;
                let scans = ops::scans::fetch_recent_scans(pool).await?;
                Ok(ops::scans::summarize(&sessions, &scans))
            }
            _ => Err(ToolError::new(
                "unknown_tool",
                format!("Unknown tool '{name}'"),
            )),
        }
    }
}

#[async_trait]
impl ToolDispatch for Catalog {
    fn specs(&self) -> Vec<ToolSpec> {
        tool_specs()
    }

    async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome {
        let started = Instant::now();
        let result = self.execute(name, arguments).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(body) => {
                tracing::debug!(tool = name, elapsed_ms, "tool dispatch ok");
                ToolOutcome::ok(json!({
                    "tool": name,
                    "elapsed_ms": elapsed_ms,
                    "data": body,
                }))
            }
            Err(err) => {
                tracing::warn!(tool = name, elapsed_ms, code = err.code(), "tool dispatch failed");
                ToolOutcome::error(json!({
                    "tool": name,
                    "elapsed_ms": elapsed_ms,
                    "error": err.to_value(),
                }))
            }
        }
    }
}

fn parse_optional_session_id(args: &Map<String, Value>) -> Result<Option<i32>, ToolError> {
    let Some(raw) = args.get("session_id") else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }
    let parsed = match raw {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| {
        ToolError::new("invalid_argument", "'session_id' must be a backend pid")
            .with_field("session_id")
            .with_details(json!({ "received": raw }))
    })
}

/// Schema catalog exposed verbatim over every transport (in-process and
/// MCP stdio).
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "blocking_sessions",
            description: "Sessions holding or waiting on locks, with their wait chains, ordered by wait duration descending.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "long_running_operations",
            description: "In-progress long operations with measurable done/total progress, ordered by elapsed time descending.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "cpu_saturation",
            description: "Historical CPU utilization samples in a time window, with average, peak, and a bottleneck flag.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "start_time": { "type": "string", "description": "Window start, RFC3339 like 2026-08-30T14:00:00Z" },
                    "end_time": { "type": "string", "description": "Window end, RFC3339" }
                },
                "required": ["start_time", "end_time"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "sql_monitoring",
            description: "Active non-idle sessions joined with execution statistics. Detail list is capped at 10 rows.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "integer", "description": "Optional backend pid to narrow to one session" }
                },
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "parallel_execution_pressure",
            description: "Sessions waiting on parallel-execution resources, with requested vs granted parallelism degree.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "full_scan_without_parallelism",
            description: "Active non-parallel sessions alongside relations sequentially scanned in the last few minutes, with planner-cost candidates worth parallelizing.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
    ]
}
