use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

/// Sessions currently blocked on a lock, longest-waiting first.
/// `blocking_pids` is the wait chain one hop up: the sessions holding
/// whatever this one needs.
const QUERY: &str = r#"
SELECT
    a.pid,
    a.usename AS username,
    a.application_name AS application,
    COALESCE(a.client_hostname, host(a.client_addr)) AS client_machine,
    a.query,
    a.wait_event_type,
    a.wait_event,
    EXTRACT(EPOCH FROM (now() - a.state_change))::float8 AS seconds_in_wait,
    pg_blocking_pids(a.pid) AS blocking_pids
FROM
    pg_stat_activity a
WHERE
    cardinality(pg_blocking_pids(a.pid)) > 0
ORDER BY
    seconds_in_wait DESC NULLS LAST
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BlockedSession {
    pub pid: i32,
    pub username: Option<String>,
    pub application: Option<String>,
    pub client_machine: Option<String>,
    pub query: Option<String>,
    pub wait_event_type: Option<String>,
    pub wait_event: Option<String>,
    pub seconds_in_wait: Option<f64>,
    pub blocking_pids: Vec<i32>,
}

pub async fn fetch(pool: &PgPool) -> Result<Vec<BlockedSession>, sqlx::Error> {
    sqlx::query_as(QUERY).fetch_all(pool).await
}

pub fn summarize(rows: &[BlockedSession]) -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "blocking_sessions": rows,
        "total_blocked": rows.len(),
    })
}
