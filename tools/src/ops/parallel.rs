use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

const LONG_WAIT_SECONDS: f64 = 60.0;

/// Leader sessions touched by parallel execution: either waiting on a
/// parallel/IPC event or running with workers attached. `granted_degree`
/// counts the workers actually attached; Postgres does not expose a
/// per-query requested degree, so the gather limit stands in for it.
const QUERY: &str = r#"
SELECT
    l.pid,
    l.usename AS username,
    l.query,
    l.wait_event_type,
    l.wait_event,
    EXTRACT(EPOCH FROM (now() - l.state_change))::float8 AS seconds_in_wait,
    (SELECT count(*) FROM pg_stat_activity w WHERE w.leader_pid = l.pid)::int4 AS granted_degree,
    current_setting('max_parallel_workers_per_gather')::int4 AS requested_degree
FROM
    pg_stat_activity l
WHERE
    l.leader_pid IS NULL
    AND l.state = 'active'
    AND (
        l.wait_event LIKE 'Parallel%'
        OR l.wait_event_type = 'IPC'
        OR EXISTS (SELECT 1 FROM pg_stat_activity w WHERE w.leader_pid = l.pid)
    )
ORDER BY
    seconds_in_wait DESC NULLS LAST
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ParallelSession {
    pub pid: i32,
    pub username: Option<String>,
    pub query: Option<String>,
    pub wait_event_type: Option<String>,
    pub wait_event: Option<String>,
    pub seconds_in_wait: Option<f64>,
    pub requested_degree: i32,
    pub granted_degree: i32,
}

pub async fn fetch(pool: &PgPool) -> Result<Vec<ParallelSession>, sqlx::Error> {
    sqlx::query_as(QUERY).fetch_all(pool).await
}

pub fn summarize(rows: &[ParallelSession]) -> Value {
    let mismatches: Vec<Value> = rows
        .iter()
        .filter(|s| s.requested_degree != s.granted_degree)
        .map(|s| {
            json!({
                "pid": s.pid,
                "requested_degree": s.requested_degree,
                "granted_degree": s.granted_degree,
            })
        })
        .collect();
    let waiting_over_60s = rows
        .iter()
        .filter(|s| s.seconds_in_wait.is_some_and(|w| w > LONG_WAIT_SECONDS))
        .count();

    json!({
        "sessions": rows,
        "degree_mismatches": mismatches,
        "waiting_over_60_seconds": waiting_over_60s,
    })
}
