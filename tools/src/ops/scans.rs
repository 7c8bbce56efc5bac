use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

const COST_THRESHOLD: f64 = 10_000.0;
const ROWS_THRESHOLD: f64 = 100_000.0;

/// Active client backends that are not part of a parallel plan: no leader,
/// no workers attached.
const SESSIONS_QUERY: &str = r#"
SELECT
    a.pid,
    a.usename AS username,
    a.query,
    EXTRACT(EPOCH FROM (now() - a.query_start))::float8 AS elapsed_seconds
FROM
    pg_stat_activity a
WHERE
    a.state = 'active'
    AND a.backend_type = 'client backend'
    AND a.leader_pid IS NULL
    AND NOT EXISTS (SELECT 1 FROM pg_stat_activity w WHERE w.leader_pid = a.pid)
ORDER BY
    elapsed_seconds DESC NULLS LAST
"#;

/// Relations sequentially scanned in the last few minutes, priced with the
/// planner's own formula (relpages * seq_page_cost + reltuples *
/// cpu_tuple_cost). Postgres has no live plan view, so the scans cannot be
/// attributed to individual backends; they are reported alongside the
/// non-parallel sessions instead. Requires PG 16+ for `last_seq_scan`.
const SCANS_QUERY: &str = r#"
SELECT
    c.relname AS table_name,
    c.reltuples::float8 AS est_rows,
    (c.relpages::float8 * current_setting('seq_page_cost')::float8
        + c.reltuples::float8 * current_setting('cpu_tuple_cost')::float8) AS est_cost,
    EXTRACT(EPOCH FROM (now() - t.last_seq_scan))::float8 AS seconds_since_scan
FROM
    pg_stat_user_tables t
    JOIN pg_class c ON c.oid = t.relid
WHERE
    t.last_seq_scan > now() - interval '5 minutes'
ORDER BY
    est_cost DESC
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SerialSession {
    pub pid: i32,
    pub username: Option<String>,
    pub query: Option<String>,
    pub elapsed_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScannedTable {
    pub table_name: String,
    pub est_rows: f64,
    pub est_cost: f64,
    pub seconds_since_scan: Option<f64>,
}

pub async fn fetch_sessions(pool: &PgPool) -> Result<Vec<SerialSession>, sqlx::Error> {
    sqlx::query_as(SESSIONS_QUERY).fetch_all(pool).await
}

pub async fn fetch_recent_scans(pool: &PgPool) -> Result<Vec<ScannedTable>, sqlx::Error> {
    sqlx::query_as(SCANS_QUERY).fetch_all(pool).await
}

/// Candidates are the scanned relations worth parallelizing: expensive by
/// planner cost or large by estimated row count.
pub fn summarize(sessions: &[SerialSession], scans: &[ScannedTable]) -> Value {
    let candidates: Vec<&ScannedTable> = scans
        .iter()
        .filter(|s| s.est_cost > COST_THRESHOLD || s.est_rows > ROWS_THRESHOLD)
        .collect();

    json!({
        "serial_sessions": sessions,
        "recently_scanned_tables": scans,
        "candidates": candidates,
        "candidate_count": candidates.len(),
    })
}
