use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

/// Detail lists longer than this are cut down before being handed to the
/// model; the counts still describe the full result set.
const DETAIL_LIMIT: usize = 10;
const LONG_RUNNING_SECONDS: f64 = 300.0;

/// Active, non-idle sessions joined with cumulative execution statistics.
/// The optional filter narrows to one backend pid. pg_stat_statements is
/// keyed by (userid, dbid, queryid, toplevel), so the statistics are
/// collapsed per queryid before joining; otherwise one backend could fan
/// out into several rows.
const QUERY: &str = r#"
SELECT
    a.pid,
    a.usename AS username,
    a.state,
    a.query,
    a.query_id,
    EXTRACT(EPOCH FROM (now() - a.query_start))::float8 AS elapsed_seconds,
    s.calls,
    s.total_exec_time,
    s.rows_processed
FROM
    pg_stat_activity a
    LEFT JOIN (
        SELECT
            queryid,
            sum(calls)::int8 AS calls,
            sum(total_exec_time)::float8 AS total_exec_time,
            sum(rows)::int8 AS rows_processed
        FROM pg_stat_statements
        GROUP BY queryid
    ) s ON s.queryid = a.query_id
WHERE
    a.state = 'active'
    AND a.pid <> pg_backend_pid()
    AND ($1::int4 IS NULL OR a.pid = $1)
ORDER BY
    elapsed_seconds DESC NULLS LAST
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActiveSession {
    pub pid: i32,
    pub username: Option<String>,
    pub state: Option<String>,
    pub query: Option<String>,
    pub query_id: Option<i64>,
    pub elapsed_seconds: Option<f64>,
    pub calls: Option<i64>,
    pub total_exec_time: Option<f64>,
    pub rows_processed: Option<i64>,
}

pub async fn fetch(
    pool: &PgPool,
    session_id: Option<i32>,
) -> Result<Vec<ActiveSession>, sqlx::Error> {
    sqlx::query_as(QUERY).bind(session_id).fetch_all(pool).await
}

/// Counts describe sessions, not result rows: if the same pid somehow
/// appears more than once, only its first row is kept.
pub fn summarize(rows: &[ActiveSession]) -> Value {
    let mut seen = std::collections::HashSet::new();
    let sessions: Vec<&ActiveSession> = rows.iter().filter(|s| seen.insert(s.pid)).collect();

    let over_long_running = sessions
        .iter()
        .filter(|s| s.elapsed_seconds.is_some_and(|e| e > LONG_RUNNING_SECONDS))
        .count();
    let truncated = sessions.len() > DETAIL_LIMIT;
    let detail: Vec<&ActiveSession> = sessions.iter().copied().take(DETAIL_LIMIT).collect();

    json!({
        "active_count": sessions.len(),
        "over_300_seconds": over_long_running,
        "truncated": truncated,
        "sessions": detail,
    })
}
