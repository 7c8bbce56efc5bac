use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

use super::round1;

/// In-flight long operations from the progress views, longest-elapsed
/// first. A row with `total = 0` is still in flight but its backend has
/// not sized the work yet (COPY without a known byte total, for example).
const QUERY: &str = r#"
SELECT * FROM (
    SELECT
        v.pid,
        'vacuum: ' || v.phase AS opname,
        c.relname AS target,
        v.heap_blks_scanned::float8 AS done,
        v.heap_blks_total::float8 AS total,
        EXTRACT(EPOCH FROM (now() - a.query_start))::float8 AS elapsed_seconds
    FROM pg_stat_progress_vacuum v
    JOIN pg_stat_activity a USING (pid)
    LEFT JOIN pg_class c ON c.oid = v.relid
    UNION ALL
    SELECT
        i.pid,
        'create index: ' || i.phase,
        c.relname,
        i.blocks_done::float8,
        i.blocks_total::float8,
        EXTRACT(EPOCH FROM (now() - a.query_start))::float8
    FROM pg_stat_progress_create_index i
    JOIN pg_stat_activity a USING (pid)
    LEFT JOIN pg_class c ON c.oid = i.relid
    UNION ALL
    SELECT
        s.pid,
        'cluster: ' || s.phase,
        c.relname,
        s.heap_blks_scanned::float8,
        s.heap_blks_total::float8,
        EXTRACT(EPOCH FROM (now() - a.query_start))::float8
    FROM pg_stat_progress_cluster s
    JOIN pg_stat_activity a USING (pid)
    LEFT JOIN pg_class c ON c.oid = s.relid
    UNION ALL
    SELECT
        p.pid,
        'copy: ' || p.command,
        c.relname,
        p.bytes_processed::float8,
        p.bytes_total::float8,
        EXTRACT(EPOCH FROM (now() - a.query_start))::float8
    FROM pg_stat_progress_copy p
    JOIN pg_stat_activity a USING (pid)
    LEFT JOIN pg_class c ON c.oid = p.relid
) op
WHERE op.total = 0 OR op.done < op.total
ORDER BY op.elapsed_seconds DESC NULLS LAST
"#;

#[derive(Debug, Clone, FromRow)]
pub struct LongOperation {
    pub pid: i32,
    pub opname: Option<String>,
    pub target: Option<String>,
    pub done: f64,
    pub total: f64,
    pub elapsed_seconds: Option<f64>,
}

pub async fn fetch(pool: &PgPool) -> Result<Vec<LongOperation>, sqlx::Error> {
    sqlx::query_as(QUERY).fetch_all(pool).await
}

/// `progress_percent` is present only when the total work is known, and is
/// always derived from the same `done`/`total` pair returned in the row.
pub fn summarize(rows: &[LongOperation]) -> Value {
    let operations: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut op = json!({
                "pid": row.pid,
                "opname": row.opname,
                "target": row.target,
                "done": row.done,
                "total": row.total,
                "elapsed_seconds": row.elapsed_seconds,
            });
            if row.total > 0.0 {
                op["progress_percent"] = json!(round1(row.done / row.total * 100.0));
            }
            op
        })
        .collect();

    json!({
        "operations": operations,
        "total_count": rows.len(),
    })
}
