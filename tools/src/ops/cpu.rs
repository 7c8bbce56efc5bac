use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

use super::round1;
use crate::error::ToolError;

/// Utilization threshold above which the window is flagged as a CPU
/// bottleneck.
const BOTTLENECK_THRESHOLD: f64 = 80.0;

/// Historical CPU samples inside the requested window. The
/// `cpu_usage_history` view is maintained by the deployment's metrics
/// collector; core never writes to it.
const QUERY: &str = r#"
SELECT
    sample_time,
    cpu_percent::float8 AS cpu_percent
FROM
    cpu_usage_history
WHERE
    sample_time >= $1 AND sample_time <= $2
ORDER BY
    sample_time
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CpuSample {
    pub sample_time: DateTime<Utc>,
    pub cpu_percent: f64,
}

/// Pull the required `start_time`/`end_time` window out of the argument
/// map. Accepts RFC3339 or a bare `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_window(
    args: &Map<String, Value>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ToolError> {
    let start = parse_timestamp_arg(args, "start_time")?;
    let end = parse_timestamp_arg(args, "end_time")?;
    if end < start {
        return Err(
            ToolError::new("invalid_argument", "end_time precedes start_time")
                .with_field("end_time"),
        );
    }
    Ok((start, end))
}

fn parse_timestamp_arg(args: &Map<String, Value>, name: &str) -> Result<DateTime<Utc>, ToolError> {
    let raw = args
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ToolError::new("invalid_argument", format!("'{name}' is required"))
                .with_field(name)
                .with_docs_hint("Pass an RFC3339 timestamp like 2026-08-30T14:00:00Z.")
        })?
        .trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(
        ToolError::new("invalid_argument", format!("'{name}' is not a valid timestamp"))
            .with_field(name)
            .with_details(json!({ "received": raw })),
    )
}

pub async fn fetch(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<CpuSample>, sqlx::Error> {
    sqlx::query_as(QUERY)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
}

pub fn summarize(rows: &[CpuSample], start: DateTime<Utc>, end: DateTime<Utc>) -> Value {
    let mut summary = json!({
        "window": { "start": start.to_rfc3339(), "end": end.to_rfc3339() },
        "samples": rows,
        "sample_count": rows.len(),
        "is_bottleneck": false,
    });

    if !rows.is_empty() {
        let average =
            round1(rows.iter().map(|s| s.cpu_percent).sum::<f64>() / rows.len() as f64);
        let peak = rows
            .iter()
            .map(|s| s.cpu_percent)
            .fold(f64::NEG_INFINITY, f64::max);
        summary["average_cpu"] = json!(average);
        summary["peak_cpu"] = json!(peak);
        summary["is_bottleneck"] = json!(average > BOTTLENECK_THRESHOLD);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 30, 13, 0, 0).unwrap(),
        )
    }

    fn samples(values: &[f64]) -> Vec<CpuSample> {
        let (start, _) = window();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| CpuSample {
                sample_time: start + chrono::Duration::minutes(i as i64),
                cpu_percent: *v,
            })
            .collect()
    }

    #[test]
    fn saturated_window_is_flagged_as_bottleneck() {
        let (start, end) = window();
        let summary = summarize(&samples(&[70.0, 90.0, 85.0]), start, end);
        assert_eq!(summary["average_cpu"], 81.7);
        assert_eq!(summary["peak_cpu"], 90.0);
        assert_eq!(summary["is_bottleneck"], true);
    }

    #[test]
    fn quiet_window_is_not_a_bottleneck() {
        let (start, end) = window();
        let summary = summarize(&samples(&[60.0, 70.0]), start, end);
        assert_eq!(summary["average_cpu"], 65.0);
        assert_eq!(summary["is_bottleneck"], false);
    }

    #[test]
    fn empty_window_omits_average_and_peak() {
        let (start, end) = window();
        let summary = summarize(&[], start, end);
        assert_eq!(summary["sample_count"], 0);
        assert_eq!(summary["is_bottleneck"], false);
        assert!(summary.get("average_cpu").is_none());
    }

    #[test]
    fn window_parsing_requires_both_endpoints() {
        let mut args = Map::new();
        args.insert("start_time".to_string(), json!("2026-08-30T12:00:00Z"));
        let err = parse_window(&args).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        args.insert("end_time".to_string(), json!("2026-08-30 11:00:00"));
        let err = parse_window(&args).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        args.insert("end_time".to_string(), json!("2026-08-30 13:00:00"));
        let (start, end) = parse_window(&args).unwrap();
        assert!(start < end);
    }
}
