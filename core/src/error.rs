use thiserror::Error;

/// Missing or invalid environment configuration. Fatal and pre-flight:
/// raised before any query or model call executes, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
    #[error("invalid value for {name}: {reason}")]
    InvalidVariable { name: String, reason: String },
}

/// Exchange-level failures. Tool-level failures never appear here; the
/// dispatch boundary converts those into error-tagged payloads the model
/// can see.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model endpoint failed or returned an unusable response.
    #[error("model request failed: {0}")]
    Model(String),

    /// The model kept requesting tools past the configured budget.
    /// Reported to the caller; the partial history is discarded.
    #[error("round-trip budget of {limit} exhausted without a final answer")]
    BudgetExceeded { limit: u32 },

    /// End-to-end deadline for one question expired.
    #[error("question timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_are_reported_together() {
        let err = ConfigError::MissingVariables(vec![
            "DATABASE_URL".to_string(),
            "MODEL_API_KEY".to_string(),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("DATABASE_URL"));
        assert!(rendered.contains("MODEL_API_KEY"));
    }
}
