use serde_json::{Value, json};

/// Structured tool failure. Never crosses the dispatch boundary as an
/// `Err`; it is rendered into the error-tagged payload the orchestration
/// loop (and the model) reason about.
#[derive(Debug, Clone)]
pub struct ToolError {
    code: String,
    message: String,
    field: Option<String>,
    docs_hint: Option<String>,
    details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl From<sqlx::Error> for ToolError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::TypeNotFound { .. } => ToolError::new(
                "unexpected_result_shape",
                format!("Diagnostic query returned an unexpected shape: {err}"),
            ),
            other => ToolError::new("query_failed", format!("Diagnostic query failed: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_value_includes_optional_fields_only_when_set() {
        let bare = ToolError::new("query_failed", "boom").to_value();
        assert_eq!(bare["error"], "query_failed");
        assert!(bare.get("field").is_none());

        let full = ToolError::new("invalid_argument", "bad window")
            .with_field("start_time")
            .with_docs_hint("Pass an RFC3339 timestamp.")
            .to_value();
        assert_eq!(full["field"], "start_time");
        assert_eq!(full["docs_hint"], "Pass an RFC3339 timestamp.");
    }
}
