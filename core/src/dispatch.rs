use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::message::ToolOutcome;

/// Schema-described entry in the diagnostic operation catalog.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema for the operation's parameters.
    pub parameters: Value,
}

/// The tool dispatch boundary.
///
/// `dispatch` is total: every failure (unknown name, bad arguments, query
/// error) comes back as an error-tagged [`ToolOutcome`], never as an `Err`
/// the orchestration loop has to unwind.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome;
}

#[async_trait]
impl<T: ToolDispatch + ?Sized> ToolDispatch for &T {
    fn specs(&self) -> Vec<ToolSpec> {
        (**self).specs()
    }

    async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome {
        (**self).dispatch(name, arguments).await
    }
}
