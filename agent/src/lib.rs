pub mod aggregate;
pub mod model;
pub mod orchestrator;
pub mod prompt;

pub use aggregate::{Exchange, ToolTrace, aggregate};
pub use model::{ChatModel, OpenAiChatModel};
pub use orchestrator::Orchestrator;
