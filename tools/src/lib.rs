pub mod catalog;
pub mod db;
pub mod error;
pub mod ops;
pub mod rpc;

pub use catalog::Catalog;
pub use db::Db;
pub use error::ToolError;
