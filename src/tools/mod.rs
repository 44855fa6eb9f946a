//! Tool system
//!
//! Tools are named side-effecting operations the LLM may request. The
//! catalog resolves them by name; the context sandboxes their file access
//! and collects file-change records.

pub mod builtin;
pub mod catalog;
pub mod context;
pub mod error;
pub mod traits;

pub use catalog::ToolCatalog;
pub use context::ToolContext;
pub use error::ToolError;
pub use traits::{Tool, ToolResult};
