//! Shared error taxonomy and plain types for the mcpx workspace.

pub mod error;
pub mod types;

pub use error::{McpxError, Result, exit_code};
