//! Locally executed tools.

pub mod runner;
pub mod tool;
pub mod types;

pub use runner::ToolRunner;
pub use tool::{FnTool, Tool, ToolError, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolParameters};
