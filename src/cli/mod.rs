//! CLI entry point for colloquy.

use clap::{ArgGroup, Parser, Subcommand};

use crate::types::ToolOutcome;

/// colloquy CLI
#[derive(Parser, Debug)]
#[command(name = "colloquy", version, about = "Conversations with tool-using models")]
pub struct Cli {
    /// Model override (otherwise COLLOQUY_MODEL or config.toml)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List stored sessions
    Sessions,
    /// Create a session and print its id
    New(NewArgs),
    /// Send a message and stream the reply
    Send(SendArgs),
    /// Print a session's messages
    History(SessionArgs),
    /// Replay from a message
    Retry(MessageArgs),
    /// Replace a user message and everything after it
    Edit(EditArgs),
    /// Delete one message
    Delete(MessageArgs),
    /// Supply the outcome of a pending tool call
    Resolve(ResolveArgs),
}

#[derive(Parser, Debug)]
pub struct NewArgs {
    /// System prompt for this session
    #[arg(short, long)]
    pub system: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SessionArgs {
    pub session: String,
}

#[derive(Parser, Debug)]
pub struct SendArgs {
    pub session: String,
    pub message: String,
}

#[derive(Parser, Debug)]
pub struct MessageArgs {
    pub session: String,
    pub message_id: String,
}

#[derive(Parser, Debug)]
pub struct EditArgs {
    pub session: String,
    pub message_id: String,
    pub content: String,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("outcome").required(true).args(["result", "error"])))]
pub struct ResolveArgs {
    pub session: String,
    pub tool_call_id: String,
    /// Successful tool output
    #[arg(long)]
    pub result: Option<String>,
    /// Failure description
    #[arg(long)]
    pub error: Option<String>,
}

impl ResolveArgs {
    pub fn outcome(&self) -> ToolOutcome {
        match (&self.result, &self.error) {
            (_, Some(error)) => ToolOutcome::failed(error.clone()),
            (Some(result), None) => ToolOutcome::completed(result.clone()),
            (None, None) => ToolOutcome::completed(String::new()),
        }
    }
}
