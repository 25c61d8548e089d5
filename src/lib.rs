//! colloquy: conversation turn orchestration for tool-using chat agents.
//!
//! Streams a model response fragment by fragment, rebuilds tool calls from
//! partial deltas, holds the conversation while tools run out-of-band, and
//! keeps a replayable history under cancel, retry and edit.
//!
//! # Quick Start
//!
//! ```no_run
//! use colloquy::prelude::*;
//!
//! # async fn example() -> colloquy::Result<()> {
//! let chat = Chat::from_config(ColloquyConfig::load()?)?;
//! let session = chat.create_session(Session::generate()).await?;
//! let outcome = chat.send(&session.id, "Hello!").await?;
//! if let Some(message) = outcome.message {
//!     println!("{}", message.content());
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod gate;
pub mod history;
pub mod prelude;
pub mod provider;
pub mod store;
pub mod stream;
pub mod tools;
pub mod turn;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{ColloquyError, Result};
