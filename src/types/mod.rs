//! Core types for colloquy.

pub mod message;
pub mod session;
pub mod stream;
pub mod usage;

pub use message::*;
pub use session::*;
pub use stream::*;
pub use usage::*;
