//! Turning a fragment stream into an assistant draft.

pub mod accumulator;
pub mod reconciler;

pub use accumulator::{AccumulatedDraft, FragmentAccumulator, StreamingPreview};
pub use reconciler::{ToolCallPreview, ToolCallReconciler, ToolCallUpdate};
