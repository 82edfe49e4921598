//! Story graph engine for Lorekeeper.
//!
//! A catalog of [`StoryEvent`]s is loaded once from external JSON. Each event
//! is gated by a list of [`Condition`]s (all must hold) and carries a list of
//! [`Effect`]s applied in order when it fires. The [`StoryEngine`] owns the
//! live narrative state and announces every change on the shared event bus.

/// Trigger conditions and their evaluation.
pub mod condition;
/// Story definition documents and the built-in fallback.
pub mod definition;
/// Effects and the effect processor.
pub mod effect;
/// The story graph engine.
pub mod engine;
/// Error types for the story crate.
pub mod error;
/// Runtime narrative state.
pub mod state;

pub use condition::{Condition, NarrativeState, evaluate};
pub use definition::{Checkpoint, StoryDefinitions, StoryEvent};
pub use effect::{Effect, EffectTarget, apply_effects};
pub use engine::{StoryEngine, StoryProgress};
pub use error::{StoryError, StoryResult};
pub use state::StoryState;
