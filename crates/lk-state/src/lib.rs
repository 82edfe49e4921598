//! Aggregate game state for Lorekeeper.
//!
//! [`GameState`] composes the story engine, the power registry, and the
//! state it owns itself (inventory, actor, scene, play time) into an
//! [`AggregateSnapshot`](lk_core::AggregateSnapshot). Snapshots are checked by
//! the [`StateValidator`], repaired by the [`RecoveryManager`], and pushed
//! into presentation contexts by the [`SceneSynchronizer`].

/// Snapshot composition and the state owned outside story and powers.
pub mod aggregate;
/// Recovery ladder for snapshots that fail validation.
pub mod recovery;
/// Scene-to-scene state transfer.
pub mod sync;
/// Structural snapshot checks.
pub mod validator;

pub use aggregate::GameState;
pub use recovery::RecoveryManager;
pub use sync::{SceneContext, SceneSynchronizer, SyncPhase};
pub use validator::{SectionCheck, StateValidator, ValidationReport};
