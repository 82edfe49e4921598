//! Lorekeeper, a narrative state engine.
//!
//! [`NarrativeEngine`] wires the story graph, the power registry, the
//! aggregate game state, validation and recovery, scene synchronization and
//! the persistent store onto one shared event bus. Presentation layers drive
//! it with [`Command`]s and listen on the bus.
//!
//! ```
//! use lk_engine::{Command, NarrativeEngine};
//! use serde_json::json;
//!
//! let engine = NarrativeEngine::in_memory(Default::default()).unwrap();
//! engine
//!     .load_story(&json!({"events": [{"id": "intro", "effects": []}]}))
//!     .unwrap();
//! let outcome = engine.execute(Command::TriggerEvent { event_id: "intro".into() });
//! assert!(outcome.is_applied());
//! ```

/// Inbound commands and their outcomes.
pub mod command;
/// The composition root.
pub mod engine;

pub use command::{Command, CommandOutcome};
pub use engine::NarrativeEngine;

pub use lk_core::{BusEvent, Clock, EngineConfig, EventBus, FlagValue, Topic};
pub use lk_state::SceneContext;
pub use lk_store::{FileStorage, MemoryStorage, StorageBackend};
