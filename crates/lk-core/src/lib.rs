//! Core types for Lorekeeper, a narrative state engine.
//!
//! This crate holds everything the other Lorekeeper crates share: the
//! synchronous publish/subscribe [`EventBus`], scalar [`FlagValue`]s, the
//! injectable [`Clock`], the [`EngineConfig`], and the serializable
//! [`AggregateSnapshot`] that projects the state of every subsystem at one
//! instant.

/// Synchronous, typed publish/subscribe bus.
pub mod bus;
/// Time source abstraction used for cooldowns, timers, and timestamps.
pub mod clock;
/// Engine-wide configuration.
pub mod config;
/// Power effect descriptors shared by definitions and bus payloads.
pub mod effect;
/// Error types for the core crate.
pub mod error;
/// The aggregate snapshot model and its sections.
pub mod snapshot;
/// Scalar story flag values.
pub mod value;

/// Re-exports of the bus types.
pub use bus::{BusEvent, DeactivationReason, EventBus, StoryEventKind, SubscriptionId, Topic};
/// Re-exports of the clock types.
pub use clock::{Clock, ManualClock, SystemClock};
/// Re-export of [`config::EngineConfig`].
pub use config::EngineConfig;
/// Re-export of [`effect::PowerEffect`].
pub use effect::PowerEffect;
/// Re-exports of [`error::CoreError`] and [`error::CoreResult`].
pub use error::{CoreError, CoreResult};
/// Re-exports of the snapshot model.
pub use snapshot::{
    ActorSection, AggregateSnapshot, InventorySection, Position, PowerSection, StorySection,
};
/// Re-export of [`value::FlagValue`].
pub use value::FlagValue;
