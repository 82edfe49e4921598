//! Capability ("power") registry for Lorekeeper.
//!
//! Powers are defined once from external JSON and tracked at runtime as
//! unlocked, active, or cooling down. The [`PowerRegistry`] listens for
//! unlock requests coming out of the story engine and announces its own
//! changes on the shared event bus.

/// Power definitions and the catalog loader.
pub mod definition;
/// Error types for the power crate.
pub mod error;
/// The runtime registry.
pub mod registry;

pub use definition::{PowerCatalog, PowerDefinition, PowerEffect, PowerKind};
pub use error::{PowerError, PowerResult};
pub use registry::{DeactivationHandle, PowerRegistry};
