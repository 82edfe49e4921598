//! Persistent save store for Lorekeeper.
//!
//! Save records are JSON documents written under namespaced keys through a
//! [`StorageBackend`]. The [`PersistentStore`] accounts for space against a
//! byte budget, quarantines records that fail to parse, and auto-saves when
//! the story reaches a checkpoint or a power is unlocked.

/// Key-value storage backends.
pub mod backend;
/// Error types for storage and the store.
pub mod error;
/// The save record format and slot naming.
pub mod record;
/// The persistent store.
pub mod store;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
pub use error::{StorageError, StorageResult, StoreError, StoreResult};
pub use record::{SaveDescriptor, SaveKind, SaveMetadata, SaveRecord, SaveSlot};
pub use store::PersistentStore;
