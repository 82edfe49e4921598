//! The save record format and slot naming.

use chrono::{DateTime, Utc};
use lk_core::AggregateSnapshot;
use serde::{Deserialize, Serialize};

/// Slot key of the auto-save.
pub const AUTO_SAVE_KEY: &str = "auto_save";

const MANUAL_SAVE_PREFIX: &str = "manual_save_";

/// Who wrote a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    /// Written by an auto-save trigger.
    Auto,
    /// Written on request.
    Manual,
}

/// A named save slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SaveSlot {
    /// The single auto-save slot.
    Auto,
    /// A numbered manual slot.
    Manual(u32),
}

impl SaveSlot {
    /// The slot key, e.g. `auto_save` or `manual_save_1`.
    pub fn key(self) -> String {
        match self {
            Self::Auto => AUTO_SAVE_KEY.to_string(),
            Self::Manual(n) => format!("{MANUAL_SAVE_PREFIX}{n}"),
        }
    }

    /// Parse a slot key.
    pub fn parse(key: &str) -> Option<Self> {
        if key == AUTO_SAVE_KEY {
            return Some(Self::Auto);
        }
        key.strip_prefix(MANUAL_SAVE_PREFIX)?
            .parse()
            .ok()
            .map(Self::Manual)
    }

    /// The kind of save this slot holds.
    pub fn kind(self) -> SaveKind {
        match self {
            Self::Auto => SaveKind::Auto,
            Self::Manual(_) => SaveKind::Manual,
        }
    }
}

impl std::fmt::Display for SaveSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Bookkeeping stored next to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    /// Total play time when the save was written.
    pub play_time_ms: u64,
    /// Monotonic save counter.
    pub save_ordinal: u64,
    /// Checkpoint at save time.
    pub last_checkpoint: Option<String>,
    /// Auto or manual.
    pub save_kind: SaveKind,
    /// Manual slot number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
}

/// A durable save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    /// Schema version.
    pub version: u32,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// The saved state.
    pub snapshot: AggregateSnapshot,
    /// Bookkeeping.
    pub metadata: SaveMetadata,
}

/// Summary of one stored save, as listed by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDescriptor {
    /// Slot key the save is stored under.
    pub key: String,
    /// The slot.
    pub slot: SaveSlot,
    /// Schema version.
    pub version: u32,
    /// When the save was written.
    pub timestamp: DateTime<Utc>,
    /// Bookkeeping copied from the record.
    pub metadata: SaveMetadata,
}

impl SaveDescriptor {
    /// Describe a record stored in `slot`.
    pub fn new(slot: SaveSlot, record: &SaveRecord) -> Self {
        Self {
            key: slot.key(),
            slot,
            version: record.version,
            timestamp: record.timestamp,
            metadata: record.metadata.clone(),
        }
    }
}

impl Serialize for SaveSlot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}
