//! The aggregate snapshot: a read-only projection of every subsystem.
//!
//! Snapshots are rebuilt on demand from live state and never mutated in
//! place. Each section is optional so a snapshot taken before a subsystem
//! initializes still serializes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::FlagValue;

/// Story runtime state: checkpoint, completed events, flags, granted powers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorySection {
    /// The current checkpoint, if any has been reached.
    pub checkpoint: Option<String>,
    /// Ids of every event that has fired.
    pub completed_event_ids: BTreeSet<String>,
    /// Story flags.
    pub flags: BTreeMap<String, FlagValue>,
    /// Powers the story has granted or seen unlocked.
    pub unlocked_power_ids: BTreeSet<String>,
}

impl StorySection {
    /// Build a section from untrusted JSON, keeping every field that parses
    /// and defaulting the rest. Never fails.
    pub fn from_value_lenient(value: &Value) -> Self {
        Self {
            checkpoint: lenient_field(value, "checkpoint"),
            completed_event_ids: lenient_field(value, "completedEventIds"),
            flags: lenient_field(value, "flags"),
            unlocked_power_ids: lenient_field(value, "unlockedPowerIds"),
        }
    }
}

/// Capability state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PowerSection {
    /// Unlocked power ids.
    pub unlocked_power_ids: BTreeSet<String>,
    /// Powers active when the snapshot was taken. Not restored on load.
    pub active_power_ids: BTreeSet<String>,
    /// Cooldown expiry per power.
    pub cooldowns: BTreeMap<String, DateTime<Utc>>,
}

impl PowerSection {
    /// Build a section from untrusted JSON, field by field. Never fails.
    pub fn from_value_lenient(value: &Value) -> Self {
        Self {
            unlocked_power_ids: lenient_field(value, "unlockedPowerIds"),
            active_power_ids: lenient_field(value, "activePowerIds"),
            cooldowns: lenient_field(value, "cooldowns"),
        }
    }
}

/// Item counts carried by the actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InventorySection {
    /// Item id to count.
    pub items: BTreeMap<String, u32>,
}

impl InventorySection {
    /// Add `count` of an item.
    pub fn add(&mut self, item: impl Into<String>, count: u32) {
        let entry = self.items.entry(item.into()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Remove up to `count` of an item. Returns `false` if not enough were held.
    pub fn remove(&mut self, item: &str, count: u32) -> bool {
        match self.items.get_mut(item) {
            Some(held) if *held >= count => {
                *held -= count;
                if *held == 0 {
                    self.items.remove(item);
                }
                true
            }
            _ => false,
        }
    }

    /// How many of an item are held.
    pub fn count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }
}

/// A 2D position in the current scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The player actor's carried-over state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSection {
    /// Position in the current scene.
    pub position: Position,
    /// Current health.
    pub health: f64,
    /// Maximum health.
    pub max_health: f64,
}

impl ActorSection {
    /// An actor at the origin with full health.
    pub fn new(health: f64) -> Self {
        Self {
            position: Position::default(),
            health,
            max_health: health,
        }
    }
}

/// The composed, serializable view of all subsystem state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    /// Schema version the snapshot was produced under.
    pub version: u32,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Story section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<StorySection>,
    /// Capability section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerSection>,
    /// Inventory section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventorySection>,
    /// Actor section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorSection>,
    /// Id of the current scene context.
    #[serde(default)]
    pub scene: Option<String>,
}

impl AggregateSnapshot {
    /// An empty snapshot with no sections.
    pub fn empty(version: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            version,
            timestamp,
            story: None,
            power: None,
            inventory: None,
            actor: None,
            scene: None,
        }
    }

    /// The snapshot as a JSON document, `Null` if it cannot be represented.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            tracing::error!("snapshot could not be converted to JSON: {e}");
            Value::Null
        })
    }

    /// Parse a snapshot from a JSON document.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }
}

fn lenient_field<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .and_then(|field| T::deserialize(field).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AggregateSnapshot {
        let story = StorySection {
            checkpoint: Some("gate".to_string()),
            completed_event_ids: BTreeSet::from(["intro".to_string()]),
            flags: BTreeMap::from([("met_guard".to_string(), FlagValue::from(true))]),
            ..StorySection::default()
        };
        let mut snapshot = AggregateSnapshot::empty(1, DateTime::<Utc>::default());
        snapshot.story = Some(story);
        snapshot.actor = Some(ActorSection::new(80.0));
        snapshot.scene = Some("courtyard".to_string());
        snapshot
    }

    #[test]
    fn serializes_camel_case_sections() {
        let value = sample().to_value();
        assert_eq!(value["story"]["checkpoint"], json!("gate"));
        assert_eq!(value["story"]["completedEventIds"], json!(["intro"]));
        assert_eq!(value["actor"]["maxHealth"], json!(80.0));
        assert!(value.get("power").is_none());
    }

    #[test]
    fn parses_back_from_value() {
        let snapshot = sample();
        let parsed = AggregateSnapshot::from_value(&snapshot.to_value()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn lenient_story_keeps_good_fields() {
        let value = json!({
            "checkpoint": "gate",
            "completedEventIds": "not a list",
            "flags": {"a": 1},
        });
        let story = StorySection::from_value_lenient(&value);
        assert_eq!(story.checkpoint.as_deref(), Some("gate"));
        assert!(story.completed_event_ids.is_empty());
        assert_eq!(story.flags.get("a"), Some(&FlagValue::Integer(1)));
        assert!(story.unlocked_power_ids.is_empty());
    }

    #[test]
    fn lenient_story_from_garbage_is_default() {
        assert_eq!(
            StorySection::from_value_lenient(&json!(42)),
            StorySection::default()
        );
    }

    #[test]
    fn inventory_add_and_remove() {
        let mut inventory = InventorySection::default();
        inventory.add("potion", 2);
        assert!(!inventory.remove("potion", 3));
        assert!(inventory.remove("potion", 2));
        assert_eq!(inventory.count("potion"), 0);
        assert!(inventory.items.is_empty());
    }
}
