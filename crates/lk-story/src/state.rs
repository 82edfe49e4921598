//! Runtime narrative state.

use std::collections::{BTreeMap, BTreeSet};

use lk_core::{FlagValue, StorySection};

use crate::condition::NarrativeState;

/// Live story state: completed events, flags, granted powers, and the
/// current checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryState {
    checkpoint: Option<String>,
    completed_events: BTreeSet<String>,
    flags: BTreeMap<String, FlagValue>,
    unlocked_powers: BTreeSet<String>,
}

impl StoryState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an event as completed. Returns `true` the first time.
    pub fn mark_completed(&mut self, event_id: impl Into<String>) -> bool {
        self.completed_events.insert(event_id.into())
    }

    /// Check if an event has completed.
    pub fn is_completed(&self, event_id: &str) -> bool {
        self.completed_events.contains(event_id)
    }

    /// Ids of every completed event.
    pub fn completed_events(&self) -> &BTreeSet<String> {
        &self.completed_events
    }

    /// Write a flag. Returns the value it replaced.
    pub fn set_flag(&mut self, key: impl Into<String>, value: FlagValue) -> Option<FlagValue> {
        self.flags.insert(key.into(), value)
    }

    /// Read a flag.
    pub fn flag(&self, key: &str) -> Option<&FlagValue> {
        self.flags.get(key)
    }

    /// All flags.
    pub fn flags(&self) -> &BTreeMap<String, FlagValue> {
        &self.flags
    }

    /// Record a power as unlocked. Returns `true` the first time.
    pub fn grant_power(&mut self, power_id: impl Into<String>) -> bool {
        self.unlocked_powers.insert(power_id.into())
    }

    /// Check if a power has been recorded as unlocked.
    pub fn has_power(&self, power_id: &str) -> bool {
        self.unlocked_powers.contains(power_id)
    }

    /// Every power recorded as unlocked.
    pub fn unlocked_powers(&self) -> &BTreeSet<String> {
        &self.unlocked_powers
    }

    /// Move the checkpoint pointer. Returns the previous checkpoint.
    pub fn set_checkpoint(&mut self, checkpoint_id: impl Into<String>) -> Option<String> {
        self.checkpoint.replace(checkpoint_id.into())
    }

    /// The current checkpoint.
    pub fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    /// Reset all state.
    pub fn reset(&mut self) {
        self.checkpoint = None;
        self.completed_events.clear();
        self.flags.clear();
        self.unlocked_powers.clear();
    }

    /// Project the state into its snapshot section.
    pub fn to_section(&self) -> StorySection {
        StorySection {
            checkpoint: self.checkpoint.clone(),
            completed_event_ids: self.completed_events.clone(),
            flags: self.flags.clone(),
            unlocked_power_ids: self.unlocked_powers.clone(),
        }
    }

    /// Rebuild the state from a snapshot section.
    pub fn from_section(section: StorySection) -> Self {
        Self {
            checkpoint: section.checkpoint,
            completed_events: section.completed_event_ids,
            flags: section.flags,
            unlocked_powers: section.unlocked_power_ids,
        }
    }
}

impl NarrativeState for StoryState {
    fn flag(&self, key: &str) -> Option<&FlagValue> {
        self.flags.get(key)
    }

    fn is_event_completed(&self, event_id: &str) -> bool {
        self.is_completed(event_id)
    }

    fn is_power_unlocked(&self, power_id: &str) -> bool {
        self.has_power(power_id)
    }

    fn current_checkpoint(&self) -> Option<&str> {
        self.checkpoint()
    }
}
