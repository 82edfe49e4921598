//! The story graph engine.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::path::Path;
use std::rc::{Rc, Weak};

use lk_core::{BusEvent, EventBus, FlagValue, StorySection, SubscriptionId, Topic};
use serde::Serialize;
use serde_json::Value;

use crate::condition::evaluate;
use crate::definition::{StoryDefinitions, StoryEvent};
use crate::effect::{EffectTarget, apply_effects};
use crate::error::{StoryError, StoryResult};
use crate::state::StoryState;

/// Completion summary returned by [`StoryEngine::progress`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryProgress {
    /// Number of completed events.
    pub completed_count: usize,
    /// Number of defined events.
    pub total_count: usize,
    /// Completed share in percent, `0.0` when nothing is defined.
    pub percentage: f64,
    /// Number of powers the story has seen unlocked.
    pub unlocked_power_count: usize,
}

/// Owns the story catalog and the live narrative state.
///
/// Created behind an `Rc` so bus handlers can reach it. Every mutation is
/// announced on the bus after internal borrows are released, so handlers may
/// call back into the engine.
pub struct StoryEngine {
    bus: Rc<EventBus>,
    definitions: RefCell<Option<StoryDefinitions>>,
    state: RefCell<StoryState>,
    power_subscription: Cell<Option<SubscriptionId>>,
}

impl StoryEngine {
    /// Create an engine with no definitions loaded.
    ///
    /// The engine mirrors `power.unlocked` notifications into its own
    /// unlocked set so `powerUnlocked` conditions see powers unlocked from
    /// outside the story.
    pub fn new(bus: Rc<EventBus>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let id = bus.subscribe(Topic::PowerUnlocked, move |event| {
                if let (Some(engine), BusEvent::PowerUnlocked { power_id, .. }) =
                    (weak.upgrade(), event)
                {
                    engine.record_power(power_id);
                }
            });
            Self {
                bus: Rc::clone(&bus),
                definitions: RefCell::new(None),
                state: RefCell::new(StoryState::new()),
                power_subscription: Cell::new(Some(id)),
            }
        })
    }

    /// Load a definition document.
    ///
    /// On a structural error the built-in fallback story is installed and
    /// the error is returned so the caller can report the degradation.
    pub fn load_definitions(&self, data: &Value) -> StoryResult<()> {
        match StoryDefinitions::from_value(data) {
            Ok(definitions) => {
                tracing::info!(events = definitions.len(), "story definitions loaded");
                self.install(definitions);
                Ok(())
            }
            Err(e) => Err(self.fall_back(e)),
        }
    }

    /// Load a definition document from JSON text.
    pub fn load_definitions_str(&self, json: &str) -> StoryResult<()> {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => self.load_definitions(&value),
            Err(e) => Err(self.fall_back(e.into())),
        }
    }

    /// Load a definition document from a file.
    pub fn load_definitions_file(&self, path: impl AsRef<Path>) -> StoryResult<()> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => self.load_definitions_str(&json),
            Err(source) => Err(self.fall_back(StoryError::Io {
                path: path.to_path_buf(),
                source,
            })),
        }
    }

    fn fall_back(&self, error: StoryError) -> StoryError {
        tracing::warn!("story definitions rejected, using built-in fallback: {error}");
        self.install(StoryDefinitions::fallback());
        error
    }

    fn install(&self, definitions: StoryDefinitions) {
        for cycle in definitions.dependency_cycles() {
            tracing::warn!(
                events = ?cycle,
                "story events wait on each other and can never trigger"
            );
        }
        {
            let mut state = self.state.borrow_mut();
            for (key, value) in definitions.initial_flags() {
                if state.flag(key).is_none() {
                    state.set_flag(key.clone(), value.clone());
                }
            }
        }
        *self.definitions.borrow_mut() = Some(definitions);
    }

    /// Whether any definitions (loaded or fallback) are installed.
    pub fn has_definitions(&self) -> bool {
        self.definitions.borrow().is_some()
    }

    /// A copy of an event definition.
    pub fn event(&self, event_id: &str) -> Option<StoryEvent> {
        self.definitions
            .borrow()
            .as_ref()
            .and_then(|defs| defs.event(event_id).cloned())
    }

    /// Fire an event if it exists and its triggers hold.
    ///
    /// Marks the event completed, applies its effects in order, and
    /// publishes `story.eventTriggered` plus the kind-specific topic.
    /// Completed events may fire again when their triggers still hold.
    pub fn trigger_event(&self, event_id: &str) -> Option<StoryEvent> {
        let event = {
            let definitions = self.definitions.borrow();
            let Some(definitions) = definitions.as_ref() else {
                tracing::debug!(event_id, "no story definitions loaded");
                return None;
            };
            let Some(event) = definitions.event(event_id) else {
                tracing::debug!(event_id, "unknown story event");
                return None;
            };
            event.clone()
        };

        let satisfied = evaluate(&event.triggers, &*self.state.borrow());
        if !satisfied {
            tracing::debug!(event_id, "story event triggers not met");
            return None;
        }

        self.state.borrow_mut().mark_completed(event.id.clone());
        apply_effects(&event.effects, &event.id, self);

        let payload = BusEvent::EventTriggered {
            event_id: event.id.clone(),
            kind: event.kind,
            content: event.content.clone(),
        };
        self.bus.publish(Topic::EventTriggered, &payload);
        self.bus.publish(Topic::for_event_kind(event.kind), &payload);
        Some(event)
    }

    /// Write a flag and publish `story.flagChanged`.
    pub fn set_flag(&self, key: impl Into<String>, value: FlagValue) {
        let key = key.into();
        let old_value = self.state.borrow_mut().set_flag(key.clone(), value.clone());
        self.bus.publish(
            Topic::FlagChanged,
            &BusEvent::FlagChanged {
                flag: key,
                value,
                old_value,
            },
        );
    }

    /// Read a flag.
    pub fn flag(&self, key: &str) -> Option<FlagValue> {
        self.state.borrow().flag(key).cloned()
    }

    /// Move the current checkpoint and publish `story.checkpointReached`.
    ///
    /// Returns `false` without changing anything if the id is not defined.
    pub fn set_checkpoint(&self, checkpoint_id: &str) -> bool {
        let known = self
            .definitions
            .borrow()
            .as_ref()
            .is_some_and(|defs| defs.checkpoint(checkpoint_id).is_some());
        if !known {
            tracing::warn!(checkpoint_id, "ignoring unknown checkpoint");
            return false;
        }

        let previous = self.state.borrow_mut().set_checkpoint(checkpoint_id);
        self.bus.publish(
            Topic::CheckpointReached,
            &BusEvent::CheckpointReached {
                checkpoint_id: checkpoint_id.to_string(),
                previous,
            },
        );
        true
    }

    /// The current checkpoint.
    pub fn current_checkpoint(&self) -> Option<String> {
        self.state.borrow().checkpoint().map(str::to_string)
    }

    /// Check if an event has completed.
    pub fn is_event_completed(&self, event_id: &str) -> bool {
        self.state.borrow().is_completed(event_id)
    }

    /// Check if the story has seen a power unlocked.
    pub fn is_power_unlocked(&self, power_id: &str) -> bool {
        self.state.borrow().has_power(power_id)
    }

    /// Ids of every completed event.
    pub fn completed_events(&self) -> BTreeSet<String> {
        self.state.borrow().completed_events().clone()
    }

    /// Completion summary.
    pub fn progress(&self) -> StoryProgress {
        let total_count = self
            .definitions
            .borrow()
            .as_ref()
            .map_or(0, StoryDefinitions::len);
        let state = self.state.borrow();
        let completed_count = state.completed_events().len();
        let percentage = if total_count == 0 {
            0.0
        } else {
            (completed_count as f64 / total_count as f64 * 100.0).min(100.0)
        };
        StoryProgress {
            completed_count,
            total_count,
            percentage,
            unlocked_power_count: state.unlocked_powers().len(),
        }
    }

    /// Project the live state into its snapshot section.
    pub fn snapshot(&self) -> StorySection {
        self.state.borrow().to_section()
    }

    /// Replace the live state from a snapshot section.
    ///
    /// `None` restores a fresh state as [`StoryEngine::reset`] would.
    pub fn restore(&self, section: Option<&StorySection>) {
        match section {
            Some(section) => {
                *self.state.borrow_mut() = StoryState::from_section(section.clone());
            }
            None => self.reset(),
        }
    }

    /// Restore from untrusted JSON, defaulting any field that does not parse.
    pub fn restore_value(&self, section: &Value) {
        let section = StorySection::from_value_lenient(section);
        self.restore(Some(&section));
    }

    /// Clear all narrative state and re-seed the initial flags.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.reset();
        if let Some(definitions) = self.definitions.borrow().as_ref() {
            for (key, value) in definitions.initial_flags() {
                state.set_flag(key.clone(), value.clone());
            }
        }
    }

    fn record_power(&self, power_id: &str) {
        match self.state.try_borrow_mut() {
            Ok(mut state) => {
                state.grant_power(power_id);
            }
            Err(_) => {
                tracing::error!(power_id, "story state busy; unlocked power not mirrored");
            }
        }
    }
}

impl EffectTarget for StoryEngine {
    fn apply_set_flag(&self, flag: &str, value: &FlagValue) {
        self.set_flag(flag, value.clone());
    }

    fn apply_unlock_power(&self, power_id: &str, cause: &str) {
        self.state.borrow_mut().grant_power(power_id);
        self.bus.publish(
            Topic::PowerGranted,
            &BusEvent::PowerGranted {
                power_id: power_id.to_string(),
                cause: cause.to_string(),
            },
        );
    }

    fn apply_set_checkpoint(&self, checkpoint_id: &str) {
        self.set_checkpoint(checkpoint_id);
    }
}

impl Drop for StoryEngine {
    fn drop(&mut self) {
        if let Some(id) = self.power_subscription.take() {
            self.bus.unsubscribe(Topic::PowerUnlocked, id);
        }
    }
}

impl std::fmt::Debug for StoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryEngine")
            .field("definitions", &self.definitions.borrow().as_ref().map(StoryDefinitions::len))
            .field("state", &self.state.borrow())
            .finish()
    }
}
