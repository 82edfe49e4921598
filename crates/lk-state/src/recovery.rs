//! Recovery ladder for snapshots that fail validation.
//!
//! Every snapshot that passes [`RecoveryManager::check`] is cached as the
//! last valid one and pushed into a bounded history. [`RecoveryManager::recover`]
//! tries, in order: the last valid snapshot, the history from newest to
//! oldest (each entry re-validated), and finally a synthesized minimal
//! snapshot.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use lk_core::{
    ActorSection, AggregateSnapshot, Clock, EngineConfig, InventorySection, PowerSection,
    StorySection,
};
use serde_json::Value;

use crate::validator::{StateValidator, ValidationReport};

#[derive(Debug, Default)]
struct RecoveryState {
    last_valid: Option<AggregateSnapshot>,
    history: VecDeque<AggregateSnapshot>,
}

/// Validates live snapshots and repairs broken ones.
pub struct RecoveryManager {
    validator: Rc<StateValidator>,
    clock: Rc<dyn Clock>,
    capacity: usize,
    default_checkpoint: String,
    default_health: f64,
    state: RefCell<RecoveryState>,
}

impl RecoveryManager {
    /// Create a manager with an empty history.
    pub fn new(
        config: &EngineConfig,
        validator: Rc<StateValidator>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            validator,
            clock,
            capacity: config.history_capacity.max(1),
            default_checkpoint: config.default_checkpoint.clone(),
            default_health: config.default_health,
            state: RefCell::new(RecoveryState::default()),
        }
    }

    /// The validator snapshots are checked against.
    pub fn validator(&self) -> &Rc<StateValidator> {
        &self.validator
    }

    /// Validate a live snapshot; if it passes, remember it for recovery.
    pub fn check(&self, snapshot: &AggregateSnapshot) -> ValidationReport {
        let report = self.validator.validate_snapshot(snapshot);
        if report.is_valid {
            self.remember(snapshot.clone());
        }
        report
    }

    fn remember(&self, snapshot: AggregateSnapshot) {
        let mut state = self.state.borrow_mut();
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(snapshot.clone());
        state.last_valid = Some(snapshot);
    }

    /// Produce a trustworthy snapshot in place of `invalid`.
    ///
    /// Returns `None` only if the synthesized minimal snapshot itself fails
    /// validation.
    pub fn recover(&self, invalid: &Value) -> Option<AggregateSnapshot> {
        let report = self.validator.validate(invalid);
        tracing::warn!(errors = ?report.errors, "recovering from invalid snapshot");

        if let Some(last) = self.state.borrow().last_valid.clone() {
            tracing::info!("recovered from last valid snapshot");
            return Some(last);
        }

        let from_history = {
            let state = self.state.borrow();
            state
                .history
                .iter()
                .rev()
                .find(|candidate| self.validator.validate_snapshot(candidate).is_valid)
                .cloned()
        };
        if let Some(snapshot) = from_history {
            tracing::info!("recovered from snapshot history");
            return Some(snapshot);
        }

        let minimal = self.minimal_snapshot();
        let report = self.validator.validate_snapshot(&minimal);
        if report.is_valid {
            tracing::info!("recovered with a minimal snapshot");
            Some(minimal)
        } else {
            tracing::error!(errors = ?report.errors, "minimal snapshot failed validation");
            None
        }
    }

    /// A fresh-game snapshot at the default checkpoint.
    pub fn minimal_snapshot(&self) -> AggregateSnapshot {
        let mut snapshot = AggregateSnapshot::empty(self.validator.version(), self.clock.now());
        snapshot.story = Some(StorySection {
            checkpoint: Some(self.default_checkpoint.clone()),
            ..StorySection::default()
        });
        snapshot.power = Some(PowerSection::default());
        snapshot.inventory = Some(InventorySection::default());
        snapshot.actor = Some(ActorSection::new(self.default_health));
        snapshot
    }

    /// The most recent snapshot that passed validation.
    pub fn last_valid(&self) -> Option<AggregateSnapshot> {
        self.state.borrow().last_valid.clone()
    }

    /// Forget the cached last-valid snapshot. The history is kept.
    pub fn clear_last_valid(&self) {
        self.state.borrow_mut().last_valid = None;
    }

    /// Number of snapshots in the history.
    pub fn history_len(&self) -> usize {
        self.state.borrow().history.len()
    }

    /// Forget everything.
    pub fn clear(&self) {
        *self.state.borrow_mut() = RecoveryState::default();
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("RecoveryManager")
            .field("capacity", &self.capacity)
            .field("history_len", &state.history.len())
            .field("has_last_valid", &state.last_valid.is_some())
            .finish_non_exhaustive()
    }
}
