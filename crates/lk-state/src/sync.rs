//! Scene-to-scene state transfer.
//!
//! A transition captures the actor from the context being left, builds and
//! validates the aggregate snapshot, and applies it to the context being
//! entered. Transitions are not re-entrant: a call made while one is in
//! progress is rejected.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use lk_core::{ActorSection, AggregateSnapshot, BusEvent, EventBus, InventorySection, Topic};

use crate::aggregate::GameState;
use crate::recovery::RecoveryManager;

/// A presentation surface the synchronizer reads from and writes to.
pub trait SceneContext {
    /// Stable id of the context.
    fn id(&self) -> &str;

    /// The actor as the context currently sees it, if it has one.
    fn actor(&self) -> Option<ActorSection>;

    /// Place the actor into the context.
    fn set_actor(&mut self, actor: &ActorSection);

    /// Show the inventory. Contexts without an inventory view ignore it.
    fn set_inventory(&mut self, _inventory: &InventorySection) {}

    /// Show which powers are active.
    fn set_active_powers(&mut self, _active: &BTreeSet<String>) {}
}

/// Where a transition currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// No transition in progress.
    #[default]
    Idle,
    /// Reading state out of the context being left.
    Capturing,
    /// Writing state into the context being entered.
    Applying,
}

/// Resets the phase to idle when dropped, including during unwinding.
struct PhaseGuard<'a>(&'a Cell<SyncPhase>);

impl PhaseGuard<'_> {
    fn enter(&self, phase: SyncPhase) {
        self.0.set(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.set(SyncPhase::Idle);
    }
}

/// Moves aggregate state between scene contexts.
pub struct SceneSynchronizer {
    bus: Rc<EventBus>,
    state: Rc<GameState>,
    recovery: Rc<RecoveryManager>,
    phase: Cell<SyncPhase>,
    captured: RefCell<BTreeMap<String, ActorSection>>,
}

impl SceneSynchronizer {
    /// Create an idle synchronizer.
    pub fn new(bus: Rc<EventBus>, state: Rc<GameState>, recovery: Rc<RecoveryManager>) -> Self {
        Self {
            bus,
            state,
            recovery,
            phase: Cell::new(SyncPhase::Idle),
            captured: RefCell::new(BTreeMap::new()),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase.get()
    }

    /// The actor last captured from a context.
    pub fn captured_actor(&self, context_id: &str) -> Option<ActorSection> {
        self.captured.borrow().get(context_id).copied()
    }

    /// Transfer state from `from` to `to` and publish `state.synchronized`.
    ///
    /// Returns `false` if a transition is already running or no trustworthy
    /// snapshot could be produced; `to` is left untouched in both cases.
    pub fn synchronize(&self, from: &dyn SceneContext, to: &mut dyn SceneContext) -> bool {
        if self.phase.get() != SyncPhase::Idle {
            tracing::warn!(
                from = from.id(),
                to = to.id(),
                phase = ?self.phase.get(),
                "scene synchronization already in progress; request rejected"
            );
            return false;
        }
        let guard = PhaseGuard(&self.phase);

        guard.enter(SyncPhase::Capturing);
        if let Some(actor) = from.actor() {
            self.captured
                .borrow_mut()
                .insert(from.id().to_string(), actor);
            self.state.set_actor(actor);
        }

        let mut snapshot = self.state.snapshot();
        snapshot.scene = Some(to.id().to_string());
        let Some(snapshot) = self.trusted(snapshot) else {
            tracing::error!(
                from = from.id(),
                to = to.id(),
                "no valid state to apply; scene left untouched"
            );
            return false;
        };

        guard.enter(SyncPhase::Applying);
        if let Some(actor) = &snapshot.actor {
            to.set_actor(actor);
            self.state.set_actor(*actor);
        }
        if let Some(inventory) = &snapshot.inventory {
            to.set_inventory(inventory);
        }
        if let Some(power) = &snapshot.power {
            to.set_active_powers(&power.active_power_ids);
        }
        self.state.set_scene(to.id());

        self.bus.publish(
            Topic::StateSynchronized,
            &BusEvent::StateSynchronized {
                from: from.id().to_string(),
                to: to.id().to_string(),
            },
        );
        true
    }

    fn trusted(&self, snapshot: AggregateSnapshot) -> Option<AggregateSnapshot> {
        let report = self.recovery.check(&snapshot);
        if report.is_valid {
            return Some(snapshot);
        }
        self.recovery.recover(&snapshot.to_value())
    }
}

impl std::fmt::Debug for SceneSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneSynchronizer")
            .field("phase", &self.phase.get())
            .field("captured", &self.captured.borrow())
            .finish_non_exhaustive()
    }
}
