//! The capability registry: unlocks, activation, cooldowns, and timed
//! deactivation.
//!
//! Timed deactivations are queued as tasks with a due instant. The host calls
//! [`PowerRegistry::process_due`] from its tick loop; a task whose power is
//! already inactive fires as a no-op.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use lk_core::clock::{after_millis, millis_between};
use lk_core::{BusEvent, Clock, DeactivationReason, EventBus, PowerSection, SubscriptionId, Topic};
use serde_json::Value;

use crate::definition::{PowerCatalog, PowerDefinition, PowerKind};
use crate::error::PowerResult;

/// Identifies a scheduled deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeactivationHandle(u64);

#[derive(Debug, Clone)]
struct PendingDeactivation {
    handle: DeactivationHandle,
    power_id: String,
    due: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    catalog: PowerCatalog,
    unlocked: BTreeSet<String>,
    active: BTreeSet<String>,
    cooldowns: BTreeMap<String, DateTime<Utc>>,
    pending: Vec<PendingDeactivation>,
    next_handle: u64,
}

impl RegistryState {
    fn cancel_pending_for(&mut self, power_id: &str) {
        self.pending.retain(|task| task.power_id != power_id);
    }
}

/// Runtime state of every defined power.
pub struct PowerRegistry {
    bus: Rc<EventBus>,
    clock: Rc<dyn Clock>,
    state: RefCell<RegistryState>,
    grant_subscription: Cell<Option<SubscriptionId>>,
}

impl PowerRegistry {
    /// Create a registry with an empty catalog.
    ///
    /// The registry subscribes to `story.powerGranted` and unlocks the
    /// requested power when it is defined.
    pub fn new(bus: Rc<EventBus>, clock: Rc<dyn Clock>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let id = bus.subscribe(Topic::PowerGranted, move |event| {
                if let (Some(registry), BusEvent::PowerGranted { power_id, cause }) =
                    (weak.upgrade(), event)
                {
                    registry.unlock(power_id, Some(cause));
                }
            });
            Self {
                bus: Rc::clone(&bus),
                clock,
                state: RefCell::new(RegistryState::default()),
                grant_subscription: Cell::new(Some(id)),
            }
        })
    }

    /// Replace the catalog. Runtime state for ids no longer defined is kept.
    pub fn set_catalog(&self, catalog: PowerCatalog) {
        tracing::info!(powers = catalog.len(), "power definitions loaded");
        self.state.borrow_mut().catalog = catalog;
    }

    /// Load definitions from JSON. On error the catalog is emptied and the
    /// error returned.
    pub fn load_definitions(&self, data: &Value) -> PowerResult<()> {
        self.install(PowerCatalog::from_value(data))
    }

    /// Load definitions from JSON text.
    pub fn load_definitions_str(&self, json: &str) -> PowerResult<()> {
        self.install(PowerCatalog::from_json_str(json))
    }

    /// Load definitions from a file.
    pub fn load_definitions_file(&self, path: impl AsRef<Path>) -> PowerResult<()> {
        self.install(PowerCatalog::from_path(path))
    }

    fn install(&self, loaded: PowerResult<PowerCatalog>) -> PowerResult<()> {
        match loaded {
            Ok(catalog) => {
                self.set_catalog(catalog);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("power definitions rejected, no powers available: {e}");
                self.state.borrow_mut().catalog = PowerCatalog::default();
                Err(e)
            }
        }
    }

    /// A copy of a power definition.
    pub fn definition(&self, power_id: &str) -> Option<PowerDefinition> {
        self.state.borrow().catalog.get(power_id).cloned()
    }

    /// Number of defined powers.
    pub fn defined_count(&self) -> usize {
        self.state.borrow().catalog.len()
    }

    /// Unlock a defined power and publish `power.unlocked`.
    ///
    /// Returns `false` if the id is unknown or already unlocked.
    pub fn unlock(&self, power_id: &str, cause: Option<&str>) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if !state.catalog.contains(power_id) {
                tracing::debug!(power_id, "ignoring unlock of undefined power");
                return false;
            }
            if !state.unlocked.insert(power_id.to_string()) {
                return false;
            }
        }
        self.bus.publish(
            Topic::PowerUnlocked,
            &BusEvent::PowerUnlocked {
                power_id: power_id.to_string(),
                cause: cause.map(str::to_string),
            },
        );
        true
    }

    /// Check if a power is unlocked.
    pub fn is_unlocked(&self, power_id: &str) -> bool {
        self.state.borrow().unlocked.contains(power_id)
    }

    /// Check if a power is currently active.
    pub fn is_active(&self, power_id: &str) -> bool {
        self.state.borrow().active.contains(power_id)
    }

    /// Unlocked power ids.
    pub fn unlocked_powers(&self) -> BTreeSet<String> {
        self.state.borrow().unlocked.clone()
    }

    /// Active power ids.
    pub fn active_powers(&self) -> BTreeSet<String> {
        self.state.borrow().active.clone()
    }

    /// Milliseconds of cooldown left, `None` if the power is ready.
    pub fn cooldown_remaining_ms(&self, power_id: &str) -> Option<u64> {
        let now = self.clock.now();
        let expires = *self.state.borrow().cooldowns.get(power_id)?;
        (expires > now).then(|| millis_between(now, expires))
    }

    /// Whether a power is unlocked and off cooldown. An elapsed cooldown is
    /// cleared here.
    pub fn check_available(&self, power_id: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.borrow_mut();
        if !state.unlocked.contains(power_id) {
            return false;
        }
        match state.cooldowns.get(power_id).copied() {
            Some(expires) if expires > now => false,
            Some(_) => {
                state.cooldowns.remove(power_id);
                true
            }
            None => true,
        }
    }

    /// Activate a power.
    ///
    /// Toggle powers flip between on and off; turning one off ignores the
    /// cooldown. Active powers with a duration effect stay active until the
    /// longest duration expires. Passive powers cannot be activated.
    pub fn activate(&self, power_id: &str, context: Value) -> bool {
        let Some(definition) = self.definition(power_id) else {
            tracing::debug!(power_id, "cannot activate undefined power");
            return false;
        };

        if definition.kind == PowerKind::Toggle && self.is_active(power_id) {
            return self.end_activation(power_id, DeactivationReason::Toggled);
        }

        if !self.check_available(power_id) {
            tracing::debug!(power_id, "power locked or cooling down");
            return false;
        }
        if definition.kind == PowerKind::Passive {
            tracing::debug!(power_id, "passive powers cannot be activated");
            return false;
        }

        let now = self.clock.now();
        {
            let mut state = self.state.borrow_mut();
            if definition.cooldown_ms > 0 {
                state
                    .cooldowns
                    .insert(power_id.to_string(), after_millis(now, definition.cooldown_ms));
            }
            match definition.kind {
                PowerKind::Toggle => {
                    state.active.insert(power_id.to_string());
                }
                _ => {
                    state.cancel_pending_for(power_id);
                    if let Some(duration) = definition.active_duration_ms() {
                        state.active.insert(power_id.to_string());
                        let handle = DeactivationHandle(state.next_handle);
                        state.next_handle += 1;
                        state.pending.push(PendingDeactivation {
                            handle,
                            power_id: power_id.to_string(),
                            due: after_millis(now, duration),
                        });
                    }
                }
            }
        }

        tracing::debug!(power_id, effects = definition.effects.len(), "power activated");
        self.bus.publish(
            Topic::PowerActivated,
            &BusEvent::PowerActivated {
                power_id: power_id.to_string(),
                context,
                effects: definition.effects,
            },
        );
        true
    }

    /// End an activation early. Any scheduled deactivation stays queued and
    /// later fires as a no-op.
    pub fn deactivate(&self, power_id: &str) -> bool {
        self.end_activation(power_id, DeactivationReason::Manual)
    }

    fn end_activation(&self, power_id: &str, reason: DeactivationReason) -> bool {
        if !self.state.borrow_mut().active.remove(power_id) {
            return false;
        }
        self.bus.publish(
            Topic::PowerDeactivated,
            &BusEvent::PowerDeactivated {
                power_id: power_id.to_string(),
                reason,
            },
        );
        true
    }

    /// The scheduled deactivation for a power, if one is queued.
    pub fn pending_deactivation(&self, power_id: &str) -> Option<DeactivationHandle> {
        self.state
            .borrow()
            .pending
            .iter()
            .find(|task| task.power_id == power_id)
            .map(|task| task.handle)
    }

    /// Drop a scheduled deactivation. Returns `false` if it already fired or
    /// was cancelled.
    pub fn cancel_deactivation(&self, handle: DeactivationHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.pending.len();
        state.pending.retain(|task| task.handle != handle);
        before != state.pending.len()
    }

    /// When the next scheduled deactivation is due.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().pending.iter().map(|task| task.due).min()
    }

    /// Fire every scheduled deactivation that is due, in due order. Returns
    /// how many powers were actually deactivated.
    pub fn process_due(&self) -> usize {
        let now = self.clock.now();
        let mut due = {
            let mut state = self.state.borrow_mut();
            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|task| task.due <= now);
            state.pending = waiting;
            due
        };
        due.sort_by_key(|task| (task.due, task.handle));

        let mut fired = 0;
        for task in due {
            if self.end_activation(&task.power_id, DeactivationReason::Expired) {
                fired += 1;
            }
        }
        fired
    }

    /// Project unlocked, active, and cooldown state into a snapshot section.
    pub fn snapshot(&self) -> PowerSection {
        let state = self.state.borrow();
        PowerSection {
            unlocked_power_ids: state.unlocked.clone(),
            active_power_ids: state.active.clone(),
            cooldowns: state.cooldowns.clone(),
        }
    }

    /// Restore unlocked and cooldown state. Nothing is left active and no
    /// deactivation stays scheduled. `None` resets.
    pub fn restore(&self, section: Option<&PowerSection>) {
        let mut state = self.state.borrow_mut();
        state.active.clear();
        state.pending.clear();
        match section {
            Some(section) => {
                state.unlocked = section.unlocked_power_ids.clone();
                state.cooldowns = section.cooldowns.clone();
            }
            None => {
                state.unlocked.clear();
                state.cooldowns.clear();
            }
        }
    }

    /// Restore from untrusted JSON, defaulting any field that does not parse.
    pub fn restore_value(&self, section: &Value) {
        let section = PowerSection::from_value_lenient(section);
        self.restore(Some(&section));
    }

    /// Lock every power and clear all runtime state. The catalog is kept.
    pub fn reset(&self) {
        self.restore(None);
    }
}

impl Drop for PowerRegistry {
    fn drop(&mut self) {
        if let Some(id) = self.grant_subscription.take() {
            self.bus.unsubscribe(Topic::PowerGranted, id);
        }
    }
}

impl std::fmt::Debug for PowerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerRegistry")
            .field("state", &self.state.borrow())
            .finish_non_exhaustive()
    }
}
