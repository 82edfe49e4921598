//! The persistent store.
//!
//! Records are stored as JSON under `"<namespace>_<slotKey>"`. Space usage is
//! recomputed from the backend on every save so external deletions are
//! accounted for. A record that cannot be read back is moved to
//! `"<key>.corrupted"` and reported as absent.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

use lk_core::{AggregateSnapshot, BusEvent, Clock, EngineConfig, EventBus, SubscriptionId, Topic};
use lk_state::{GameState, RecoveryManager};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::StorageBackend;
use crate::error::{StorageError, StoreError, StoreResult};
use crate::record::{SaveDescriptor, SaveMetadata, SaveRecord, SaveSlot};

const QUARANTINE_SUFFIX: &str = ".corrupted";

/// Durable save and load of the aggregate state.
pub struct PersistentStore<B: StorageBackend> {
    namespace: String,
    budget: u64,
    manual_slots: u32,
    version: u32,
    bus: Rc<EventBus>,
    clock: Rc<dyn Clock>,
    state: Rc<GameState>,
    recovery: Rc<RecoveryManager>,
    backend: RefCell<B>,
    ordinal: Cell<u64>,
    subscriptions: RefCell<Vec<(Topic, SubscriptionId)>>,
}

impl<B: StorageBackend + 'static> PersistentStore<B> {
    /// Create a store over `backend` and subscribe the auto-save triggers.
    ///
    /// The save counter resumes after the highest ordinal already stored.
    pub fn new(
        config: &EngineConfig,
        backend: B,
        bus: Rc<EventBus>,
        clock: Rc<dyn Clock>,
        state: Rc<GameState>,
        recovery: Rc<RecoveryManager>,
    ) -> Rc<Self> {
        let store = Rc::new_cyclic(|weak: &Weak<Self>| {
            let mut subscriptions = Vec::new();
            for topic in [Topic::CheckpointReached, Topic::PowerUnlocked] {
                let weak = weak.clone();
                let id = bus.subscribe(topic, move |event| {
                    if let Some(store) = weak.upgrade() {
                        store.auto_save(&describe_trigger(event));
                    }
                });
                subscriptions.push((topic, id));
            }
            Self {
                namespace: config.namespace.clone(),
                budget: config.storage_budget_bytes,
                manual_slots: config.manual_slots,
                version: config.version,
                bus: Rc::clone(&bus),
                clock,
                state,
                recovery,
                backend: RefCell::new(backend),
                ordinal: Cell::new(0),
                subscriptions: RefCell::new(subscriptions),
            }
        });
        let highest = store
            .list_saves()
            .iter()
            .map(|save| save.metadata.save_ordinal)
            .max()
            .unwrap_or(0);
        store.ordinal.set(highest);
        store
    }

    /// The backend.
    pub fn backend(&self) -> Ref<'_, B> {
        self.backend.borrow()
    }

    /// The backend, mutably. Do not hold across store calls.
    pub fn backend_mut(&self) -> RefMut<'_, B> {
        self.backend.borrow_mut()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}_{key}", self.namespace)
    }

    fn prefix(&self) -> String {
        format!("{}_", self.namespace)
    }

    /// Write `record` under `key`. Publishes `save.notification` on success
    /// and `save.error` on failure.
    pub fn save(&self, key: &str, record: &SaveRecord) -> bool {
        match self.try_save(key, record) {
            Ok(bytes) => {
                tracing::info!(key, bytes, "game saved");
                self.bus.publish(
                    Topic::SaveNotification,
                    &BusEvent::SaveNotification {
                        key: key.to_string(),
                        message: format!("Saved to {key}"),
                    },
                );
                true
            }
            Err(e) => {
                tracing::error!(key, "save failed: {e}");
                self.bus.publish(
                    Topic::SaveError,
                    &BusEvent::SaveError {
                        key: key.to_string(),
                        reason: e.to_string(),
                    },
                );
                false
            }
        }
    }

    fn try_save(&self, key: &str, record: &SaveRecord) -> StoreResult<u64> {
        let value = serde_json::to_value(record)?;
        self.check_record(&value).map_err(StoreError::Rejected)?;
        let json = serde_json::to_string(&value)?;
        let full_key = self.full_key(key);
        let needed = (full_key.len() + json.len()) as u64;

        match self.write(&full_key, &json, needed) {
            Err(e) if is_out_of_space(&e) => {
                tracing::warn!(key, "{e}; removing quarantine backups and retrying");
                self.cleanup(&full_key)?;
                self.write(&full_key, &json, needed)
            }
            other => other,
        }
    }

    fn write(&self, full_key: &str, json: &str, needed: u64) -> StoreResult<u64> {
        let available = self.budget.saturating_sub(self.usage_excluding(full_key)?);
        if needed > available {
            return Err(StoreError::BudgetExceeded { needed, available });
        }
        let written = self.backend.borrow_mut().set(full_key, json);
        written?;
        Ok(needed)
    }

    /// Bytes used by every key under this store's namespace.
    pub fn usage_bytes(&self) -> StoreResult<u64> {
        self.usage_excluding("")
    }

    fn usage_excluding(&self, excluded: &str) -> StoreResult<u64> {
        let prefix = self.prefix();
        let backend = self.backend.borrow();
        let mut used = 0u64;
        for key in backend.keys()? {
            if !key.starts_with(&prefix) || key == excluded {
                continue;
            }
            if let Some(value) = backend.get(&key)? {
                used += (key.len() + value.len()) as u64;
            }
        }
        Ok(used)
    }

    /// Free space for `keep`.
    ///
    /// There is one auto-save slot, so the newest auto-save is the only one
    /// and is kept. Cleanup removes quarantine backups; live saves are never
    /// evicted.
    fn cleanup(&self, keep: &str) -> StoreResult<usize> {
        let prefix = self.prefix();
        let victims: Vec<String> = self
            .backend
            .borrow()
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(&prefix) && key != keep)
            .filter(|key| key.ends_with(QUARANTINE_SUFFIX))
            .collect();

        let mut backend = self.backend.borrow_mut();
        for key in &victims {
            backend.remove(key)?;
        }
        tracing::info!(removed = victims.len(), "storage cleanup finished");
        Ok(victims.len())
    }

    fn check_record(&self, value: &Value) -> Result<(), String> {
        let Some(root) = value.as_object() else {
            return Err("record is not an object".to_string());
        };
        if !root.get("version").is_some_and(Value::is_u64) {
            return Err("record has no version".to_string());
        }
        if !root.get("timestamp").is_some_and(Value::is_string) {
            return Err("record has no timestamp".to_string());
        }
        if !root.get("metadata").is_some_and(Value::is_object) {
            return Err("record has no metadata".to_string());
        }
        let Some(snapshot) = root.get("snapshot") else {
            return Err("record has no snapshot".to_string());
        };
        let report = self.recovery.validator().validate(snapshot);
        if report.is_valid {
            Ok(())
        } else {
            Err(report.errors.join("; "))
        }
    }

    fn parse_record(&self, raw: &str) -> StoreResult<SaveRecord> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        self.check_record(&value).map_err(StoreError::Corrupted)?;
        SaveRecord::deserialize(&value).map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    /// Read and parse a full key without side effects.
    fn read_record(&self, full_key: &str) -> Option<SaveRecord> {
        let raw = self.backend.borrow().get(full_key).ok()??;
        self.parse_record(&raw).ok()
    }

    /// Load the snapshot stored under `key`.
    pub fn load(&self, key: &str) -> Option<AggregateSnapshot> {
        self.load_record(key).map(|record| record.snapshot)
    }

    /// Load the full record stored under `key`.
    ///
    /// A record that cannot be parsed or fails validation is quarantined and
    /// `None` is returned.
    pub fn load_record(&self, key: &str) -> Option<SaveRecord> {
        let full_key = self.full_key(key);
        let raw = self.backend.borrow().get(&full_key);
        let raw = match raw {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "no save stored");
                return None;
            }
            Err(e) => {
                tracing::error!(key, "cannot read save: {e}");
                return None;
            }
        };
        match self.parse_record(&raw) {
            Ok(record) => {
                tracing::info!(key, ordinal = record.metadata.save_ordinal, "save loaded");
                Some(record)
            }
            Err(e) => {
                self.quarantine(&full_key, &raw, &e);
                None
            }
        }
    }

    fn quarantine(&self, full_key: &str, raw: &str, reason: &StoreError) {
        let backup = format!("{full_key}{QUARANTINE_SUFFIX}");
        let mut backend = self.backend.borrow_mut();
        if let Err(e) = backend.set(&backup, raw) {
            tracing::error!(key = full_key, "cannot back up corrupted save, leaving it in place: {e}");
            return;
        }
        if let Err(e) = backend.remove(full_key) {
            tracing::error!(key = full_key, "cannot remove corrupted save: {e}");
        }
        tracing::error!(key = full_key, %backup, "quarantined corrupted save: {reason}");
    }

    /// Load `key` and push it into the live game state.
    pub fn load_and_restore(&self, key: &str) -> bool {
        let Some(record) = self.load_record(key) else {
            return false;
        };
        let snapshot = if self.recovery.check(&record.snapshot).is_valid {
            record.snapshot
        } else {
            match self.recovery.recover(&record.snapshot.to_value()) {
                Some(snapshot) => snapshot,
                None => return false,
            }
        };
        self.state.restore(&snapshot);
        self.state.set_play_time_ms(record.metadata.play_time_ms);
        self.ordinal
            .set(self.ordinal.get().max(record.metadata.save_ordinal));
        true
    }

    /// Write the live state to the auto-save slot.
    pub fn auto_save(&self, trigger: &str) -> bool {
        tracing::debug!(trigger, "auto-save");
        self.save_slot(SaveSlot::Auto)
    }

    /// Write the live state to a manual slot.
    pub fn manual_save(&self, slot: u32) -> bool {
        if slot >= self.manual_slots {
            let key = SaveSlot::Manual(slot).key();
            tracing::error!(slot, limit = self.manual_slots, "no such manual save slot");
            self.bus.publish(
                Topic::SaveError,
                &BusEvent::SaveError {
                    key,
                    reason: format!("only {} manual slots exist", self.manual_slots),
                },
            );
            return false;
        }
        self.save_slot(SaveSlot::Manual(slot))
    }

    fn save_slot(&self, slot: SaveSlot) -> bool {
        let record = self.build_record(slot);
        self.recovery.check(&record.snapshot);
        self.save(&slot.key(), &record)
    }

    fn build_record(&self, slot: SaveSlot) -> SaveRecord {
        let snapshot = self.state.snapshot();
        let save_ordinal = self.ordinal.get() + 1;
        self.ordinal.set(save_ordinal);
        let metadata = SaveMetadata {
            play_time_ms: self.state.play_time_ms(),
            save_ordinal,
            last_checkpoint: snapshot
                .story
                .as_ref()
                .and_then(|story| story.checkpoint.clone()),
            save_kind: slot.kind(),
            slot: match slot {
                SaveSlot::Auto => None,
                SaveSlot::Manual(n) => Some(n),
            },
        };
        SaveRecord {
            version: self.version,
            timestamp: self.clock.now(),
            snapshot,
            metadata,
        }
    }

    /// Every readable save in the auto slot and the manual slots, newest
    /// first. Unreadable entries are skipped and left in place.
    pub fn list_saves(&self) -> Vec<SaveDescriptor> {
        let slots =
            std::iter::once(SaveSlot::Auto).chain((0..self.manual_slots).map(SaveSlot::Manual));
        let mut saves: Vec<SaveDescriptor> = slots
            .filter_map(|slot| {
                let record = self.read_record(&self.full_key(&slot.key()))?;
                Some(SaveDescriptor::new(slot, &record))
            })
            .collect();
        saves.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        saves
    }

    /// Delete the save under `key`. Returns `false` if nothing was stored.
    pub fn delete(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        let existing = self.backend.borrow().get(&full_key);
        match existing {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(key, "cannot read save: {e}");
                return false;
            }
        }
        let removed = self.backend.borrow_mut().remove(&full_key);
        match removed {
            Ok(()) => {
                tracing::info!(key, "save deleted");
                true
            }
            Err(e) => {
                tracing::error!(key, "cannot delete save: {e}");
                false
            }
        }
    }
}

impl<B: StorageBackend> Drop for PersistentStore<B> {
    fn drop(&mut self) {
        for (topic, id) in self.subscriptions.take() {
            self.bus.unsubscribe(topic, id);
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for PersistentStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("namespace", &self.namespace)
            .field("budget", &self.budget)
            .field("manual_slots", &self.manual_slots)
            .field("ordinal", &self.ordinal.get())
            .finish_non_exhaustive()
    }
}

fn is_out_of_space(error: &StoreError) -> bool {
    matches!(
        error,
        StoreError::BudgetExceeded { .. }
            | StoreError::Storage(StorageError::QuotaExceeded { .. })
    )
}

fn describe_trigger(event: &BusEvent) -> String {
    match event {
        BusEvent::CheckpointReached { checkpoint_id, .. } => format!("checkpoint {checkpoint_id}"),
        BusEvent::PowerUnlocked { power_id, .. } => format!("power {power_id}"),
        _ => "bus event".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStorage, MockStorageBackend};
    use crate::record::SaveKind;
    use lk_core::{ActorSection, ManualClock};
    use lk_power::PowerRegistry;
    use lk_state::StateValidator;
    use lk_story::StoryEngine;
    use serde_json::json;

    struct Fixture<B: StorageBackend> {
        bus: Rc<EventBus>,
        clock: Rc<ManualClock>,
        state: Rc<GameState>,
        store: Rc<PersistentStore<B>>,
    }

    fn fixture_with<B: StorageBackend + 'static>(config: EngineConfig, backend: B) -> Fixture<B> {
        let bus = Rc::new(EventBus::new());
        let clock = Rc::new(ManualClock::default());
        let story = StoryEngine::new(Rc::clone(&bus));
        story
            .load_definitions(&json!({
                "events": [
                    {"id": "intro", "effects": [
                        {"unlockPower": "dash"},
                        {"setCheckpoint": "gate"}
                    ]}
                ],
                "checkpoints": {"gate": {"name": "Gate"}}
            }))
            .unwrap();
        let powers = PowerRegistry::new(Rc::clone(&bus), clock.clone());
        powers.load_definitions(&json!([{"id": "dash"}])).unwrap();
        let state = Rc::new(GameState::new(&config, clock.clone(), story, powers));
        let validator = Rc::new(StateValidator::new(config.version));
        let recovery = Rc::new(RecoveryManager::new(&config, validator, clock.clone()));
        let store = PersistentStore::new(
            &config,
            backend,
            Rc::clone(&bus),
            clock.clone(),
            Rc::clone(&state),
            recovery,
        );
        Fixture {
            bus,
            clock,
            state,
            store,
        }
    }

    fn fixture() -> Fixture<MemoryStorage> {
        fixture_with(EngineConfig::default(), MemoryStorage::new())
    }

    fn topics(bus: &EventBus) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for topic in [Topic::SaveNotification, Topic::SaveError] {
            let seen = Rc::clone(&seen);
            bus.subscribe(topic, move |event| {
                let entry = match event {
                    BusEvent::SaveNotification { key, .. } => format!("saved {key}"),
                    BusEvent::SaveError { key, .. } => format!("failed {key}"),
                    _ => String::new(),
                };
                seen.borrow_mut().push(entry);
            });
        }
        seen
    }

    #[test]
    fn manual_save_round_trips() {
        let f = fixture();
        f.state.add_item("rope", 1);
        assert!(f.store.manual_save(0));
        let loaded = f.store.load("manual_save_0").unwrap();
        assert_eq!(loaded, f.state.snapshot());

        let record = f.store.load_record("manual_save_0").unwrap();
        assert_eq!(record.metadata.save_kind, SaveKind::Manual);
        assert_eq!(record.metadata.slot, Some(0));
        assert_eq!(record.metadata.save_ordinal, 1);
        assert!(f.store.backend().get("lorekeeper_manual_save_0").unwrap().is_some());
    }

    #[test]
    fn checkpoints_and_unlocks_auto_save() {
        let f = fixture();
        let seen = topics(&f.bus);
        f.state.story().trigger_event("intro").unwrap();
        assert_eq!(
            *seen.borrow(),
            vec!["saved auto_save".to_string(), "saved auto_save".to_string()]
        );

        let record = f.store.load_record("auto_save").unwrap();
        assert_eq!(record.metadata.save_kind, SaveKind::Auto);
        assert_eq!(record.metadata.save_ordinal, 2);
        assert_eq!(record.metadata.last_checkpoint.as_deref(), Some("gate"));
        assert!(
            record
                .snapshot
                .power
                .unwrap()
                .unlocked_power_ids
                .contains("dash")
        );
    }

    #[test]
    fn invalid_record_is_rejected_without_writing() {
        let f = fixture();
        let seen = topics(&f.bus);
        let mut snapshot = f.state.snapshot();
        snapshot.actor = Some(ActorSection::new(f64::NAN));
        let record = SaveRecord {
            version: 1,
            timestamp: f.clock.now(),
            snapshot,
            metadata: SaveMetadata {
                play_time_ms: 0,
                save_ordinal: 1,
                last_checkpoint: None,
                save_kind: SaveKind::Manual,
                slot: Some(0),
            },
        };
        assert!(!f.store.save("manual_save_0", &record));
        assert!(f.store.backend().keys().unwrap().is_empty());
        assert_eq!(*seen.borrow(), vec!["failed manual_save_0".to_string()]);
    }

    #[test]
    fn unparsable_bytes_are_quarantined() {
        let f = fixture();
        f.store
            .backend_mut()
            .set("lorekeeper_manual_save_1", "{not json")
            .unwrap();

        assert_eq!(f.store.load("manual_save_1"), None);

        let backend = f.store.backend();
        assert_eq!(backend.get("lorekeeper_manual_save_1").unwrap(), None);
        assert_eq!(
            backend
                .get("lorekeeper_manual_save_1.corrupted")
                .unwrap()
                .as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn structurally_invalid_records_are_quarantined() {
        let f = fixture();
        f.store
            .backend_mut()
            .set("lorekeeper_auto_save", r#"{"version": 1}"#)
            .unwrap();
        assert_eq!(f.store.load("auto_save"), None);
        assert!(
            f.store
                .backend()
                .get("lorekeeper_auto_save.corrupted")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn missing_key_loads_as_none() {
        let f = fixture();
        assert_eq!(f.store.load("manual_save_2"), None);
        assert!(f.store.backend().keys().unwrap().is_empty());
    }

    #[test]
    fn cleanup_frees_space_and_retries() {
        let sizing = fixture();
        assert!(sizing.store.manual_save(0));
        let one_save = sizing.store.usage_bytes().unwrap();

        let f = fixture_with(
            EngineConfig::default().with_storage_budget(one_save + 10),
            MemoryStorage::new(),
        );
        let junk = "x".repeat(usize::try_from(one_save).unwrap());
        f.store
            .backend_mut()
            .set("lorekeeper_manual_save_2.corrupted", &junk)
            .unwrap();

        assert!(f.store.manual_save(0));
        assert_eq!(
            f.store.backend().keys().unwrap(),
            vec!["lorekeeper_manual_save_0".to_string()]
        );
    }

    #[test]
    fn cleanup_never_evicts_live_saves() {
        let sizing = fixture();
        assert!(sizing.store.auto_save("setup"));
        assert!(sizing.store.manual_save(1));
        let two_saves = sizing.store.usage_bytes().unwrap();
        assert!(sizing.store.manual_save(0));
        let three_saves = sizing.store.usage_bytes().unwrap();

        let f = fixture_with(
            EngineConfig::default().with_storage_budget(three_saves + 10),
            MemoryStorage::new(),
        );
        assert!(f.store.auto_save("setup"));
        assert!(f.store.manual_save(1));
        let junk = "x".repeat(usize::try_from(three_saves).unwrap());
        f.store
            .backend_mut()
            .set("lorekeeper_auto_save.corrupted", &junk)
            .unwrap();

        assert!(f.store.manual_save(0));
        assert_eq!(
            f.store.backend().keys().unwrap(),
            vec![
                "lorekeeper_auto_save".to_string(),
                "lorekeeper_manual_save_0".to_string(),
                "lorekeeper_manual_save_1".to_string(),
            ]
        );

        let tight = fixture_with(
            EngineConfig::default().with_storage_budget(two_saves + 10),
            MemoryStorage::new(),
        );
        assert!(tight.store.auto_save("setup"));
        assert!(tight.store.manual_save(1));
        assert!(!tight.store.manual_save(0));
        assert_eq!(
            tight.store.backend().keys().unwrap(),
            vec![
                "lorekeeper_auto_save".to_string(),
                "lorekeeper_manual_save_1".to_string(),
            ]
        );
    }

    #[test]
    fn save_beyond_budget_fails() {
        let f = fixture_with(
            EngineConfig::default().with_storage_budget(10),
            MemoryStorage::new(),
        );
        let seen = topics(&f.bus);
        assert!(!f.store.manual_save(0));
        assert_eq!(*seen.borrow(), vec!["failed manual_save_0".to_string()]);
    }

    #[test]
    fn backend_quota_error_becomes_false() {
        let mut mock = MockStorageBackend::new();
        mock.expect_keys().returning(|| Ok(Vec::new()));
        mock.expect_get().returning(|_| Ok(None));
        mock.expect_set().returning(|key, _| {
            Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed: 1,
                available: 0,
            })
        });
        let f = fixture_with(EngineConfig::default(), mock);
        let seen = topics(&f.bus);

        assert!(!f.store.manual_save(1));
        assert_eq!(*seen.borrow(), vec!["failed manual_save_1".to_string()]);
    }

    #[test]
    fn list_saves_newest_first_and_skips_garbage() {
        let f = fixture();
        assert!(f.store.manual_save(0));
        f.clock.advance_ms(1000);
        assert!(f.store.manual_save(1));
        f.store
            .backend_mut()
            .set("lorekeeper_manual_save_2", "garbage")
            .unwrap();

        let saves = f.store.list_saves();
        let keys: Vec<&str> = saves.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["manual_save_1", "manual_save_0"]);
        assert!(
            f.store
                .backend()
                .get("lorekeeper_manual_save_2")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn delete_removes_once() {
        let f = fixture();
        f.store.manual_save(0);
        assert!(f.store.delete("manual_save_0"));
        assert!(!f.store.delete("manual_save_0"));
        assert_eq!(f.store.load("manual_save_0"), None);
    }

    #[test]
    fn load_and_restore_brings_back_state() {
        let f = fixture();
        f.state.story().trigger_event("intro").unwrap();
        f.state.add_item("key", 2);
        f.clock.advance_ms(5000);
        assert!(f.store.manual_save(0));

        f.state.reset_all();
        assert!(!f.state.powers().is_unlocked("dash"));

        assert!(f.store.load_and_restore("manual_save_0"));
        assert!(f.state.powers().is_unlocked("dash"));
        assert_eq!(f.state.item_count("key"), 2);
        assert_eq!(f.state.story().current_checkpoint().as_deref(), Some("gate"));
        assert_eq!(f.state.play_time_ms(), 5000);
        assert!(!f.store.load_and_restore("manual_save_2"));
    }

    #[test]
    fn unknown_manual_slot_is_refused() {
        let f = fixture();
        let seen = topics(&f.bus);
        assert!(!f.store.manual_save(3));
        assert_eq!(*seen.borrow(), vec!["failed manual_save_3".to_string()]);
    }

    #[test]
    fn usage_follows_external_deletes() {
        let f = fixture();
        f.store.manual_save(0);
        assert!(f.store.usage_bytes().unwrap() > 0);
        f.store
            .backend_mut()
            .remove("lorekeeper_manual_save_0")
            .unwrap();
        assert_eq!(f.store.usage_bytes().unwrap(), 0);
    }

    #[test]
    fn other_namespaces_are_not_counted() {
        let f = fixture();
        f.store.backend_mut().set("other_auto_save", "{}").unwrap();
        assert_eq!(f.store.usage_bytes().unwrap(), 0);
    }

    #[test]
    fn ordinal_resumes_from_stored_saves() {
        let first = fixture();
        first.store.manual_save(0);
        first.store.manual_save(1);
        let backend = first.store.backend().clone();

        let second = fixture_with(EngineConfig::default(), backend);
        assert!(second.store.manual_save(2));
        let record = second.store.load_record("manual_save_2").unwrap();
        assert_eq!(record.metadata.save_ordinal, 3);
    }

    #[test]
    fn drop_unsubscribes_auto_save() {
        let f = fixture();
        assert_eq!(f.bus.subscriber_count(Topic::CheckpointReached), 1);
        drop(f.store);
        assert_eq!(f.bus.subscriber_count(Topic::CheckpointReached), 0);
        assert_eq!(f.bus.subscriber_count(Topic::PowerUnlocked), 1);
    }
}
