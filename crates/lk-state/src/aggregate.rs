//! Snapshot composition.
//!
//! Story and power state live in their own components; `GameState` only
//! reads them when composing a snapshot and writes them back on restore.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use lk_core::clock::millis_between;
use lk_core::{
    ActorSection, AggregateSnapshot, Clock, EngineConfig, InventorySection, Position,
};
use lk_power::PowerRegistry;
use lk_story::StoryEngine;

/// Composes the aggregate snapshot and owns inventory, actor, scene, and
/// play time.
pub struct GameState {
    version: u32,
    default_health: f64,
    clock: Rc<dyn Clock>,
    story: Rc<StoryEngine>,
    powers: Rc<PowerRegistry>,
    inventory: RefCell<InventorySection>,
    actor: Cell<ActorSection>,
    scene: RefCell<Option<String>>,
    play_base_ms: Cell<u64>,
    session_start: Cell<DateTime<Utc>>,
}

impl GameState {
    /// Create the aggregate over an existing story engine and registry.
    pub fn new(
        config: &EngineConfig,
        clock: Rc<dyn Clock>,
        story: Rc<StoryEngine>,
        powers: Rc<PowerRegistry>,
    ) -> Self {
        let session_start = clock.now();
        Self {
            version: config.version,
            default_health: config.default_health,
            clock,
            story,
            powers,
            inventory: RefCell::new(InventorySection::default()),
            actor: Cell::new(ActorSection::new(config.default_health)),
            scene: RefCell::new(None),
            play_base_ms: Cell::new(0),
            session_start: Cell::new(session_start),
        }
    }

    /// The story engine this state composes.
    pub fn story(&self) -> &Rc<StoryEngine> {
        &self.story
    }

    /// The power registry this state composes.
    pub fn powers(&self) -> &Rc<PowerRegistry> {
        &self.powers
    }

    /// Build a fresh snapshot of every subsystem.
    pub fn snapshot(&self) -> AggregateSnapshot {
        let mut snapshot = AggregateSnapshot::empty(self.version, self.clock.now());
        snapshot.story = Some(self.story.snapshot());
        snapshot.power = Some(self.powers.snapshot());
        snapshot.inventory = Some(self.inventory.borrow().clone());
        snapshot.actor = Some(self.actor.get());
        snapshot.scene = self.scene.borrow().clone();
        snapshot
    }

    /// Push a snapshot back into every subsystem. Missing sections reset
    /// that subsystem to its defaults.
    pub fn restore(&self, snapshot: &AggregateSnapshot) {
        self.story.restore(snapshot.story.as_ref());
        self.powers.restore(snapshot.power.as_ref());
        *self.inventory.borrow_mut() = snapshot.inventory.clone().unwrap_or_default();
        self.actor.set(
            snapshot
                .actor
                .unwrap_or_else(|| ActorSection::new(self.default_health)),
        );
        self.scene.replace(snapshot.scene.clone());
        tracing::info!(version = snapshot.version, "game state restored");
    }

    /// Reset story, powers, inventory, actor, scene, and play time.
    pub fn reset_all(&self) {
        self.story.reset();
        self.powers.reset();
        self.inventory.borrow_mut().items.clear();
        self.actor.set(ActorSection::new(self.default_health));
        self.scene.replace(None);
        self.set_play_time_ms(0);
    }

    /// Add items to the inventory.
    pub fn add_item(&self, item: impl Into<String>, count: u32) {
        self.inventory.borrow_mut().add(item, count);
    }

    /// Remove items. Returns `false` if not enough were held.
    pub fn remove_item(&self, item: &str, count: u32) -> bool {
        self.inventory.borrow_mut().remove(item, count)
    }

    /// How many of an item are held.
    pub fn item_count(&self, item: &str) -> u32 {
        self.inventory.borrow().count(item)
    }

    /// A copy of the inventory.
    pub fn inventory(&self) -> InventorySection {
        self.inventory.borrow().clone()
    }

    /// The actor state.
    pub fn actor(&self) -> ActorSection {
        self.actor.get()
    }

    /// Replace the actor state.
    pub fn set_actor(&self, actor: ActorSection) {
        self.actor.set(actor);
    }

    /// Move the actor.
    pub fn set_position(&self, position: Position) {
        let mut actor = self.actor.get();
        actor.position = position;
        self.actor.set(actor);
    }

    /// Set health, clamped to `0..=maxHealth`.
    pub fn set_health(&self, health: f64) {
        let mut actor = self.actor.get();
        actor.health = health.clamp(0.0, actor.max_health.max(0.0));
        self.actor.set(actor);
    }

    /// The current scene id.
    pub fn scene(&self) -> Option<String> {
        self.scene.borrow().clone()
    }

    /// Record the current scene id.
    pub fn set_scene(&self, scene: impl Into<String>) {
        self.scene.replace(Some(scene.into()));
    }

    /// Total play time, including the running session.
    pub fn play_time_ms(&self) -> u64 {
        let session = millis_between(self.session_start.get(), self.clock.now());
        self.play_base_ms.get().saturating_add(session)
    }

    /// Restart play-time accounting from `ms`.
    pub fn set_play_time_ms(&self, ms: u64) {
        self.play_base_ms.set(ms);
        self.session_start.set(self.clock.now());
    }
}

impl std::fmt::Debug for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameState")
            .field("inventory", &self.inventory.borrow())
            .field("actor", &self.actor.get())
            .field("scene", &self.scene.borrow())
            .field("play_time_ms", &self.play_time_ms())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lk_core::{EventBus, FlagValue, ManualClock};
    use proptest::prelude::*;
    use serde_json::json;

    struct Fixture {
        clock: Rc<ManualClock>,
        state: GameState,
    }

    fn fixture() -> Fixture {
        let bus = Rc::new(EventBus::new());
        let clock = Rc::new(ManualClock::default());
        let story = StoryEngine::new(Rc::clone(&bus));
        story
            .load_definitions(&json!({
                "events": [{"id": "intro", "effects": [
                    {"unlockPower": "dash"},
                    {"setCheckpoint": "gate"}
                ]}],
                "checkpoints": {"gate": {"name": "Gate"}}
            }))
            .unwrap();
        let powers = PowerRegistry::new(Rc::clone(&bus), clock.clone());
        powers
            .load_definitions(&json!([{"id": "dash", "cooldownMs": 100}]))
            .unwrap();
        let state = GameState::new(&EngineConfig::default(), clock.clone(), story, powers);
        Fixture { clock, state }
    }

    #[test]
    fn snapshot_composes_every_section() {
        let f = fixture();
        f.state.story().trigger_event("intro").unwrap();
        f.state.add_item("potion", 2);
        f.state.set_position(Position::new(3.0, 4.0));
        f.state.set_scene("courtyard");

        let snapshot = f.state.snapshot();
        let story = snapshot.story.unwrap();
        assert_eq!(story.checkpoint.as_deref(), Some("gate"));
        assert!(snapshot.power.unwrap().unlocked_power_ids.contains("dash"));
        assert_eq!(snapshot.inventory.unwrap().count("potion"), 2);
        assert_eq!(snapshot.actor.unwrap().position, Position::new(3.0, 4.0));
        assert_eq!(snapshot.scene.as_deref(), Some("courtyard"));
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn restore_writes_back_to_subsystems() {
        let f = fixture();
        f.state.story().trigger_event("intro").unwrap();
        f.state.add_item("key", 1);
        let saved = f.state.snapshot();

        f.state.reset_all();
        assert!(!f.state.powers().is_unlocked("dash"));
        assert_eq!(f.state.item_count("key"), 0);

        f.state.restore(&saved);
        assert!(f.state.powers().is_unlocked("dash"));
        assert!(f.state.story().is_event_completed("intro"));
        assert_eq!(f.state.item_count("key"), 1);
    }

    #[test]
    fn missing_sections_restore_defaults() {
        let f = fixture();
        f.state.story().set_flag("x", FlagValue::from(true));
        f.state.set_health(10.0);

        f.state.restore(&AggregateSnapshot::empty(1, f.clock.now()));

        assert_eq!(f.state.story().flag("x"), None);
        assert_eq!(f.state.actor(), ActorSection::new(100.0));
    }

    #[test]
    fn health_is_clamped() {
        let f = fixture();
        f.state.set_health(250.0);
        assert!((f.state.actor().health - 100.0).abs() < f64::EPSILON);
        f.state.set_health(-5.0);
        assert!(f.state.actor().health.abs() < f64::EPSILON);
    }

    #[test]
    fn play_time_accumulates_across_restarts() {
        let f = fixture();
        f.clock.advance_ms(1500);
        assert_eq!(f.state.play_time_ms(), 1500);

        f.state.set_play_time_ms(10_000);
        f.clock.advance_ms(250);
        assert_eq!(f.state.play_time_ms(), 10_250);

        f.state.reset_all();
        assert_eq!(f.state.play_time_ms(), 0);
    }

    proptest! {
        #[test]
        fn restore_of_snapshot_is_observably_identical(
            items in proptest::collection::btree_map("[a-z]{1,5}", 1u32..50, 0..5),
            x in -1000.0f64..1000.0,
            y in -1000.0f64..1000.0,
            fire in any::<bool>(),
        ) {
            let f = fixture();
            if fire {
                f.state.story().trigger_event("intro");
            }
            for (item, count) in &items {
                f.state.add_item(item.clone(), *count);
            }
            f.state.set_position(Position::new(x, y));

            let before = f.state.snapshot();
            f.state.reset_all();
            f.state.restore(&before);
            prop_assert_eq!(f.state.snapshot(), before);
        }
    }
}
