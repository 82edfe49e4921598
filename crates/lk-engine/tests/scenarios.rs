//! End-to-end scenarios across every Lorekeeper component.

use std::cell::RefCell;
use std::rc::Rc;

use lk_core::{ActorSection, ManualClock, Position};
use lk_engine::{
    BusEvent, Command, CommandOutcome, EngineConfig, FileStorage, MemoryStorage, NarrativeEngine,
    SceneContext, StorageBackend, Topic,
};
use serde_json::json;

fn engine() -> (Rc<ManualClock>, NarrativeEngine<MemoryStorage>) {
    let clock = Rc::new(ManualClock::default());
    let engine =
        NarrativeEngine::with_clock(EngineConfig::default(), MemoryStorage::new(), clock.clone())
            .unwrap();
    (clock, engine)
}

fn record_topics(engine: &NarrativeEngine<impl StorageBackend + 'static>) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    for topic in Topic::ALL {
        let seen = Rc::clone(&seen);
        engine.bus().subscribe(topic, move |_| {
            seen.borrow_mut().push(topic.as_str().to_string());
        });
    }
    seen
}

#[test]
fn unlock_gates_a_later_event() {
    let (_clock, engine) = engine();
    engine
        .load_story(&json!({
            "events": [
                {"id": "a", "triggers": [], "effects": [{"unlockPower": "p"}]},
                {"id": "b", "triggers": [{"type": "powerUnlocked", "powerId": "p"}], "effects": []}
            ]
        }))
        .unwrap();
    engine.load_powers(&json!([{"id": "p", "name": "P"}])).unwrap();
    assert!(!engine.powers().is_unlocked("p"));

    assert!(matches!(
        engine.execute(Command::TriggerEvent { event_id: "b".into() }),
        CommandOutcome::Refused(_)
    ));
    assert!(!engine.story().is_event_completed("b"));

    let a = engine.story().trigger_event("a").unwrap();
    assert_eq!(a.id, "a");
    assert!(engine.powers().is_unlocked("p"));

    let b = engine.story().trigger_event("b").unwrap();
    assert_eq!(b.id, "b");
    assert!((engine.progress().percentage - 100.0).abs() < f64::EPSILON);
}

#[test]
fn trigger_publishes_in_order_and_auto_saves() {
    let (_clock, engine) = engine();
    engine
        .load_story(&json!({
            "events": [{
                "id": "meet_guide",
                "type": "dialogue",
                "effects": [
                    {"setFlag": "met_guide", "value": true},
                    {"unlockPower": "dash"},
                    {"setCheckpoint": "village"}
                ]
            }],
            "checkpoints": {"village": {"name": "Village"}}
        }))
        .unwrap();
    engine.load_powers(&json!([{"id": "dash"}])).unwrap();
    // Subscribed after every component, so nested publishes are recorded
    // before the topic that caused them.
    let seen = record_topics(&engine);

    engine.story().trigger_event("meet_guide").unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            "story.flagChanged",
            "save.notification",
            "power.unlocked",
            "story.powerGranted",
            "save.notification",
            "story.checkpointReached",
            "story.eventTriggered",
            "story.dialogueTriggered",
        ]
    );
    let auto = engine.store().load("auto_save").unwrap();
    assert_eq!(
        auto.story.unwrap().checkpoint.as_deref(),
        Some("village")
    );
}

#[test]
fn corrupted_save_is_quarantined() {
    let (_clock, engine) = engine();
    engine
        .store()
        .backend_mut()
        .set("lorekeeper_manual_save_0", "\u{0}\u{1}not a save")
        .unwrap();

    assert!(matches!(
        engine.execute(Command::Load { key: "manual_save_0".into() }),
        CommandOutcome::Refused(_)
    ));
    let backend = engine.store().backend();
    assert_eq!(backend.get("lorekeeper_manual_save_0").unwrap(), None);
    assert!(
        backend
            .get("lorekeeper_manual_save_0.corrupted")
            .unwrap()
            .is_some()
    );
}

#[test]
fn malformed_power_section_recovers_to_valid_state() {
    let (_clock, engine) = engine();
    let mut broken = engine.snapshot().to_value();
    broken["power"] = json!({"unlockedPowerIds": "dash", "activePowerIds": []});

    let validator = engine.recovery().validator();
    assert!(!validator.validate(&broken).is_valid);

    let recovered = engine.recovery().recover(&broken).unwrap();
    assert!(validator.validate_snapshot(&recovered).is_valid);
}

#[test]
fn saves_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let story = json!({
        "events": [{"id": "intro", "effects": [{"unlockPower": "dash"}]}],
        "initialFlags": {"chapter": 1}
    });

    {
        let engine = NarrativeEngine::new(
            EngineConfig::default(),
            FileStorage::open(dir.path()).unwrap(),
        )
        .unwrap();
        engine.load_story(&story).unwrap();
        engine.load_powers(&json!([{"id": "dash"}])).unwrap();
        engine.story().trigger_event("intro").unwrap();
        engine.state().add_item("map", 1);
        assert!(engine.execute(Command::ManualSave { slot: 0 }).is_applied());
    }

    let engine = NarrativeEngine::new(
        EngineConfig::default(),
        FileStorage::open(dir.path()).unwrap(),
    )
    .unwrap();
    engine.load_story(&story).unwrap();
    engine.load_powers(&json!([{"id": "dash"}])).unwrap();
    assert!(!engine.powers().is_unlocked("dash"));

    let saves = engine.store().list_saves();
    let keys: Vec<&str> = saves.iter().map(|s| s.key.as_str()).collect();
    assert!(keys.contains(&"manual_save_0"));
    assert!(keys.contains(&"auto_save"));

    assert!(
        engine
            .execute(Command::Load { key: "manual_save_0".into() })
            .is_applied()
    );
    assert!(engine.powers().is_unlocked("dash"));
    assert!(engine.story().is_event_completed("intro"));
    assert_eq!(engine.state().item_count("map"), 1);
}

struct Room {
    id: String,
    actor: Option<ActorSection>,
    active: Vec<String>,
}

impl Room {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            actor: None,
            active: Vec::new(),
        }
    }
}

impl SceneContext for Room {
    fn id(&self) -> &str {
        &self.id
    }

    fn actor(&self) -> Option<ActorSection> {
        self.actor
    }

    fn set_actor(&mut self, actor: &ActorSection) {
        self.actor = Some(*actor);
    }

    fn set_active_powers(&mut self, active: &std::collections::BTreeSet<String>) {
        self.active = active.iter().cloned().collect();
    }
}

#[test]
fn scene_transition_carries_actor_and_powers() {
    let (_clock, engine) = engine();
    engine
        .load_powers(&json!([{"id": "glow", "type": "toggle"}]))
        .unwrap();
    engine.powers().unlock("glow", None);
    engine.powers().activate("glow", json!(null));

    let synced = Rc::new(RefCell::new(Vec::new()));
    {
        let synced = Rc::clone(&synced);
        engine.bus().subscribe(Topic::StateSynchronized, move |event| {
            if let BusEvent::StateSynchronized { from, to } = event {
                synced.borrow_mut().push((from.clone(), to.clone()));
            }
        });
    }

    let mut hall = Room::new("hall");
    let mut actor = ActorSection::new(100.0);
    actor.position = Position::new(3.0, 4.0);
    hall.actor = Some(actor);
    let mut crypt = Room::new("crypt");

    assert!(engine.synchronize(&hall, &mut crypt));
    assert_eq!(crypt.actor, Some(actor));
    assert_eq!(crypt.active, vec!["glow".to_string()]);
    assert_eq!(engine.state().scene().as_deref(), Some("crypt"));
    assert_eq!(
        *synced.borrow(),
        vec![("hall".to_string(), "crypt".to_string())]
    );
}

#[test]
fn missing_story_file_falls_back() {
    let (_clock, engine) = engine();
    assert!(engine.load_story_file("/nonexistent/story.json").is_err());
    assert!(engine.story().has_definitions());
    assert!(engine.story().trigger_event("game_start").is_some());
    assert_eq!(
        engine.story().current_checkpoint().as_deref(),
        Some("game_start")
    );
}

#[test]
fn endless_cooldown_still_saves() {
    let (_clock, engine) = engine();
    engine
        .load_powers(&json!([{"id": "seal", "cooldownMs": u64::MAX}]))
        .unwrap();
    engine.powers().unlock("seal", None);
    assert!(engine.powers().activate("seal", json!(null)));

    let snapshot = engine.snapshot();
    assert!(engine.recovery().validator().validate_snapshot(&snapshot).is_valid);
    assert!(engine.execute(Command::ManualSave { slot: 0 }).is_applied());
    assert!(!engine.powers().check_available("seal"));
}
