//! The composition root.

use std::path::Path;
use std::rc::Rc;

use lk_core::{AggregateSnapshot, Clock, CoreResult, EngineConfig, EventBus, SystemClock};
use lk_power::{PowerRegistry, PowerResult};
use lk_state::{GameState, RecoveryManager, SceneContext, SceneSynchronizer, StateValidator};
use lk_store::{MemoryStorage, PersistentStore, StorageBackend};
use lk_story::{StoryEngine, StoryProgress, StoryResult};
use serde_json::Value;

use crate::command::{Command, CommandOutcome};

/// Every Lorekeeper component, wired onto one event bus.
///
/// Components are built in dependency order: story engine, power registry,
/// game state, validator, recovery, synchronizer, store. Dropping the engine
/// drops them all and removes their subscriptions.
pub struct NarrativeEngine<B: StorageBackend> {
    config: EngineConfig,
    bus: Rc<EventBus>,
    clock: Rc<dyn Clock>,
    state: Rc<GameState>,
    recovery: Rc<RecoveryManager>,
    synchronizer: SceneSynchronizer,
    store: Rc<PersistentStore<B>>,
}

impl NarrativeEngine<MemoryStorage> {
    /// An engine that keeps saves in memory and reads the system clock.
    pub fn in_memory(config: EngineConfig) -> CoreResult<Self> {
        Self::new(config, MemoryStorage::new())
    }
}

impl<B: StorageBackend + 'static> NarrativeEngine<B> {
    /// Build an engine over `backend` that reads the system clock.
    pub fn new(config: EngineConfig, backend: B) -> CoreResult<Self> {
        Self::with_clock(config, backend, Rc::new(SystemClock))
    }

    /// Build an engine with an explicit time source.
    pub fn with_clock(config: EngineConfig, backend: B, clock: Rc<dyn Clock>) -> CoreResult<Self> {
        config.validate()?;
        let bus = Rc::new(EventBus::with_max_depth(config.max_publish_depth));
        let story = StoryEngine::new(Rc::clone(&bus));
        let powers = PowerRegistry::new(Rc::clone(&bus), Rc::clone(&clock));
        let state = Rc::new(GameState::new(&config, Rc::clone(&clock), story, powers));
        let validator = Rc::new(StateValidator::new(config.version));
        let recovery = Rc::new(RecoveryManager::new(&config, validator, Rc::clone(&clock)));
        let synchronizer =
            SceneSynchronizer::new(Rc::clone(&bus), Rc::clone(&state), Rc::clone(&recovery));
        let store = PersistentStore::new(
            &config,
            backend,
            Rc::clone(&bus),
            Rc::clone(&clock),
            Rc::clone(&state),
            Rc::clone(&recovery),
        );
        tracing::info!(namespace = %config.namespace, version = config.version, "engine ready");
        Ok(Self {
            config,
            bus,
            clock,
            state,
            recovery,
            synchronizer,
            store,
        })
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared event bus. Presentation layers subscribe here.
    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    /// The time source.
    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// The story graph engine.
    pub fn story(&self) -> &Rc<StoryEngine> {
        self.state.story()
    }

    /// The power registry.
    pub fn powers(&self) -> &Rc<PowerRegistry> {
        self.state.powers()
    }

    /// The aggregate game state.
    pub fn state(&self) -> &Rc<GameState> {
        &self.state
    }

    /// The validator and recovery ladder.
    pub fn recovery(&self) -> &Rc<RecoveryManager> {
        &self.recovery
    }

    /// The scene synchronizer.
    pub fn synchronizer(&self) -> &SceneSynchronizer {
        &self.synchronizer
    }

    /// The persistent store.
    pub fn store(&self) -> &Rc<PersistentStore<B>> {
        &self.store
    }

    /// Load story definitions. On error the built-in fallback is installed.
    pub fn load_story(&self, data: &Value) -> StoryResult<()> {
        self.story().load_definitions(data)
    }

    /// Load story definitions from a JSON file.
    pub fn load_story_file(&self, path: impl AsRef<Path>) -> StoryResult<()> {
        self.story().load_definitions_file(path)
    }

    /// Load power definitions. On error no powers are defined.
    pub fn load_powers(&self, data: &Value) -> PowerResult<()> {
        self.powers().load_definitions(data)
    }

    /// Load power definitions from a JSON file.
    pub fn load_powers_file(&self, path: impl AsRef<Path>) -> PowerResult<()> {
        self.powers().load_definitions_file(path)
    }

    /// Fire scheduled power deactivations that are due. Call once per frame.
    pub fn tick(&self) -> usize {
        self.powers().process_due()
    }

    /// Story completion figures.
    pub fn progress(&self) -> StoryProgress {
        self.story().progress()
    }

    /// The aggregate snapshot of the live state.
    pub fn snapshot(&self) -> AggregateSnapshot {
        self.state.snapshot()
    }

    /// Move state from one scene context to another.
    pub fn synchronize(&self, from: &dyn SceneContext, to: &mut dyn SceneContext) -> bool {
        self.synchronizer.synchronize(from, to)
    }

    /// Run one inbound command.
    pub fn execute(&self, command: Command) -> CommandOutcome {
        tracing::debug!(command = command.name(), "executing command");
        match command {
            Command::TriggerEvent { event_id } => match self.story().trigger_event(&event_id) {
                Some(event) => CommandOutcome::Triggered(event),
                None => CommandOutcome::Refused(format!("event {event_id} cannot trigger")),
            },
            Command::SetFlag { key, value } => {
                self.story().set_flag(key, value);
                CommandOutcome::Applied
            }
            Command::SetCheckpoint { checkpoint_id } => CommandOutcome::from_flag(
                self.story().set_checkpoint(&checkpoint_id),
                || format!("unknown checkpoint {checkpoint_id}"),
            ),
            Command::UnlockPower { power_id } => {
                CommandOutcome::from_flag(self.powers().unlock(&power_id, None), || {
                    format!("power {power_id} is unknown or already unlocked")
                })
            }
            Command::ActivatePower { power_id, context } => {
                CommandOutcome::from_flag(self.powers().activate(&power_id, context), || {
                    format!("power {power_id} is not available")
                })
            }
            Command::ManualSave { slot } => {
                CommandOutcome::from_flag(self.store.manual_save(slot), || {
                    format!("could not save to slot {slot}")
                })
            }
            Command::Load { key } => {
                CommandOutcome::from_flag(self.store.load_and_restore(&key), || {
                    format!("no usable save under {key}")
                })
            }
            Command::DeleteSave { key } => CommandOutcome::from_flag(self.store.delete(&key), || {
                format!("no save under {key}")
            }),
            Command::ResetAll => {
                self.state.reset_all();
                CommandOutcome::Applied
            }
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for NarrativeEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeEngine")
            .field("config", &self.config)
            .field("recovery", &self.recovery)
            .field("synchronizer", &self.synchronizer)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
