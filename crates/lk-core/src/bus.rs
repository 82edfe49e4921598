//! Synchronous, typed publish/subscribe.
//!
//! One [`EventBus`] is shared (via `Rc`) by every component. Handlers for a
//! topic run in subscription order, synchronously, before `publish` returns.
//! A handler that panics is logged and skipped; the remaining handlers for
//! that publish still run.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MAX_PUBLISH_DEPTH;
use crate::effect::PowerEffect;
use crate::value::FlagValue;

/// Kind tag of a story event; selects its type-specific topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryEventKind {
    /// A conversation beat.
    Dialogue,
    /// A non-interactive sequence.
    Cutscene,
    /// A bookkeeping beat with no presentation of its own.
    #[default]
    Systemic,
}

impl fmt::Display for StoryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dialogue => write!(f, "dialogue"),
            Self::Cutscene => write!(f, "cutscene"),
            Self::Systemic => write!(f, "systemic"),
        }
    }
}

/// Every topic the engine publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Any story event fired.
    EventTriggered,
    /// A dialogue event fired.
    DialogueTriggered,
    /// A cutscene event fired.
    CutsceneTriggered,
    /// A systemic event fired.
    SystemicTriggered,
    /// A story flag changed.
    FlagChanged,
    /// The current checkpoint moved.
    CheckpointReached,
    /// A story effect asked for a power to be unlocked.
    PowerGranted,
    /// A power was unlocked.
    PowerUnlocked,
    /// A power was activated.
    PowerActivated,
    /// A power stopped being active.
    PowerDeactivated,
    /// A scene transition finished applying state.
    StateSynchronized,
    /// A save succeeded.
    SaveNotification,
    /// A save failed.
    SaveError,
}

impl Topic {
    /// All topics, in declaration order.
    pub const ALL: [Topic; 13] = [
        Topic::EventTriggered,
        Topic::DialogueTriggered,
        Topic::CutsceneTriggered,
        Topic::SystemicTriggered,
        Topic::FlagChanged,
        Topic::CheckpointReached,
        Topic::PowerGranted,
        Topic::PowerUnlocked,
        Topic::PowerActivated,
        Topic::PowerDeactivated,
        Topic::StateSynchronized,
        Topic::SaveNotification,
        Topic::SaveError,
    ];

    /// The dotted wire name presentation layers listen for.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventTriggered => "story.eventTriggered",
            Self::DialogueTriggered => "story.dialogueTriggered",
            Self::CutsceneTriggered => "story.cutsceneTriggered",
            Self::SystemicTriggered => "story.systemicTriggered",
            Self::FlagChanged => "story.flagChanged",
            Self::CheckpointReached => "story.checkpointReached",
            Self::PowerGranted => "story.powerGranted",
            Self::PowerUnlocked => "power.unlocked",
            Self::PowerActivated => "power.activated",
            Self::PowerDeactivated => "power.deactivated",
            Self::StateSynchronized => "state.synchronized",
            Self::SaveNotification => "save.notification",
            Self::SaveError => "save.error",
        }
    }

    /// Look a topic up by its dotted name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// The type-specific topic for a story event kind.
    pub fn for_event_kind(kind: StoryEventKind) -> Self {
        match kind {
            StoryEventKind::Dialogue => Self::DialogueTriggered,
            StoryEventKind::Cutscene => Self::CutsceneTriggered,
            StoryEventKind::Systemic => Self::SystemicTriggered,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a power stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// Its effect duration ran out.
    Expired,
    /// The host deactivated it early.
    Manual,
    /// A toggle power was switched off.
    Toggled,
}

/// Payloads carried on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A story event fired.
    EventTriggered {
        /// The event id.
        event_id: String,
        /// The event kind.
        kind: StoryEventKind,
        /// Opaque payload for the presentation layer.
        content: serde_json::Value,
    },
    /// A story flag was written.
    FlagChanged {
        /// Flag key.
        flag: String,
        /// New value.
        value: FlagValue,
        /// Previous value, if the flag existed.
        old_value: Option<FlagValue>,
    },
    /// The current checkpoint moved.
    CheckpointReached {
        /// The new checkpoint.
        checkpoint_id: String,
        /// The checkpoint it replaced.
        previous: Option<String>,
    },
    /// A story effect requested a power unlock.
    PowerGranted {
        /// The power to unlock.
        power_id: String,
        /// The story event whose effect asked for it.
        cause: String,
    },
    /// A power was unlocked.
    PowerUnlocked {
        /// The power id.
        power_id: String,
        /// What caused the unlock, if known.
        cause: Option<String>,
    },
    /// A power was activated.
    PowerActivated {
        /// The power id.
        power_id: String,
        /// Opaque activation context supplied by the caller.
        context: serde_json::Value,
        /// The effects applied by this activation, in definition order.
        effects: Vec<PowerEffect>,
    },
    /// A power stopped being active.
    PowerDeactivated {
        /// The power id.
        power_id: String,
        /// Why it stopped.
        reason: DeactivationReason,
    },
    /// A scene transition applied the aggregate state.
    StateSynchronized {
        /// Context that was left.
        from: String,
        /// Context that was entered.
        to: String,
    },
    /// A save succeeded.
    SaveNotification {
        /// Slot key that was written.
        key: String,
        /// Human-readable message.
        message: String,
    },
    /// A save failed.
    SaveError {
        /// Slot key that was attempted.
        key: String,
        /// Why it failed.
        reason: String,
    },
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&BusEvent)>;

/// The shared publish/subscribe bus.
pub struct EventBus {
    handlers: RefCell<BTreeMap<Topic, Vec<(SubscriptionId, Handler)>>>,
    next_id: Cell<u64>,
    depth: Cell<u32>,
    max_depth: u32,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        f.debug_struct("EventBus")
            .field("topics", &handlers.len())
            .field(
                "subscribers",
                &handlers.values().map(Vec::len).sum::<usize>(),
            )
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default cascade limit.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_PUBLISH_DEPTH)
    }

    /// Create a bus that drops publishes nested deeper than `max_depth`.
    pub fn with_max_depth(max_depth: u32) -> Self {
        Self {
            handlers: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
            depth: Cell::new(0),
            max_depth: max_depth.max(1),
        }
    }

    /// Register a handler for `topic`. Handlers run in subscription order.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(&BusEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers
            .borrow_mut()
            .entry(topic)
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not subscribed to `topic`.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(&topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        before != list.len()
    }

    /// Deliver `event` to every handler of `topic`.
    ///
    /// The handler list is captured before delivery: handlers added during
    /// the publish are not called for it, handlers removed during it still
    /// are. Returns the number of handlers that completed without panicking.
    pub fn publish(&self, topic: Topic, event: &BusEvent) -> usize {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            tracing::error!(
                %topic,
                depth,
                "publish cascade exceeded its depth limit; event dropped"
            );
            return 0;
        }

        let handlers: Vec<Handler> = self
            .handlers
            .borrow()
            .get(&topic)
            .map(|list| list.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default();

        self.depth.set(depth + 1);
        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    tracing::error!(%topic, "bus handler panicked: {}", panic_message(&*payload));
                }
            }
        }
        self.depth.set(depth);
        delivered
    }

    /// Number of handlers subscribed to `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.handlers.borrow().get(&topic).map_or(0, Vec::len)
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.handlers.borrow_mut().clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlocked(id: &str) -> BusEvent {
        BusEvent::PowerUnlocked {
            power_id: id.to_string(),
            cause: None,
        }
    }

    #[test]
    fn topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::parse("story.nothing"), None);
        assert_eq!(Topic::FlagChanged.to_string(), "story.flagChanged");
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let seen = Rc::clone(&seen);
            bus.subscribe(Topic::PowerUnlocked, move |_| seen.borrow_mut().push(n));
        }
        assert_eq!(bus.publish(Topic::PowerUnlocked, &unlocked("dash")), 3);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn other_topics_are_not_delivered() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        bus.subscribe(Topic::PowerActivated, move |_| counter.set(counter.get() + 1));
        bus.publish(Topic::PowerUnlocked, &unlocked("dash"));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_siblings() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        bus.subscribe(Topic::PowerUnlocked, |_| panic!("boom"));
        let counter = Rc::clone(&hits);
        bus.subscribe(Topic::PowerUnlocked, move |_| counter.set(counter.get() + 1));

        assert_eq!(bus.publish(Topic::PowerUnlocked, &unlocked("dash")), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let a = bus.subscribe(Topic::SaveError, |_| {});
        bus.subscribe(Topic::SaveError, |_| {});
        assert!(bus.unsubscribe(Topic::SaveError, a));
        assert!(!bus.unsubscribe(Topic::SaveError, a));
        assert!(!bus.unsubscribe(Topic::SaveNotification, a));
        assert_eq!(bus.subscriber_count(Topic::SaveError), 1);
    }

    #[test]
    fn nested_publish_is_delivered() {
        let bus = Rc::new(EventBus::new());
        let hits = Rc::new(Cell::new(0));
        let inner = Rc::clone(&bus);
        bus.subscribe(Topic::PowerGranted, move |_| {
            inner.publish(Topic::PowerUnlocked, &unlocked("dash"));
        });
        let counter = Rc::clone(&hits);
        bus.subscribe(Topic::PowerUnlocked, move |_| counter.set(counter.get() + 1));

        bus.publish(
            Topic::PowerGranted,
            &BusEvent::PowerGranted {
                power_id: "dash".into(),
                cause: "intro".into(),
            },
        );
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn runaway_cascade_is_cut_off() {
        let bus = Rc::new(EventBus::with_max_depth(4));
        let hits = Rc::new(Cell::new(0));
        let inner = Rc::clone(&bus);
        let counter = Rc::clone(&hits);
        bus.subscribe(Topic::PowerUnlocked, move |event| {
            counter.set(counter.get() + 1);
            inner.publish(Topic::PowerUnlocked, event);
        });

        bus.publish(Topic::PowerUnlocked, &unlocked("loop"));
        assert_eq!(hits.get(), 4);
    }

    #[test]
    fn subscribing_during_publish_takes_effect_next_time() {
        let bus = Rc::new(EventBus::new());
        let hits = Rc::new(Cell::new(0));
        let inner = Rc::clone(&bus);
        let counter = Rc::clone(&hits);
        bus.subscribe(Topic::SaveNotification, move |_| {
            let counter = Rc::clone(&counter);
            inner.subscribe(Topic::SaveNotification, move |_| {
                counter.set(counter.get() + 1);
            });
        });
        let event = BusEvent::SaveNotification {
            key: "auto_save".into(),
            message: "saved".into(),
        };
        bus.publish(Topic::SaveNotification, &event);
        assert_eq!(hits.get(), 0);
        bus.publish(Topic::SaveNotification, &event);
        assert_eq!(hits.get(), 1);
    }
}
