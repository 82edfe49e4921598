//! Story definition documents.
//!
//! The external format is
//! `{ "events": [StoryEvent], "checkpoints": { id: Checkpoint }, "initialFlags": { key: value } }`.
//! Only `events` is required. Definitions are immutable once loaded.

use std::collections::{BTreeMap, HashMap};

use lk_core::{FlagValue, StoryEventKind};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::condition::Condition;
use crate::effect::Effect;
use crate::error::{StoryError, StoryResult};

/// Id of the single event in the built-in fallback story.
pub const FALLBACK_EVENT_ID: &str = "game_start";

/// A named narrative beat.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryEvent {
    /// Unique event id.
    pub id: String,
    /// Presentation kind.
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: StoryEventKind,
    /// Trigger conditions; empty means always triggerable.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub triggers: Vec<Condition>,
    /// Effects applied in order when the event fires.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub effects: Vec<Effect>,
    /// Opaque payload forwarded to the presentation layer.
    #[serde(default)]
    pub content: Value,
}

impl StoryEvent {
    /// An event with no triggers and no effects.
    pub fn new(id: impl Into<String>, kind: StoryEventKind) -> Self {
        Self {
            id: id.into(),
            kind,
            triggers: Vec::new(),
            effects: Vec::new(),
            content: Value::Null,
        }
    }
}

/// A named narrative waypoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Checkpoint id. Filled from the map key when omitted.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionDocument {
    events: Vec<StoryEvent>,
    #[serde(default)]
    checkpoints: BTreeMap<String, Checkpoint>,
    #[serde(default)]
    initial_flags: BTreeMap<String, FlagValue>,
}

/// The loaded catalog of events and checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryDefinitions {
    events: Vec<StoryEvent>,
    by_id: HashMap<String, usize>,
    checkpoints: BTreeMap<String, Checkpoint>,
    initial_flags: BTreeMap<String, FlagValue>,
}

impl StoryDefinitions {
    /// Validate and load a definition document.
    pub fn from_value(data: &Value) -> StoryResult<Self> {
        let Some(root) = data.as_object() else {
            return Err(StoryError::Malformed(
                "definitions must be an object".to_string(),
            ));
        };
        match root.get("events") {
            Some(Value::Array(_)) => {}
            Some(_) => return Err(StoryError::Malformed("`events` must be a list".to_string())),
            None => return Err(StoryError::Malformed("missing `events` list".to_string())),
        }
        match root.get("checkpoints") {
            None | Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(StoryError::Malformed(
                    "`checkpoints` must be a map".to_string(),
                ));
            }
        }

        let doc = DefinitionDocument::deserialize(data)?;
        Ok(Self::build(doc.events, doc.checkpoints, doc.initial_flags))
    }

    /// Parse and load a JSON definition document.
    pub fn from_json_str(json: &str) -> StoryResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// The built-in story: one always-triggerable start event.
    pub fn fallback() -> Self {
        let mut start = StoryEvent::new(FALLBACK_EVENT_ID, StoryEventKind::Systemic);
        start.effects.push(Effect::SetCheckpoint {
            checkpoint_id: FALLBACK_EVENT_ID.to_string(),
        });
        let checkpoint = Checkpoint {
            id: FALLBACK_EVENT_ID.to_string(),
            name: "Game Start".to_string(),
            description: None,
        };
        Self::build(
            vec![start],
            BTreeMap::from([(FALLBACK_EVENT_ID.to_string(), checkpoint)]),
            BTreeMap::new(),
        )
    }

    fn build(
        events: Vec<StoryEvent>,
        mut checkpoints: BTreeMap<String, Checkpoint>,
        initial_flags: BTreeMap<String, FlagValue>,
    ) -> Self {
        let mut kept = Vec::with_capacity(events.len());
        let mut by_id = HashMap::new();
        for event in events {
            if by_id.contains_key(&event.id) {
                tracing::warn!(event_id = %event.id, "duplicate event id; keeping the first definition");
                continue;
            }
            by_id.insert(event.id.clone(), kept.len());
            kept.push(event);
        }
        for (key, checkpoint) in &mut checkpoints {
            if checkpoint.id.is_empty() {
                checkpoint.id = key.clone();
            }
        }
        Self {
            events: kept,
            by_id,
            checkpoints,
            initial_flags,
        }
    }

    /// Look up an event.
    pub fn event(&self, event_id: &str) -> Option<&StoryEvent> {
        self.by_id.get(event_id).map(|&i| &self.events[i])
    }

    /// All events, in document order.
    pub fn events(&self) -> &[StoryEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Look up a checkpoint.
    pub fn checkpoint(&self, checkpoint_id: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(checkpoint_id)
    }

    /// All checkpoints.
    pub fn checkpoints(&self) -> &BTreeMap<String, Checkpoint> {
        &self.checkpoints
    }

    /// Flags seeded at load and on reset.
    pub fn initial_flags(&self) -> &BTreeMap<String, FlagValue> {
        &self.initial_flags
    }

    /// Groups of events that wait on each other's completion and can never fire.
    ///
    /// Each group is sorted; groups are sorted by their first id.
    pub fn dependency_cycles(&self) -> Vec<Vec<String>> {
        let edges: Vec<Vec<usize>> = self
            .events
            .iter()
            .map(|event| {
                event
                    .triggers
                    .iter()
                    .filter_map(|c| match c {
                        Condition::EventCompleted { event_id } => self.by_id.get(event_id).copied(),
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        let mut tarjan = Tarjan::new(edges.len());
        for v in 0..edges.len() {
            if tarjan.index[v].is_none() {
                tarjan.visit(v, &edges);
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1 || edges[c[0]].contains(&c[0]))
            .map(|c| {
                let mut ids: Vec<String> = c.iter().map(|&i| self.events[i].id.clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }
}

/// Strongly connected components over the event dependency graph.
struct Tarjan {
    next: usize,
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan {
    fn new(n: usize) -> Self {
        Self {
            next: 0,
            index: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn open(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    /// Depth-first walk from `root` on an explicit work stack of
    /// `(node, next edge)` frames, so long chains don't exhaust the call stack.
    fn visit(&mut self, root: usize, edges: &[Vec<usize>]) {
        self.open(root);
        let mut work = vec![(root, 0usize)];
        while let Some(frame) = work.last_mut() {
            let (v, edge) = *frame;
            if let Some(&w) = edges[v].get(edge) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.open(w);
                        work.push((w, 0));
                    }
                    Some(iw) if self.on_stack[w] => self.low[v] = self.low[v].min(iw),
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                self.low[parent] = self.low[parent].min(self.low[v]);
            }
            if self.index[v] == Some(self.low[v]) {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
