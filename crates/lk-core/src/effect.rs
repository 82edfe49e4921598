use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One effect of a power.
///
/// The engine only interprets the duration; `kind` and `value` are passed
/// through to whoever renders the effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerEffect {
    /// Effect tag, interpreted by the presentation layer.
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: String,
    /// How long the effect lasts. Absent or zero means instantaneous.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Effect magnitude or payload.
    #[serde(default)]
    pub value: Option<Value>,
}

impl PowerEffect {
    /// Whether the effect is over as soon as it is applied.
    pub fn is_instantaneous(&self) -> bool {
        self.duration_ms.is_none_or(|ms| ms == 0)
    }
}
