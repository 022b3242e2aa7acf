use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lenient deserializer for optional action values.
/// Planners emit numbers and booleans for values like `wait_for` durations;
/// scalars are stringified, `null` and structured values become `None`.
fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Deserializer that treats `null` like a missing string.
fn deserialize_null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The closed action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Navigate,
    Click,
    Fill,
    Press,
    WaitFor,
    WaitForSelector,
    AssertText,
    AssertUrlContains,
    Select,
    ComboSelect,
    DateSet,
    FileUpload,
    Hover,
    ScrollIntoView,
    DragAndDrop,
}

impl ActionType {
    pub const ALL: [ActionType; 15] = [
        ActionType::Navigate,
        ActionType::Click,
        ActionType::Fill,
        ActionType::Press,
        ActionType::WaitFor,
        ActionType::WaitForSelector,
        ActionType::AssertText,
        ActionType::AssertUrlContains,
        ActionType::Select,
        ActionType::ComboSelect,
        ActionType::DateSet,
        ActionType::FileUpload,
        ActionType::Hover,
        ActionType::ScrollIntoView,
        ActionType::DragAndDrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Navigate => "navigate",
            ActionType::Click => "click",
            ActionType::Fill => "fill",
            ActionType::Press => "press",
            ActionType::WaitFor => "wait_for",
            ActionType::WaitForSelector => "wait_for_selector",
            ActionType::AssertText => "assert_text",
            ActionType::AssertUrlContains => "assert_url_contains",
            ActionType::Select => "select",
            ActionType::ComboSelect => "combo_select",
            ActionType::DateSet => "date_set",
            ActionType::FileUpload => "file_upload",
            ActionType::Hover => "hover",
            ActionType::ScrollIntoView => "scroll_into_view",
            ActionType::DragAndDrop => "drag_and_drop",
        }
    }

    /// Actions that run without a target or value (`press` defaults to Enter,
    /// `wait_for` to the configured pause).
    pub fn allows_empty_target(&self) -> bool {
        matches!(self, ActionType::Press | ActionType::WaitFor)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ActionType::ALL
            .iter()
            .find(|t| t.as_str() == needle)
            .copied()
            .ok_or_else(|| UnknownActionType(needle.to_string()))
    }
}

/// An action type as planned. Types outside the closed vocabulary are kept
/// verbatim so the orchestrator can skip them with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Known(ActionType),
    Unknown(String),
}

impl ActionKind {
    pub fn known(&self) -> Option<ActionType> {
        match self {
            ActionKind::Known(t) => Some(*t),
            ActionKind::Unknown(_) => None,
        }
    }
}

impl From<String> for ActionKind {
    fn from(raw: String) -> Self {
        match raw.parse::<ActionType>() {
            Ok(t) => ActionKind::Known(t),
            Err(_) => ActionKind::Unknown(raw.trim().to_string()),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.to_string()
    }
}

impl From<ActionType> for ActionKind {
    fn from(t: ActionType) -> Self {
        ActionKind::Known(t)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Known(t) => f.write_str(t.as_str()),
            ActionKind::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// One typed, executable UI operation derived from a step description.
///
/// Planned once and never mutated; the executor may substitute an equivalent
/// action internally but works from its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub target: String,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Action {
    pub fn new(action_type: ActionType, target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Known(action_type),
            target: target.into(),
            value: None,
            notes: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn action_type(&self) -> Option<ActionType> {
        self.kind.known()
    }

    /// The value if present and non-empty.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }

    /// Target hint, falling back to the value (e.g. `navigate` with the URL in either slot).
    pub fn target_or_value(&self) -> &str {
        if self.target.is_empty() {
            self.value.as_deref().unwrap_or("")
        } else {
            &self.target
        }
    }

    /// Value, falling back to the target hint.
    pub fn value_or_target(&self) -> &str {
        self.value_str().unwrap_or(&self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pass,
    Fail,
}

/// Outcome of one planned step. Produced exactly once per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub error: Option<String>,
    /// Screenshot path relative to the run directory.
    #[serde(default)]
    pub screenshot: Option<String>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StepResult {
    pub fn passed(&self) -> bool {
        self.status == StepStatus::Pass
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub index: usize,
    pub text: String,
    pub passed: bool,
    pub explanation: String,
    pub elapsed_ms: u64,
}

/// Structured record of one run, as written to `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub name: String,
    pub url: String,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub assertions: Vec<AssertionResult>,
}

impl RunRecord {
    pub fn passed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.len() - self.passed_steps()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_steps() == 0 && self.assertions.iter().all(|a| a.passed)
    }
}
