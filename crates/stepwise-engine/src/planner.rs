//! Step → action-plan collaborator.
//!
//! The planner never fails: malformed model output, an unreachable model or
//! an empty plan all fall back to a single `click` on the raw step text, so
//! the orchestrator always has something to execute and log.

use crate::hint;
use crate::llm::{ChatMessage, ChatModel, LlmError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use stepwise_common::{Action, ActionType};
use tracing::{debug, warn};

const PLAN_SYSTEM_PROMPT: &str = r#"You convert a single natural-language UI test step into a small JSON action plan.
Output ONLY JSON. Keys:
- "actions": list of ordered actions. Each action has:
  - "type": one of ["navigate","click","fill","press","wait_for","wait_for_selector",
                   "assert_text","assert_url_contains","select","combo_select",
                   "date_set","file_upload","hover","scroll_into_view",
                   "drag_and_drop"]
  - "target": a human hint (text on button, label, placeholder, role, test-id). Keep short.
  - "value": optional string (for fill/select/press).
  - "notes": optional brief hint.
Guidelines:
- Prefer robust hints: accessible role with name, visible text, placeholder, label, [data-testid].
- For comboboxes use: {"type":"combo_select","target":"<label or name>","value":"<option text>"}.
- For date pickers use ISO date: {"type":"date_set","target":"Start Date","value":"2025-08-07"}.
- For upload use path: {"type":"file_upload","target":"Profile picture","value":"fixtures/sample.txt"}.
- Prefer "wait_for_selector" over generic waits when possible.
- Do NOT return code. JSON only.
"#;

/// Label clicked when a "check" step names no quoted label.
const DEFAULT_CHECK_LABEL: &str = "privacy";

#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed plan: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Ordered actions for one step. Never empty.
    async fn plan(&self, page_html: &str, step: &str, base_url: &str) -> Vec<Action>;
}

/// Deterministic plan used whenever planning fails.
pub fn fallback_plan(step: &str) -> Vec<Action> {
    vec![Action::new(ActionType::Click, step)]
}

/// Parse model output into a sanitized action list.
///
/// The first `max_actions` entries are considered; entries whose type is
/// outside the vocabulary are dropped, target and notes are trimmed and
/// scalar values become strings.
pub fn parse_plan(raw: &str, max_actions: usize) -> Result<Vec<Action>, PlanningError> {
    let body = strip_code_fence(raw);
    let data: Value =
        serde_json::from_str(body).map_err(|e| PlanningError::Malformed(e.to_string()))?;
    let Some(entries) = data.get("actions").and_then(Value::as_array) else {
        return Err(PlanningError::Malformed("missing \"actions\" list".into()));
    };

    let actions: Vec<Action> = entries
        .iter()
        .take(max_actions)
        .filter_map(sanitize_entry)
        .collect();
    if actions.is_empty() {
        return Err(PlanningError::Malformed("no usable actions".into()));
    }
    Ok(actions)
}

fn sanitize_entry(entry: &Value) -> Option<Action> {
    let kind = entry.get("type")?.as_str()?.trim();
    let action_type: ActionType = kind.parse().ok()?;
    let target = entry.get("target").and_then(Value::as_str).unwrap_or("").trim();
    let mut action = Action::new(action_type, target);
    action.value = entry.get("value").and_then(scalar_string);
    action.notes = entry
        .get("notes")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    Some(action)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Body of a fenced code block if the output is wrapped in one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Prepend a `click` when the step asks to "check" something but the plan
/// has no click. Returns the injected label.
pub fn inject_check_click(step: &str, actions: &mut Vec<Action>, max_actions: usize) -> Option<String> {
    if !step.to_lowercase().contains("check") {
        return None;
    }
    if actions.iter().any(|a| a.action_type() == Some(ActionType::Click)) {
        return None;
    }
    let label = hint::first_quoted(step).unwrap_or_else(|| DEFAULT_CHECK_LABEL.to_string());
    actions.insert(0, Action::new(ActionType::Click, label.clone()));
    actions.truncate(max_actions);
    Some(label)
}

/// Planner backed by a chat model at temperature 0.
pub struct LlmPlanner {
    model: Arc<dyn ChatModel>,
    snippet_chars: usize,
    max_actions: usize,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn ChatModel>, snippet_chars: usize, max_actions: usize) -> Self {
        Self {
            model,
            snippet_chars,
            max_actions,
        }
    }

    fn messages(&self, page_html: &str, step: &str, base_url: &str) -> Vec<ChatMessage> {
        let snippet: String = page_html.chars().take(self.snippet_chars).collect();
        vec![
            ChatMessage::system(PLAN_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Base URL: {}\nPage (truncated): {}\n\nMake a JSON action plan for: \"{}\"",
                base_url, snippet, step
            )),
        ]
    }

    async fn try_plan(&self, page_html: &str, step: &str, base_url: &str) -> Result<Vec<Action>, PlanningError> {
        let raw = self
            .model
            .chat(&self.messages(page_html, step, base_url), 0.0)
            .await?;
        debug!(step, "Planner output: {}", raw);
        parse_plan(&raw, self.max_actions)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, page_html: &str, step: &str, base_url: &str) -> Vec<Action> {
        match self.try_plan(page_html, step, base_url).await {
            Ok(actions) => actions,
            Err(e) => {
                warn!(step, "Planning failed, falling back to a single click: {}", e);
                fallback_plan(step)
            }
        }
    }
}

/// Planner used when no model is configured: every step is a single click on its text.
pub struct FallbackPlanner;

#[async_trait]
impl Planner for FallbackPlanner {
    async fn plan(&self, _page_html: &str, step: &str, _base_url: &str) -> Vec<Action> {
        fallback_plan(step)
    }
}
