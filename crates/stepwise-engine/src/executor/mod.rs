//! Action execution: resolve a target, interact with it, verify the effect.
//!
//! Every action walks `resolving → interacting → verifying → settled | failed`.
//! Interaction ladders (click, check, fill) are ordered lists of techniques,
//! each more invasive than the last; a rung's failure is logged before the
//! next one runs and the last rung's error becomes the action's error.

mod click;
mod combo;
mod date;
mod fill;
mod upload;

pub use click::ClickRung;
pub use date::parse_iso_date;
pub use fill::FillRung;

use crate::alias::AliasStore;
use crate::config::StepwiseConfig;
use crate::driver::{Driver, ElementHandle, Query, SearchRoot, TextMatch};
use crate::resolution::{Intent, Resolver};
use crate::selector;
use std::fmt;
use std::sync::Arc;
use stepwise_common::formatter::{format_action, truncate_for_log};
use stepwise_common::{Action, ActionError, ActionType};
use tracing::{debug, info, warn};

/// Lifecycle of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Interacting,
    Verifying,
    Settled,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolving => "resolving",
            Phase::Interacting => "interacting",
            Phase::Verifying => "verifying",
            Phase::Settled => "settled",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Phase tracker for one action; every transition is logged.
#[derive(Debug)]
pub(crate) struct Progress {
    action: ActionType,
    hint: String,
    phase: Phase,
    history: Vec<Phase>,
}

impl Progress {
    fn new(action: ActionType, hint: &str) -> Self {
        Self {
            action,
            hint: hint.to_string(),
            phase: Phase::Resolving,
            history: vec![Phase::Resolving],
        }
    }

    pub(crate) fn enter(&mut self, next: Phase) {
        if self.phase == next {
            return;
        }
        debug!(action = %self.action, hint = %self.hint, "{} -> {}", self.phase, next);
        self.phase = next;
        self.history.push(next);
    }
}

/// Outcome of a successful [`ActionExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Phases visited, ending in [`Phase::Settled`].
    pub phases: Vec<Phase>,
    /// Non-fatal remark for the step notes (e.g. an unknown action type was skipped).
    pub note: Option<String>,
}

pub struct ActionExecutor {
    resolver: Resolver,
    config: Arc<StepwiseConfig>,
}

impl ActionExecutor {
    pub fn new(aliases: Arc<AliasStore>, config: Arc<StepwiseConfig>) -> Self {
        Self {
            resolver: Resolver::new(aliases, &config.limits),
            config,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn config(&self) -> &StepwiseConfig {
        &self.config
    }

    /// Execute one action against the current page.
    pub async fn execute(
        &self,
        driver: &mut dyn Driver,
        action: &Action,
    ) -> Result<Execution, ActionError> {
        let Some(action_type) = action.action_type() else {
            let note = format!("Unknown action type: {}; skipped.", action.kind);
            warn!("{}", note);
            return Ok(Execution {
                phases: Vec::new(),
                note: Some(note),
            });
        };

        info!("Executing {}", format_action(action));
        let mut progress = Progress::new(action_type, action.target_or_value());
        match self.dispatch(driver, action_type, action, &mut progress).await {
            Ok(()) => {
                progress.enter(Phase::Settled);
                Ok(Execution {
                    phases: progress.history,
                    note: None,
                })
            }
            Err(e) => {
                progress.enter(Phase::Failed);
                warn!(
                    action = %action_type,
                    "Action failed: {}",
                    truncate_for_log(&e.to_string(), self.config.limits.log_truncate_chars)
                );
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        driver: &mut dyn Driver,
        action_type: ActionType,
        action: &Action,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        let target = action.target.trim();
        match action_type {
            ActionType::Navigate => self.navigate(driver, action.value_or_target(), progress).await,
            ActionType::Click => {
                self.click(driver, action.target_or_value().trim(), progress)
                    .await
            }
            ActionType::Fill => {
                let value = action.value.as_deref().unwrap_or("");
                self.fill(driver, target, value, progress).await
            }
            ActionType::Press => {
                let key = action
                    .value_str()
                    .or_else(|| Some(target).filter(|t| !t.is_empty()))
                    .unwrap_or("Enter");
                progress.enter(Phase::Interacting);
                driver.press_key(key).await?;
                Ok(())
            }
            ActionType::WaitFor => {
                let wait = action
                    .value_str()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(std::time::Duration::from_millis)
                    .unwrap_or_else(|| self.config.timeouts.default_wait());
                progress.enter(Phase::Interacting);
                driver.pause(wait).await;
                Ok(())
            }
            ActionType::WaitForSelector => {
                self.wait_for_selector(driver, action.value_or_target().trim(), progress)
                    .await
            }
            ActionType::AssertUrlContains => {
                progress.enter(Phase::Verifying);
                let fragment = action.value_or_target().trim();
                let url = driver.current_url().await?;
                if url.to_lowercase().contains(&fragment.to_lowercase()) {
                    Ok(())
                } else {
                    Err(ActionError::AssertionFailed(format!(
                        "URL does not contain {:?} (was {})",
                        fragment, url
                    )))
                }
            }
            ActionType::AssertText => {
                self.assert_text(driver, action.target_or_value().trim(), progress)
                    .await
            }
            ActionType::Select => {
                let value = action.value.as_deref().unwrap_or("");
                self.select(driver, target, value, progress).await
            }
            ActionType::ComboSelect => {
                let value = action.value.as_deref().unwrap_or("");
                self.combo_select(driver, target, value, progress).await
            }
            ActionType::DateSet => {
                let value = action.value.as_deref().unwrap_or("");
                self.date_set(driver, target, value, progress).await
            }
            ActionType::FileUpload => {
                let hint = if target.is_empty() { "upload" } else { target };
                self.file_upload(driver, hint, action.value_str(), progress)
                    .await
            }
            ActionType::Hover => {
                let hint = action.target_or_value().trim();
                let element = self.require(driver, Intent::Clickable, action_type, hint).await?;
                progress.enter(Phase::Interacting);
                self.highlight(driver, &element).await;
                driver.hover(&element).await?;
                Ok(())
            }
            ActionType::ScrollIntoView => {
                let hint = action.target_or_value().trim();
                let element = self.require(driver, Intent::Clickable, action_type, hint).await?;
                progress.enter(Phase::Interacting);
                self.highlight(driver, &element).await;
                driver.scroll_into_view(&element).await?;
                Ok(())
            }
            ActionType::DragAndDrop => {
                let destination = action.value.as_deref().unwrap_or("").trim();
                let source = self.require(driver, Intent::Clickable, action_type, target).await?;
                let dest = self
                    .require(driver, Intent::Clickable, action_type, destination)
                    .await?;
                progress.enter(Phase::Interacting);
                self.highlight(driver, &source).await;
                self.highlight(driver, &dest).await;
                driver.drag_to(&source, &dest).await?;
                Ok(())
            }
        }
    }

    // ============================================================
    // Shared helpers
    // ============================================================

    /// Resolve across frames or fail with `TargetNotFound`.
    pub(crate) async fn require(
        &self,
        driver: &mut dyn Driver,
        intent: Intent,
        action: ActionType,
        hint: &str,
    ) -> Result<ElementHandle, ActionError> {
        if hint.is_empty() {
            return Err(ActionError::not_found(action.as_str(), hint));
        }
        self.resolver
            .resolve(driver, intent, hint)
            .await
            .map(|c| c.element)
            .ok_or_else(|| ActionError::not_found(action.as_str(), hint))
    }

    /// Scroll, highlight and wait for visibility. Never fails: a timeout here
    /// defers the real failure to the interaction itself.
    pub(crate) async fn prepare(&self, driver: &mut dyn Driver, element: &ElementHandle) {
        if let Err(e) = driver.scroll_into_view(element).await {
            debug!("scroll_into_view failed: {}", e);
        }
        self.highlight(driver, element).await;
        if !driver
            .wait_visible(element, self.config.timeouts.visibility())
            .await
        {
            debug!("Element {} not visible after wait; interacting anyway", element.id);
        }
    }

    pub(crate) async fn highlight(&self, driver: &mut dyn Driver, element: &ElementHandle) {
        if driver.set_highlight(element, true).await.is_ok() {
            driver.pause(self.config.delays.highlight()).await;
            let _ = driver.set_highlight(element, false).await;
        }
    }

    async fn navigate(
        &self,
        driver: &mut dyn Driver,
        raw: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ActionError::not_found("navigate", raw));
        }
        let target = match url::Url::parse(raw) {
            Ok(u) => u.to_string(),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let current = driver.current_url().await?;
                url::Url::parse(&current)
                    .and_then(|base| base.join(raw))
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| raw.to_string())
            }
            Err(_) => raw.to_string(),
        };
        progress.enter(Phase::Interacting);
        driver.navigate(&target).await?;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        if hint.is_empty() {
            progress.enter(Phase::Interacting);
            driver.pause(self.config.timeouts.default_wait()).await;
            return Ok(());
        }
        let timeout = self.config.timeouts.visibility();

        for intent in [Intent::Input, Intent::Checkbox, Intent::Clickable] {
            if let Some(found) = self.resolver.resolve(driver, intent, hint).await {
                progress.enter(Phase::Verifying);
                let _ = driver.scroll_into_view(&found.element).await;
                if driver.wait_visible(&found.element, timeout).await {
                    return Ok(());
                }
                return Err(ActionError::Driver(crate::driver::DriverError::timeout(
                    format!("waiting for {:?} to become visible", hint),
                )));
            }
        }

        progress.enter(Phase::Verifying);
        let mut queries = vec![Query::Text(TextMatch::contains(hint))];
        if let Some(raw) = selector::parse(hint) {
            queries.push(raw);
        }
        for query in &queries {
            if driver.wait_for_query(&SearchRoot::Main, query, timeout).await.is_some() {
                return Ok(());
            }
        }
        Err(ActionError::not_found("wait_for_selector", hint))
    }

    async fn assert_text(
        &self,
        driver: &mut dyn Driver,
        text: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        if text.is_empty() {
            return Err(ActionError::not_found("assert_text", text));
        }
        let text_query = Query::Text(TextMatch::contains(text));
        let mut found = driver.query_first(&SearchRoot::Main, &text_query).await?;
        if found.is_none() {
            found = self
                .resolver
                .resolve(driver, Intent::Clickable, text)
                .await
                .map(|c| c.element);
        }
        let Some(element) = found else {
            return Err(ActionError::not_found("assert_text", text));
        };
        progress.enter(Phase::Verifying);
        if driver
            .wait_visible(&element, self.config.timeouts.visibility())
            .await
        {
            Ok(())
        } else {
            Err(ActionError::AssertionFailed(format!(
                "text {:?} is present but not visible",
                text
            )))
        }
    }
}
