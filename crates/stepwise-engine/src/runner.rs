//! Step orchestration: plan → execute → record, one step at a time.
//!
//! A failing step never aborts the run; it is recorded with its error and a
//! failure screenshot and the next step starts. Only setup failures before
//! the first step (run directory, initial navigation) surface as [`RunError`].

use crate::config::StepwiseConfig;
use crate::driver::{ClickOptions, Driver, DriverError, SearchRoot};
use crate::executor::ActionExecutor;
use crate::goal::Goal;
use crate::oracle::{Oracle, evaluate_assertion};
use crate::planner::{Planner, inject_check_click};
use crate::report::TRACE_FILE;
use crate::runlog::RunLog;
use crate::selector;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use stepwise_common::formatter::mask_sensitive;
use stepwise_common::{
    Action, ActionError, ActionKind, AssertionResult, RunRecord, StepResult, StepStatus,
};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to create run directory {path}: {source}")]
    RunDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Initial navigation to {url} failed: {source}")]
    InitialNavigation {
        url: String,
        #[source]
        source: DriverError,
    },
}

/// Create `<runs_dir>/<goal_slug>_<unix_ts>/`.
pub async fn create_run_dir(runs_dir: &Path, goal: &Goal) -> Result<PathBuf, RunError> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let path = runs_dir.join(format!("{}_{}", goal.slug(), ts));
    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|source| RunError::RunDir {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

pub fn screenshot_name(prefix: &str, index: usize) -> String {
    format!("{}_{:03}.png", prefix, index)
}

/// Click every visible cookie/toast banner matching `selectors`.
/// Best effort: errors are logged and ignored. Returns the number dismissed.
pub async fn dismiss_noise(driver: &mut dyn Driver, selectors: &[String], settle: Duration) -> usize {
    let mut dismissed = 0;
    for expr in selectors {
        let Some(query) = selector::parse(expr) else {
            continue;
        };
        let Ok(Some(banner)) = driver.first_visible(&SearchRoot::Main, &query).await else {
            continue;
        };
        match driver
            .click(&banner, ClickOptions::with_timeout(Duration::from_millis(1000)))
            .await
        {
            Ok(()) => {
                debug!(selector = %expr, "Dismissed overlay");
                dismissed += 1;
                driver.pause(settle).await;
            }
            Err(e) => debug!(selector = %expr, "Overlay dismissal failed: {}", e),
        }
    }
    dismissed
}

pub struct StepOrchestrator {
    executor: ActionExecutor,
    planner: Arc<dyn Planner>,
    oracle: Arc<dyn Oracle>,
    config: Arc<StepwiseConfig>,
}

impl StepOrchestrator {
    pub fn new(
        executor: ActionExecutor,
        planner: Arc<dyn Planner>,
        oracle: Arc<dyn Oracle>,
        config: Arc<StepwiseConfig>,
    ) -> Self {
        Self {
            executor,
            planner,
            oracle,
            config,
        }
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Run every step and assertion of `goal`, writing artifacts into `dir`.
    pub async fn run(
        &self,
        driver: &mut dyn Driver,
        goal: &Goal,
        dir: &Path,
        log: &RunLog,
    ) -> Result<RunRecord, RunError> {
        let started_at = chrono::Local::now();
        let clock = Instant::now();

        if let Err(e) = driver.start_trace().await {
            debug!("Tracing unavailable: {}", e);
        }

        if let Some(url) = &goal.url {
            log.log(format!("INIT navigate -> {}", url));
            driver
                .navigate(url)
                .await
                .map_err(|source| RunError::InitialNavigation {
                    url: url.clone(),
                    source,
                })?;
            self.forward_browser_events(driver, log).await;
        }

        let mut steps = Vec::with_capacity(goal.steps.len());
        for (offset, description) in goal.steps.iter().enumerate() {
            let result = self
                .run_step(driver, goal, offset + 1, description, dir, log)
                .await;
            self.forward_browser_events(driver, log).await;
            steps.push(result);
        }

        let mut assertions = Vec::with_capacity(goal.assertions.len());
        for (offset, text) in goal.assertions.iter().enumerate() {
            assertions.push(self.run_assertion(driver, offset + 1, text, log).await);
        }

        match driver.stop_trace(&dir.join(TRACE_FILE)).await {
            Ok(()) => {}
            Err(DriverError::NotSupported(_)) => {}
            Err(e) => warn!("Failed to save trace: {}", e),
        }

        let record = RunRecord {
            name: goal.name.clone(),
            url: goal.url.clone().unwrap_or_default(),
            started_at: started_at.to_rfc3339(),
            duration_ms: clock.elapsed().as_millis() as u64,
            steps,
            assertions,
        };
        info!(
            passed = record.passed_steps(),
            failed = record.failed_steps(),
            "Run finished: {}",
            record.name
        );
        Ok(record)
    }

    async fn run_step(
        &self,
        driver: &mut dyn Driver,
        goal: &Goal,
        index: usize,
        description: &str,
        dir: &Path,
        log: &RunLog,
    ) -> StepResult {
        let started = Instant::now();
        let mut notes = None;

        let outcome = self
            .execute_step(driver, goal, index, description, log, &mut notes)
            .await;

        let (status, error, prefix) = match outcome {
            Ok(()) => (StepStatus::Pass, None, "step"),
            Err(e) => {
                let message = e.to_string();
                log.log(format!("FAIL {}: {}", index, message));
                (StepStatus::Fail, Some(message), "step_fail")
            }
        };

        let name = screenshot_name(prefix, index);
        let screenshot = match driver.screenshot(&dir.join(&name)).await {
            Ok(()) => Some(name),
            Err(e) => {
                warn!(step = index, "Screenshot failed: {}", e);
                None
            }
        };

        StepResult {
            index,
            description: description.to_string(),
            status,
            error,
            screenshot,
            elapsed_ms: started.elapsed().as_millis() as u64,
            notes,
        }
    }

    async fn execute_step(
        &self,
        driver: &mut dyn Driver,
        goal: &Goal,
        index: usize,
        description: &str,
        log: &RunLog,
        notes: &mut Option<String>,
    ) -> Result<(), ActionError> {
        dismiss_noise(
            driver,
            &self.config.noise.dismiss_selectors,
            self.config.delays.noise_dismiss(),
        )
        .await;
        log.log(format!("STEP {}: {}", index, description));

        let page = driver.content().await?;
        let base_url = match &goal.url {
            Some(url) => url.clone(),
            None => driver.current_url().await?,
        };
        let mut actions = self.planner.plan(&page, description, &base_url).await;

        let plan_json = serde_json::to_string(&actions).unwrap_or_default();
        log.log(format!("PLAN {}: {}", index, plan_json));
        *notes = Some(format!("AI plan: {}", plan_json));

        let cap = self.config.limits.max_actions_per_step;
        if let Some(label) = inject_check_click(description, &mut actions, cap) {
            log.log(format!(
                "PLAN {} UPDATED: injected click for check -> {}",
                index, label
            ));
        }

        for action in &actions {
            log.log(format!("EXEC {}: {}", index, exec_line(action)));
            if let Some(reason) = skip_reason(action) {
                log.log(format!("SKIP {}: {}", index, reason));
                continue;
            }
            let execution = self.executor.execute(driver, action).await?;
            if let Some(warning) = execution.note {
                log.log(format!("WARN {}: {}", index, warning));
                append_note(notes, &warning);
            }
        }
        Ok(())
    }

    async fn run_assertion(
        &self,
        driver: &mut dyn Driver,
        index: usize,
        text: &str,
        log: &RunLog,
    ) -> AssertionResult {
        let started = Instant::now();
        let verdict = match (driver.current_url().await, driver.content().await) {
            (Ok(url), Ok(page)) => evaluate_assertion(self.oracle.as_ref(), &page, &url, text).await,
            (Err(e), _) | (_, Err(e)) => crate::oracle::Verdict::fail(format!("Driver error: {}", e)),
        };
        log.log(format!(
            "ASSERT {}: {} {} ({})",
            index,
            if verdict.passed { "PASS" } else { "FAIL" },
            text,
            verdict.explanation
        ));
        AssertionResult {
            index,
            text: text.to_string(),
            passed: verdict.passed,
            explanation: verdict.explanation,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Copy network traffic and console output captured by the driver into the event log.
    async fn forward_browser_events(&self, driver: &mut dyn Driver, log: &RunLog) {
        for event in driver.drain_network().await {
            log.log(event.to_string());
        }
        for (level, text) in driver.drain_console().await {
            log.log(format!("CONSOLE[{}] {}", level, text));
        }
    }
}

fn exec_line(action: &Action) -> String {
    let value = action
        .value
        .as_deref()
        .map(|v| mask_sensitive(v, &action.target, &[]))
        .unwrap_or_default();
    format!(
        "type={} target={} value={}",
        action.kind,
        action.target.trim(),
        value
    )
}

/// Non-fatal reasons to skip a planned action.
fn skip_reason(action: &Action) -> Option<String> {
    let action_type = match &action.kind {
        ActionKind::Known(t) => *t,
        ActionKind::Unknown(raw) if raw.trim().is_empty() => {
            return Some("missing action type".to_string());
        }
        ActionKind::Unknown(raw) => return Some(format!("unknown action type: {}", raw.trim())),
    };
    if !action_type.allows_empty_target()
        && action.target.trim().is_empty()
        && action.value_str().is_none()
    {
        return Some("empty target/value".to_string());
    }
    None
}

fn append_note(notes: &mut Option<String>, line: &str) {
    match notes {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(line);
        }
        None => *notes = Some(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_common::ActionType;

    #[test]
    fn test_skip_reasons() {
        let unknown = Action {
            kind: ActionKind::Unknown("teleport".into()),
            target: "Mars".into(),
            value: None,
            notes: None,
        };
        assert_eq!(skip_reason(&unknown).as_deref(), Some("unknown action type: teleport"));

        let missing = Action {
            kind: ActionKind::Unknown(String::new()),
            ..unknown.clone()
        };
        assert_eq!(skip_reason(&missing).as_deref(), Some("missing action type"));

        let empty = Action::new(ActionType::Click, "  ");
        assert_eq!(skip_reason(&empty).as_deref(), Some("empty target/value"));
        assert_eq!(skip_reason(&Action::new(ActionType::Press, "")), None);
        assert_eq!(skip_reason(&Action::new(ActionType::WaitFor, "")), None);
    }

    #[test]
    fn test_exec_line_masks_passwords() {
        let action = Action::new(ActionType::Fill, "Password").with_value("secret_sauce");
        assert_eq!(exec_line(&action), "type=fill target=Password value=••••••••");
    }

    #[test]
    fn test_screenshot_names() {
        assert_eq!(screenshot_name("step", 3), "step_003.png");
        assert_eq!(screenshot_name("step_fail", 12), "step_fail_012.png");
    }
}
