use super::{ActionExecutor, Phase, Progress};
use crate::driver::{ClickOptions, Driver, DriverError, ElementHandle};
use crate::resolution::Intent;
use stepwise_common::{ActionError, ActionType};
use tracing::{debug, warn};

/// Ways of putting text into a field, least invasive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRung {
    /// Programmatic value assignment plus `input` event.
    Assign,
    /// Select-all, then one key event per character.
    Keystrokes,
}

impl FillRung {
    pub const LADDER: [FillRung; 2] = [FillRung::Assign, FillRung::Keystrokes];
}

impl ActionExecutor {
    pub(super) async fn fill(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        value: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        let field = self.require(driver, Intent::Input, ActionType::Fill, hint).await?;
        progress.enter(Phase::Interacting);
        self.prepare(driver, &field).await;

        let focus = ClickOptions::with_timeout(self.config.timeouts.pre_fill_click());
        if let Err(e) = driver.click(&field, focus).await {
            debug!(hint, "Focus click before fill failed: {}", e);
        }
        driver.pause(self.config.delays.settle()).await;

        self.fill_verified(driver, &field, hint, value, progress).await?;
        self.settle_field(driver, &field).await;
        Ok(())
    }

    /// Run [`FillRung::LADDER`] until the field reads back `value`.
    pub(crate) async fn fill_verified(
        &self,
        driver: &mut dyn Driver,
        field: &ElementHandle,
        hint: &str,
        value: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        let mut outcome = Err(ActionError::protocol("fill", hint, "fill ladder is empty"));
        for rung in FillRung::LADDER {
            progress.enter(Phase::Interacting);
            if let Err(e) = self.fill_rung(driver, field, value, rung).await {
                warn!(rung = ?rung, hint, "Fill rung failed: {}", e);
                outcome = Err(e.into());
                continue;
            }

            progress.enter(Phase::Verifying);
            let actual = driver.value(field).await?;
            if actual == value {
                return Ok(());
            }
            warn!(
                rung = ?rung,
                hint,
                "Field reads {:?} after fill, expected {:?}",
                actual,
                value
            );
            outcome = Err(ActionError::mismatch("fill", hint, value, actual));
        }
        outcome
    }

    async fn fill_rung(
        &self,
        driver: &mut dyn Driver,
        field: &ElementHandle,
        value: &str,
        rung: FillRung,
    ) -> Result<(), DriverError> {
        match rung {
            FillRung::Assign => driver.fill(field, value).await,
            FillRung::Keystrokes => {
                let focus = ClickOptions::with_timeout(self.config.timeouts.pre_fill_click());
                if let Err(e) = driver.click(field, focus).await {
                    debug!("Focus click before retype failed: {}", e);
                }
                if driver.press_key("Control+A").await.is_err() {
                    driver.press_key("Meta+A").await?;
                }
                driver.press_key("Backspace").await?;
                driver.type_text(value, self.config.delays.keystroke()).await
            }
        }
    }

    /// Fire `input`/`change` and drop focus so blur-time validation runs.
    pub(crate) async fn settle_field(&self, driver: &mut dyn Driver, field: &ElementHandle) {
        for event in ["input", "change"] {
            if let Err(e) = driver.dispatch_event(field, event).await {
                debug!("dispatch {} failed: {}", event, e);
            }
        }
        if driver.blur(field).await.is_err() {
            let _ = driver.press_key("Tab").await;
        }
    }
}
