use super::{ActionExecutor, Phase, Progress};
use crate::driver::{ClickOptions, Driver, DriverError, ElementHandle, Query};
use crate::resolution::Intent;
use crate::selector::css_quote;
use std::fmt;
use stepwise_common::ActionError;
use tracing::{debug, info, warn};

/// Tags that are interactive on their own and never retargeted to a nested checkbox.
const NATIVE_CONTROLS: &[&str] = &["button", "a", "input", "select", "textarea", "option"];

const NESTED_CHECKBOX_CSS: &str = "input[type=\"checkbox\"]";

/// Click techniques, least invasive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickRung {
    /// Pointer click with actionability checks and the configured timeout.
    Default,
    /// Pointer click dispatched without actionability checks.
    Forced,
    /// `element.click()` from script.
    Script,
}

impl ClickRung {
    pub const LADDER: [ClickRung; 3] = [ClickRung::Default, ClickRung::Forced, ClickRung::Script];
}

impl fmt::Display for ClickRung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClickRung::Default => "default",
            ClickRung::Forced => "forced",
            ClickRung::Script => "script",
        };
        f.write_str(name)
    }
}

/// How a resolved element should be driven.
enum ClickTarget {
    Plain(ElementHandle),
    /// ARIA toggle: no native checked state, plain click only.
    AriaToggle(ElementHandle),
    /// Native checkbox (possibly retargeted from a wrapping container).
    Checkbox(ElementHandle),
}

impl ActionExecutor {
    pub(super) async fn click(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        if hint.is_empty() {
            return Err(ActionError::not_found("click", hint));
        }
        let resolved = match self.resolver.resolve(driver, Intent::Clickable, hint).await {
            Some(found) => Some(found),
            None => self.resolver.resolve(driver, Intent::Checkbox, hint).await,
        };
        let Some(resolved) = resolved else {
            return Err(ActionError::not_found("click", hint));
        };

        progress.enter(Phase::Interacting);
        self.prepare(driver, &resolved.element).await;

        match self.classify(driver, resolved.element).await? {
            ClickTarget::Checkbox(checkbox) => {
                self.ensure_checked(driver, &checkbox, hint, progress).await
            }
            ClickTarget::AriaToggle(element) => {
                debug!(hint, "ARIA toggle; driving with a plain click");
                self.click_ladder(driver, &element).await
            }
            ClickTarget::Plain(element) => self.click_ladder(driver, &element).await,
        }
    }

    async fn classify(
        &self,
        driver: &mut dyn Driver,
        element: ElementHandle,
    ) -> Result<ClickTarget, ActionError> {
        let role = driver.attribute(&element, "role").await?.unwrap_or_default();
        let aria_checked = driver.attribute(&element, "aria-checked").await?;
        if matches!(role.to_lowercase().as_str(), "checkbox" | "switch") || aria_checked.is_some() {
            return Ok(ClickTarget::AriaToggle(element));
        }

        let tag = driver.tag_name(&element).await?;
        if is_native_checkbox(driver, &element).await {
            return Ok(ClickTarget::Checkbox(element));
        }
        if NATIVE_CONTROLS.contains(&tag.as_str()) {
            return Ok(ClickTarget::Plain(element));
        }
        // Clicking a `<label for>` toggles its control, so drive the control instead.
        if tag == "label"
            && let Some(for_id) = driver.attribute(&element, "for").await?
        {
            let control = Query::css(format!("[id={}]", css_quote(&for_id)));
            if let Ok(Some(target)) = driver.query_first(&element.root, &control).await
                && is_native_checkbox(driver, &target).await
            {
                debug!("Retargeting label click to its checkbox");
                return Ok(ClickTarget::Checkbox(target));
            }
        }

        let nested = driver
            .query_within(&element, &Query::css(NESTED_CHECKBOX_CSS))
            .await
            .unwrap_or_default();
        match nested.into_iter().next() {
            Some(checkbox) => {
                debug!("Retargeting click to nested checkbox");
                Ok(ClickTarget::Checkbox(checkbox))
            }
            None => Ok(ClickTarget::Plain(element)),
        }
    }

    /// Walk [`ClickRung::LADDER`]; the last rung's error is the result.
    pub(crate) async fn click_ladder(
        &self,
        driver: &mut dyn Driver,
        element: &ElementHandle,
    ) -> Result<(), ActionError> {
        let mut outcome: Result<(), DriverError> =
            Err(DriverError::Other("click ladder is empty".into()));
        for rung in ClickRung::LADDER {
            outcome = self.click_rung(driver, element, rung).await;
            match &outcome {
                Ok(()) => {
                    if rung != ClickRung::Default {
                        info!(rung = %rung, "Click succeeded after escalation");
                    }
                    return Ok(());
                }
                Err(e) => warn!(rung = %rung, "Click rung failed: {}", e),
            }
        }
        outcome.map_err(ActionError::from)
    }

    async fn click_rung(
        &self,
        driver: &mut dyn Driver,
        element: &ElementHandle,
        rung: ClickRung,
    ) -> Result<(), DriverError> {
        let options = ClickOptions::with_timeout(self.config.timeouts.click());
        match rung {
            ClickRung::Default => driver.click(element, options).await,
            ClickRung::Forced => driver.click(element, options.forced()).await,
            ClickRung::Script => driver.script_click(element).await,
        }
    }

    /// Check a native checkbox and confirm it stuck; idempotent on an
    /// already-checked box.
    pub(crate) async fn ensure_checked(
        &self,
        driver: &mut dyn Driver,
        checkbox: &ElementHandle,
        hint: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        if let Err(e) = driver.check(checkbox, false).await {
            warn!(hint, "check() failed: {}; clicking the associated label", e);
            match self.associated_label(driver, checkbox).await {
                Some(label) => self.click_ladder(driver, &label).await?,
                None => self.click_ladder(driver, checkbox).await?,
            }
        }

        progress.enter(Phase::Verifying);
        if driver.is_checked(checkbox).await? {
            return Ok(());
        }
        debug!(hint, "Checkbox did not stick; forcing");
        driver.check(checkbox, true).await?;
        if driver.is_checked(checkbox).await? {
            Ok(())
        } else {
            Err(ActionError::mismatch("click", hint, "checked", "unchecked"))
        }
    }

    async fn associated_label(
        &self,
        driver: &mut dyn Driver,
        element: &ElementHandle,
    ) -> Option<ElementHandle> {
        if let Ok(Some(label)) = driver.closest(element, "label").await {
            return Some(label);
        }
        let id = driver.attribute(element, "id").await.ok().flatten()?;
        let query = Query::css(format!("label[for={}]", css_quote(&id)));
        driver.query_first(&element.root, &query).await.ok().flatten()
    }
}

async fn is_native_checkbox(driver: &mut dyn Driver, element: &ElementHandle) -> bool {
    if driver.tag_name(element).await.ok().as_deref() != Some("input") {
        return false;
    }
    matches!(
        driver.attribute(element, "type").await,
        Ok(Some(kind)) if kind.eq_ignore_ascii_case("checkbox")
    )
}
