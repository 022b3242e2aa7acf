//! Native `<select>` and custom dropdown adapters.

use super::{ActionExecutor, Phase, Progress};
use crate::driver::{Driver, ElementHandle, Query, SearchRoot, TextMatch};
use crate::resolution::Intent;
use crate::selector::css_quote;
use stepwise_common::ActionError;
use tracing::{debug, info};

/// Trigger elements of widget libraries that do not expose `role=combobox`.
const CUSTOM_TRIGGER_CSS: &str = ".select2-selection, #msdd";

const SEARCH_FIELD_CSS: &str = ".select2-search__field, input[type=\"search\"]";

/// Outcome of trying native `<select>` elements.
#[derive(Debug, PartialEq, Eq)]
enum NativeSelect {
    Selected,
    /// At least one `<select>` matched the hint but none had the option.
    NoOption,
    Absent,
}

impl ActionExecutor {
    pub(super) async fn select(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        value: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        match self.select_native(driver, hint, value, progress).await? {
            NativeSelect::Selected => Ok(()),
            NativeSelect::NoOption => Err(ActionError::protocol(
                "select",
                hint,
                format!("no option matched {:?}", value),
            )),
            NativeSelect::Absent => Err(ActionError::not_found("select", hint)),
        }
    }

    pub(super) async fn combo_select(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        value: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        if self.select_native(driver, hint, value, progress).await? == NativeSelect::Selected {
            return Ok(());
        }

        let Some(trigger) = self.combo_trigger(driver, hint).await else {
            return Err(ActionError::not_found("combo_select", hint));
        };
        progress.enter(Phase::Interacting);
        self.prepare(driver, &trigger).await;
        self.click_ladder(driver, &trigger).await?;
        driver.pause(self.config.delays.combo_nudge()).await;

        self.type_ahead(driver, &trigger, value).await;
        driver.pause(self.config.delays.combo_nudge()).await;

        progress.enter(Phase::Verifying);
        if self.click_option(driver, value).await? {
            self.close_dropdown(driver).await;
            return Ok(());
        }

        // Some lists only render options after scrolling.
        debug!(hint, "No option visible; nudging the list");
        for key in ["End", "Home"] {
            let _ = driver.press_key(key).await;
            driver.pause(self.config.delays.combo_nudge()).await;
        }
        if self.click_option(driver, value).await? {
            self.close_dropdown(driver).await;
            return Ok(());
        }

        info!(hint, value, "No option matched; accepting top suggestion with Enter");
        driver.press_key("Enter").await?;
        let _ = driver.press_key("Escape").await;
        if self.combo_shows(driver, &trigger, value).await {
            Ok(())
        } else {
            Err(ActionError::protocol(
                "combo_select",
                hint,
                format!("no option matched {:?}", value),
            ))
        }
    }

    /// Native select by label, then by `id`/`name`, then by `placeholder`.
    async fn select_native(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        value: &str,
        progress: &mut Progress,
    ) -> Result<NativeSelect, ActionError> {
        let hint = hint.trim();
        if hint.is_empty() {
            return Ok(NativeSelect::Absent);
        }
        let quoted = css_quote(hint);
        let queries = [
            Query::Label(TextMatch::contains(hint)),
            Query::css(format!(
                "select[id*={q} i], select[name*={q} i]",
                q = quoted
            )),
            Query::css(format!("select[placeholder*={} i]", quoted)),
        ];

        let mut seen = false;
        for root in search_roots(driver).await {
            for query in &queries {
                let candidates = driver.query_all(&root, query).await.unwrap_or_default();
                for select in candidates {
                    if driver.tag_name(&select).await.ok().as_deref() != Some("select") {
                        continue;
                    }
                    seen = true;
                    progress.enter(Phase::Interacting);
                    let _ = driver.scroll_into_view(&select).await;
                    if driver.select_option(&select, value).await? {
                        debug!(hint, value, "Selected via native <select>");
                        return Ok(NativeSelect::Selected);
                    }
                }
            }
        }
        Ok(if seen {
            NativeSelect::NoOption
        } else {
            NativeSelect::Absent
        })
    }

    async fn combo_trigger(&self, driver: &mut dyn Driver, hint: &str) -> Option<ElementHandle> {
        let role = Query::role("combobox", TextMatch::contains(hint));
        if let Ok(Some(found)) = driver.first_visible(&SearchRoot::Main, &role).await {
            return Some(found);
        }
        if let Some(found) = self.resolver.resolve(driver, Intent::Clickable, hint).await {
            return Some(found.element);
        }
        driver
            .first_visible(&SearchRoot::Main, &Query::css(CUSTOM_TRIGGER_CSS))
            .await
            .ok()
            .flatten()
    }

    /// Type the value into whatever search box the open widget offers.
    async fn type_ahead(&self, driver: &mut dyn Driver, trigger: &ElementHandle, value: &str) {
        let inner = driver
            .query_within(trigger, &Query::css("input"))
            .await
            .ok()
            .and_then(|found| found.into_iter().next());
        let search = match inner {
            Some(input) => Some(input),
            None => driver
                .first_visible(&trigger.root, &Query::css(SEARCH_FIELD_CSS))
                .await
                .ok()
                .flatten(),
        };
        let typed = match &search {
            Some(field) => driver.fill(field, value).await,
            None => driver.type_text(value, self.config.delays.keystroke()).await,
        };
        if let Err(e) = typed {
            debug!("Type-ahead failed: {}", e);
        }
    }

    async fn click_option(&self, driver: &mut dyn Driver, value: &str) -> Result<bool, ActionError> {
        for query in option_queries(value) {
            if let Ok(Some(option)) = driver.first_visible(&SearchRoot::Main, &query).await {
                self.click_ladder(driver, &option).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn close_dropdown(&self, driver: &mut dyn Driver) {
        let _ = driver.press_key("Escape").await;
        let _ = driver.mouse_click(5.0, 5.0).await;
    }

    /// Whether the trigger (or its inner input) now displays `value`.
    async fn combo_shows(&self, driver: &mut dyn Driver, trigger: &ElementHandle, value: &str) -> bool {
        let wanted = TextMatch::contains(value);
        if let Ok(text) = driver.inner_text(trigger).await
            && wanted.matches(&text)
        {
            return true;
        }
        let inputs = driver
            .query_within(trigger, &Query::css("input"))
            .await
            .unwrap_or_default();
        for input in inputs {
            if let Ok(current) = driver.value(&input).await
                && wanted.matches(&current)
            {
                return true;
            }
        }
        false
    }
}

/// Option selectors of common dropdown widgets, tried in order.
fn option_queries(value: &str) -> Vec<Query> {
    vec![
        Query::role("option", TextMatch::contains(value)),
        Query::Text(TextMatch::exact(value)),
        Query::css_with_text(
            ".select2-results__option, .select2-results li",
            TextMatch::contains(value),
        ),
        Query::css_with_text(".ui-autocomplete li", TextMatch::contains(value)),
        Query::css_with_text("[role=\"listbox\"] li", TextMatch::contains(value)),
    ]
}

/// Main document followed by every embedded frame.
pub(crate) async fn search_roots(driver: &mut dyn Driver) -> Vec<SearchRoot> {
    let mut roots = vec![SearchRoot::Main];
    match driver.frames().await {
        Ok(frames) => roots.extend(frames),
        Err(e) => debug!("Frame enumeration failed: {}", e),
    }
    roots
}
