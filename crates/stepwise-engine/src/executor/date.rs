//! Date fields: native `type=date` inputs and popover calendars.

use super::combo::search_roots;
use super::{ActionExecutor, Phase, Progress};
use crate::driver::{Driver, ElementHandle, Query, SearchRoot, TextMatch};
use crate::resolution::Intent;
use chrono::{Datelike, Local, NaiveDate};
use stepwise_common::ActionError;
use tracing::debug;

const NATIVE_DATE_CSS: &str = "input[type=\"date\"]";
const NEXT_MONTH_CSS: &str = "button[aria-label*=\"Next\" i], button[title*=\"Next\" i]";
const PREV_MONTH_CSS: &str =
    "button[aria-label*=\"Previous\" i], button[aria-label*=\"Prev\" i], button[title*=\"Prev\" i]";

/// Parse the leading `YYYY-MM-DD` of a value such as `2025-03-14T00:00`.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let head = value.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Next,
    Prev,
}

impl Direction {
    /// Calendars open on the current month; page backwards only for past months.
    fn toward(target: NaiveDate, today: NaiveDate) -> Self {
        if (target.year(), target.month()) < (today.year(), today.month()) {
            Direction::Prev
        } else {
            Direction::Next
        }
    }

    fn queries(self) -> [Query; 2] {
        match self {
            Direction::Next => [
                Query::css(NEXT_MONTH_CSS),
                Query::css_with_text("button", TextMatch::exact("›")),
            ],
            Direction::Prev => [
                Query::css(PREV_MONTH_CSS),
                Query::css_with_text("button", TextMatch::exact("‹")),
            ],
        }
    }
}

impl ActionExecutor {
    pub(super) async fn date_set(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        value: &str,
        progress: &mut Progress,
    ) -> Result<(), ActionError> {
        let Some(date) = parse_iso_date(value) else {
            return Err(ActionError::protocol(
                "date_set",
                hint,
                format!("not an ISO date: {:?}", value),
            ));
        };

        let field = self
            .date_field(driver, hint)
            .await
            .ok_or_else(|| ActionError::not_found("date_set", hint))?;
        progress.enter(Phase::Interacting);
        self.prepare(driver, &field).await;

        if self.is_native_date(driver, &field).await? {
            let iso = date.format("%Y-%m-%d").to_string();
            driver.fill(&field, &iso).await?;
            let _ = driver.dispatch_event(&field, "change").await;
            progress.enter(Phase::Verifying);
            let actual = driver.value(&field).await?;
            return if actual == iso {
                Ok(())
            } else {
                Err(ActionError::mismatch("date_set", hint, iso, actual))
            };
        }

        self.click_ladder(driver, &field).await?;
        driver.pause(self.config.delays.calendar_page()).await;
        self.page_to_month(driver, hint, date).await?;

        progress.enter(Phase::Verifying);
        match self.day_cell(driver, date.day()).await {
            Some(cell) => self.click_ladder(driver, &cell).await,
            None => Err(ActionError::protocol(
                "date_set",
                hint,
                format!("no day cell matched {}", date.day()),
            )),
        }
    }

    /// Input cascade, then clickable cascade, then the first visible native
    /// date input in any document.
    async fn date_field(&self, driver: &mut dyn Driver, hint: &str) -> Option<ElementHandle> {
        if let Some(found) = self.resolver.resolve(driver, Intent::Input, hint).await {
            return Some(found.element);
        }
        if let Some(found) = self.resolver.resolve(driver, Intent::Clickable, hint).await {
            return Some(found.element);
        }
        let native = Query::css(NATIVE_DATE_CSS);
        for root in search_roots(driver).await {
            if let Ok(Some(field)) = driver.first_visible(&root, &native).await {
                debug!(hint, root = %root, "Using first native date input");
                return Some(field);
            }
        }
        None
    }

    async fn is_native_date(
        &self,
        driver: &mut dyn Driver,
        field: &ElementHandle,
    ) -> Result<bool, ActionError> {
        if driver.tag_name(field).await? != "input" {
            return Ok(false);
        }
        let kind = driver.attribute(field, "type").await?.unwrap_or_default();
        Ok(kind.eq_ignore_ascii_case("date"))
    }

    /// Page the open calendar until the `Month YYYY` label is visible.
    /// Bounded by `limits.calendar_max_pages`.
    async fn page_to_month(
        &self,
        driver: &mut dyn Driver,
        hint: &str,
        date: NaiveDate,
    ) -> Result<(), ActionError> {
        let label = Query::Text(TextMatch::contains(date.format("%B %Y").to_string()));
        let direction = Direction::toward(date, Local::now().date_naive());
        let max_pages = self.config.limits.calendar_max_pages;

        for page in 0..=max_pages {
            if let Ok(Some(_)) = driver.first_visible(&SearchRoot::Main, &label).await {
                debug!(page, "Calendar shows target month");
                return Ok(());
            }
            if page == max_pages {
                break;
            }
            let Some(button) = self.month_button(driver, direction).await else {
                return Err(ActionError::protocol(
                    "date_set",
                    hint,
                    format!("no {:?} month control found", direction),
                ));
            };
            self.click_ladder(driver, &button).await?;
            driver.pause(self.config.delays.calendar_page()).await;
        }
        Err(ActionError::protocol(
            "date_set",
            hint,
            format!(
                "month {:?} not reached after {} pages",
                date.format("%B %Y").to_string(),
                max_pages
            ),
        ))
    }

    async fn month_button(&self, driver: &mut dyn Driver, direction: Direction) -> Option<ElementHandle> {
        for query in direction.queries() {
            if let Ok(Some(button)) = driver.first_visible(&SearchRoot::Main, &query).await {
                return Some(button);
            }
        }
        None
    }

    async fn day_cell(&self, driver: &mut dyn Driver, day: u32) -> Option<ElementHandle> {
        let day = day.to_string();
        let queries = [
            Query::role("gridcell", TextMatch::exact(day.as_str())),
            Query::Text(TextMatch::exact(day.as_str())),
        ];
        for query in &queries {
            if let Ok(Some(cell)) = driver.first_visible(&SearchRoot::Main, query).await {
                return Some(cell);
            }
        }
        None
    }
}
