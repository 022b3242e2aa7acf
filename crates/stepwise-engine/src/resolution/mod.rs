//! Element resolution: hint → concrete element.
//!
//! A [`Cascade`] is an ordered list of independent [`Strategy`] objects; the
//! first one yielding a match wins. Hits from learning strategies are written
//! to the [`AliasStore`] so the next lookup of the same hint short-circuits at
//! the alias strategy. [`frames::resolve_across_frames`] reapplies a cascade in
//! every embedded frame when the main document yields nothing.

pub mod frames;
pub mod strategies;

use crate::alias::AliasStore;
use crate::config::LimitConfig;
use crate::driver::{Driver, DriverError, ElementHandle, Query, SearchRoot};
use crate::hint;
use crate::selector;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use strategies::*;
use tracing::debug;

/// What a strategy is asked to find.
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    pub root: &'a SearchRoot,
    pub hint: &'a str,
    /// Network authority of the current page; empty when unknown.
    pub host: &'a str,
}

/// A resolved element plus the selector expression that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub element: ElementHandle,
    pub selector: String,
    pub strategy: &'static str,
}

impl Candidate {
    pub fn new(element: ElementHandle, query: &Query, strategy: &'static str) -> Self {
        Self {
            element,
            selector: selector::render(query),
            strategy,
        }
    }
}

/// One independent technique for resolving a hint.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a hit is recorded in the alias store.
    fn learns(&self) -> bool {
        false
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError>;
}

/// Semantic kind of element an action needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Clickable,
    Input,
    Checkbox,
    Radio,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::Clickable => "clickable",
            Intent::Input => "input",
            Intent::Checkbox => "checkbox",
            Intent::Radio => "radio",
        };
        f.write_str(name)
    }
}

/// Ordered strategy chain for one intent.
pub struct Cascade {
    intent: Intent,
    strategies: Vec<Box<dyn Strategy>>,
    aliases: Arc<AliasStore>,
}

impl Cascade {
    pub fn new(intent: Intent, aliases: Arc<AliasStore>, strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self {
            intent,
            strategies,
            aliases,
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try every strategy in priority order against one search root.
    ///
    /// A failing strategy is logged and skipped; only exhaustion yields `None`.
    pub async fn resolve(
        &self,
        driver: &mut dyn Driver,
        root: &SearchRoot,
        host: &str,
        hint: &str,
    ) -> Option<Candidate> {
        let hint = match self.intent {
            Intent::Checkbox | Intent::Radio => hint::strip_toggle_words(hint),
            _ => hint.trim().to_string(),
        };
        if hint.is_empty() {
            return None;
        }
        let probe = Probe {
            root,
            hint: &hint,
            host,
        };

        for strategy in &self.strategies {
            let candidate = match strategy.locate(driver, &probe).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(e) => {
                    debug!(strategy = strategy.name(), hint = %hint, "Strategy failed: {}", e);
                    continue;
                }
            };
            debug!(
                intent = %self.intent,
                strategy = strategy.name(),
                root = %root,
                hint = %hint,
                "Resolved via {}",
                candidate.selector
            );
            // Aliases carry no frame scope, so only top-document hits are learned.
            if strategy.learns() && *root == SearchRoot::Main {
                self.learn(driver, host, &hint, &candidate).await;
            }
            return Some(candidate);
        }
        None
    }

    async fn learn(&self, driver: &mut dyn Driver, host: &str, hint: &str, candidate: &Candidate) {
        let selector = match driver.selector_for(&candidate.element).await {
            Ok(Some(unique)) => unique,
            _ => candidate.selector.clone(),
        };
        self.aliases.record(host, hint, &selector);
    }
}

/// Per-intent cascades sharing one alias store.
pub struct Resolver {
    clickable: Cascade,
    input: Cascade,
    checkbox: Cascade,
    radio: Cascade,
}

impl Resolver {
    pub fn new(aliases: Arc<AliasStore>, limits: &LimitConfig) -> Self {
        let clickable = Cascade::new(
            Intent::Clickable,
            aliases.clone(),
            vec![
                Box::new(AliasLookup::new(aliases.clone(), true)),
                Box::new(RoleMatch::new(&["button", "link"])),
                Box::new(ClickableText),
                Box::new(TestIdMatch),
                Box::new(ClickableAttributes),
                Box::new(CommerceIntent),
                Box::new(TextAncestor),
                Box::new(TokenAttributes::new(Intent::Clickable)),
            ],
        );
        let input = Cascade::new(
            Intent::Input,
            aliases.clone(),
            vec![
                Box::new(AliasLookup::new(aliases.clone(), true)),
                Box::new(AriaInput),
                Box::new(RoleMatch::new(&["textbox"])),
                Box::new(PlaceholderMatch),
                Box::new(LabelMatch),
                Box::new(TestIdMatch),
                Box::new(FieldFamily),
                Box::new(LabelFollowing),
                Box::new(TokenAttributes::new(Intent::Input)),
                Box::new(StructuralInput::new(limits.textarea_scan_limit)),
            ],
        );
        Self {
            clickable,
            input,
            checkbox: toggle_cascade(Intent::Checkbox, ToggleKind::Checkbox, aliases.clone()),
            radio: toggle_cascade(Intent::Radio, ToggleKind::Radio, aliases),
        }
    }

    pub fn cascade(&self, intent: Intent) -> &Cascade {
        match intent {
            Intent::Clickable => &self.clickable,
            Intent::Input => &self.input,
            Intent::Checkbox => &self.checkbox,
            Intent::Radio => &self.radio,
        }
    }

    /// Resolve in the main document, then in each embedded frame.
    pub async fn resolve(
        &self,
        driver: &mut dyn Driver,
        intent: Intent,
        hint: &str,
    ) -> Option<Candidate> {
        frames::resolve_across_frames(driver, self.cascade(intent), hint).await
    }

    pub async fn resolve_clickable(&self, driver: &mut dyn Driver, hint: &str) -> Option<Candidate> {
        self.resolve(driver, Intent::Clickable, hint).await
    }

    pub async fn resolve_input(&self, driver: &mut dyn Driver, hint: &str) -> Option<Candidate> {
        self.resolve(driver, Intent::Input, hint).await
    }

    pub async fn resolve_checkbox(&self, driver: &mut dyn Driver, hint: &str) -> Option<Candidate> {
        self.resolve(driver, Intent::Checkbox, hint).await
    }

    pub async fn resolve_radio(&self, driver: &mut dyn Driver, hint: &str) -> Option<Candidate> {
        self.resolve(driver, Intent::Radio, hint).await
    }
}

fn toggle_cascade(intent: Intent, kind: ToggleKind, aliases: Arc<AliasStore>) -> Cascade {
    Cascade::new(
        intent,
        aliases.clone(),
        vec![
            Box::new(AliasLookup::new(aliases, false)),
            Box::new(ToggleRole(kind)),
            Box::new(ToggleAttributes(kind)),
            Box::new(ToggleInLabel(kind)),
            Box::new(ToggleNearLabel(kind)),
            Box::new(ToggleInTextContainer(kind)),
            Box::new(ToggleTokens(kind)),
        ],
    )
}

/// Host component of a page URL; empty when the URL has none.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}
