//! Individual resolution strategies.
//!
//! Each strategy is stateless apart from configuration and maps
//! `(root, hint)` to at most one element. Strategies return the first match
//! in document order; there is no scoring between matches.

use super::{Candidate, Intent, Probe, Strategy};
use crate::alias::AliasStore;
use crate::driver::{Driver, DriverError, ElementHandle, Query, SearchRoot, TextMatch};
use crate::hint;
use crate::selector::{self, css_quote, xpath_text_contains};
use async_trait::async_trait;
use std::sync::Arc;

/// Ancestors that make a text node clickable.
const CLICKABLE_ANCESTOR: &str = "button, a, [role=\"button\"]";

/// Containers that usually own a toggle next to its caption.
const TOGGLE_CONTAINER: &str = "label, div, section, form";

async fn first_visible_of(
    driver: &mut dyn Driver,
    root: &SearchRoot,
    queries: &[Query],
) -> Result<Option<(ElementHandle, Query)>, DriverError> {
    for query in queries {
        if let Some(element) = driver.first_visible(root, query).await? {
            return Ok(Some((element, query.clone())));
        }
    }
    Ok(None)
}

async fn first_present_of(
    driver: &mut dyn Driver,
    root: &SearchRoot,
    queries: &[Query],
) -> Result<Option<(ElementHandle, Query)>, DriverError> {
    for query in queries {
        if let Some(element) = driver.query_first(root, query).await? {
            return Ok(Some((element, query.clone())));
        }
    }
    Ok(None)
}

fn hit(found: Option<(ElementHandle, Query)>, name: &'static str) -> Option<Candidate> {
    found.map(|(element, query)| Candidate::new(element, &query, name))
}

/// `tag[attr*="value" i]` for every tag/attribute pair, comma-joined.
fn attr_contains(tags: &[&str], attrs: &[&str], value: &str) -> String {
    let quoted = css_quote(value);
    let mut parts = Vec::with_capacity(tags.len() * attrs.len());
    for tag in tags {
        for attr in attrs {
            parts.push(format!("{}[{}*={} i]", tag, attr, quoted));
        }
    }
    parts.join(", ")
}

// ============================================================
// Alias store
// ============================================================

/// Replays selectors previously learned for this host and hint.
pub struct AliasLookup {
    store: Arc<AliasStore>,
    require_visible: bool,
}

impl AliasLookup {
    pub fn new(store: Arc<AliasStore>, require_visible: bool) -> Self {
        Self {
            store,
            require_visible,
        }
    }
}

#[async_trait]
impl Strategy for AliasLookup {
    fn name(&self) -> &'static str {
        "alias"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        for expr in self.store.lookup(probe.host, probe.hint) {
            let Some(query) = selector::parse(&expr) else {
                continue;
            };
            let found = if self.require_visible {
                driver.first_visible(probe.root, &query).await?
            } else {
                driver.query_first(probe.root, &query).await?
            };
            if let Some(element) = found {
                return Ok(Some(Candidate {
                    element,
                    selector: expr,
                    strategy: self.name(),
                }));
            }
        }
        Ok(None)
    }
}

// ============================================================
// Accessibility / label / placeholder
// ============================================================

/// Role with an accessible name containing the hint.
pub struct RoleMatch {
    roles: &'static [&'static str],
}

impl RoleMatch {
    pub fn new(roles: &'static [&'static str]) -> Self {
        Self { roles }
    }
}

#[async_trait]
impl Strategy for RoleMatch {
    fn name(&self) -> &'static str {
        "role"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let queries: Vec<Query> = self
            .roles
            .iter()
            .map(|role| Query::role(role, TextMatch::contains(probe.hint)))
            .collect();
        Ok(hit(first_visible_of(driver, probe.root, &queries).await?, self.name()))
    }
}

pub struct LabelMatch;

#[async_trait]
impl Strategy for LabelMatch {
    fn name(&self) -> &'static str {
        "label"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::Label(TextMatch::contains(probe.hint));
        Ok(hit(first_visible_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

pub struct PlaceholderMatch;

#[async_trait]
impl Strategy for PlaceholderMatch {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::Placeholder(TextMatch::contains(probe.hint));
        Ok(hit(first_visible_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

/// `aria-label` / `aria-placeholder` on text controls. Covers floating-label
/// inputs whose placeholder is blank.
pub struct AriaInput;

#[async_trait]
impl Strategy for AriaInput {
    fn name(&self) -> &'static str {
        "aria-input"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::css(attr_contains(
            &["input", "textarea"],
            &["aria-label", "aria-placeholder"],
            probe.hint,
        ));
        Ok(hit(first_visible_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

/// Button, link or `role=button` whose text contains the hint.
pub struct ClickableText;

#[async_trait]
impl Strategy for ClickableText {
    fn name(&self) -> &'static str {
        "clickable-text"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let queries: Vec<Query> = ["button", "a", "[role=\"button\"]"]
            .iter()
            .map(|css| Query::css_with_text(*css, TextMatch::contains(probe.hint)))
            .collect();
        Ok(hit(first_visible_of(driver, probe.root, &queries).await?, self.name()))
    }
}

// ============================================================
// Declarative markers and attribute heuristics
// ============================================================

/// `data-testid` / `data-test` containing the hint, or its dashed form.
pub struct TestIdMatch;

#[async_trait]
impl Strategy for TestIdMatch {
    fn name(&self) -> &'static str {
        "test-id"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let mut queries = vec![Query::css(attr_contains(
            &[""],
            &["data-testid", "data-test"],
            probe.hint,
        ))];
        let dashed = hint::normalize(probe.hint).replace(' ', "-");
        if dashed != probe.hint.to_lowercase() {
            queries.push(Query::css(attr_contains(&[""], &["data-testid", "data-test"], &dashed)));
        }
        Ok(hit(first_visible_of(driver, probe.root, &queries).await?, self.name()))
    }
}

/// Id/name/title/class substrings on clickables, and id/name/placeholder/value on inputs.
pub struct ClickableAttributes;

#[async_trait]
impl Strategy for ClickableAttributes {
    fn name(&self) -> &'static str {
        "attributes"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let queries = [
            Query::css(attr_contains(
                &["input"],
                &["id", "name", "placeholder", "value"],
                probe.hint,
            )),
            Query::css(format!(
                "{}, {}",
                attr_contains(&["a", "button"], &["id", "name", "title", "class"], probe.hint),
                attr_contains(&["[role=\"button\"]", "[role=\"link\"]"], &["id"], probe.hint),
            )),
        ];
        Ok(hit(first_visible_of(driver, probe.root, &queries).await?, self.name()))
    }
}

/// Fixed selector tables for common shop actions.
pub struct CommerceIntent;

impl CommerceIntent {
    fn queries(hint: &str) -> Vec<Query> {
        let h = hint.to_lowercase();
        let mut queries = Vec::new();
        if h.contains("cart") || h.contains("basket") {
            queries.push(Query::css(
                "[data-test=\"shopping-cart-link\"], .shopping_cart_link, #shopping_cart_container a, a[href*=\"cart\" i], [aria-label*=\"cart\" i]",
            ));
        }
        for (needles, id, label) in [
            (&["checkout"][..], "checkout", "Checkout"),
            (&["continue"][..], "continue", "Continue"),
            (&["finish", "complete"][..], "finish", "Finish"),
        ] {
            if needles.iter().any(|n| h.contains(n)) {
                queries.push(Query::css(format!("[data-test=\"{}\"], #{}", id, id)));
                queries.push(Query::css_with_text("button, a", TextMatch::contains(label)));
            }
        }
        queries
    }
}

#[async_trait]
impl Strategy for CommerceIntent {
    fn name(&self) -> &'static str {
        "commerce-intent"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let queries = Self::queries(probe.hint);
        if queries.is_empty() {
            return Ok(None);
        }
        Ok(hit(first_visible_of(driver, probe.root, &queries).await?, self.name()))
    }
}

/// Fixed selector tables for common input families.
pub struct FieldFamily;

impl FieldFamily {
    fn queries(hint: &str) -> Vec<Query> {
        let h = hint.to_lowercase();
        let mut selectors: Vec<&str> = Vec::new();
        if h.contains("username") || h.contains("user name") || h.contains("email") {
            selectors.extend([
                "#user-name",
                "[data-test=\"username\"]",
                "input[name*=\"user\" i], input[name*=\"email\" i], input[type=\"email\"]",
            ]);
        }
        if h.contains("password") {
            selectors.extend([
                "#password",
                "[data-test=\"password\"]",
                "input[type=\"password\"]",
            ]);
        }
        if h.contains("zip") || h.contains("postal") {
            selectors.extend([
                "#postal-code",
                "[data-test=\"postalCode\"]",
                "input[name*=\"zip\" i], input[id*=\"zip\" i]",
                "input[name*=\"postal\" i], input[id*=\"postal\" i]",
            ]);
        }
        if h.contains("address") {
            selectors.extend([
                "textarea[ng-model*=\"Adress\" i]",
                "#address, #Address",
                "textarea[name*=\"address\" i], textarea[id*=\"address\" i]",
                "input[name*=\"address\" i], input[id*=\"address\" i]",
            ]);
        }
        selectors.into_iter().map(Query::css).collect()
    }
}

#[async_trait]
impl Strategy for FieldFamily {
    fn name(&self) -> &'static str {
        "field-family"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let queries = Self::queries(probe.hint);
        if queries.is_empty() {
            return Ok(None);
        }
        Ok(hit(first_visible_of(driver, probe.root, &queries).await?, self.name()))
    }
}

// ============================================================
// Free text and tokens
// ============================================================

/// Text node containing the hint, lifted to its nearest clickable ancestor.
pub struct TextAncestor;

#[async_trait]
impl Strategy for TextAncestor {
    fn name(&self) -> &'static str {
        "text-ancestor"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::Text(TextMatch::contains(probe.hint));
        let Some(node) = driver.first_visible(probe.root, &query).await? else {
            return Ok(None);
        };
        if let Some(ancestor) = driver.closest(&node, CLICKABLE_ANCESTOR).await?
            && driver.is_visible(&ancestor).await?
        {
            return Ok(Some(Candidate::new(ancestor, &query, self.name())));
        }
        Ok(Some(Candidate::new(node, &query, self.name())))
    }
}

/// Attribute-substring match per hint token ("Cart icon" → "cart").
pub struct TokenAttributes {
    intent: Intent,
}

impl TokenAttributes {
    pub fn new(intent: Intent) -> Self {
        Self { intent }
    }

    fn query(&self, token: &str) -> Query {
        match self.intent {
            Intent::Input => Query::css(attr_contains(
                &["input", "textarea"],
                &["id", "name", "aria-label"],
                token,
            )),
            _ => Query::css(format!(
                "{}, {}, {}, {}",
                attr_contains(&["a", "button"], &["id", "name", "title", "class"], token),
                attr_contains(&["[role=\"button\"]", "[role=\"link\"]"], &["id"], token),
                attr_contains(&[""], &["data-testid", "data-test"], token),
                attr_contains(&["a"], &["href"], token),
            )),
        }
    }
}

#[async_trait]
impl Strategy for TokenAttributes {
    fn name(&self) -> &'static str {
        "tokens"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        for token in hint::tokens(probe.hint) {
            let query = self.query(&token);
            if let Some(element) = driver.first_visible(probe.root, &query).await? {
                return Ok(Some(Candidate::new(element, &query, self.name())));
            }
        }
        Ok(None)
    }
}

// ============================================================
// Structural
// ============================================================

/// XPath for the first `tags` element following a label containing `hint`.
pub fn label_following_xpath(hint: &str, tags: &[&str]) -> String {
    let tag_test = tags
        .iter()
        .map(|t| format!("self::{}", t))
        .collect::<Vec<_>>()
        .join(" or ");
    format!(
        "(//label[{}]/following::*[{}])[1]",
        xpath_text_contains(hint),
        tag_test
    )
}

/// Input or textarea following a label containing the hint.
pub struct LabelFollowing;

#[async_trait]
impl Strategy for LabelFollowing {
    fn name(&self) -> &'static str {
        "label-following"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::XPath(label_following_xpath(probe.hint, &["input", "textarea"]));
        Ok(hit(first_visible_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

/// Last resort for inputs: first visible textarea among the first few, else
/// the only visible text input on the page.
pub struct StructuralInput {
    textarea_scan_limit: usize,
}

impl StructuralInput {
    pub fn new(textarea_scan_limit: usize) -> Self {
        Self {
            textarea_scan_limit,
        }
    }
}

pub const TEXT_INPUT_CSS: &str = "input[type=\"text\"], input[type=\"email\"], input[type=\"search\"], input[type=\"tel\"], input[type=\"url\"], input[type=\"number\"], input:not([type])";

#[async_trait]
impl Strategy for StructuralInput {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let textareas = Query::css("textarea");
        let all = driver.query_all(probe.root, &textareas).await?;
        for element in all.into_iter().take(self.textarea_scan_limit) {
            if driver.is_visible(&element).await? {
                return Ok(Some(Candidate::new(element, &textareas, self.name())));
            }
        }

        let inputs = Query::css(TEXT_INPUT_CSS);
        let mut visible = Vec::new();
        for element in driver.query_all(probe.root, &inputs).await? {
            if driver.is_visible(&element).await? {
                visible.push(element);
                if visible.len() > 1 {
                    return Ok(None);
                }
            }
        }
        Ok(visible
            .pop()
            .map(|element| Candidate::new(element, &inputs, self.name())))
    }
}

// ============================================================
// Toggles (checkbox / radio)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Checkbox,
    Radio,
}

impl ToggleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleKind::Checkbox => "checkbox",
            ToggleKind::Radio => "radio",
        }
    }

    pub fn input_css(&self) -> String {
        format!("input[type=\"{}\"]", self.as_str())
    }

    fn input_xpath(&self) -> String {
        format!("input[@type='{}']", self.as_str())
    }
}

/// Toggles are often visually hidden behind a styled label, so these
/// strategies accept present-but-hidden inputs.
pub struct ToggleRole(pub ToggleKind);

#[async_trait]
impl Strategy for ToggleRole {
    fn name(&self) -> &'static str {
        "toggle-role"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::role(self.0.as_str(), TextMatch::contains(probe.hint));
        Ok(hit(first_present_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

pub struct ToggleAttributes(pub ToggleKind);

#[async_trait]
impl Strategy for ToggleAttributes {
    fn name(&self) -> &'static str {
        "toggle-attributes"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::css(attr_contains(
            &[self.0.input_css().as_str()],
            &["name", "aria-label", "value", "title"],
            probe.hint,
        ));
        Ok(hit(first_present_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

/// Toggle nested inside a label containing the hint.
pub struct ToggleInLabel(pub ToggleKind);

#[async_trait]
impl Strategy for ToggleInLabel {
    fn name(&self) -> &'static str {
        "toggle-in-label"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let query = Query::XPath(format!(
            "(//label[{}]//{})[1]",
            xpath_text_contains(probe.hint),
            self.0.input_xpath()
        ));
        Ok(hit(first_present_of(driver, probe.root, &[query]).await?, self.name()))
    }
}

/// Toggle right after (or, failing that, right before) a label containing the hint.
pub struct ToggleNearLabel(pub ToggleKind);

#[async_trait]
impl Strategy for ToggleNearLabel {
    fn name(&self) -> &'static str {
        "toggle-near-label"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let label = format!("//label[{}]", xpath_text_contains(probe.hint));
        let input = self.0.input_xpath();
        let queries = [
            Query::XPath(format!("({}/following::{})[1]", label, input)),
            Query::XPath(format!("({}/preceding::{})[last()]", label, input)),
        ];
        Ok(hit(first_present_of(driver, probe.root, &queries).await?, self.name()))
    }
}

/// Toggle inside the nearest container of a text node containing the hint.
///
/// Not learned: the only selector at hand addresses the caption, not the toggle.
pub struct ToggleInTextContainer(pub ToggleKind);

#[async_trait]
impl Strategy for ToggleInTextContainer {
    fn name(&self) -> &'static str {
        "toggle-in-container"
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        let text = Query::Text(TextMatch::contains(probe.hint));
        let Some(node) = driver.query_first(probe.root, &text).await? else {
            return Ok(None);
        };
        let Some(container) = driver.closest(&node, TOGGLE_CONTAINER).await? else {
            return Ok(None);
        };
        let input = Query::css(self.0.input_css());
        let found = driver.query_within(&container, &input).await?.into_iter().next();
        Ok(found.map(|element| Candidate::new(element, &text, self.name())))
    }
}

/// Per-token fallback ("Male radio" → "male") on role name, value and aria-label.
pub struct ToggleTokens(pub ToggleKind);

#[async_trait]
impl Strategy for ToggleTokens {
    fn name(&self) -> &'static str {
        "toggle-tokens"
    }

    fn learns(&self) -> bool {
        true
    }

    async fn locate(
        &self,
        driver: &mut dyn Driver,
        probe: &Probe<'_>,
    ) -> Result<Option<Candidate>, DriverError> {
        for token in hint::tokens(probe.hint) {
            let queries = [
                Query::role(self.0.as_str(), TextMatch::contains(&token)),
                Query::css(attr_contains(
                    &[self.0.input_css().as_str()],
                    &["value", "aria-label"],
                    &token,
                )),
            ];
            if let Some(found) = first_present_of(driver, probe.root, &queries).await? {
                return Ok(hit(Some(found), self.name()));
            }
        }
        Ok(None)
    }
}
