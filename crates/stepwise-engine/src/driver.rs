use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
pub use stepwise_common::error::DriverError;

/// Interval between visibility polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The document a query runs against: the top-level page or one embedded frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchRoot {
    Main,
    Frame(String),
}

impl fmt::Display for SearchRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchRoot::Main => f.write_str("main"),
            SearchRoot::Frame(id) => write!(f, "frame:{}", id),
        }
    }
}

/// A network exchange observed while the page loads or runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Request { method: String, url: String },
    Response { status: i64, url: String },
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEvent::Request { method, url } => write!(f, "REQ {} {}", method, url),
            NetworkEvent::Response { status, url } => write!(f, "RES {} {}", status, url),
        }
    }
}

/// Opaque reference to a concrete element held by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub root: SearchRoot,
    pub id: u64,
}

impl ElementHandle {
    pub fn new(root: SearchRoot, id: u64) -> Self {
        Self { root, id }
    }
}

/// Case-insensitive text predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Contains(String),
    Exact(String),
}

impl TextMatch {
    pub fn contains(text: impl Into<String>) -> Self {
        TextMatch::Contains(text.into())
    }

    pub fn exact(text: impl Into<String>) -> Self {
        TextMatch::Exact(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            TextMatch::Contains(t) | TextMatch::Exact(t) => t,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TextMatch::Exact(_))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim().to_lowercase();
        match self {
            TextMatch::Contains(t) => candidate.contains(&t.trim().to_lowercase()),
            TextMatch::Exact(t) => candidate == t.trim().to_lowercase(),
        }
    }
}

/// How to find elements inside a search root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Accessibility role with an accessible-name predicate.
    Role { role: String, name: TextMatch },
    /// Form control associated with a label (`for`/`id`, nesting or `aria-label`).
    Label(TextMatch),
    Placeholder(TextMatch),
    Css(String),
    /// CSS selector filtered by the element's text content.
    CssWithText { css: String, text: TextMatch },
    /// Elements whose own text matches.
    Text(TextMatch),
    XPath(String),
}

impl Query {
    pub fn role(role: &str, name: TextMatch) -> Self {
        Query::Role {
            role: role.to_string(),
            name,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Query::Css(selector.into())
    }

    pub fn css_with_text(css: impl Into<String>, text: TextMatch) -> Self {
        Query::CssWithText {
            css: css.into(),
            text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOptions {
    /// Skip actionability checks and dispatch the click directly.
    pub force: bool,
    pub timeout: Duration,
}

impl ClickOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            force: false,
            timeout,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self::with_timeout(Duration::from_millis(8000))
    }
}

/// The Driver trait is the interface every browser automation backend implements.
///
/// All element operations take handles returned by [`Driver::query_all`] and
/// friends; a handle whose element left the DOM yields [`DriverError::StaleElement`].
#[async_trait]
pub trait Driver: Send + Sync {
    // ============================================================
    // Page
    // ============================================================

    /// Navigate to a URL and wait for the document to load.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&mut self) -> Result<String, DriverError>;

    /// Full HTML of the top-level document.
    async fn content(&mut self) -> Result<String, DriverError>;

    /// Embedded frames, in document order. The main document is not included.
    async fn frames(&mut self) -> Result<Vec<SearchRoot>, DriverError>;

    // ============================================================
    // Location
    // ============================================================

    /// All elements matching `query` in `root`, in document order.
    async fn query_all(
        &mut self,
        root: &SearchRoot,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Descendants of `element` matching `query`, in document order.
    async fn query_within(
        &mut self,
        element: &ElementHandle,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Nearest ancestor-or-self of `element` matching the CSS selector.
    async fn closest(
        &mut self,
        element: &ElementHandle,
        css: &str,
    ) -> Result<Option<ElementHandle>, DriverError>;

    async fn is_visible(&mut self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// Lowercase tag name.
    async fn tag_name(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Current `value` property of a form control (empty for non-controls).
    async fn value(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn inner_text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn is_checked(&mut self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// A selector that uniquely identifies `element` in its document, if one exists.
    async fn selector_for(
        &mut self,
        element: &ElementHandle,
    ) -> Result<Option<String>, DriverError>;

    // ============================================================
    // Element operations
    // ============================================================

    async fn click(
        &mut self,
        element: &ElementHandle,
        options: ClickOptions,
    ) -> Result<(), DriverError>;

    /// Invoke `element.click()` from script, bypassing pointer events.
    async fn script_click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Programmatic value assignment followed by `input` dispatch.
    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    async fn check(&mut self, element: &ElementHandle, force: bool) -> Result<(), DriverError>;

    /// Select the option whose label or value matches. Returns `false` when no option matched.
    async fn select_option(
        &mut self,
        element: &ElementHandle,
        option: &str,
    ) -> Result<bool, DriverError>;

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn drag_to(
        &mut self,
        source: &ElementHandle,
        target: &ElementHandle,
    ) -> Result<(), DriverError>;

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn set_input_files(
        &mut self,
        element: &ElementHandle,
        files: &[PathBuf],
    ) -> Result<(), DriverError>;

    async fn dispatch_event(
        &mut self,
        element: &ElementHandle,
        event: &str,
    ) -> Result<(), DriverError>;

    async fn blur(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Toggle a transient visual outline. Cosmetic only.
    async fn set_highlight(
        &mut self,
        _element: &ElementHandle,
        _on: bool,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    // ============================================================
    // Keyboard / mouse
    // ============================================================

    /// Press a key chord such as `Enter`, `Tab` or `Control+A`.
    async fn press_key(&mut self, key: &str) -> Result<(), DriverError>;

    /// Type text into the focused element, one key event per character.
    async fn type_text(&mut self, text: &str, delay: Duration) -> Result<(), DriverError>;

    async fn mouse_click(&mut self, x: f64, y: f64) -> Result<(), DriverError>;

    // ============================================================
    // Artifacts
    // ============================================================

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError>;

    async fn start_trace(&mut self) -> Result<(), DriverError> {
        Err(DriverError::NotSupported("start_trace".into()))
    }

    async fn stop_trace(&mut self, _path: &Path) -> Result<(), DriverError> {
        Err(DriverError::NotSupported("stop_trace".into()))
    }

    /// Browser console messages captured since the last call, as `(level, text)`.
    async fn drain_console(&mut self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Network requests and responses observed since the last call, in order.
    async fn drain_network(&mut self) -> Vec<NetworkEvent> {
        Vec::new()
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Suspend for a fixed duration.
    async fn pause(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    // ============================================================
    // Provided helpers
    // ============================================================

    async fn query_first(
        &mut self,
        root: &SearchRoot,
        query: &Query,
    ) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self.query_all(root, query).await?.into_iter().next())
    }

    /// First match in document order that is currently visible.
    async fn first_visible(
        &mut self,
        root: &SearchRoot,
        query: &Query,
    ) -> Result<Option<ElementHandle>, DriverError> {
        for element in self.query_all(root, query).await? {
            if self.is_visible(&element).await.unwrap_or(false) {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// Poll until `element` is visible. Returns `false` on timeout instead of erroring.
    async fn wait_visible(&mut self, element: &ElementHandle, timeout: Duration) -> bool {
        let polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1);
        for attempt in 0..polls {
            if self.is_visible(element).await.unwrap_or(false) {
                return true;
            }
            if attempt + 1 < polls {
                self.pause(POLL_INTERVAL).await;
            }
        }
        false
    }

    /// Poll until `query` has a visible match in `root`, up to `timeout`.
    async fn wait_for_query(
        &mut self,
        root: &SearchRoot,
        query: &Query,
        timeout: Duration,
    ) -> Option<ElementHandle> {
        let polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1);
        for attempt in 0..polls {
            if let Ok(Some(element)) = self.first_visible(root, query).await {
                return Some(element);
            }
            if attempt + 1 < polls {
                self.pause(POLL_INTERVAL).await;
            }
        }
        None
    }
}
