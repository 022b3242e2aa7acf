use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepwiseConfig {
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub limits: LimitConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

impl Default for StepwiseConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            limits: LimitConfig::default(),
            delays: DelayConfig::default(),
            aliases: AliasConfig::default(),
            noise: NoiseConfig::default(),
            oracle: OracleConfig::default(),
            browser: BrowserConfig::default(),
            llm: LlmConfig::default(),
            runs_dir: default_runs_dir(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

// ============================================================
// Timeouts
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Bounded wait for a resolved element to become visible.
    #[serde(default = "default_visibility_ms")]
    pub visibility_ms: u64,
    #[serde(default = "default_click_ms")]
    pub click_ms: u64,
    /// Focus click issued before filling.
    #[serde(default = "default_pre_fill_click_ms")]
    pub pre_fill_click_ms: u64,
    /// `wait_for` pause when no duration is given.
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            visibility_ms: default_visibility_ms(),
            click_ms: default_click_ms(),
            pre_fill_click_ms: default_pre_fill_click_ms(),
            default_wait_ms: default_wait_ms(),
            navigation_ms: default_navigation_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn visibility(&self) -> Duration {
        Duration::from_millis(self.visibility_ms)
    }

    pub fn click(&self) -> Duration {
        Duration::from_millis(self.click_ms)
    }

    pub fn pre_fill_click(&self) -> Duration {
        Duration::from_millis(self.pre_fill_click_ms)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }
}

fn default_visibility_ms() -> u64 {
    5000
}

fn default_click_ms() -> u64 {
    8000
}

fn default_pre_fill_click_ms() -> u64 {
    2000
}

fn default_wait_ms() -> u64 {
    300
}

fn default_navigation_ms() -> u64 {
    20000
}

// ============================================================
// Limits
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    #[serde(default = "default_max_actions_per_step")]
    pub max_actions_per_step: usize,
    /// Month pages a date picker may be paged through before giving up.
    #[serde(default = "default_calendar_max_pages")]
    pub calendar_max_pages: usize,
    #[serde(default = "default_textarea_scan_limit")]
    pub textarea_scan_limit: usize,
    #[serde(default = "default_log_truncate_chars")]
    pub log_truncate_chars: usize,
    #[serde(default = "default_plan_snippet_chars")]
    pub plan_snippet_chars: usize,
    #[serde(default = "default_oracle_snippet_chars")]
    pub oracle_snippet_chars: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_actions_per_step: default_max_actions_per_step(),
            calendar_max_pages: default_calendar_max_pages(),
            textarea_scan_limit: default_textarea_scan_limit(),
            log_truncate_chars: default_log_truncate_chars(),
            plan_snippet_chars: default_plan_snippet_chars(),
            oracle_snippet_chars: default_oracle_snippet_chars(),
        }
    }
}

fn default_max_actions_per_step() -> usize {
    10
}

fn default_calendar_max_pages() -> usize {
    24
}

fn default_textarea_scan_limit() -> usize {
    6
}

fn default_log_truncate_chars() -> usize {
    800
}

fn default_plan_snippet_chars() -> usize {
    3500
}

fn default_oracle_snippet_chars() -> usize {
    5000
}

// ============================================================
// Delays
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default = "default_keystroke_ms")]
    pub keystroke_ms: u64,
    /// Pause between the focus click and the fill.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_calendar_page_ms")]
    pub calendar_page_ms: u64,
    #[serde(default = "default_upload_reveal_ms")]
    pub upload_reveal_ms: u64,
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,
    #[serde(default = "default_combo_nudge_ms")]
    pub combo_nudge_ms: u64,
    #[serde(default = "default_noise_dismiss_ms")]
    pub noise_dismiss_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            keystroke_ms: default_keystroke_ms(),
            settle_ms: default_settle_ms(),
            calendar_page_ms: default_calendar_page_ms(),
            upload_reveal_ms: default_upload_reveal_ms(),
            highlight_ms: default_highlight_ms(),
            combo_nudge_ms: default_combo_nudge_ms(),
            noise_dismiss_ms: default_noise_dismiss_ms(),
        }
    }
}

impl DelayConfig {
    pub fn keystroke(&self) -> Duration {
        Duration::from_millis(self.keystroke_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn calendar_page(&self) -> Duration {
        Duration::from_millis(self.calendar_page_ms)
    }

    pub fn upload_reveal(&self) -> Duration {
        Duration::from_millis(self.upload_reveal_ms)
    }

    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn combo_nudge(&self) -> Duration {
        Duration::from_millis(self.combo_nudge_ms)
    }

    pub fn noise_dismiss(&self) -> Duration {
        Duration::from_millis(self.noise_dismiss_ms)
    }
}

fn default_keystroke_ms() -> u64 {
    20
}

fn default_settle_ms() -> u64 {
    250
}

fn default_calendar_page_ms() -> u64 {
    80
}

fn default_upload_reveal_ms() -> u64 {
    150
}

fn default_highlight_ms() -> u64 {
    50
}

fn default_combo_nudge_ms() -> u64 {
    80
}

fn default_noise_dismiss_ms() -> u64 {
    150
}

// ============================================================
// Alias store
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    /// Explicit alias file. Overrides the search paths.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_alias_search_paths")]
    pub search_paths: Vec<PathBuf>,
    /// Where new aliases are written when no file exists yet.
    #[serde(default = "default_alias_path")]
    pub default_path: PathBuf,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_paths: default_alias_search_paths(),
            default_path: default_alias_path(),
        }
    }
}

fn default_alias_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("fixtures").join("aliases.yaml"),
        PathBuf::from("aliases.yaml"),
    ]
}

fn default_alias_path() -> PathBuf {
    PathBuf::from("fixtures").join("aliases.yaml")
}

// ============================================================
// Noise dismissal / oracle
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Selector expressions clicked (when visible) before every step.
    #[serde(default = "default_dismiss_selectors")]
    pub dismiss_selectors: Vec<String>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            dismiss_selectors: default_dismiss_selectors(),
        }
    }
}

fn default_dismiss_selectors() -> Vec<String> {
    [
        "#onetrust-accept-btn-handler",
        "button:has-text(\"Accept All\")",
        "button:has-text(\"I Accept\")",
        "[data-testid=\"close-toast\"]",
        "button:has-text(\"Got it\")",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Page tokens that count as confirmation without asking the LLM.
    #[serde(default = "default_confirmation_tokens")]
    pub confirmation_tokens: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            confirmation_tokens: default_confirmation_tokens(),
        }
    }
}

fn default_confirmation_tokens() -> Vec<String> {
    ["thank you", "completed", "order", "success", "confirmation"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ============================================================
// Browser
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// Write a `REQ`/`RES` line to the event log for every network exchange.
    #[serde(default = "default_log_network")]
    pub log_network: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            chrome_executable: None,
            log_network: default_log_network(),
        }
    }
}

fn default_log_network() -> bool {
    true
}

fn default_headless() -> bool {
    true
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    800
}

// ============================================================
// LLM
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `azure-openai`, `openai`, `anthropic` or `groq`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Overrides the provider's model (or Azure deployment) from the environment.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Apply `LLM_PROVIDER` / `LLM_TEMPERATURE` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("LLM_PROVIDER")
            && !provider.trim().is_empty()
        {
            self.provider = provider.trim().to_lowercase();
        }
        if let Ok(temp) = std::env::var("LLM_TEMPERATURE")
            && let Ok(temp) = temp.trim().parse::<f32>()
        {
            self.temperature = temp;
        }
    }
}

fn default_provider() -> String {
    "azure-openai".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    120
}
