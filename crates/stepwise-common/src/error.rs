/// Errors raised by a browser driver.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DriverError {
    // ============================================================
    // Lifecycle
    // ============================================================
    #[error("Driver not ready")]
    NotReady,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    // ============================================================
    // Element
    // ============================================================
    #[error("Element {0} is stale (removed from DOM)")]
    StaleElement(u64),

    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    // ============================================================
    // Plumbing
    // ============================================================
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn timeout(operation: impl Into<String>) -> Self {
        DriverError::Timeout {
            operation: operation.into(),
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::Serialization(e.to_string())
    }
}

/// Failure of one action. Every variant names the action and the hint so a
/// step failure can be reported without extra context.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ActionError {
    /// Every cascade strategy in every search root failed.
    #[error("{action}: target not found: {hint:?}")]
    TargetNotFound { action: String, hint: String },

    /// An element was acted on but the post-condition never held.
    #[error("{action}: verification failed for {hint:?}: expected {expected:?}, got {actual:?}")]
    VerificationMismatch {
        action: String,
        hint: String,
        expected: String,
        actual: String,
    },

    /// A widget adapter could not drive its widget to the requested state.
    #[error("{action}: {reason} ({hint:?})")]
    AdapterProtocol {
        action: String,
        hint: String,
        reason: String,
    },

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl ActionError {
    pub fn not_found(action: impl Into<String>, hint: impl Into<String>) -> Self {
        ActionError::TargetNotFound {
            action: action.into(),
            hint: hint.into(),
        }
    }

    pub fn protocol(
        action: impl Into<String>,
        hint: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ActionError::AdapterProtocol {
            action: action.into(),
            hint: hint.into(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(
        action: impl Into<String>,
        hint: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ActionError::VerificationMismatch {
            action: action.into(),
            hint: hint.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ActionError::TargetNotFound { .. })
    }
}
