pub mod error;
pub mod formatter;
pub mod protocol;

pub use error::{ActionError, DriverError};
pub use protocol::{Action, ActionKind, ActionType, AssertionResult, RunRecord, StepResult, StepStatus};
