pub mod alias;
pub mod config;
pub mod driver;
pub mod executor;
pub mod goal;
pub mod hint;
pub mod llm;
pub mod oracle;
pub mod planner;
pub mod report;
pub mod resolution;
pub mod runlog;
pub mod runner;
pub mod selector;

pub use stepwise_common::error;
pub use stepwise_common::formatter;
pub use stepwise_common::protocol;
