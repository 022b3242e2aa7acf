pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    AliasConfig, BrowserConfig, DelayConfig, LimitConfig, LlmConfig, NoiseConfig, OracleConfig,
    StepwiseConfig, TimeoutConfig,
};
