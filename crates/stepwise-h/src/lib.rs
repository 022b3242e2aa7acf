//! Headless Chromium driver for the stepwise engine.

pub mod cdp;
pub mod driver;
pub mod inject;
pub mod keys;
pub mod trace;

pub use driver::ChromiumDriver;
