//! gstjob Common Utilities
//!
//! Shared infrastructure for all gstjob crates:
//! - Error taxonomy and result aliases
//! - Runner configuration and the environment contract with the scheduler
//! - Tracing/logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
