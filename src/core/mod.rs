//! Core module
//!
//! Configuration, the aggregated error type and small utilities shared by
//! every store.

pub mod config;
pub mod error;
pub mod utils;

pub use config::{AppConfig, ConfigError, ConfigResult, Settings};
pub use error::{FnordError, Result};
