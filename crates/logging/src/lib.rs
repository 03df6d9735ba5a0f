//! Logging for the inference service
//!
//! This crate provides functionality for installing the global `tracing`
//! subscriber, with an environment-overridable filter and optional JSON output.

pub mod logger;

// Re-export commonly used types
pub use logger::{Logger, LoggingConfig};
