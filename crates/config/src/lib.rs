//! Configuration management for the inference service
//!
//! This crate provides functionality for managing configuration settings,
//! layering built-in defaults, an optional configuration file and
//! `AI_INFERENCE_*` environment variables.

pub mod defaults;
pub mod manager;

// Re-export commonly used types
pub use defaults::DefaultConfig;
pub use manager::ConfigManager;
