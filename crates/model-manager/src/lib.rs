//! Model lifecycle management for the inference service
//!
//! This crate provides functionality for validating a model's execution
//! policy, holding the registered model record, tracking per-key run
//! statistics, and registering models into the key space.

pub mod model;
pub mod options;
pub mod registry;
pub mod stats;

// Re-export commonly used types
pub use model::{Model, ModelSpec};
pub use options::{BatchingArgs, OptionsValidator};
pub use registry::{normalize_device, DeviceQueues, ModelRegistry, ModelSetRequest};
pub use stats::{RunStats, StatsRegistry, StatsSnapshot};
