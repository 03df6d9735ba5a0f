//! Backend runtimes for the inference service
//!
//! This crate provides the contract every inference runtime implements, the
//! registry of loaded runtimes with their lazily loaded defaults, and the
//! opaque tensor handle exchanged with runtimes.

pub mod backend;
pub mod backends;
pub mod registry;
pub mod tensor;

// Re-export commonly used types
pub use backend::{Backend, LoadedModel, ModelDefinition, ModelHandle};
pub use registry::{BackendFactory, BackendRegistry};
pub use tensor::Tensor;
