//! Common utilities and types for the inference service
//! 
//! This crate provides shared functionality used across the workspace,
//! including the structured error type, backend kinds with their capability
//! table, model options and small utility functions.

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use types::*;
