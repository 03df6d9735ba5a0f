//! Typed key space for the inference service
//!
//! This crate provides the keyed object store that models and tensors are
//! written to. Values are typed, and writes never replace a value of a
//! foreign type.

pub mod keyspace;

// Re-export commonly used types
pub use keyspace::{KeySpace, Stored};
