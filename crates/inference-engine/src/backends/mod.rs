//! Built-in backend implementations

pub mod identity;

pub use identity::IdentityBackend;
