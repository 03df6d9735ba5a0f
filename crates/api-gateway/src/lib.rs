//! Command surface of the inference service
//!
//! This crate provides the argument parsing, handlers and reply format of
//! the MODELSET, MODELRUN, MODELGET, MODELDEL, TENSORSET, TENSORGET and INFO
//! commands, and the router that dispatches command lines to them.

pub mod args;
pub mod handlers;
pub mod reply;
pub mod routes;

// Re-export commonly used types
pub use args::{tokenize, ArgsCursor};
pub use handlers::build_run_op;
pub use reply::Reply;
pub use routes::CommandRouter;
