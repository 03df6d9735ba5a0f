//! Command handlers

pub mod info;
pub mod model;
pub mod run;
pub mod tensor;

pub use run::build_run_op;
