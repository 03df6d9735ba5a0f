//! Built-in configuration defaults
//!
//! Every key the service reads has an entry here, so a missing file or an
//! empty environment still yields a complete configuration.

use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "AI_INFERENCE";

/// Default configuration values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Threads used inside a single operator (0 lets the backend decide)
    pub backends_intra_op_parallelism: i64,

    /// Operators run in parallel (0 lets the backend decide)
    pub backends_inter_op_parallelism: i64,

    /// Worker tasks draining each device queue
    pub threads_per_queue: i64,

    /// Maximum number of pending ops per device queue
    pub max_queue_len: i64,

    /// Idle time before a batch without a minimum size is dispatched
    pub idle_batch_linger_ms: i64,

    /// Default log level
    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            backends_intra_op_parallelism: 0,
            backends_inter_op_parallelism: 0,
            threads_per_queue: 1,
            max_queue_len: 1024,
            idle_batch_linger_ms: 0,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl DefaultConfig {
    /// Key/value pairs registered as defaults
    pub fn entries(&self) -> Vec<(&'static str, DefaultValue)> {
        vec![
            ("backends_intra_op_parallelism", DefaultValue::Int(self.backends_intra_op_parallelism)),
            ("backends_inter_op_parallelism", DefaultValue::Int(self.backends_inter_op_parallelism)),
            ("threads_per_queue", DefaultValue::Int(self.threads_per_queue)),
            ("max_queue_len", DefaultValue::Int(self.max_queue_len)),
            ("idle_batch_linger_ms", DefaultValue::Int(self.idle_batch_linger_ms)),
            ("log_level", DefaultValue::Str(self.log_level.clone())),
            ("log_json", DefaultValue::Bool(self.log_json)),
        ]
    }
}

/// Typed default value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// Integer value
    Int(i64),
    /// String value
    Str(String),
    /// Boolean value
    Bool(bool),
}
