//! Common types for the inference service
//!
//! This module defines the backend kinds and their capability table, the
//! normalized model options, and the value types known to the key space.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Inference runtime a model is registered against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// TensorFlow graph runtime
    TensorFlow,
    /// TensorFlow Lite runtime
    TfLite,
    /// TorchScript runtime
    Torch,
    /// ONNX runtime
    OnnxRuntime,
}

/// Per-kind capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether requests can be batched together by the run queue
    pub supports_auto_batching: bool,
    /// Whether the serialized model names its own inputs and outputs
    pub self_describing_io: bool,
}

impl BackendKind {
    /// All supported kinds
    pub const ALL: [BackendKind; 4] = [
        BackendKind::TensorFlow,
        BackendKind::TfLite,
        BackendKind::Torch,
        BackendKind::OnnxRuntime,
    ];

    /// Capability table
    pub const fn capabilities(self) -> BackendCapabilities {
        match self {
            BackendKind::TensorFlow => BackendCapabilities {
                supports_auto_batching: true,
                self_describing_io: false,
            },
            BackendKind::TfLite => BackendCapabilities {
                supports_auto_batching: false,
                self_describing_io: true,
            },
            BackendKind::Torch => BackendCapabilities {
                supports_auto_batching: true,
                self_describing_io: true,
            },
            BackendKind::OnnxRuntime => BackendCapabilities {
                supports_auto_batching: true,
                self_describing_io: true,
            },
        }
    }

    /// Keyword used for this kind in the command surface
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::TensorFlow => "TF",
            BackendKind::TfLite => "TFLITE",
            BackendKind::Torch => "TORCH",
            BackendKind::OnnxRuntime => "ONNX",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TF" => Ok(BackendKind::TensorFlow),
            "TFLITE" => Ok(BackendKind::TfLite),
            "TORCH" => Ok(BackendKind::Torch),
            "ONNX" => Ok(BackendKind::OnnxRuntime),
            _ => Err(Error::Validation("unsupported backend".to_string())),
        }
    }
}

/// Normalized execution policy attached to a model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Maximum number of requests per batch (0 disables batching)
    pub batchsize: u64,
    /// Minimum number of requests before a batch is dispatched (0 = no minimum)
    pub minbatchsize: u64,
    /// Milliseconds the oldest request may wait for the minimum (0 = no timeout)
    pub minbatchtimeout: u64,
    /// Threads used inside a single operator
    pub intra_op_parallelism: u64,
    /// Operators run in parallel
    pub inter_op_parallelism: u64,
}

impl ModelOptions {
    /// Returns true if requests for this model can be batched
    pub fn batching_enabled(&self) -> bool {
        self.batchsize > 0
    }
}

/// Type of a value held in the key space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Registered model
    Model,
    /// Tensor
    Tensor,
    /// Plain string value owned by the host
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Model => write!(f, "model"),
            ValueType::Tensor => write!(f, "tensor"),
            ValueType::String => write!(f, "string"),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse_is_case_insensitive() {
        assert_eq!("tf".parse::<BackendKind>().unwrap(), BackendKind::TensorFlow);
        assert_eq!("TfLite".parse::<BackendKind>().unwrap(), BackendKind::TfLite);
        assert_eq!("TORCH".parse::<BackendKind>().unwrap(), BackendKind::Torch);
        assert_eq!("onnx".parse::<BackendKind>().unwrap(), BackendKind::OnnxRuntime);

        let err = "CAFFE".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.oneline(), "ERR unsupported backend");
    }

    #[test]
    fn test_capability_table() {
        assert!(!BackendKind::TfLite.capabilities().supports_auto_batching);
        assert!(!BackendKind::TensorFlow.capabilities().self_describing_io);
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_log_level_round_trip() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
