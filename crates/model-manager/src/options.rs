//! Model option validation
//!
//! Batching parameters arrive as optional values (absent when the keyword was
//! not given). Validation walks a fixed rule table in order; the first
//! violated rule determines the error.

use common::error::{Error, Result};
use common::types::{BackendCapabilities, BackendKind, ModelOptions};
use config::ConfigManager;

/// Raw batching parameters as given at registration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchingArgs {
    /// BATCHSIZE value, if given
    pub batchsize: Option<u64>,

    /// MINBATCHSIZE value, if given
    pub minbatchsize: Option<u64>,

    /// MINBATCHTIMEOUT value in milliseconds, if given
    pub minbatchtimeout: Option<u64>,
}

fn enabled(value: Option<u64>) -> bool {
    value.unwrap_or(0) > 0
}

struct Rule {
    violated: fn(&BatchingArgs, BackendCapabilities) -> bool,
    message: &'static str,
}

const AUTO_BATCHING_RULE: usize = 3;

const RULES: [Rule; 4] = [
    Rule {
        violated: minbatchsize_without_batchsize,
        message: "MINBATCHSIZE specified without BATCHSIZE",
    },
    Rule {
        violated: minbatchtimeout_without_batchsize,
        message: "MINBATCHTIMEOUT specified without BATCHSIZE",
    },
    Rule {
        violated: minbatchtimeout_without_minbatchsize,
        message: "MINBATCHTIMEOUT specified without MINBATCHSIZE",
    },
    Rule {
        violated: batchsize_without_auto_batching,
        message: "Auto-batching not supported by the {backend} backend",
    },
];

impl Rule {
    fn error(&self, kind: BackendKind) -> Error {
        Error::Validation(self.message.replace("{backend}", kind.as_str()))
    }
}

fn minbatchsize_without_batchsize(args: &BatchingArgs, _: BackendCapabilities) -> bool {
    args.minbatchsize.is_some() && !enabled(args.batchsize)
}

fn minbatchtimeout_without_batchsize(args: &BatchingArgs, _: BackendCapabilities) -> bool {
    args.minbatchtimeout.is_some() && !enabled(args.batchsize)
}

fn minbatchtimeout_without_minbatchsize(args: &BatchingArgs, _: BackendCapabilities) -> bool {
    args.minbatchtimeout.is_some() && !enabled(args.minbatchsize)
}

fn batchsize_without_auto_batching(args: &BatchingArgs, capabilities: BackendCapabilities) -> bool {
    args.batchsize.is_some() && !capabilities.supports_auto_batching
}

/// Validates batching parameters and produces normalized options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsValidator {
    /// Process-wide intra-op parallelism attached to every model
    intra_op_parallelism: u64,

    /// Process-wide inter-op parallelism attached to every model
    inter_op_parallelism: u64,
}

impl OptionsValidator {
    /// Creates a validator with explicit parallelism settings
    pub fn new(intra_op_parallelism: u64, inter_op_parallelism: u64) -> Self {
        Self {
            intra_op_parallelism,
            inter_op_parallelism,
        }
    }

    /// Creates a validator from configuration
    pub fn from_config(config_manager: &ConfigManager) -> Self {
        let intra_op_parallelism = config_manager
            .get_u64("backends_intra_op_parallelism")
            .unwrap_or(0);

        let inter_op_parallelism = config_manager
            .get_u64("backends_inter_op_parallelism")
            .unwrap_or(0);

        Self::new(intra_op_parallelism, inter_op_parallelism)
    }

    /// Fails as soon as BATCHSIZE is given for a kind without auto-batching
    pub fn check_batching_supported(kind: BackendKind) -> Result<()> {
        if kind.capabilities().supports_auto_batching {
            Ok(())
        } else {
            Err(RULES[AUTO_BATCHING_RULE].error(kind))
        }
    }

    /// Validates the arguments for a backend kind
    pub fn validate(&self, kind: BackendKind, args: &BatchingArgs) -> Result<ModelOptions> {
        let capabilities = kind.capabilities();

        if let Some(rule) = RULES.iter().find(|rule| (rule.violated)(args, capabilities)) {
            return Err(rule.error(kind));
        }

        Ok(ModelOptions {
            batchsize: args.batchsize.unwrap_or(0),
            minbatchsize: args.minbatchsize.unwrap_or(0),
            minbatchtimeout: args.minbatchtimeout.unwrap_or(0),
            intra_op_parallelism: self.intra_op_parallelism,
            inter_op_parallelism: self.inter_op_parallelism,
        })
    }
}
