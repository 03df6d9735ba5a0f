//! Command replies
//!
//! A failed command replies with the error's one-line form; the verbose form
//! of the same error is logged for operators.

use std::fmt;
use serde_json::Value;
use tracing::error;

use common::error::Error;

/// Reply to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple acknowledgment
    Ok,

    /// Text value
    Bulk(String),

    /// Integer value
    Integer(i64),

    /// Nested values
    Array(Vec<Reply>),

    /// Single-line error
    Error(String),
}

impl Reply {
    /// Builds an error reply, logging the detail
    pub fn from_error(command: &str, err: &Error) -> Self {
        error!(kind = ?err.kind(), "{} failed: {}", command, err);
        Reply::Error(err.oneline())
    }

    /// Integer reply for an unsigned value, saturating at `i64::MAX`
    pub fn unsigned(value: u64) -> Self {
        Reply::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }

    /// Returns true for error replies
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Key/value pairs as a flat array
    pub fn map(pairs: Vec<(&str, Reply)>) -> Self {
        Reply::Array(
            pairs
                .into_iter()
                .flat_map(|(key, value)| [Reply::Bulk(key.to_string()), value])
                .collect(),
        )
    }

    /// JSON representation used for arrays
    pub fn to_value(&self) -> Value {
        match self {
            Reply::Ok => Value::from("OK"),
            Reply::Bulk(text) => Value::from(text.as_str()),
            Reply::Integer(value) => Value::from(*value),
            Reply::Array(items) => Value::Array(items.iter().map(Reply::to_value).collect()),
            Reply::Error(message) => Value::from(message.as_str()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Bulk(text) => write!(f, "{}", text),
            Reply::Integer(value) => write!(f, "(integer) {}", value),
            Reply::Array(_) => write!(f, "{}", self.to_value()),
            Reply::Error(message) => write!(f, "{}", message),
        }
    }
}

impl From<Result<Reply, Error>> for Reply {
    fn from(result: Result<Reply, Error>) -> Self {
        match result {
            Ok(reply) => reply,
            Err(e) => Reply::Error(e.oneline()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_matches_error() {
        let err = Error::Validation("Invalid DEVICE".to_string());
        let reply = Reply::from_error("MODELSET", &err);

        assert!(reply.is_error());
        assert_eq!(reply.to_string(), "ERR Invalid DEVICE");
        assert_eq!(Reply::from(Err(err)), reply);
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::Ok.to_string(), "OK");
        assert_eq!(Reply::Integer(3).to_string(), "(integer) 3");
        assert_eq!(Reply::unsigned(3), Reply::Integer(3));
        assert_eq!(Reply::unsigned(u64::MAX), Reply::Integer(i64::MAX));

        let reply = Reply::map(vec![("device", Reply::Bulk("CPU".into())), ("batchsize", Reply::Integer(4))]);
        assert_eq!(reply.to_string(), r#"["device","CPU","batchsize",4]"#);
    }
}
