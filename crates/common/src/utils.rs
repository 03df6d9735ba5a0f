//! Utility functions for the inference service
//!
//! This module provides utility functions used throughout the workspace.

use std::future::Future;
use std::time::{Duration, Instant};
use crate::error::{Error, Result};

/// Awaits a future until an absolute deadline
///
/// Returns a timeout error naming the operation if the deadline passes first.
pub async fn execute_until<T, F>(
    future: F,
    deadline: Instant,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout_at(deadline.into(), future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{} timed out", operation_name))),
    }
}

/// Measures the execution time of a function
pub fn measure_execution_time<T, F>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}
