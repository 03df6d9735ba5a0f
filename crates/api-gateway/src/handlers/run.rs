//! MODELRUN
//!
//! Builds a [`DagOp`] from the run arguments, submits it to the model's
//! device queue and writes the outputs back to the key space.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use common::error::{Error, Result};
use inference_engine::Tensor;
use model_manager::Model;
use storage_adapter::KeySpace;
use task_scheduler::{DagOp, RunQueueDirectory};

use crate::args::ArgsCursor;
use crate::reply::Reply;

fn parse_timeout(arg: Option<&str>) -> Result<Duration> {
    arg.and_then(|arg| arg.parse::<u64>().ok())
        .filter(|timeout| *timeout > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| Error::Validation("Invalid value for TIMEOUT".to_string()))
}

/// Builds the op for `MODELRUN` arguments (without the command name)
///
/// `single_op` is false when the run is one step of a composite request; the
/// op's inputs are then left for the caller to materialize.
pub fn build_run_op(args: &[String], keyspace: &KeySpace, single_op: bool) -> Result<DagOp> {
    if args.len() < 5 {
        return Err(Error::Arity(
            "wrong number of arguments for 'MODELRUN' command".to_string(),
        ));
    }

    let mut cursor = ArgsCursor::new(args);
    let key = cursor.next_arg().unwrap_or_default();
    let model = keyspace.resolve::<Model>(key)?;

    let timeout = if cursor.advance_if_match("TIMEOUT") {
        Some(parse_timeout(cursor.next_arg())?)
    } else {
        None
    };

    if !cursor.advance_if_match("INPUTS") {
        return Err(Error::Validation("INPUTS not specified".to_string()));
    }

    let mut inkeys = Vec::new();
    let mut outkeys = Vec::new();
    let mut in_outputs = false;
    for arg in cursor.rest() {
        if !in_outputs && arg.eq_ignore_ascii_case("OUTPUTS") {
            in_outputs = true;
        } else if in_outputs {
            outkeys.push(arg.clone());
        } else {
            inkeys.push(arg.clone());
        }
    }

    let mut op = DagOp::model_run(model, inkeys, outkeys, timeout)?;

    if timeout.is_some() && !single_op {
        return Err(Error::Validation("TIMEOUT not allowed within a DAG command".to_string()));
    }

    if single_op {
        let inputs = op
            .inkeys()
            .iter()
            .map(|key| keyspace.resolve::<Tensor>(key).map(|tensor| (*tensor).clone()))
            .collect::<Result<Vec<_>>>()?;
        op.set_inputs(inputs)?;

        check_output_keys(keyspace, op.outkeys())?;
    }

    debug!("Op {} built for {} on {}", op.id(), key, op.device());

    Ok(op)
}

/// Fails with WRONGTYPE if any output key holds something other than a tensor
fn check_output_keys(keyspace: &KeySpace, outkeys: &[String]) -> Result<()> {
    outkeys
        .iter()
        .try_for_each(|key| keyspace.get::<Tensor>(key).map(|_| ()))
}

/// MODELRUN
pub async fn model_run(keyspace: &KeySpace, directory: &RunQueueDirectory, args: &[String]) -> Result<Reply> {
    let op = build_run_op(args, keyspace, true)?;
    let outkeys = op.outkeys().to_vec();

    let outputs = directory.run(op).await?;

    // A key may have changed type while the op was queued
    check_output_keys(keyspace, &outkeys)?;
    for (key, tensor) in outkeys.iter().zip(outputs) {
        keyspace.set(key, Arc::new(tensor))?;
    }

    Ok(Reply::Ok)
}
