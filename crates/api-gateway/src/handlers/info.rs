//! INFO `<key>`

use common::error::{Error, Result};
use model_manager::StatsRegistry;

use crate::reply::Reply;

/// INFO
pub fn info(stats: &StatsRegistry, args: &[String]) -> Result<Reply> {
    let key = match args {
        [key] => key,
        _ => return Err(Error::Arity("wrong number of arguments for 'INFO' command".to_string())),
    };

    let snapshot = stats
        .get(key)
        .ok_or_else(|| Error::Resolution("cannot find run info for key".to_string()))?
        .snapshot();

    let last_run = snapshot
        .last_run
        .map(|time| time.to_rfc3339())
        .unwrap_or_default();

    Ok(Reply::map(vec![
        ("key", Reply::Bulk(snapshot.key)),
        ("type", Reply::Bulk("MODEL".to_string())),
        ("backend", Reply::Bulk(snapshot.backend.to_string())),
        ("device", Reply::Bulk(snapshot.device)),
        ("tag", Reply::Bulk(snapshot.tag)),
        ("duration", Reply::unsigned(snapshot.duration_us)),
        ("samples", Reply::unsigned(snapshot.samples)),
        ("calls", Reply::unsigned(snapshot.calls)),
        ("errors", Reply::unsigned(snapshot.errors)),
        ("last_run", Reply::Bulk(last_run)),
    ]))
}
