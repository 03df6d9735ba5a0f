//! MODELSET, MODELGET and MODELDEL

use common::error::{Error, Result};
use common::types::BackendKind;
use model_manager::{normalize_device, BatchingArgs, ModelRegistry, ModelSetRequest, OptionsValidator};

use crate::args::ArgsCursor;
use crate::reply::Reply;

fn missing_blob() -> Error {
    Error::Validation("Insufficient arguments, missing model BLOB".to_string())
}

/// Parses `MODELSET` arguments (without the command name)
///
/// `<key> <backend> <device> [TAG <tag>] [BATCHSIZE <n> [MINBATCHSIZE <n>
/// [MINBATCHTIMEOUT <ms>]]] [INPUTS <names...> OUTPUTS <names...>] BLOB <bytes...>`
pub fn parse_model_set(args: &[String]) -> Result<ModelSetRequest> {
    if args.len() < 3 {
        return Err(Error::Arity(
            "wrong number of arguments for 'MODELSET' command".to_string(),
        ));
    }

    let mut cursor = ArgsCursor::new(args);
    let key = cursor.next_arg().ok_or_else(missing_blob)?.to_string();
    let backend: BackendKind = cursor.next_arg().ok_or_else(missing_blob)?.parse()?;

    let device = cursor.next_arg().ok_or_else(missing_blob)?;
    normalize_device(device)?;

    let mut tag = String::new();
    if cursor.advance_if_match("TAG") {
        tag = cursor.next_arg().ok_or_else(missing_blob)?.to_string();
    }

    let mut batching = BatchingArgs::default();
    if cursor.advance_if_match("BATCHSIZE") {
        OptionsValidator::check_batching_supported(backend)?;
        batching.batchsize = Some(cursor.next_u64("BATCHSIZE")?);
    }
    if cursor.advance_if_match("MINBATCHSIZE") {
        batching.minbatchsize = Some(cursor.next_u64("MINBATCHSIZE")?);
    }
    if cursor.advance_if_match("MINBATCHTIMEOUT") {
        batching.minbatchtimeout = Some(cursor.next_u64("MINBATCHTIMEOUT")?);
    }

    if cursor.is_at_end() {
        return Err(missing_blob());
    }

    let options = cursor.slice_until("BLOB");
    let (inputs, outputs) = parse_signature(backend, options)?;

    if !cursor.advance_if_match("BLOB") || cursor.is_at_end() {
        return Err(missing_blob());
    }

    let blob: Vec<u8> = cursor
        .rest()
        .iter()
        .flat_map(|chunk| chunk.as_bytes().iter().copied())
        .collect();

    Ok(ModelSetRequest {
        key,
        backend,
        device: device.to_string(),
        tag,
        batching,
        inputs,
        outputs,
        blob: blob.into(),
    })
}

/// Parses `INPUTS <names...> OUTPUTS <names...>`
fn parse_signature(backend: BackendKind, options: &[String]) -> Result<(Vec<String>, Vec<String>)> {
    if options.is_empty() {
        if !backend.capabilities().self_describing_io {
            return Err(Error::Validation(
                "Insufficient arguments, INPUTS and OUTPUTS not specified".to_string(),
            ));
        }
        return Ok((Vec::new(), Vec::new()));
    }

    let mut cursor = ArgsCursor::new(options);
    if !cursor.advance_if_match("INPUTS") {
        return Err(Error::Validation("INPUTS not specified".to_string()));
    }

    let inputs = cursor.slice_until("OUTPUTS").to_vec();
    if !cursor.advance_if_match("OUTPUTS") {
        return Err(Error::Validation("OUTPUTS not specified".to_string()));
    }

    Ok((inputs, cursor.rest().to_vec()))
}

/// MODELSET
pub fn model_set(registry: &ModelRegistry, args: &[String]) -> Result<Reply> {
    let request = parse_model_set(args)?;
    registry.register(request)?;
    Ok(Reply::Ok)
}

/// MODELGET `<key>` `[META]` `[BLOB]`
pub fn model_get(registry: &ModelRegistry, args: &[String]) -> Result<Reply> {
    let mut cursor = ArgsCursor::new(args);
    let key = cursor
        .next_arg()
        .ok_or_else(|| Error::Arity("wrong number of arguments for 'MODELGET' command".to_string()))?;

    let mut meta = false;
    let mut blob = false;
    while let Some(flag) = cursor.next_arg() {
        match flag.to_uppercase().as_str() {
            "META" => meta = true,
            "BLOB" => blob = true,
            _ => return Err(Error::Validation(format!("unrecognized MODELGET argument '{}'", flag))),
        }
    }
    if !meta && !blob {
        meta = true;
    }

    let model = registry.get(key)?;
    let mut pairs = Vec::new();

    if meta {
        let options = model.options();
        let names = |names: &[String]| Reply::Array(names.iter().cloned().map(Reply::Bulk).collect());

        pairs.push(("backend", Reply::Bulk(model.kind().to_string())));
        pairs.push(("device", Reply::Bulk(model.device().to_string())));
        pairs.push(("tag", Reply::Bulk(model.tag().to_string())));
        pairs.push(("batchsize", Reply::unsigned(options.batchsize)));
        pairs.push(("minbatchsize", Reply::unsigned(options.minbatchsize)));
        pairs.push(("minbatchtimeout", Reply::unsigned(options.minbatchtimeout)));
        pairs.push(("inputs", names(model.inputs())));
        pairs.push(("outputs", names(model.outputs())));
    }

    if blob {
        let definition = String::from_utf8_lossy(model.definition()).into_owned();
        pairs.push(("blob", Reply::Bulk(definition)));
    }

    Ok(Reply::map(pairs))
}

/// MODELDEL `<key>`
pub fn model_del(registry: &ModelRegistry, args: &[String]) -> Result<Reply> {
    match args {
        [key] => {
            registry.delete(key)?;
            Ok(Reply::Ok)
        }
        _ => Err(Error::Arity("wrong number of arguments for 'MODELDEL' command".to_string())),
    }
}
