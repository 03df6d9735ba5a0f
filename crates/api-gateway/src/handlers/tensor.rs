//! TENSORSET and TENSORGET
//!
//! Tensor contents are opaque: the blob is stored as given.

use std::sync::Arc;
use bytes::Bytes;

use common::error::{Error, Result};
use inference_engine::Tensor;
use storage_adapter::KeySpace;

use crate::args::ArgsCursor;
use crate::reply::Reply;

/// Parses `<key> <dtype> <dims...> BLOB <bytes...>`
pub fn parse_tensor_set(args: &[String]) -> Result<(String, Tensor)> {
    if args.len() < 4 {
        return Err(Error::Arity("wrong number of arguments for 'TENSORSET' command".to_string()));
    }

    let mut cursor = ArgsCursor::new(args);
    let key = cursor.next_arg().unwrap_or_default().to_string();
    let dtype = cursor.next_arg().unwrap_or_default();

    let shape = cursor
        .slice_until("BLOB")
        .iter()
        .map(|dim| {
            dim.parse::<usize>()
                .map_err(|_| Error::Validation(format!("invalid tensor dimension '{}'", dim)))
        })
        .collect::<Result<Vec<_>>>()?;

    if !cursor.advance_if_match("BLOB") || cursor.is_at_end() {
        return Err(Error::Validation("Insufficient arguments, missing tensor BLOB".to_string()));
    }

    let data: Vec<u8> = cursor
        .rest()
        .iter()
        .flat_map(|chunk| chunk.as_bytes().iter().copied())
        .collect();

    Ok((key, Tensor::new(dtype, shape, Bytes::from(data))))
}

/// TENSORSET
pub fn tensor_set(keyspace: &KeySpace, args: &[String]) -> Result<Reply> {
    let (key, tensor) = parse_tensor_set(args)?;
    keyspace.set(&key, Arc::new(tensor))?;
    Ok(Reply::Ok)
}

/// TENSORGET `<key>`
pub fn tensor_get(keyspace: &KeySpace, args: &[String]) -> Result<Reply> {
    let key = match args {
        [key] => key,
        _ => return Err(Error::Arity("wrong number of arguments for 'TENSORGET' command".to_string())),
    };

    let tensor = keyspace.resolve::<Tensor>(key)?;
    let shape = tensor
        .shape()
        .iter()
        .map(|dim| Reply::unsigned(*dim as u64))
        .collect();

    Ok(Reply::map(vec![
        ("dtype", Reply::Bulk(tensor.dtype().to_string())),
        ("shape", Reply::Array(shape)),
        ("blob", Reply::Bulk(String::from_utf8_lossy(tensor.data()).into_owned())),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::tokenize;

    #[test]
    fn test_set_and_get() {
        let keyspace = KeySpace::new();
        tensor_set(&keyspace, &tokenize("t float 2 2 BLOB abcd efgh")).unwrap();

        let reply = tensor_get(&keyspace, &tokenize("t")).unwrap();
        assert_eq!(reply.to_string(), r#"["dtype","FLOAT","shape",[2,2],"blob","abcdefgh"]"#);
    }

    #[test]
    fn test_errors() {
        let keyspace = KeySpace::new();

        let err = tensor_set(&keyspace, &tokenize("t FLOAT two BLOB x")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = tensor_set(&keyspace, &tokenize("t FLOAT 1 2")).unwrap_err();
        assert_eq!(err.oneline(), "ERR Insufficient arguments, missing tensor BLOB");

        let err = tensor_get(&keyspace, &tokenize("t")).unwrap_err();
        assert_eq!(err.oneline(), "ERR tensor key is empty");
    }
}
