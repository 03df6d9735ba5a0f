//! Key space implementation
//!
//! Entries are held as `Arc`s, so a reader that resolved a value keeps it
//! alive after the key is overwritten or deleted.

use std::any::Any;
use std::sync::Arc;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tracing::trace;

use common::error::{Error, Result};
use common::types::ValueType;

/// A value that can be written to the key space
pub trait Stored: Any + Send + Sync {
    /// Type tag reported by the key space
    const VALUE_TYPE: ValueType;
}

impl Stored for String {
    const VALUE_TYPE: ValueType = ValueType::String;
}

/// Stored value with its type tag
#[derive(Clone)]
struct Entry {
    /// Type tag
    value_type: ValueType,

    /// Type-erased value
    value: Arc<dyn Any + Send + Sync>,
}

/// Keyed object store
#[derive(Default)]
pub struct KeySpace {
    /// Entries (key -> typed value)
    entries: DashMap<String, Entry>,
}

impl KeySpace {
    /// Creates an empty key space
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the type of the value at `key`, if any
    pub fn key_type(&self, key: &str) -> Option<ValueType> {
        self.entries.get(key).map(|entry| entry.value_type)
    }

    /// Gets a typed value
    ///
    /// Returns `Ok(None)` for an empty key and a wrong-type error when the key
    /// holds another type.
    pub fn get<T: Stored>(&self, key: &str) -> Result<Option<Arc<T>>> {
        let value = match self.entries.get(key) {
            Some(entry) => {
                if entry.value_type != T::VALUE_TYPE {
                    return Err(Error::WrongType(key.to_string()));
                }
                entry.value.clone()
            }
            None => return Ok(None),
        };

        value
            .downcast::<T>()
            .map(Some)
            .map_err(|_| Error::Internal(format!("value at '{}' does not match its type tag", key)))
    }

    /// Gets a typed value, failing with a resolution error if the key is empty
    pub fn resolve<T: Stored>(&self, key: &str) -> Result<Arc<T>> {
        self.get::<T>(key)?
            .ok_or_else(|| Error::Resolution(format!("{} key is empty", T::VALUE_TYPE)))
    }

    /// Writes a typed value
    ///
    /// Replaces an empty key or a value of the same type and returns the
    /// previous value. A key holding another type is left untouched.
    pub fn set<T: Stored>(&self, key: &str, value: Arc<T>) -> Result<Option<Arc<T>>> {
        self.set_with(key, value, || ())
    }

    /// Writes a typed value, running `on_commit` while the key is still locked
    ///
    /// `on_commit` runs only when the write succeeds. It must not touch this
    /// key space.
    pub fn set_with<T: Stored, F: FnOnce()>(&self, key: &str, value: Arc<T>, on_commit: F) -> Result<Option<Arc<T>>> {
        let entry = Entry {
            value_type: T::VALUE_TYPE,
            value,
        };

        let previous = match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().value_type != T::VALUE_TYPE {
                    return Err(Error::WrongType(key.to_string()));
                }
                let previous = occupied.insert(entry);
                on_commit();
                Some(previous)
            }
            MapEntry::Vacant(vacant) => {
                let _slot = vacant.insert(entry);
                on_commit();
                None
            }
        };

        trace!("Key {} set to a {} value", key, T::VALUE_TYPE);

        Ok(previous.and_then(|entry| entry.value.downcast::<T>().ok()))
    }

    /// Deletes a typed value
    ///
    /// Returns the removed value, `Ok(None)` for an empty key, and a wrong-type
    /// error (without deleting) when the key holds another type.
    pub fn delete_typed<T: Stored>(&self, key: &str) -> Result<Option<Arc<T>>> {
        self.delete_typed_with::<T, _>(key, || ())
    }

    /// Deletes a typed value, running `on_commit` while the key is still locked
    pub fn delete_typed_with<T: Stored, F: FnOnce()>(&self, key: &str, on_commit: F) -> Result<Option<Arc<T>>> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(occupied) => {
                if occupied.get().value_type != T::VALUE_TYPE {
                    return Err(Error::WrongType(key.to_string()));
                }
                on_commit();
                let (_, entry) = occupied.remove_entry();
                Ok(entry.value.downcast::<T>().ok())
            }
            MapEntry::Vacant(_) => Ok(None),
        }
    }

    /// Deletes whatever is stored at `key`
    pub fn delete(&self, key: &str) -> Option<ValueType> {
        self.entries.remove(key).map(|(_, entry)| entry.value_type)
    }

    /// Returns the number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the key space is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Blob(u32);

    impl Stored for Blob {
        const VALUE_TYPE: ValueType = ValueType::Tensor;
    }

    #[test]
    fn test_set_get_and_replace() {
        let keyspace = KeySpace::new();
        assert!(keyspace.get::<Blob>("a").unwrap().is_none());

        assert!(keyspace.set("a", Arc::new(Blob(1))).unwrap().is_none());
        let previous = keyspace.set("a", Arc::new(Blob(2))).unwrap();
        assert_eq!(previous.as_deref(), Some(&Blob(1)));
        assert_eq!(keyspace.resolve::<Blob>("a").unwrap().0, 2);
        assert_eq!(keyspace.key_type("a"), Some(ValueType::Tensor));
    }

    #[test]
    fn test_foreign_type_is_not_overwritten() {
        let keyspace = KeySpace::new();
        keyspace.set("a", Arc::new("hello".to_string())).unwrap();

        let err = keyspace.set("a", Arc::new(Blob(1))).unwrap_err();
        assert_eq!(err, Error::WrongType("a".to_string()));
        assert_eq!(keyspace.resolve::<String>("a").unwrap().as_str(), "hello");

        assert!(matches!(keyspace.get::<Blob>("a"), Err(Error::WrongType(_))));
        assert!(matches!(keyspace.delete_typed::<Blob>("a"), Err(Error::WrongType(_))));
        assert_eq!(keyspace.len(), 1);
    }

    #[test]
    fn test_resolve_missing_key() {
        let keyspace = KeySpace::new();
        let err = keyspace.resolve::<Blob>("missing").unwrap_err();
        assert_eq!(err.oneline(), "ERR tensor key is empty");
    }

    #[test]
    fn test_reader_outlives_delete() {
        let keyspace = KeySpace::new();
        keyspace.set("a", Arc::new(Blob(7))).unwrap();

        let held = keyspace.resolve::<Blob>("a").unwrap();
        assert_eq!(keyspace.delete("a"), Some(ValueType::Tensor));
        assert!(keyspace.is_empty());
        assert_eq!(held.0, 7);
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn test_commit_hooks_run_only_on_success() {
        let keyspace = KeySpace::new();
        let mut commits = Vec::new();

        keyspace.set_with("a", Arc::new(Blob(1)), || commits.push("set a")).unwrap();
        keyspace.set("s", Arc::new("text".to_string())).unwrap();
        assert!(keyspace.set_with("s", Arc::new(Blob(2)), || commits.push("set s")).is_err());
        assert!(keyspace.delete_typed_with::<Blob, _>("s", || commits.push("del s")).is_err());
        assert!(keyspace.delete_typed_with::<Blob, _>("none", || commits.push("del none")).unwrap().is_none());
        assert_eq!(keyspace.delete_typed_with::<Blob, _>("a", || commits.push("del a")).unwrap().unwrap().0, 1);

        assert_eq!(commits, vec!["set a", "del a"]);
        assert_eq!(keyspace.key_type("s"), Some(ValueType::String));
    }

    #[tokio::test]
    async fn test_concurrent_writers_of_one_key() {
        let keyspace = Arc::new(KeySpace::new());

        let writers = (0..16u32).map(|i| {
            let keyspace = keyspace.clone();
            tokio::spawn(async move { keyspace.set("shared", Arc::new(Blob(i))).map(|_| ()) })
        });

        for result in futures::future::join_all(writers).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(keyspace.len(), 1);
    }
}
