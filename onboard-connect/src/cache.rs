use crate::error::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Value = Arc<dyn Any + Send + Sync>;

/// Thread-safe last-value cache keyed by name.
///
/// Values are stored behind an `Arc`, so a reader either sees the previous
/// value or the complete new one. A single lock guards the whole map; writes
/// happen once per poll cycle, reads far more often.
#[derive(Default)]
pub struct CacheStore {
    values: RwLock<HashMap<String, Value>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn store<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        let value: Value = Arc::new(value);
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), value);
    }

    /// Load the value stored under `key`.
    ///
    /// Fails with [`Error::NotFound`] if the key is absent and with
    /// [`Error::InvalidData`] if the stored value is not a `T`.
    pub fn load<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>> {
        let value = {
            let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
            values.get(key).cloned()
        };
        let value = value.ok_or_else(|| Error::NotFound(key.to_string()))?;
        value.downcast::<T>().map_err(|_| {
            Error::invalid_data(
                key,
                format!("stored value is not a {}", std::any::type_name::<T>()),
            )
        })
    }

    /// Load a clone of the value under `key`, or `default` if there is none.
    pub fn load_or<T: Clone + Send + Sync + 'static>(&self, key: &str, default: T) -> T {
        match self.load::<T>(key) {
            Ok(value) => T::clone(&value),
            Err(Error::NotFound(_)) => default,
            Err(e) => {
                log::warn!("{}, using default", e);
                default
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.contains_key(key)
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key).is_some()
    }

    /// Drop every stored value.
    pub fn clear(&self) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.clear();
    }

    pub fn len(&self) -> usize {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("keys", &self.keys())
            .finish()
    }
}
