use crate::{CacheStore, Connector};

/// A connector for vehicles that expose no live data at all.
///
/// It never performs I/O and never stores anything, so every read falls back
/// to the caller's default (or fails with `NotFound`).
pub struct DummyConnector {
    api_url: String,
    cache: CacheStore,
}

impl DummyConnector {
    pub fn new() -> Self {
        Self::with_url("dummy://")
    }

    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            cache: CacheStore::new(),
        }
    }
}

impl Default for DummyConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for DummyConnector {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn refresh(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn store<T: Send + Sync + 'static>(&self, key: &str, _value: T) {
        log::trace!("DummyConnector discarding value for {}", key);
    }
}
