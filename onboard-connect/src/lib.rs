use std::sync::Arc;

pub use cache::CacheStore;
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use reqwest::Url;

/// The seam between the refresh engine and a vendor backend.
///
/// A connector knows how to fetch its vendor's data and deposit it into its
/// own [`CacheStore`]. Everything else (threads, cadence, lifecycle) is the
/// poller's business.
pub trait Connector: Send + Sync {
    /// Identity of the backend, usually its base URL
    fn api_url(&self) -> &str;

    /// The cache this connector writes into
    fn cache(&self) -> &CacheStore;

    /// One-off handshake before the first refresh (session ids, cookies, ...)
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch fresh data and store it. Only ever writes into `cache()`.
    fn refresh(&self) -> anyhow::Result<()>;

    /// Store a value in the cache
    fn store<T: Send + Sync + 'static>(&self, key: &str, value: T)
    where
        Self: Sized,
    {
        self.cache().store(key, value);
    }

    /// Load a value from the cache
    fn load<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>>
    where
        Self: Sized,
    {
        self.cache().load(key)
    }

    /// Load a value from the cache, falling back to `default`
    fn load_or<T: Clone + Send + Sync + 'static>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        self.cache().load_or(key, default)
    }

    /// Forget everything fetched so far
    fn reset(&self) {
        self.cache().clear();
    }
}

pub mod cache;
pub mod config;
pub mod dummy;
pub mod error;
pub mod graphql;
pub mod rest;
