#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a store feature: `memory` or `sqlite`.");

use async_trait::async_trait;
use portal_types::ports::key_value_store::{KeyValueStore, StoreError};

pub mod local_cache;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use local_cache::LocalCache;

#[cfg(feature = "sqlite")]
pub const DEFAULT_SQLITE_URL: &str = "sqlite://portal-cache.db";

pub enum Store {
    #[cfg(feature = "memory")]
    Memory(memory::InMemoryStore),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteStore),
}

pub async fn build_store(url: Option<&str>) -> anyhow::Result<Store> {
    Store::build_store(url).await
}

impl Store {
    #[cfg(all(feature = "memory", not(feature = "sqlite")))]
    pub async fn build_store(url: Option<&str>) -> anyhow::Result<Self> {
        if url.is_some() {
            tracing::warn!("CACHE_URL ignored: built without the `sqlite` feature");
        }
        Ok(Store::Memory(memory::InMemoryStore::new()))
    }

    #[cfg(all(feature = "sqlite", not(feature = "memory")))]
    pub async fn build_store(url: Option<&str>) -> anyhow::Result<Self> {
        let url = url.unwrap_or(DEFAULT_SQLITE_URL);
        Ok(Store::Sqlite(sqlite::SqliteStore::new(url).await?))
    }

    // With both backends compiled in, a URL selects sqlite.
    #[cfg(all(feature = "sqlite", feature = "memory"))]
    pub async fn build_store(url: Option<&str>) -> anyhow::Result<Self> {
        match url {
            Some(url) => Ok(Store::Sqlite(sqlite::SqliteStore::new(url).await?)),
            None => Ok(Store::Memory(memory::InMemoryStore::new())),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "memory")]
            Store::Memory(_) => "memory",
            #[cfg(feature = "sqlite")]
            Store::Sqlite(_) => "sqlite",
        }
    }
}

#[async_trait]
impl KeyValueStore for Store {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            #[cfg(feature = "memory")]
            Store::Memory(s) => s.get(key).await,
            #[cfg(feature = "sqlite")]
            Store::Sqlite(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            #[cfg(feature = "memory")]
            Store::Memory(s) => s.set(key, value).await,
            #[cfg(feature = "sqlite")]
            Store::Sqlite(s) => s.set(key, value).await,
        }
    }
}
