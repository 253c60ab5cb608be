//! Key-value backends for the weather cache.
//!
//! Two implementations share the [`CacheStore`] contract: [`MemoryStore`]
//! keeps everything in-process on top of moka, [`RedisStore`] talks to a
//! redis server. Both apply TTLs per entry, so long-lived and short-lived
//! keys can live side by side.

use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use redis::{aio::ConnectionManager, AsyncCommands, IntoConnectionInfo};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    /// Failure from a [`CacheStore`] implementation that is not backed by
    /// redis. The bundled [`MemoryStore`] never fails; this is for stores
    /// plugged in from outside the crate and for test doubles.
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrites `key`. `ttl = None` keeps the entry until evicted.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    /// Writes `key` without a TTL unless it already exists. Returns whether
    /// the value was written.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    ttl: Option<Duration>,
    written_at: Instant,
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Remaining lifetime of a key, as seen by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

pub struct MemoryStore {
    cache: Cache<String, StoredValue>,
}

impl MemoryStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    pub async fn ttl(&self, key: &str) -> KeyTtl {
        match self.cache.get(key).await {
            None => KeyTtl::Missing,
            Some(StoredValue { ttl: None, .. }) => KeyTtl::Persistent,
            Some(StoredValue {
                ttl: Some(ttl),
                written_at,
                ..
            }) => KeyTtl::Expires(ttl.saturating_sub(written_at.elapsed())),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.cache.get(key).await.map(|value| value.bytes))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let value = StoredValue {
            bytes: value,
            ttl,
            written_at: Instant::now(),
        };
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        let value = StoredValue {
            bytes: value,
            ttl: None,
            written_at: Instant::now(),
        };
        let entry = self.cache.entry(key.to_string()).or_insert(value).await;
        Ok(entry.is_fresh())
    }
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Opens a managed connection and checks the server answers before
    /// returning.
    pub async fn connect(info: impl IntoConnectionInfo) -> Result<Self, StoreError> {
        let client = redis::Client::open(info)?;
        let mut connection = client.get_connection_manager().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await?;

        info!("Connected to redis cache store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = connection.get(key).await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(expiry_millis(ttl));
        }
        cmd.query_async::<_, ()>(&mut connection).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let written: bool = connection.set_nx(key, value).await?;
        Ok(written)
    }
}

/// `PX` argument for `ttl`. redis rejects a zero expiry, and anything past
/// `u64::MAX` milliseconds is clamped.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis().max(1)).unwrap_or(u64::MAX)
}
