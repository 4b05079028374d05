//! Redis-backed cache implementation.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;

use crate::application::cache::{CacheError, CacheKey, ItemCache};

/// Item cache on a pooled `fred` Redis client.
///
/// The adapter only reports failures; deciding whether a failure matters is
/// the caller's job. The service layer treats every error here as a miss.
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pooled client for `url`. No connections are opened until
    /// [`RedisCache::init`] runs.
    pub fn connect(url: &str, pool_size: usize) -> Result<Self, CacheError> {
        let config = Config::from_url(url).map_err(CacheError::backend)?;
        let pool = Builder::from_config(config)
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2))
            .build_pool(pool_size)
            .map_err(CacheError::backend)?;

        Ok(Self::new(pool))
    }

    /// Open the initial connections, verifying the backend is reachable.
    pub async fn init(&self) -> Result<(), CacheError> {
        self.pool.init().await.map_err(CacheError::backend)?;
        Ok(())
    }
}

#[async_trait]
impl ItemCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let value: Option<String> = self
            .pool
            .get(key.to_string())
            .await
            .map_err(CacheError::backend)?;

        Ok(value)
    }

    async fn put(&self, key: &CacheKey, payload: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl_secs = ttl.as_secs() as i64;

        self.pool
            .set::<(), _, _>(
                key.to_string(),
                payload,
                Some(Expiration::EX(ttl_secs)),
                None,
                false,
            )
            .await
            .map_err(CacheError::backend)
    }

    async fn remove(&self, keys: &[CacheKey]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.pool
            .del::<(), _>(keys)
            .await
            .map_err(CacheError::backend)
    }
}
