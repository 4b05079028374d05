//! Cache trait describing the read-through cache adapter for items.
//!
//! The cache stores JSON payloads keyed by [`CacheKey`] and is strictly
//! best-effort: callers must be able to serve every request from the store
//! alone when the cache misbehaves.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Default lifetime for cached item payloads.
pub const DEFAULT_ITEM_TTL: Duration = Duration::from_secs(300);

/// Namespaced cache keys. Rendering is part of the wire contract: other
/// consumers of the same cache rely on these exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The full collection of live items, keyed as `all_items`.
    AllItems,
    /// A single item, keyed as `item:<uuid>` with the hyphenated form.
    Item(Uuid),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllItems => f.write_str("all_items"),
            Self::Item(id) => write!(f, "item:{id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait ItemCache: Send + Sync {
    /// Fetch a payload. `Ok(None)` is a miss; errors are backend failures.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Store a payload with the given lifetime.
    async fn put(&self, key: &CacheKey, payload: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Drop entries. Removing a key that is not present is not an error.
    async fn remove(&self, keys: &[CacheKey]) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_render_wire_format() {
        let id = Uuid::parse_str("0f2f8f3a-9a43-4bb0-a1bb-3a6f0f0c9d1c").expect("uuid");
        assert_eq!(CacheKey::AllItems.to_string(), "all_items");
        assert_eq!(
            CacheKey::Item(id).to_string(),
            "item:0f2f8f3a-9a43-4bb0-a1bb-3a6f0f0c9d1c"
        );
    }
}
