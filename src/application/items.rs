//! Item CRUD service with a cache-aside consistency layer.
//!
//! Reads populate the cache on miss, writes invalidate the affected keys, and
//! every cache failure falls open to the store. The store is the only source
//! of truth; losing the cache entirely must never change observable results.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::cache::{CacheKey, DEFAULT_ITEM_TTL, ItemCache};
use crate::application::store::{ItemStore, StoreError};
use crate::domain::error::DomainError;
use crate::domain::items::ItemRecord;

const METRIC_CACHE_HIT: &str = "pricebook_cache_hit_total";
const METRIC_CACHE_MISS: &str = "pricebook_cache_miss_total";
const METRIC_CACHE_INVALIDATE: &str = "pricebook_cache_invalidate_total";

#[derive(Debug, Error)]
pub enum ItemServiceError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
    #[error("item not found")]
    NotFound,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ItemServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateItemCommand {
    /// Caller-supplied identity; generated when absent.
    pub id: Option<Uuid>,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct UpdateItemCommand {
    pub name: String,
    pub price: f64,
}

#[derive(Clone)]
pub struct ItemService {
    store: Arc<dyn ItemStore>,
    cache: Arc<dyn ItemCache>,
    ttl: Duration,
}

impl ItemService {
    pub fn new(store: Arc<dyn ItemStore>, cache: Arc<dyn ItemCache>) -> Self {
        Self {
            store,
            cache,
            ttl: DEFAULT_ITEM_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Persist a new item and drop the cached collection.
    ///
    /// Validation runs before any store or cache interaction; an invalid
    /// payload leaves both collaborators untouched.
    pub async fn create(&self, command: CreateItemCommand) -> Result<ItemRecord, ItemServiceError> {
        let id = command.id.unwrap_or_else(Uuid::new_v4);
        let record = ItemRecord::new(id, command.name, command.price)?;

        self.store.insert(&record).await?;
        self.invalidate(CacheKey::AllItems).await;
        Ok(record)
    }

    /// List every live item, preferring the cached collection.
    pub async fn list_all(&self) -> Result<Vec<ItemRecord>, ItemServiceError> {
        if let Some(items) = self.cached::<Vec<ItemRecord>>(CacheKey::AllItems).await {
            return Ok(items);
        }

        let items = self.store.list().await?;
        self.populate(CacheKey::AllItems, &items).await;
        Ok(items)
    }

    /// Fetch a single item, preferring its cached entry.
    ///
    /// A store failure on the fallback path is reported as [`ItemServiceError::NotFound`]
    /// so a flaky store and an absent row look the same to callers.
    pub async fn fetch(&self, id: Uuid) -> Result<ItemRecord, ItemServiceError> {
        let key = CacheKey::Item(id);
        if let Some(item) = self.cached::<ItemRecord>(key).await {
            return Ok(item);
        }

        let item = match self.store.fetch(id).await {
            Ok(Some(item)) => item,
            Ok(None) => return Err(ItemServiceError::NotFound),
            Err(err) => {
                warn!(item_id = %id, error = %err, "store lookup failed; reporting not found");
                return Err(ItemServiceError::NotFound);
            }
        };

        self.populate(key, &item).await;
        Ok(item)
    }

    /// Replace the mutable fields of an existing item.
    ///
    /// The current record is resolved through [`Self::fetch`], so the lookup
    /// may be served (and re-populated) by the cache before both keys are
    /// invalidated after the write.
    pub async fn update(
        &self,
        id: Uuid,
        command: UpdateItemCommand,
    ) -> Result<ItemRecord, ItemServiceError> {
        let current = self.fetch(id).await?;
        let updated = current.with_fields(command.name, command.price)?;

        self.store.update(&updated).await?;
        self.invalidate(CacheKey::Item(id)).await;
        self.invalidate(CacheKey::AllItems).await;
        Ok(updated)
    }

    /// Soft-delete an item and drop both affected cache keys.
    pub async fn delete(&self, id: Uuid) -> Result<(), ItemServiceError> {
        self.store.soft_delete(id).await?;
        self.invalidate(CacheKey::Item(id)).await;
        self.invalidate(CacheKey::AllItems).await;
        Ok(())
    }

    async fn cached<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        match self.cache.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(key = %key, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    warn!(key = %key, error = %err, "discarding undecodable cache payload");
                    None
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(key = %key, "cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                warn!(key = %key, error = %err, "cache read failed; falling back to store");
                None
            }
        }
    }

    async fn populate<T: Serialize>(&self, key: CacheKey, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %key, error = %err, "skipping cache populate: serialization failed");
                return;
            }
        };

        if let Err(err) = self.cache.put(&key, &payload, self.ttl).await {
            warn!(key = %key, error = %err, "cache populate failed");
        }
    }

    async fn invalidate(&self, key: CacheKey) {
        counter!(METRIC_CACHE_INVALIDATE).increment(1);
        if let Err(err) = self.cache.remove(&[key]).await {
            warn!(key = %key, error = %err, "cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use crate::application::cache::CacheError;

    #[derive(Clone)]
    struct StoredItem {
        record: ItemRecord,
        deleted: bool,
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<StoredItem>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MemoryStore {
        fn seeded(items: &[ItemRecord]) -> Self {
            let store = Self::default();
            store
                .rows
                .lock()
                .unwrap()
                .extend(items.iter().cloned().map(|record| StoredItem {
                    record,
                    deleted: false,
                }));
            store
        }

        fn call_count(&self, name: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| **call == name)
                .count()
        }
    }

    #[async_trait]
    impl ItemStore for MemoryStore {
        async fn insert(&self, record: &ItemRecord) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push("insert");
            self.rows.lock().unwrap().push(StoredItem {
                record: record.clone(),
                deleted: false,
            });
            Ok(())
        }

        async fn list(&self) -> Result<Vec<ItemRecord>, StoreError> {
            self.calls.lock().unwrap().push("list");
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| !row.deleted)
                .map(|row| row.record.clone())
                .collect())
        }

        async fn fetch(&self, id: Uuid) -> Result<Option<ItemRecord>, StoreError> {
            self.calls.lock().unwrap().push("fetch");
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|row| !row.deleted && row.record.id == id)
                .map(|row| row.record.clone()))
        }

        async fn update(&self, record: &ItemRecord) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push("update");
            let mut rows = self.rows.lock().unwrap();
            match rows
                .iter_mut()
                .find(|row| !row.deleted && row.record.id == record.id)
            {
                Some(row) => {
                    row.record = record.clone();
                    Ok(())
                }
                None => Err(StoreError::NotFound),
            }
        }

        async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push("soft_delete");
            let mut rows = self.rows.lock().unwrap();
            match rows.iter_mut().find(|row| !row.deleted && row.record.id == id) {
                Some(row) => {
                    row.deleted = true;
                    Ok(())
                }
                None => Err(StoreError::NotFound),
            }
        }
    }

    /// Store stub whose every method fails, for fail-closed assertions.
    struct FailingStore;

    #[async_trait]
    impl ItemStore for FailingStore {
        async fn insert(&self, _record: &ItemRecord) -> Result<(), StoreError> {
            Err(StoreError::from_persistence("store offline"))
        }

        async fn list(&self) -> Result<Vec<ItemRecord>, StoreError> {
            Err(StoreError::from_persistence("store offline"))
        }

        async fn fetch(&self, _id: Uuid) -> Result<Option<ItemRecord>, StoreError> {
            Err(StoreError::from_persistence("store offline"))
        }

        async fn update(&self, _record: &ItemRecord) -> Result<(), StoreError> {
            Err(StoreError::from_persistence("store offline"))
        }

        async fn soft_delete(&self, _id: Uuid) -> Result<(), StoreError> {
            Err(StoreError::from_persistence("store offline"))
        }
    }

    /// In-memory cache that records every interaction in call order.
    #[derive(Default)]
    struct RecordingCache {
        entries: Mutex<HashMap<String, String>>,
        gets: Mutex<Vec<String>>,
        puts: Mutex<Vec<String>>,
        removals: Mutex<Vec<String>>,
    }

    impl RecordingCache {
        fn seed(&self, key: &str, payload: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), payload.to_string());
        }

        fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(key)
        }
    }

    #[async_trait]
    impl ItemCache for RecordingCache {
        async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
            let key = key.to_string();
            self.gets.lock().unwrap().push(key.clone());
            Ok(self.entries.lock().unwrap().get(&key).cloned())
        }

        async fn put(
            &self,
            key: &CacheKey,
            payload: &str,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            let key = key.to_string();
            self.puts.lock().unwrap().push(key.clone());
            self.entries.lock().unwrap().insert(key, payload.to_string());
            Ok(())
        }

        async fn remove(&self, keys: &[CacheKey]) -> Result<(), CacheError> {
            for key in keys {
                let key = key.to_string();
                self.entries.lock().unwrap().remove(&key);
                self.removals.lock().unwrap().push(key);
            }
            Ok(())
        }
    }

    /// Cache stub whose every method fails, for fail-open assertions.
    struct BrokenCache;

    #[async_trait]
    impl ItemCache for BrokenCache {
        async fn get(&self, _key: &CacheKey) -> Result<Option<String>, CacheError> {
            Err(CacheError::backend("cache offline"))
        }

        async fn put(
            &self,
            _key: &CacheKey,
            _payload: &str,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::backend("cache offline"))
        }

        async fn remove(&self, _keys: &[CacheKey]) -> Result<(), CacheError> {
            Err(CacheError::backend("cache offline"))
        }
    }

    fn widget(name: &str, price: f64) -> ItemRecord {
        ItemRecord::new(Uuid::new_v4(), name, price).expect("valid item")
    }

    fn service(store: Arc<MemoryStore>, cache: Arc<RecordingCache>) -> ItemService {
        let store: Arc<dyn ItemStore> = store;
        let cache: Arc<dyn ItemCache> = cache;
        ItemService::new(store, cache)
    }

    #[tokio::test]
    async fn create_persists_and_generates_identity() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        let created = service
            .create(CreateItemCommand {
                id: None,
                name: "Widget".into(),
                price: 9.99,
            })
            .await
            .expect("create succeeds");

        assert_ne!(created.id, Uuid::nil());
        assert_eq!(created.name, "Widget");
        assert_eq!(created.price, 9.99);
        assert_eq!(store.call_count("insert"), 1);

        let supplied = Uuid::new_v4();
        let kept = service
            .create(CreateItemCommand {
                id: Some(supplied),
                name: "Gadget".into(),
                price: 4.5,
            })
            .await
            .expect("create succeeds");
        assert_eq!(kept.id, supplied);
    }

    #[tokio::test]
    async fn create_invalidates_collection_key_only() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        let service = service(store, cache.clone());

        service
            .create(CreateItemCommand {
                id: None,
                name: "Widget".into(),
                price: 9.99,
            })
            .await
            .expect("create succeeds");

        assert_eq!(
            cache.removals.lock().unwrap().as_slice(),
            &["all_items".to_string()]
        );
        assert!(cache.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_invalid_input_without_side_effects() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        for command in [
            CreateItemCommand {
                id: None,
                name: String::new(),
                price: 5.0,
            },
            CreateItemCommand {
                id: None,
                name: "Widget".into(),
                price: 0.0,
            },
            CreateItemCommand {
                id: None,
                name: "Widget".into(),
                price: -1.0,
            },
        ] {
            let err = service.create(command).await.expect_err("invalid input");
            assert!(matches!(err, ItemServiceError::InvalidInput(_)));
        }

        assert!(store.calls.lock().unwrap().is_empty());
        assert!(cache.gets.lock().unwrap().is_empty());
        assert!(cache.puts.lock().unwrap().is_empty());
        assert!(cache.removals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_invalidation_makes_new_item_visible_to_list() {
        let existing = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[existing.clone()]));
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        // Prime the collection entry so the create has something stale to drop.
        service.list_all().await.expect("list succeeds");
        assert_eq!(store.call_count("list"), 1);

        let created = service
            .create(CreateItemCommand {
                id: None,
                name: "Gadget".into(),
                price: 4.5,
            })
            .await
            .expect("create succeeds");

        let listed = service.list_all().await.expect("list succeeds");
        assert_eq!(listed, vec![existing, created]);
        assert_eq!(store.call_count("list"), 2, "stale collection must be recomputed");

        let repeat = service.list_all().await.expect("list succeeds");
        assert_eq!(repeat, listed);
        assert_eq!(store.call_count("list"), 2, "repeat read must hit the cache");
    }

    #[tokio::test]
    async fn list_all_populates_then_serves_from_cache() {
        let first = widget("Widget", 9.99);
        let second = widget("Gadget", 4.5);
        let store = Arc::new(MemoryStore::seeded(&[first.clone(), second.clone()]));
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        let initial = service.list_all().await.expect("list succeeds");
        assert_eq!(initial, vec![first.clone(), second.clone()]);
        assert_eq!(store.call_count("list"), 1);
        assert!(cache.contains("all_items"));

        let repeat = service.list_all().await.expect("list succeeds");
        assert_eq!(repeat, initial);
        assert_eq!(store.call_count("list"), 1, "second read must hit the cache");
    }

    #[tokio::test]
    async fn fetch_prefers_cached_payload_over_store() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        cache.seed(
            &format!("item:{}", item.id),
            &serde_json::to_string(&item).expect("serialize"),
        );
        let service = service(store.clone(), cache);

        let fetched = service.fetch(item.id).await.expect("fetch succeeds");
        assert_eq!(fetched, item);
        assert_eq!(store.call_count("fetch"), 0);
    }

    #[tokio::test]
    async fn fetch_populates_cache_on_miss() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[item.clone()]));
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        let fetched = service.fetch(item.id).await.expect("fetch succeeds");
        assert_eq!(fetched, item);
        assert!(cache.contains(&format!("item:{}", item.id)));

        let repeat = service.fetch(item.id).await.expect("fetch succeeds");
        assert_eq!(repeat, item);
        assert_eq!(store.call_count("fetch"), 1, "second read must hit the cache");
    }

    #[tokio::test]
    async fn fetch_unknown_id_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        let service = service(store, cache.clone());

        let err = service.fetch(Uuid::new_v4()).await.expect_err("missing item");
        assert!(matches!(err, ItemServiceError::NotFound));
        assert!(cache.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_reports_store_failure_as_not_found() {
        let cache = Arc::new(RecordingCache::default());
        let store: Arc<dyn ItemStore> = Arc::new(FailingStore);
        let service = ItemService::new(store, cache);

        let err = service.fetch(Uuid::new_v4()).await.expect_err("store offline");
        assert!(matches!(err, ItemServiceError::NotFound));
    }

    #[tokio::test]
    async fn update_patches_fields_and_invalidates_both_keys() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[item.clone()]));
        let cache = Arc::new(RecordingCache::default());
        // Stale entries for both keys must be gone after the write.
        cache.seed(
            &format!("item:{}", item.id),
            &serde_json::to_string(&item).expect("serialize"),
        );
        cache.seed(
            "all_items",
            &serde_json::to_string(&vec![item.clone()]).expect("serialize"),
        );
        let service = service(store.clone(), cache.clone());

        let updated = service
            .update(
                item.id,
                UpdateItemCommand {
                    name: "Widget2".into(),
                    price: 12.0,
                },
            )
            .await
            .expect("update succeeds");

        assert_eq!(updated.id, item.id);
        assert_eq!(updated.name, "Widget2");
        assert_eq!(updated.price, 12.0);
        assert_eq!(
            cache.removals.lock().unwrap().as_slice(),
            &[format!("item:{}", item.id), "all_items".to_string()],
            "item key must be dropped before the collection key"
        );
        assert!(!cache.contains(&format!("item:{}", item.id)));
        assert!(!cache.contains("all_items"));

        let fetched = service.fetch(item.id).await.expect("fetch succeeds");
        assert_eq!(fetched, updated);
        let listed = service.list_all().await.expect("list succeeds");
        assert_eq!(listed, vec![updated]);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache);

        let err = service
            .update(
                Uuid::new_v4(),
                UpdateItemCommand {
                    name: "Widget2".into(),
                    price: 12.0,
                },
            )
            .await
            .expect_err("missing item");
        assert!(matches!(err, ItemServiceError::NotFound));
        assert_eq!(store.call_count("update"), 0);
    }

    #[tokio::test]
    async fn update_rejects_invalid_patch_before_write() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[item.clone()]));
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        let err = service
            .update(
                item.id,
                UpdateItemCommand {
                    name: String::new(),
                    price: 12.0,
                },
            )
            .await
            .expect_err("invalid patch");

        assert!(matches!(err, ItemServiceError::InvalidInput(_)));
        assert_eq!(store.call_count("update"), 0);
        assert!(cache.removals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_hides_item_and_invalidates_both_keys() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[item.clone()]));
        let cache = Arc::new(RecordingCache::default());
        let service = service(store.clone(), cache.clone());

        // Warm both keys so the delete has something to drop.
        service.list_all().await.expect("list succeeds");
        service.fetch(item.id).await.expect("fetch succeeds");

        service.delete(item.id).await.expect("delete succeeds");

        assert_eq!(
            cache.removals.lock().unwrap().as_slice(),
            &[format!("item:{}", item.id), "all_items".to_string()]
        );

        let err = service.fetch(item.id).await.expect_err("deleted item");
        assert!(matches!(err, ItemServiceError::NotFound));
        let listed = service.list_all().await.expect("list succeeds");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(RecordingCache::default());
        let service = service(store, cache.clone());

        let err = service.delete(Uuid::new_v4()).await.expect_err("missing item");
        assert!(matches!(err, ItemServiceError::NotFound));
        assert!(cache.removals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_failures_fall_open_for_every_operation() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[item.clone()]));
        let cache: Arc<dyn ItemCache> = Arc::new(BrokenCache);
        let service = ItemService::new(store, cache);

        let created = service
            .create(CreateItemCommand {
                id: None,
                name: "Gadget".into(),
                price: 4.5,
            })
            .await
            .expect("create succeeds despite cache failure");

        let listed = service.list_all().await.expect("list succeeds");
        assert_eq!(listed.len(), 2);

        let fetched = service.fetch(item.id).await.expect("fetch succeeds");
        assert_eq!(fetched, item);

        let updated = service
            .update(
                created.id,
                UpdateItemCommand {
                    name: "Gadget2".into(),
                    price: 5.5,
                },
            )
            .await
            .expect("update succeeds");
        assert_eq!(updated.name, "Gadget2");

        service.delete(created.id).await.expect("delete succeeds");
    }

    #[tokio::test]
    async fn store_failure_propagates_without_cache_population() {
        let store: Arc<dyn ItemStore> = Arc::new(FailingStore);
        let cache = Arc::new(RecordingCache::default());
        let service = ItemService::new(store, cache.clone());

        let err = service.list_all().await.expect_err("store offline");
        assert!(matches!(err, ItemServiceError::Store(_)));
        assert!(cache.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_cache_payload_falls_back_to_store() {
        let item = widget("Widget", 9.99);
        let store = Arc::new(MemoryStore::seeded(&[item.clone()]));
        let cache = Arc::new(RecordingCache::default());
        cache.seed("all_items", "not-json");
        let service = service(store.clone(), cache.clone());

        let listed = service.list_all().await.expect("list succeeds");
        assert_eq!(listed, vec![item]);
        assert_eq!(store.call_count("list"), 1);
        assert_eq!(
            cache.puts.lock().unwrap().as_slice(),
            &["all_items".to_string()],
            "fresh payload must replace the undecodable one"
        );
    }
}
