//! Store trait describing the persistence adapter for items.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::items::ItemRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("item not found")]
    NotFound,
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// System of record for items. Deleted rows stay in place but are hidden
/// from every read, so an insert after a delete of the same id is a conflict.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert(&self, record: &ItemRecord) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<ItemRecord>, StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<ItemRecord>, StoreError>;

    /// Replace the mutable fields of an existing item. Fails with
    /// [`StoreError::NotFound`] when the id is absent or already deleted.
    async fn update(&self, record: &ItemRecord) -> Result<(), StoreError>;

    /// Mark an item deleted without removing the row. Fails with
    /// [`StoreError::NotFound`] when the id is absent or already deleted.
    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError>;
}
