use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::store::{ItemStore, StoreError},
    domain::items::ItemRecord,
};

use super::{PostgresStore, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    name: String,
    price: f64,
}

impl From<ItemRow> for ItemRecord {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
        }
    }
}

#[async_trait]
impl ItemStore for PostgresStore {
    async fn insert(&self, record: &ItemRecord) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO items (id, name, price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(record.price)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<ItemRecord>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, name, price
            FROM items
            WHERE deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<ItemRecord>, StoreError> {
        let row: Option<ItemRow> = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, name, price
            FROM items
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ItemRecord::from))
    }

    async fn update(&self, record: &ItemRecord) -> Result<(), StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE items
            SET name = $2,
                price = $3,
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(record.price)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE items
            SET deleted_at = now(),
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }
}
