//! The `Item` aggregate: a priced catalog entry addressed by UUID.
//!
//! Construction is the validation boundary. An [`ItemRecord`] can only exist
//! with a non-empty name and a strictly positive price, so every layer above
//! (service, cache payloads, HTTP responses) can treat the record as valid by
//! construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;

/// A validated item as it is persisted and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
}

impl ItemRecord {
    /// Build a record, enforcing the item invariants.
    pub fn new(id: Uuid, name: impl Into<String>, price: f64) -> Result<Self, DomainError> {
        let name = name.into();
        validate_name(&name)?;
        validate_price(price)?;
        Ok(Self { id, name, price })
    }

    /// Re-validate and apply replacement fields, keeping the identity stable.
    pub fn with_fields(&self, name: impl Into<String>, price: f64) -> Result<Self, DomainError> {
        Self::new(self.id, name, price)
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("item name must not be empty"));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), DomainError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(DomainError::validation(
            "item price must be greater than zero",
        ));
    }
    Ok(())
}
