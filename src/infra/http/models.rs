use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize)]
pub struct ItemCreateRequest {
    /// Optional caller-supplied identity; the service generates one otherwise.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ItemUpdateRequest {
    pub name: String,
    pub price: f64,
}
