//! Item handlers

use axum::Json;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::items::{CreateItemCommand, UpdateItemCommand};

use super::AppState;
use super::error::ApiError;
use super::models::{ItemCreateRequest, ItemUpdateRequest};

/// Item id path segment. A malformed value is answered with the standard
/// error envelope instead of axum's plain-text rejection.
pub struct ItemId(pub Uuid);

impl<S> FromRequestParts<S> for ItemId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<Uuid>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Self(id)),
            Err(rejection) => Err(ApiError::bad_request(
                "Invalid item identifier",
                Some(rejection.body_text()),
            )),
        }
    }
}

pub async fn create_item(
    State(state): State<AppState>,
    Json(payload): Json<ItemCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = CreateItemCommand {
        id: payload.id,
        name: payload.name,
        price: payload.price,
    };

    let item = state.items.create(command).await?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list_items(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.items.list_all().await?;

    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<AppState>,
    ItemId(id): ItemId,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.items.fetch(id).await?;

    Ok(Json(item))
}

pub async fn update_item(
    State(state): State<AppState>,
    ItemId(id): ItemId,
    Json(payload): Json<ItemUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = UpdateItemCommand {
        name: payload.name,
        price: payload.price,
    };

    let item = state.items.update(id, command).await?;

    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    ItemId(id): ItemId,
) -> Result<impl IntoResponse, ApiError> {
    state.items.delete(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
