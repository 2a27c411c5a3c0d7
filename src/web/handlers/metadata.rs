//! Storage metadata handler.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::web::dto::StorageMetadataResponse;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /api/storage-metadata - Current deduplication figures.
#[utoipa::path(
    get,
    path = "/storage-metadata",
    tag = "storage",
    responses(
        (status = 200, description = "Storage accounting figures", body = StorageMetadataResponse)
    )
)]
pub async fn get_storage_metadata(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StorageMetadataResponse>, ApiError> {
    let metadata = state.accounting.get_metadata().await?;
    Ok(Json(metadata.into()))
}
