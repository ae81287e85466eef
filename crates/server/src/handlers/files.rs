//! File catalog and usage handlers.

use crate::auth::require_owner;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use vault_core::FileId;
use vault_core::file::{FileEntryResponse, UsageResponse};

fn parse_file_id(file_id: &str) -> ApiResult<FileId> {
    FileId::parse(file_id).map_err(|e| ApiError::BadRequest(format!("invalid file ID: {e}")))
}

/// GET /v1/files/{file_id} - Fetch a catalogued file's metadata.
#[tracing::instrument(skip(state, req), fields(file_id = %file_id))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    req: Request,
) -> ApiResult<Json<FileEntryResponse>> {
    let owner = require_owner(&req)?;
    let file_id = parse_file_id(&file_id)?;

    Ok(Json(state.catalog.get(owner, file_id).await?))
}

/// DELETE /v1/files/{file_id} - Delete a file and its stored object.
#[tracing::instrument(skip(state, req), fields(file_id = %file_id))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let owner = require_owner(&req)?;
    let file_id = parse_file_id(&file_id)?;

    state.catalog.delete(owner, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/usage - Storage usage against the quota.
#[tracing::instrument(skip(state, req))]
pub async fn get_usage(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<UsageResponse>> {
    let owner = require_owner(&req)?;
    Ok(Json(state.catalog.usage(owner).await?))
}
