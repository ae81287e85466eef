//! Upload session handlers.

use crate::auth::{get_trace_id, require_owner};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use http_body_util::LengthLimitError;
use vault_core::SessionId;
use vault_core::upload::{
    CompleteUploadResponse, InitiateUploadRequest, InitiateUploadResponse, UploadPartResponse,
    UploadStatusResponse,
};

/// Maximum size of the initiate request body (1 MB).
const MAX_INITIATE_BODY_SIZE: usize = 1024 * 1024;

fn parse_session_id(session_id: &str) -> ApiResult<SessionId> {
    SessionId::parse(session_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid session ID: {e}")))
}

fn parse_part_number(part_number: &str) -> ApiResult<u32> {
    part_number
        .parse()
        .map_err(|_| ApiError::InvalidPart(format!("invalid part number: {part_number}")))
}

fn part_body_error(e: axum::Error, limit: u64) -> ApiError {
    let inner = e.into_inner();
    if inner.downcast_ref::<LengthLimitError>().is_some() {
        ApiError::PartTooLarge { limit }
    } else {
        ApiError::BadRequest(format!("failed to read body: {inner}"))
    }
}

/// POST /v1/uploads - Initiate a chunked upload.
#[tracing::instrument(skip(state, req))]
pub async fn initiate_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<InitiateUploadResponse>)> {
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let owner = require_owner(&req)?.clone();

    let body: InitiateUploadRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_INITIATE_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?
    };

    let response = state.manager.initiate(&owner, body).await?;

    tracing::debug!(
        trace_id = %trace_id,
        session_id = %response.session_id,
        "Initiate request served"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /v1/uploads/{session_id} - Upload progress for resuming.
#[tracing::instrument(skip(state, req), fields(session_id = %session_id))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    req: Request,
) -> ApiResult<Json<UploadStatusResponse>> {
    let owner = require_owner(&req)?;
    let session_id = parse_session_id(&session_id)?;

    Ok(Json(state.manager.get_status(owner, session_id).await?))
}

/// PUT /v1/uploads/{session_id}/parts/{part_number} - Upload one part (raw body).
#[tracing::instrument(skip(state, req), fields(session_id = %session_id, part_number = %part_number))]
pub async fn upload_part(
    State(state): State<AppState>,
    Path((session_id, part_number)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Json<UploadPartResponse>> {
    let owner = require_owner(&req)?.clone();
    let session_id = parse_session_id(&session_id)?;
    let part_number = parse_part_number(&part_number)?;

    let max_bytes = state.config.server.max_part_body_bytes;
    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    let data = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| part_body_error(e, max_bytes))?;

    Ok(Json(
        state
            .manager
            .upload_part(&owner, session_id, part_number, data)
            .await?,
    ))
}

/// POST /v1/uploads/{session_id}/complete - Finalize the upload into a file.
#[tracing::instrument(skip(state, req), fields(session_id = %session_id))]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    req: Request,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let owner = require_owner(&req)?;
    let session_id = parse_session_id(&session_id)?;

    Ok(Json(state.manager.complete_upload(owner, session_id).await?))
}

/// DELETE /v1/uploads/{session_id} - Abort the upload.
#[tracing::instrument(skip(state, req), fields(session_id = %session_id))]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let owner = require_owner(&req)?;
    let session_id = parse_session_id(&session_id)?;

    state.manager.abort_upload(owner, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
