//! Owner identity and request tracing middleware.
//!
//! Authentication happens upstream; the vault trusts a single header carrying
//! the authenticated owner id and only validates its shape.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;
use vault_core::OwnerId;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Header carrying a client-provided trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    ///
    /// Truncated to `MAX_TRACE_ID_LEN` characters, then filtered to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated owner request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedOwner(pub OwnerId);

fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default()
}

/// Resolve the owner header, if present.
///
/// A present but malformed header is an error rather than an anonymous request.
fn extract_owner(req: &Request, header: &str) -> ApiResult<Option<OwnerId>> {
    let Some(value) = req.headers().get(header) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("{header} is not valid ASCII")))?;
    OwnerId::new(value.trim())
        .map(Some)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))
}

/// Identity middleware: attaches the trace ID and the owner (when supplied).
///
/// Routes that need an owner call [`require_owner`]; the health probe does not.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    let owner = extract_owner(&req, &state.config.server.identity_header)?;
    let owner_str = owner
        .as_ref()
        .map(|o| o.to_string())
        .unwrap_or_default();
    if let Some(owner) = owner {
        req.extensions_mut().insert(AuthenticatedOwner(owner));
    }

    Ok(next
        .run(req)
        .instrument(tracing::info_span!(
            "request",
            trace_id = %trace_id_str,
            owner = %owner_str
        ))
        .await)
}

/// Require an authenticated owner.
pub fn require_owner(req: &Request) -> ApiResult<&OwnerId> {
    req.extensions()
        .get::<AuthenticatedOwner>()
        .map(|o| &o.0)
        .ok_or_else(|| ApiError::Unauthorized("missing owner identity".to_string()))
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
