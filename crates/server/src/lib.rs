//! HTTP server and chunked upload orchestrator for the encrypted file vault.
//!
//! This crate provides:
//! - The upload session manager (initiate, parts, complete, abort, status)
//! - Per-owner quota admission with in-flight reservations
//! - The file catalog and usage report
//! - The background expiry reaper
//! - The axum router exposing all of the above

pub mod auth;
pub mod catalog;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod metrics;
pub mod quota;
pub mod reaper;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedOwner, TraceId};
pub use catalog::FileCatalog;
pub use error::{ApiError, ApiResult};
pub use manager::{AbortOutcome, UploadSessionManager};
pub use quota::{Admission, QuotaLedger};
pub use reaper::{ExpiryReaper, ReaperStats};
pub use routes::create_router;
pub use state::AppState;
