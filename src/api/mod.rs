//! REST API module.
//!
//! All handlers answer with the same envelope: `{success, data, revisionId}`
//! on success, `{success: false, error, revisionId}` on failure. Read paths
//! degrade to an error envelope rather than propagating; write paths
//! invalidate the snapshot cache before answering.

mod admin;
mod bootstrap;
mod checks;
mod mileage;
mod photos;

pub use admin::*;
pub use bootstrap::*;
pub use checks::*;
pub use mileage::*;
pub use photos::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: crate::errors::AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Rebuild the snapshot after a completed mutation. The mutation itself
/// already succeeded, so a rebuild failure is only logged; the next read
/// retries the rebuild.
pub(crate) async fn invalidate_cache(state: &AppState) {
    if let Err(e) = state.cache.invalidate().await {
        tracing::warn!("Snapshot rebuild after mutation failed: {}", e);
    }
}
