//! Bootstrap API endpoints.

use axum::extract::State;

use super::{error, success, ApiResult};
use crate::models::SnapshotData;
use crate::AppState;

/// GET /api/bootstrap - The consolidated read-model, served through the
/// three-tier cache.
pub async fn get_bootstrap(State(state): State<AppState>) -> ApiResult<SnapshotData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.cache.get().await {
        Ok(snapshot) => success(snapshot, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/bootstrap/rebuild - Force a full rebuild of both cache tiers.
pub async fn rebuild_bootstrap(State(state): State<AppState>) -> ApiResult<SnapshotData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.cache.rebuild().await {
        Ok(snapshot) => success(snapshot, revision_id),
        Err(e) => error(e, revision_id),
    }
}
