//! Photo and impact-photo API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, invalidate_cache, success, ApiResult};
use crate::models::{
    LatestPhotoMeta, PhotoEvent, PhotoKeyQuery, PhotoSaved, PhotoView, SaveImpactRequest,
    SavePhotoRequest, UpdateCommentRequest,
};
use crate::AppState;

/// POST /api/photos - Store a check photo for a {category, bag, section}
/// key.
pub async fn save_photo(
    State(state): State<AppState>,
    Json(request): Json<SavePhotoRequest>,
) -> ApiResult<PhotoSaved> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .photos
        .save_check_photo(&request.category, &request.bag, &request.section, &request.data)
        .await
    {
        Ok(saved) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(saved, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/photos?category=..&bag=..&section=.. - All photos of a key,
/// newest first.
pub async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotoKeyQuery>,
) -> ApiResult<Vec<PhotoView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .photos
        .list_check_photos(&query.category, &query.bag, &query.section)
        .await
    {
        Ok(photos) => success(photos, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/photos/latest?category=..&bag=..&section=.. - Newest photo of
/// a key, or an explicit "no photo" marker.
pub async fn latest_photo(
    State(state): State<AppState>,
    Query(query): Query<PhotoKeyQuery>,
) -> ApiResult<LatestPhotoMeta> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .photos
        .latest_check_photo_meta(&query.category, &query.bag, &query.section)
        .await
    {
        Ok(meta) => success(meta, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/photos/{id} - Soft-delete a photo of either family.
pub async fn delete_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.photos.delete_photo(&id).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/photos/events - The photo event log, newest first.
pub async fn photo_events(State(state): State<AppState>) -> ApiResult<Vec<PhotoEvent>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.photos.events_newest_first().await {
        Ok(events) => success(events, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/impacts - Store an impact photo for a bag.
pub async fn save_impact(
    State(state): State<AppState>,
    Json(request): Json<SaveImpactRequest>,
) -> ApiResult<PhotoSaved> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .photos
        .save_impact_photo(&request.bag, &request.data, &request.comment)
        .await
    {
        Ok(saved) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(saved, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/impacts/{bag} - All impact photos of a bag, newest first.
pub async fn list_impacts(
    State(state): State<AppState>,
    Path(bag): Path<String>,
) -> ApiResult<Vec<PhotoView>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.photos.list_impact_photos(&bag).await {
        Ok(photos) => success(photos, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/impacts/{id}/comment - Edit an impact photo comment.
pub async fn update_impact_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCommentRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.photos.update_impact_comment(&id, &request.comment).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
