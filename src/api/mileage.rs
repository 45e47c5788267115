//! Mileage API endpoint for vehicle-mounted kits.

use axum::{extract::State, Json};
use chrono::Utc;

use super::{error, invalidate_cache, success, ApiResult};
use crate::errors::AppError;
use crate::models::{MileageRecord, SaveMileageRequest};
use crate::AppState;

/// PUT /api/mileage - Record a mileage reading, one record per bag, last
/// write wins.
pub async fn save_mileage(
    State(state): State<AppState>,
    Json(request): Json<SaveMileageRequest>,
) -> ApiResult<MileageRecord> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.bag_name.trim().is_empty() {
        return error(
            AppError::Validation("Bag name is required".to_string()),
            revision_id,
        );
    }

    let record = MileageRecord {
        km: request.km,
        date: request.date.trim().to_string(),
        captured_at: Utc::now().timestamp_millis(),
    };

    match state.repo.save_mileage(&request.bag_name, &record).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(record, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
