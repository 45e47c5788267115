//! Verification API endpoint.

use axum::{extract::State, Json};
use chrono::Utc;

use super::{error, invalidate_cache, success, ApiResult};
use crate::errors::AppError;
use crate::models::{Bag, BagStatus, SaveCheckRequest};
use crate::status;
use crate::AppState;

/// POST /api/checks - Record a completed verification.
///
/// Sets last control to today and next control to today plus the category
/// frequency, classifies the bag (an expired contained item wins and turns
/// it purple), and appends a history entry carrying the form answers plus
/// the expired-item and elapsed-time annotations.
pub async fn save_check(
    State(state): State<AppState>,
    Json(request): Json<SaveCheckRequest>,
) -> ApiResult<Bag> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.bag_name.trim().is_empty() {
        return error(
            AppError::Validation("Bag name is required".to_string()),
            revision_id,
        );
    }

    let bag = match state.repo.get_bag(&request.bag_name).await {
        Ok(Some(bag)) => bag,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Bag {} not found", request.bag_name)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    let frequency = match state.repo.category_frequency(&bag.category).await {
        Ok(days) => days,
        Err(e) => return error(e, revision_id),
    };

    let today = Utc::now().date_naive();
    let next_control = today + chrono::Duration::days(frequency);

    let item_expiry = status::parse_date(&request.next_item_expiry);
    // next_control is always set here, so classify always answers.
    let new_status =
        status::classify(today, Some(next_control), item_expiry).unwrap_or(BagStatus::Green);

    // Store the expiry in ISO form when it parsed; keep the raw string
    // otherwise so the verifier sees what they typed.
    let stored_expiry = match item_expiry {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => request.next_item_expiry.trim().to_string(),
    };

    let mut details = request.answers.to_string();
    if new_status == BagStatus::Purple {
        details.push_str(&format!(" || OBJET PÉRIMÉ : {}", request.next_item_name));
    }
    if !request.elapsed.trim().is_empty() {
        details.push_str(&format!(" [⏱️ {}]", request.elapsed.trim()));
    }

    let apply = state
        .repo
        .apply_check(
            &request.bag_name,
            &today.format("%Y-%m-%d").to_string(),
            &next_control.format("%Y-%m-%d").to_string(),
            new_status,
            &request.verifier,
            &request.next_item_name,
            &stored_expiry,
        )
        .await;
    if let Err(e) = apply {
        return error(e, revision_id);
    }

    if let Err(e) = state
        .repo
        .append_history(&request.bag_name, &request.verifier, &details)
        .await
    {
        return error(e, revision_id);
    }

    invalidate_cache(&state).await;

    match state.repo.get_bag(&request.bag_name).await {
        Ok(Some(updated)) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(updated, new_revision)
        }
        Ok(None) => error(
            AppError::NotFound(format!("Bag {} not found", request.bag_name)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}
