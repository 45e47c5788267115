//! Admin API endpoints: bag and category management, global options, mail
//! templates, history maintenance and the manual alert trigger.
//!
//! Every mutation here must touch each table carrying the mutated key (see
//! the rename/delete handlers) and ends by invalidating the snapshot cache.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, invalidate_cache, success, ApiResult};
use crate::alerts::{run_sweep, AlertSweepReport};
use crate::errors::AppError;
use crate::models::{
    AddBagRequest, Bag, BatchOutcome, CategoryConfig, CreateCategoryRequest, GlobalOptions,
    LocationUpdate, MailTemplates, OrderUpdate, RenameRequest, ReplaceFrequenciesRequest,
    SetAlertRecipientsRequest, SetBagStateRequest, UpdateTemplateRequest,
};
use crate::AppState;

// ==================== BAGS ====================

/// POST /api/bags - Register a new bag.
pub async fn add_bag(
    State(state): State<AppState>,
    Json(request): Json<AddBagRequest>,
) -> ApiResult<Bag> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.name.trim().is_empty() || request.category.trim().is_empty() {
        return error(
            AppError::Validation("Category and bag name are required".to_string()),
            revision_id,
        );
    }

    match state.repo.add_bag(&request.category, request.name.trim()).await {
        Ok(bag) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(bag, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/bags/{name} - Remove a bag. Its history and photos stay
/// behind as an audit trail.
pub async fn delete_bag(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_bag(&name).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/bags/{name}/rename - Rename a bag everywhere its name is a
/// key: the inventory row, every history row, and every photo blob of
/// both families.
pub async fn rename_bag(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let new_name = request.new_name.trim();
    if new_name.is_empty() {
        return error(
            AppError::Validation("New bag name is required".to_string()),
            revision_id,
        );
    }

    if let Err(e) = state.repo.rename_bag_rows(&name, new_name).await {
        return error(e, revision_id);
    }

    if let Err(e) = state.photos.rename_bag(&name, new_name).await {
        return error(e, revision_id);
    }

    invalidate_cache(&state).await;
    let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
    success((), new_revision)
}

/// PUT /api/bags/{name}/state - Flip a bag in or out of service.
pub async fn set_bag_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SetBagStateRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.set_bag_state(&name, request.state).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/bags/{name}/alert-recipients - Set the orange and/or red alert
/// addresses of a bag.
pub async fn set_alert_recipients(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SetAlertRecipientsRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .set_bag_alert_recipients(
            &name,
            request.mail_orange.as_deref(),
            request.mail_red.as_deref(),
        )
        .await
    {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/bags/locations - Best-effort batch location update; unmatched
/// names are reported, not rejected.
pub async fn update_locations(
    State(state): State<AppState>,
    Json(updates): Json<Vec<LocationUpdate>>,
) -> ApiResult<BatchOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_locations(&updates).await {
        Ok(outcome) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(outcome, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/bags/orders - Best-effort batch display-order update.
pub async fn update_orders(
    State(state): State<AppState>,
    Json(updates): Json<Vec<OrderUpdate>>,
) -> ApiResult<BatchOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_orders(&updates).await {
        Ok(outcome) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(outcome, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

// ==================== CATEGORIES ====================

/// POST /api/categories - Create a category (default frequency 30 days).
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<CategoryConfig> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .create_category(&request.name, request.frequency_days)
        .await
    {
        Ok(config) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(config, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/categories/{name}/rename - Rename a category in the config,
/// the inventory and the form templates. History rows do not store the
/// category and are untouched.
pub async fn rename_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.rename_category(&name, &request.new_name).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/categories/{name} - Remove a category, its bags and its
/// form template. History and photos survive.
pub async fn delete_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_category(&name).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/categories/frequencies - Replace the whole frequency table.
pub async fn replace_frequencies(
    State(state): State<AppState>,
    Json(request): Json<ReplaceFrequenciesRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.replace_frequencies(&request.categories).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/categories/{name}/template - Replace a category's checklist
/// rows and regenerate the template map wholesale.
pub async fn update_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateTemplateRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.replace_category_rows(&name, &request.rows).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

// ==================== OPTIONS, MAIL, HISTORY, ALERTS ====================

/// PUT /api/options - Save the global option switches.
pub async fn save_options(
    State(state): State<AppState>,
    Json(options): Json<GlobalOptions>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.save_global_options(&options).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/mail-templates - Save the alert mail templates.
pub async fn save_mail_templates(
    State(state): State<AppState>,
    Json(templates): Json<MailTemplates>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.save_mail_templates(&templates).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/history/{index} - Delete a history entry by its position
/// from the newest (0 = most recent), matching the display order.
pub async fn delete_history_entry(
    State(state): State<AppState>,
    Path(index): Path<i64>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if index < 0 {
        return error(
            AppError::Validation("History index must be non-negative".to_string()),
            revision_id,
        );
    }

    match state.repo.delete_history_entry(index).await {
        Ok(()) => {
            invalidate_cache(&state).await;
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/alerts/run - Trigger the daily alert sweep now.
pub async fn run_alert_sweep(State(state): State<AppState>) -> ApiResult<AlertSweepReport> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match run_sweep(&state).await {
        Ok(report) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(report, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
