//! Kitcheck Backend
//!
//! REST backend tracking the verification and expiry status of medical
//! emergency kits, with SQLite persistence, filesystem photo storage and a
//! daily alert sweep.

mod alerts;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod mailer;
mod models;
mod photos;
mod snapshot;
mod status;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use mailer::{LogMailer, Mailer};
use photos::{PhotoIndex, PhotoStore};
use snapshot::SnapshotCache;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub photos: Arc<PhotoIndex>,
    pub cache: Arc<SnapshotCache>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kitcheck Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Photo directory: {:?}", config.photo_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (KITCHECK_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    // One-time data hygiene: collapse duplicate category spellings and
    // backfill missing display ranks. Both are idempotent.
    repo.normalize_categories().await?;
    repo.assign_missing_display_orders().await?;
    let templates = repo.form_templates().await?;
    tracing::info!("Form templates loaded for {} categories", templates.len());

    // Initialize photo storage and the snapshot cache
    let store = PhotoStore::open(&config.photo_dir)?;
    let photos = Arc::new(PhotoIndex::new(repo.clone(), store));
    let cache = Arc::new(SnapshotCache::new(repo.clone(), photos.clone()));

    // Create application state
    let state = AppState {
        repo: Arc::new(repo),
        photos,
        cache,
        mailer: Arc::new(LogMailer),
        config: Arc::new(config.clone()),
    };

    // Install the daily alert sweep
    alerts::spawn_daily(state.clone(), config.alert_hour);
    tracing::info!("Daily alert sweep scheduled at {}h00", config.alert_hour);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Bootstrap
        .route("/bootstrap", get(api::get_bootstrap))
        .route("/bootstrap/rebuild", post(api::rebuild_bootstrap))
        // Verification
        .route("/checks", post(api::save_check))
        // Photos
        .route("/photos", post(api::save_photo))
        .route("/photos", get(api::list_photos))
        .route("/photos/latest", get(api::latest_photo))
        .route("/photos/events", get(api::photo_events))
        .route("/photos/{id}", delete(api::delete_photo))
        // Impact photos (GET lists by bag name, DELETE removes by file id)
        .route("/impacts", post(api::save_impact))
        .route("/impacts/{id}", get(api::list_impacts).delete(api::delete_photo))
        .route("/impacts/{id}/comment", put(api::update_impact_comment))
        // Mileage
        .route("/mileage", put(api::save_mileage))
        // Bags
        .route("/bags", post(api::add_bag))
        .route("/bags/locations", put(api::update_locations))
        .route("/bags/orders", put(api::update_orders))
        .route("/bags/{name}", delete(api::delete_bag))
        .route("/bags/{name}/rename", put(api::rename_bag))
        .route("/bags/{name}/state", put(api::set_bag_state))
        .route("/bags/{name}/alert-recipients", put(api::set_alert_recipients))
        // Categories
        .route("/categories", post(api::create_category))
        .route("/categories/frequencies", put(api::replace_frequencies))
        .route("/categories/{name}", delete(api::delete_category))
        .route("/categories/{name}/rename", put(api::rename_category))
        .route("/categories/{name}/template", put(api::update_template))
        // Options & mail templates
        .route("/options", put(api::save_options))
        .route("/mail-templates", put(api::save_mail_templates))
        // History
        .route("/history/{index}", delete(api::delete_history_entry))
        // Alerts
        .route("/alerts/run", post(api::run_alert_sweep))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::require_psk(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
