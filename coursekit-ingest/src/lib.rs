//! coursekit-ingest library interface
//!
//! Exposes the import pipeline and the HTTP router for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::db::CourseStore;
use crate::services::CourseImporter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<dyn CourseStore>,
    pub importer: Arc<CourseImporter>,
    pub startup_time: DateTime<Utc>,
    /// Last structural import failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Largest archive accepted by the upload endpoint
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(db: SqlitePool, store: Arc<dyn CourseStore>, importer: Arc<CourseImporter>) -> Self {
        let max_upload_bytes = importer.settings().limits.max_archive_bytes;
        Self {
            db,
            store,
            importer,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            max_upload_bytes,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::import_routes(state.max_upload_bytes))
        .merge(api::course_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
