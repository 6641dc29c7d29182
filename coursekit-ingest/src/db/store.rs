//! Relational storage contract for imported courses

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::CourseRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE constraint rejected the write; the only retryable failure
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// Lock contention outlasted the retry window
    #[error("Database locked after {attempts} attempts ({elapsed_ms} ms elapsed)")]
    LockTimeout { attempts: u32, elapsed_ms: u128 },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Row content that cannot be mapped back to a model
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
                constraint: db.message().to_string(),
            },
            _ => StoreError::Database(err),
        }
    }
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }

    /// Transient SQLite lock contention
    pub fn is_lock(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                let message = db.message();
                message.contains("database is locked") || message.contains("database table is locked")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewModule {
    pub course_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewUnit {
    pub module_id: Uuid,
    pub slug: String,
    pub title: String,
    pub unit_type: String,
    pub content_format: Option<String>,
    pub content_body: Option<String>,
    pub order_index: i64,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewUnitAsset {
    pub unit_id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub metadata: Value,
}

/// Row of the course listing
#[derive(Debug, Clone, Serialize)]
pub struct CourseSummary {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub has_structured_content: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitRow {
    pub id: Uuid,
    pub module_slug: String,
    pub slug: String,
    pub title: String,
    pub unit_type: String,
    pub content_format: Option<String>,
    pub content_body: Option<String>,
    pub order_index: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetRow {
    pub id: Uuid,
    pub module_slug: String,
    pub unit_slug: String,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StructureCounts {
    pub modules: i64,
    pub units: i64,
    pub assets: i64,
}

/// Course persistence primitives
///
/// Implementations must map UNIQUE constraint failures to
/// [`StoreError::UniqueViolation`]; the slug retry loop depends on it.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, StoreError>;

    /// Insert a new course row; fails on duplicate id or slug
    async fn insert_course(&self, course: &CourseRecord) -> Result<(), StoreError>;

    /// Insert or update by id; an update keeps the stored `created_at`
    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StoreError>;

    /// Delete every module, unit and unit asset of a course; returns the
    /// number of modules removed
    async fn clear_structure(&self, course_id: Uuid) -> Result<u64, StoreError>;

    async fn insert_module(&self, module: &NewModule) -> Result<Uuid, StoreError>;

    async fn insert_unit(&self, unit: &NewUnit) -> Result<Uuid, StoreError>;

    async fn insert_unit_asset(&self, asset: &NewUnitAsset) -> Result<Uuid, StoreError>;

    async fn list_courses(&self) -> Result<Vec<CourseSummary>, StoreError>;

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<ModuleRow>, StoreError>;

    async fn list_units(&self, course_id: Uuid) -> Result<Vec<UnitRow>, StoreError>;

    async fn list_unit_assets(&self, course_id: Uuid) -> Result<Vec<AssetRow>, StoreError>;

    async fn count_structure(&self, course_id: Uuid) -> Result<StructureCounts, StoreError>;
}
