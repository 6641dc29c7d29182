//! Database access for coursekit-ingest

pub mod courses;
pub mod store;

pub use courses::SqliteCourseStore;
pub use store::{
    AssetRow, CourseStore, CourseSummary, ModuleRow, NewModule, NewUnit, NewUnitAsset,
    StoreError, StructureCounts, UnitRow,
};

use coursekit_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the shared database and create the course tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = coursekit_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Private in-memory database with every table, for tests and dry runs
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = coursekit_common::db::init_memory_database().await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create course tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            description TEXT,
            category_id TEXT,
            difficulty_id TEXT,
            duration_minutes INTEGER,
            keywords TEXT NOT NULL DEFAULT '[]',
            prerequisites TEXT NOT NULL DEFAULT '[]',
            learning_outcomes TEXT NOT NULL DEFAULT '[]',
            has_structured_content INTEGER NOT NULL DEFAULT 0,
            source_file_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_modules (
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            order_index INTEGER NOT NULL,
            duration_minutes INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (course_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_units (
            id TEXT PRIMARY KEY,
            module_id TEXT NOT NULL REFERENCES course_modules(id) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            unit_type TEXT NOT NULL DEFAULT 'chapter',
            content_format TEXT,
            content_body TEXT,
            order_index INTEGER NOT NULL,
            duration_minutes INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (module_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // storage_path is NOT NULL: assets without a successful upload are never stored
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_unit_assets (
            id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL REFERENCES course_units(id) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_course_modules_course ON course_modules(course_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_course_units_module ON course_units(module_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_course_unit_assets_unit ON course_unit_assets(unit_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (courses, course_modules, course_units, course_unit_assets)"
    );

    Ok(())
}
