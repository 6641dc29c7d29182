//! SQLite course persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::store::{
    AssetRow, CourseStore, CourseSummary, ModuleRow, NewModule, NewUnit, NewUnitAsset,
    StoreError, StructureCounts, UnitRow,
};
use crate::models::CourseRecord;
use crate::utils::retry_on_lock;

/// Default window for lock retries on course writes
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

#[derive(Clone)]
pub struct SqliteCourseStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteCourseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    async fn write_course(&self, course: &CourseRecord, upsert: bool) -> Result<(), StoreError> {
        let conflict = if upsert {
            r#"
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                title = excluded.title,
                description = excluded.description,
                category_id = excluded.category_id,
                difficulty_id = excluded.difficulty_id,
                duration_minutes = excluded.duration_minutes,
                keywords = excluded.keywords,
                prerequisites = excluded.prerequisites,
                learning_outcomes = excluded.learning_outcomes,
                has_structured_content = excluded.has_structured_content,
                source_file_path = excluded.source_file_path,
                updated_at = excluded.updated_at
            "#
        } else {
            ""
        };

        let sql = format!(
            r#"
            INSERT INTO courses (
                id, slug, title, description, category_id, difficulty_id, duration_minutes,
                keywords, prerequisites, learning_outcomes, has_structured_content,
                source_file_path, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            {}
            "#,
            conflict
        );

        sqlx::query(&sql)
            .bind(course.id.to_string())
            .bind(&course.slug)
            .bind(&course.title)
            .bind(&course.description)
            .bind(&course.category_id)
            .bind(&course.difficulty_id)
            .bind(course.duration_minutes)
            .bind(to_json_list(&course.keywords))
            .bind(to_json_list(&course.prerequisites))
            .bind(to_json_list(&course.learning_outcomes))
            .bind(course.has_structured_content)
            .bind(&course.source_file_path)
            .bind(course.created_at.to_rfc3339())
            .bind(course.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl CourseStore for SqliteCourseStore {
    async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, slug, title, description, category_id, difficulty_id, duration_minutes,
                   keywords, prerequisites, learning_outcomes, has_structured_content,
                   source_file_path, created_at, updated_at
            FROM courses
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| course_from_row(&row)).transpose()
    }

    async fn insert_course(&self, course: &CourseRecord) -> Result<(), StoreError> {
        retry_on_lock("insert course", self.max_lock_wait_ms, || {
            self.write_course(course, false)
        })
        .await
    }

    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StoreError> {
        retry_on_lock("upsert course", self.max_lock_wait_ms, || {
            self.write_course(course, true)
        })
        .await
    }

    async fn clear_structure(&self, course_id: Uuid) -> Result<u64, StoreError> {
        retry_on_lock("clear course structure", self.max_lock_wait_ms, || async move {
            let id = course_id.to_string();
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                DELETE FROM course_unit_assets WHERE unit_id IN (
                    SELECT u.id FROM course_units u
                    JOIN course_modules m ON m.id = u.module_id
                    WHERE m.course_id = ?
                )
                "#,
            )
            .bind(&id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "DELETE FROM course_units WHERE module_id IN (SELECT id FROM course_modules WHERE course_id = ?)",
            )
            .bind(&id)
            .execute(&mut *tx)
            .await?;

            let removed = sqlx::query("DELETE FROM course_modules WHERE course_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            tx.commit().await?;
            Ok::<u64, StoreError>(removed)
        })
        .await
    }

    async fn insert_module(&self, module: &NewModule) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        retry_on_lock("insert module", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO course_modules (id, course_id, slug, title, description, order_index, duration_minutes)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(module.course_id.to_string())
            .bind(&module.slug)
            .bind(&module.title)
            .bind(&module.description)
            .bind(module.order_index)
            .bind(module.duration_minutes)
            .execute(&self.pool)
            .await?;
            Ok::<(), StoreError>(())
        })
        .await?;
        Ok(id)
    }

    async fn insert_unit(&self, unit: &NewUnit) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        retry_on_lock("insert unit", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO course_units (
                    id, module_id, slug, title, unit_type, content_format, content_body,
                    order_index, duration_minutes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(unit.module_id.to_string())
            .bind(&unit.slug)
            .bind(&unit.title)
            .bind(&unit.unit_type)
            .bind(&unit.content_format)
            .bind(&unit.content_body)
            .bind(unit.order_index)
            .bind(unit.duration_minutes)
            .execute(&self.pool)
            .await?;
            Ok::<(), StoreError>(())
        })
        .await?;
        Ok(id)
    }

    async fn insert_unit_asset(&self, asset: &NewUnitAsset) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        retry_on_lock("insert unit asset", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO course_unit_assets (
                    id, unit_id, file_name, storage_path, content_type, size_bytes, metadata
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(asset.unit_id.to_string())
            .bind(&asset.file_name)
            .bind(&asset.storage_path)
            .bind(&asset.content_type)
            .bind(asset.size_bytes)
            .bind(asset.metadata.to_string())
            .execute(&self.pool)
            .await?;
            Ok::<(), StoreError>(())
        })
        .await?;
        Ok(id)
    }

    async fn list_courses(&self) -> Result<Vec<CourseSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, slug, title, has_structured_content, updated_at FROM courses ORDER BY updated_at DESC, slug",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CourseSummary {
                    id: parse_uuid(row, "id")?,
                    slug: row.get("slug"),
                    title: row.get("title"),
                    has_structured_content: row.get("has_structured_content"),
                    updated_at: parse_timestamp(row, "updated_at")?,
                })
            })
            .collect()
    }

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<ModuleRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, slug, title, description, order_index, duration_minutes
            FROM course_modules
            WHERE course_id = ?
            ORDER BY order_index, slug
            "#,
        )
        .bind(course_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ModuleRow {
                    id: parse_uuid(row, "id")?,
                    slug: row.get("slug"),
                    title: row.get("title"),
                    description: row.get("description"),
                    order_index: row.get("order_index"),
                    duration_minutes: row.get("duration_minutes"),
                })
            })
            .collect()
    }

    async fn list_units(&self, course_id: Uuid) -> Result<Vec<UnitRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, m.slug AS module_slug, u.slug, u.title, u.unit_type,
                   u.content_format, u.content_body, u.order_index
            FROM course_units u
            JOIN course_modules m ON m.id = u.module_id
            WHERE m.course_id = ?
            ORDER BY m.order_index, m.slug, u.order_index, u.slug
            "#,
        )
        .bind(course_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(UnitRow {
                    id: parse_uuid(row, "id")?,
                    module_slug: row.get("module_slug"),
                    slug: row.get("slug"),
                    title: row.get("title"),
                    unit_type: row.get("unit_type"),
                    content_format: row.get("content_format"),
                    content_body: row.get("content_body"),
                    order_index: row.get("order_index"),
                })
            })
            .collect()
    }

    async fn list_unit_assets(&self, course_id: Uuid) -> Result<Vec<AssetRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, m.slug AS module_slug, u.slug AS unit_slug, a.file_name,
                   a.storage_path, a.content_type, a.size_bytes
            FROM course_unit_assets a
            JOIN course_units u ON u.id = a.unit_id
            JOIN course_modules m ON m.id = u.module_id
            WHERE m.course_id = ?
            ORDER BY a.storage_path
            "#,
        )
        .bind(course_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AssetRow {
                    id: parse_uuid(row, "id")?,
                    module_slug: row.get("module_slug"),
                    unit_slug: row.get("unit_slug"),
                    file_name: row.get("file_name"),
                    storage_path: row.get("storage_path"),
                    content_type: row.get("content_type"),
                    size_bytes: row.get("size_bytes"),
                })
            })
            .collect()
    }

    async fn count_structure(&self, course_id: Uuid) -> Result<StructureCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM course_modules WHERE course_id = ?1) AS modules,
                (SELECT COUNT(*) FROM course_units u
                    JOIN course_modules m ON m.id = u.module_id
                    WHERE m.course_id = ?1) AS units,
                (SELECT COUNT(*) FROM course_unit_assets a
                    JOIN course_units u ON u.id = a.unit_id
                    JOIN course_modules m ON m.id = u.module_id
                    WHERE m.course_id = ?1) AS assets
            "#,
        )
        .bind(course_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(StructureCounts {
            modules: row.get("modules"),
            units: row.get("units"),
            assets: row.get("assets"),
        })
    }
}

fn course_from_row(row: &SqliteRow) -> Result<CourseRecord, StoreError> {
    Ok(CourseRecord {
        id: parse_uuid(row, "id")?,
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        category_id: row.get("category_id"),
        difficulty_id: row.get("difficulty_id"),
        duration_minutes: row.get("duration_minutes"),
        keywords: from_json_list(row.get("keywords")),
        prerequisites: from_json_list(row.get("prerequisites")),
        learning_outcomes: from_json_list(row.get("learning_outcomes")),
        has_structured_content: row.get("has_structured_content"),
        source_file_path: row.get("source_file_path"),
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, StoreError> {
    let raw: String = row.get(column);
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", column, raw, e)))
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.get(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", column, raw, e)))
}

fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn from_json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}
