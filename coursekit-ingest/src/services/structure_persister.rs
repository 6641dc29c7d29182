//! Course structure persistence
//!
//! 1. Claim the course row before anything is uploaded: upsert by id for a
//!    re-import, insert for a new course. A unique-slug violation retries with
//!    `-1`, `-2`, ... so two imports racing on the same title both succeed,
//!    and the claimed slug namespaces every storage key of the import.
//! 2. Write the final course row under the claimed slug.
//! 3. Delete the previous module/unit/asset tree of the course.
//! 4. Insert modules, units and unit assets, each keyed to its parent's id.
//!    Individual insert failures are warnings; siblings continue.
//! 5. Attach loose assets whose (module, unit) target was inserted.
//!
//! Only steps 1 to 3 can fail the import.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::slug::{slugify, with_suffix};
use crate::db::{CourseStore, NewModule, NewUnit, NewUnitAsset, StoreError};
use crate::error::IngestError;
use crate::models::{
    CoursePayload, CourseRecord, CourseTree, StoredAsset, WarningCode, WarningLog,
};

/// Upper bound on slug suffix attempts
pub const DEFAULT_MAX_SLUG_ATTEMPTS: u32 = 1000;

/// Course row reserved ahead of uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedCourse {
    pub id: Uuid,
    /// Final, collision-free slug
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// What ended up in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCourse {
    pub course_id: Uuid,
    pub slug: String,
    pub modules: usize,
    pub units: usize,
    pub assets: usize,
}

pub struct StructurePersister<'a> {
    store: &'a dyn CourseStore,
    max_slug_attempts: u32,
}

impl<'a> StructurePersister<'a> {
    pub fn new(store: &'a dyn CourseStore) -> Self {
        Self {
            store,
            max_slug_attempts: DEFAULT_MAX_SLUG_ATTEMPTS,
        }
    }

    pub fn with_max_slug_attempts(mut self, attempts: u32) -> Self {
        self.max_slug_attempts = attempts.max(1);
        self
    }

    /// Reserve the course row and its final slug
    pub async fn claim_course(
        &self,
        course: &CoursePayload,
        has_structured_content: bool,
        target_course_id: Option<Uuid>,
    ) -> Result<ClaimedCourse, IngestError> {
        match target_course_id {
            Some(id) => self.update_course(id, course, has_structured_content).await,
            None => self.create_course(course, has_structured_content).await,
        }
    }

    /// Write the final course row and replace its structure
    pub async fn persist(
        &self,
        claimed: &ClaimedCourse,
        tree: &CourseTree,
        warnings: &mut WarningLog,
    ) -> Result<PersistedCourse, IngestError> {
        let course_id = claimed.id;
        let mut record = CourseRecord::from_tree(course_id, &claimed.slug, tree, Utc::now());
        record.created_at = claimed.created_at;
        self.store.upsert_course(&record).await.map_err(|e| {
            error!(course_id = %course_id, error = %e, "Failed to write course row");
            IngestError::PersistenceFailure(format!(
                "Writing course '{}' failed: {}",
                claimed.slug, e
            ))
        })?;

        let removed = self.store.clear_structure(course_id).await.map_err(|e| {
            error!(course_id = %course_id, error = %e, "Failed to clear previous structure");
            IngestError::PersistenceFailure(format!("Clearing previous structure failed: {}", e))
        })?;
        if removed > 0 {
            info!(course_id = %course_id, modules = removed, "Cleared previous course structure");
        }

        let mut persisted = PersistedCourse {
            course_id,
            slug: claimed.slug.clone(),
            modules: 0,
            units: 0,
            assets: 0,
        };
        let mut unit_ids: HashMap<(String, String), Uuid> = HashMap::new();

        for module in &tree.modules {
            let new_module = NewModule {
                course_id,
                slug: module.slug.clone(),
                title: module.title.clone(),
                description: module.description.clone(),
                order_index: module.order_index,
                duration_minutes: module.duration_minutes,
            };
            let module_id = match self.store.insert_module(&new_module).await {
                Ok(id) => id,
                Err(e) => {
                    warnings.push(
                        WarningCode::ModuleInsertFailed,
                        module.slug.clone(),
                        format!("Module skipped with its units: {}", e),
                    );
                    continue;
                }
            };
            persisted.modules += 1;

            for unit in &module.units {
                let path = format!("{}/{}", module.slug, unit.slug);
                let new_unit = NewUnit {
                    module_id,
                    slug: unit.slug.clone(),
                    title: unit.title.clone(),
                    unit_type: unit.unit_type.clone(),
                    content_format: unit.content.as_ref().map(|c| c.format.clone()),
                    content_body: unit.content.as_ref().map(|c| c.body.clone()),
                    order_index: unit.order_index,
                    duration_minutes: unit.duration_minutes,
                };
                let unit_id = match self.store.insert_unit(&new_unit).await {
                    Ok(id) => id,
                    Err(e) => {
                        warnings.push(
                            WarningCode::UnitInsertFailed,
                            path,
                            format!("Unit skipped: {}", e),
                        );
                        continue;
                    }
                };
                persisted.units += 1;
                unit_ids.insert((module.slug.clone(), unit.slug.clone()), unit_id);

                for asset in &unit.assets {
                    if self.insert_asset(unit_id, asset, &path, warnings).await {
                        persisted.assets += 1;
                    }
                }
            }
        }

        for loose in &tree.loose_assets {
            let Some((module_slug, unit_slug)) = loose.target() else {
                continue;
            };
            let key = (slugify(module_slug, ""), slugify(unit_slug, ""));
            let Some(&unit_id) = unit_ids.get(&key) else {
                debug!(
                    module = %module_slug,
                    unit = %unit_slug,
                    asset = %loose.asset.storage_path,
                    "Loose asset target not found; not attached"
                );
                continue;
            };
            let path = format!("{}/{}", key.0, key.1);
            if self.insert_asset(unit_id, &loose.asset, &path, warnings).await {
                persisted.assets += 1;
            }
        }

        info!(
            course_id = %persisted.course_id,
            course_slug = %persisted.slug,
            modules = persisted.modules,
            units = persisted.units,
            assets = persisted.assets,
            "Course structure persisted"
        );
        Ok(persisted)
    }

    /// Re-import: keep the stored slug unless the archive declares one
    async fn update_course(
        &self,
        id: Uuid,
        course: &CoursePayload,
        has_structured_content: bool,
    ) -> Result<ClaimedCourse, IngestError> {
        let existing = self.store.find_course(id).await.map_err(|e| {
            IngestError::PersistenceFailure(format!("Loading course {} failed: {}", id, e))
        })?;

        let base_slug = match &existing {
            Some(stored) if !course.slug_declared => stored.slug.clone(),
            _ => course.slug.clone(),
        };
        let now = Utc::now();
        let created_at = existing.as_ref().map(|c| c.created_at).unwrap_or(now);

        let slug = self
            .with_free_slug(&base_slug, |slug| {
                let mut record =
                    CourseRecord::from_payload(id, slug, course, has_structured_content, now);
                record.created_at = created_at;
                if let Some(stored) = &existing {
                    record.source_file_path = stored.source_file_path.clone();
                }
                async move { self.store.upsert_course(&record).await }
            })
            .await?;

        info!(course_id = %id, course_slug = %slug, "Course claimed for update");
        Ok(ClaimedCourse {
            id,
            slug,
            created_at,
        })
    }

    async fn create_course(
        &self,
        course: &CoursePayload,
        has_structured_content: bool,
    ) -> Result<ClaimedCourse, IngestError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let slug = self
            .with_free_slug(&course.slug, |slug| {
                let record =
                    CourseRecord::from_payload(id, slug, course, has_structured_content, now);
                async move { self.store.insert_course(&record).await }
            })
            .await?;

        info!(course_id = %id, course_slug = %slug, "Course created");
        Ok(ClaimedCourse {
            id,
            slug,
            created_at: now,
        })
    }

    /// Run `write` with `base`, `base-1`, `base-2`, ... until it stops
    /// reporting a unique violation
    async fn with_free_slug<F, Fut>(&self, base: &str, mut write: F) -> Result<String, IngestError>
    where
        F: FnMut(&str) -> Fut,
        Fut: std::future::Future<Output = Result<(), StoreError>>,
    {
        for attempt in 0..self.max_slug_attempts {
            let candidate = with_suffix(base, attempt);
            match write(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(StoreError::UniqueViolation { constraint }) => {
                    debug!(slug = %candidate, constraint = %constraint, "Slug taken, trying next suffix");
                }
                Err(e) => {
                    error!(slug = %candidate, error = %e, "Course write failed");
                    return Err(IngestError::PersistenceFailure(format!(
                        "Writing course '{}' failed: {}",
                        candidate, e
                    )));
                }
            }
        }

        Err(IngestError::PersistenceFailure(format!(
            "No free slug for '{}' after {} attempts",
            base, self.max_slug_attempts
        )))
    }

    async fn insert_asset(
        &self,
        unit_id: Uuid,
        asset: &StoredAsset,
        unit_path: &str,
        warnings: &mut WarningLog,
    ) -> bool {
        let new_asset = NewUnitAsset {
            unit_id,
            file_name: asset.file_name.clone(),
            storage_path: asset.storage_path.clone(),
            content_type: asset.content_type.clone(),
            size_bytes: asset.size_bytes,
            metadata: Value::Object(asset.metadata.clone()),
        };
        match self.store.insert_unit_asset(&new_asset).await {
            Ok(_) => true,
            Err(e) => {
                warnings.push(
                    WarningCode::AssetInsertFailed,
                    format!("{}/{}", unit_path, asset.file_name),
                    format!("Asset row skipped: {}", e),
                );
                false
            }
        }
    }
}
