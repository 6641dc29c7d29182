//! Resolved course tree
//!
//! These are the normalized shapes produced by the resolvers and consumed by
//! the structure persister. Unlike the manifest types, every field that has a
//! default already carries it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default unit type tag
pub const DEFAULT_UNIT_TYPE: &str = "chapter";

/// Default content format tag
pub const DEFAULT_CONTENT_FORMAT: &str = "markdown";

/// Course-level scalar fields taken from `course.json`
#[derive(Debug, Clone, Serialize)]
pub struct CoursePayload {
    pub title: String,
    pub slug: String,
    /// True when `course.json` carried an explicit slug
    pub slug_declared: bool,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub difficulty_id: Option<String>,
    pub duration_minutes: Option<i64>,
    pub keywords: Vec<String>,
    pub prerequisites: Vec<String>,
    pub learning_outcomes: Vec<String>,
}

/// A module after directory and manifest merging
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedModule {
    pub slug: String,
    /// Directory name under `modules/` that content was resolved from
    pub directory: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub duration_minutes: Option<i64>,
    pub units: Vec<ResolvedUnit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedUnit {
    pub slug: String,
    pub title: String,
    pub unit_type: String,
    pub order_index: i64,
    pub duration_minutes: Option<i64>,
    pub content: Option<UnitContent>,
    pub assets: Vec<StoredAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitContent {
    pub format: String,
    pub body: String,
}

/// An asset that was uploaded successfully
///
/// Assets that failed to resolve or upload never become a `StoredAsset`.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAsset {
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub metadata: Map<String, Value>,
}

/// An archive-level asset with an optional attachment target
#[derive(Debug, Clone, Serialize)]
pub struct LooseAsset {
    pub asset: StoredAsset,
    pub module_slug: Option<String>,
    pub unit_slug: Option<String>,
}

impl LooseAsset {
    /// The (module, unit) pair this asset should attach to, if fully declared
    pub fn target(&self) -> Option<(&str, &str)> {
        Some((self.module_slug.as_deref()?, self.unit_slug.as_deref()?))
    }
}

/// Everything the persister needs for one import
#[derive(Debug, Clone)]
pub struct CourseTree {
    pub course: CoursePayload,
    /// True when `course.json` declared at least one module
    pub has_structured_content: bool,
    pub source_file_path: Option<String>,
    pub modules: Vec<ResolvedModule>,
    pub loose_assets: Vec<LooseAsset>,
}

/// A row of the `courses` table
#[derive(Debug, Clone, Serialize)]
pub struct CourseRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub difficulty_id: Option<String>,
    pub duration_minutes: Option<i64>,
    pub keywords: Vec<String>,
    pub prerequisites: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub has_structured_content: bool,
    pub source_file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseRecord {
    /// Build a fresh record for `id` from a resolved tree, stamped with `now`
    pub fn from_tree(id: Uuid, slug: &str, tree: &CourseTree, now: DateTime<Utc>) -> Self {
        let mut record = Self::from_payload(id, slug, &tree.course, tree.has_structured_content, now);
        record.source_file_path = tree.source_file_path.clone();
        record
    }

    /// Record from the manifest scalars alone, before anything is uploaded
    pub fn from_payload(
        id: Uuid,
        slug: &str,
        course: &CoursePayload,
        has_structured_content: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            slug: slug.to_string(),
            title: course.title.clone(),
            description: course.description.clone(),
            category_id: course.category_id.clone(),
            difficulty_id: course.difficulty_id.clone(),
            duration_minutes: course.duration_minutes,
            keywords: course.keywords.clone(),
            prerequisites: course.prerequisites.clone(),
            learning_outcomes: course.learning_outcomes.clone(),
            has_structured_content,
            source_file_path: None,
            created_at: now,
            updated_at: now,
        }
    }
}
