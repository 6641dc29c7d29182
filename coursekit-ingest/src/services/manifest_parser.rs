//! Root manifest parsing
//!
//! Splits `course.json` into the course payload and the declarations handled
//! by the module and asset resolvers.

use std::io;
use std::path::Path;

use tracing::debug;

use super::slug::slugify;
use crate::error::IngestError;
use crate::models::{AssetDeclaration, CourseManifest, CoursePayload, ModuleDeclaration};

/// Well-known root manifest file name
pub const COURSE_MANIFEST: &str = "course.json";

/// Fallback course slug when neither slug nor title is usable
pub const DEFAULT_COURSE_SLUG: &str = "course";

pub const DEFAULT_COURSE_TITLE: &str = "Untitled course";

#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub course: CoursePayload,
    pub modules: Vec<ModuleDeclaration>,
    pub assets: Vec<AssetDeclaration>,
}

/// Read and parse `<course_root>/course.json`
pub fn parse_course_manifest(course_root: &Path) -> Result<ParsedManifest, IngestError> {
    let path = course_root.join(COURSE_MANIFEST);
    let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            IngestError::ManifestMissing(format!("{} not found in archive", COURSE_MANIFEST))
        }
        _ => IngestError::ManifestMalformed(format!("Cannot read {}: {}", COURSE_MANIFEST, e)),
    })?;

    parse_course_manifest_str(&raw)
}

/// Parse manifest text; split out so callers holding bytes can skip the disk
pub fn parse_course_manifest_str(raw: &str) -> Result<ParsedManifest, IngestError> {
    let manifest: CourseManifest = serde_json::from_str(raw)
        .map_err(|e| IngestError::ManifestMalformed(format!("{}: {}", COURSE_MANIFEST, e)))?;

    let CourseManifest {
        title,
        slug,
        description,
        category_id,
        difficulty_id,
        duration_minutes,
        keywords,
        prerequisites,
        learning_outcomes,
        modules,
        assets,
    } = manifest;

    let (slug, slug_declared) = match slug {
        Some(declared) => (slugify(&declared, DEFAULT_COURSE_SLUG), true),
        None => (
            slugify(title.as_deref().unwrap_or_default(), DEFAULT_COURSE_SLUG),
            false,
        ),
    };
    let title = title.unwrap_or_else(|| DEFAULT_COURSE_TITLE.to_string());

    debug!(
        course_slug = %slug,
        modules = modules.len(),
        assets = assets.len(),
        "Parsed course manifest"
    );

    Ok(ParsedManifest {
        course: CoursePayload {
            title,
            slug,
            slug_declared,
            description,
            category_id,
            difficulty_id,
            duration_minutes,
            keywords,
            prerequisites,
            learning_outcomes,
        },
        modules,
        assets,
    })
}
