//! Manifest shapes as authored inside a course archive
//!
//! `course.json` sits at the archive root; `modules/<dir>/module.json` is
//! optional per module. Every field is optional here; defaults are applied by
//! the resolvers, not by serde, so "absent" and "declared" stay distinguishable.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::lenient;

/// Root `course.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourseManifest {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub category_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub difficulty_id: Option<String>,
    #[serde(alias = "duration", deserialize_with = "lenient::opt_i64")]
    pub duration_minutes: Option<i64>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub prerequisites: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub learning_outcomes: Vec<String>,
    #[serde(deserialize_with = "lenient::declarations")]
    pub modules: Vec<ModuleDeclaration>,
    #[serde(deserialize_with = "lenient::declarations")]
    pub assets: Vec<AssetDeclaration>,
}

/// A module as declared in `course.json`
///
/// The string shorthand `"intro"` declares a module whose slug and directory
/// are both `intro`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleDeclaration {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub slug: Option<String>,
    #[serde(alias = "id", deserialize_with = "lenient::opt_string")]
    pub module_id: Option<String>,
    #[serde(alias = "dir", alias = "path", deserialize_with = "lenient::opt_string")]
    pub directory: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub order_index: Option<i64>,
    #[serde(
        alias = "estimated_duration",
        alias = "duration",
        deserialize_with = "lenient::opt_i64"
    )]
    pub duration_minutes: Option<i64>,
    #[serde(deserialize_with = "lenient::declarations")]
    pub units: Vec<UnitDeclaration>,
}

impl From<String> for ModuleDeclaration {
    fn from(slug: String) -> Self {
        Self {
            slug: Some(slug),
            ..Default::default()
        }
    }
}

impl ModuleDeclaration {
    /// Slug or module identifier, whichever the author wrote
    pub fn declared_slug(&self) -> Option<&str> {
        self.slug.as_deref().or(self.module_id.as_deref())
    }
}

/// `modules/<dir>/module.json`
///
/// `units: None` means the file did not mention units at all; `Some(vec![])`
/// is an explicit empty list and still replaces the course-level list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleManifest {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub slug: Option<String>,
    #[serde(alias = "id", deserialize_with = "lenient::opt_string")]
    pub module_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub order_index: Option<i64>,
    #[serde(
        alias = "estimated_duration",
        alias = "duration",
        deserialize_with = "lenient::opt_i64"
    )]
    pub duration_minutes: Option<i64>,
    #[serde(deserialize_with = "optional_units")]
    pub units: Option<Vec<UnitDeclaration>>,
}

impl ModuleManifest {
    pub fn declared_slug(&self) -> Option<&str> {
        self.slug.as_deref().or(self.module_id.as_deref())
    }
}

fn optional_units<'de, D>(deserializer: D) -> Result<Option<Vec<UnitDeclaration>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    lenient::declarations(deserializer).map(Some)
}

/// A unit inside a module declaration
///
/// The string shorthand declares a unit by title.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnitDeclaration {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub slug: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(alias = "type", deserialize_with = "lenient::opt_string")]
    pub unit_type: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub order_index: Option<i64>,
    #[serde(
        alias = "estimated_duration",
        alias = "duration",
        deserialize_with = "lenient::opt_i64"
    )]
    pub duration_minutes: Option<i64>,
    #[serde(deserialize_with = "lenient::opt_declaration")]
    pub content: Option<ContentDeclaration>,
    #[serde(alias = "file", alias = "content_path", deserialize_with = "lenient::opt_string")]
    pub content_file: Option<String>,
    pub body: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub format: Option<String>,
    #[serde(deserialize_with = "lenient::declarations")]
    pub assets: Vec<AssetDeclaration>,
}

impl From<String> for UnitDeclaration {
    fn from(title: String) -> Self {
        Self {
            title: Some(title),
            ..Default::default()
        }
    }
}

impl UnitDeclaration {
    /// Explicit content file reference, from either spelling
    pub fn content_file_ref(&self) -> Option<&str> {
        self.content_file
            .as_deref()
            .or_else(|| self.content.as_ref().and_then(|c| c.file.as_deref()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Inline body, from either spelling
    pub fn inline_body(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|c| c.body.as_deref())
            .or(self.body.as_deref())
    }

    /// Declared format, from either spelling
    pub fn declared_format(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|c| c.format.as_deref())
            .or(self.format.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Unit content; a bare string is an inline body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentDeclaration {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub format: Option<String>,
    pub body: Option<String>,
    #[serde(alias = "path", deserialize_with = "lenient::opt_string")]
    pub file: Option<String>,
}

impl From<String> for ContentDeclaration {
    fn from(body: String) -> Self {
        Self {
            body: Some(body),
            ..Default::default()
        }
    }
}

/// A binary file referenced by a unit or listed loosely in `course.json`
///
/// The string shorthand is the file path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssetDeclaration {
    #[serde(alias = "path", alias = "src", deserialize_with = "lenient::opt_string")]
    pub file: Option<String>,
    #[serde(alias = "name", deserialize_with = "lenient::opt_string")]
    pub file_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub content_type: Option<String>,
    pub metadata: Map<String, Value>,
    #[serde(alias = "module", deserialize_with = "lenient::opt_string")]
    pub module_slug: Option<String>,
    #[serde(alias = "unit", deserialize_with = "lenient::opt_string")]
    pub unit_slug: Option<String>,
}

impl From<String> for AssetDeclaration {
    fn from(file: String) -> Self {
        Self {
            file: Some(file),
            ..Default::default()
        }
    }
}
