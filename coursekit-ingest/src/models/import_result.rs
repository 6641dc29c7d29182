//! Import outcomes and recoverable warnings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recoverable item-level failure kinds
///
/// None of these abort an import; the affected item is skipped and the rest
/// of the tree persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// `module.json` exists but could not be read or parsed
    ModuleManifestReadError,
    /// Unit references a content file that is not in the archive
    UnitContentMissing,
    /// Asset references a file that is not in the archive
    AssetMissing,
    /// Object store rejected the upload or it timed out
    StorageUploadFailure,
    ModuleInsertFailed,
    UnitInsertFailed,
    AssetInsertFailed,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::ModuleManifestReadError => "MODULE_MANIFEST_READ_ERROR",
            WarningCode::UnitContentMissing => "UNIT_CONTENT_MISSING",
            WarningCode::AssetMissing => "ASSET_MISSING",
            WarningCode::StorageUploadFailure => "STORAGE_UPLOAD_FAILURE",
            WarningCode::ModuleInsertFailed => "MODULE_INSERT_FAILED",
            WarningCode::UnitInsertFailed => "UNIT_INSERT_FAILED",
            WarningCode::AssetInsertFailed => "ASSET_INSERT_FAILED",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One skipped item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportWarning {
    pub code: WarningCode,

    /// Archive-relative path or slug path of the skipped item
    pub path: String,

    pub message: String,

    pub occurred_at: DateTime<Utc>,
}

impl ImportWarning {
    pub fn new(code: WarningCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Ordered warning accumulator for a single import
///
/// Every pushed warning is also logged, so server logs and the caller see the
/// same list.
#[derive(Debug, Default, Clone)]
pub struct WarningLog {
    warnings: Vec<ImportWarning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: WarningCode, path: impl Into<String>, message: impl Into<String>) {
        let warning = ImportWarning::new(code, path, message);
        tracing::warn!(
            code = %warning.code,
            path = %warning.path,
            "{}",
            warning.message
        );
        self.warnings.push(warning);
    }

    /// Append warnings already logged elsewhere
    pub fn extend(&mut self, other: WarningLog) {
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Count warnings with the given code
    pub fn count(&self, code: WarningCode) -> usize {
        self.warnings.iter().filter(|w| w.code == code).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportWarning> {
        self.warnings.iter()
    }

    pub fn into_vec(self) -> Vec<ImportWarning> {
        self.warnings
    }
}

/// Successful import result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub course_id: Uuid,
    pub slug: String,
    pub message: String,

    /// Object key of the archived original upload, if it was stored
    pub source_file_url: Option<String>,

    pub modules_imported: usize,
    pub units_imported: usize,
    pub assets_imported: usize,

    pub warnings: Vec<ImportWarning>,
}

impl ImportOutcome {
    pub fn count_by_code(&self, code: WarningCode) -> usize {
        self.warnings.iter().filter(|w| w.code == code).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&WarningCode::UnitContentMissing).unwrap();
        assert_eq!(json, "\"UNIT_CONTENT_MISSING\"");
        assert_eq!(WarningCode::UnitContentMissing.as_str(), "UNIT_CONTENT_MISSING");
    }

    #[test]
    fn test_warning_log_counts() {
        let mut log = WarningLog::new();
        log.push(WarningCode::AssetMissing, "modules/a/x.png", "missing");
        log.push(WarningCode::AssetMissing, "modules/a/y.png", "missing");

        let mut other = WarningLog::new();
        other.push(WarningCode::StorageUploadFailure, "modules/a/z.png", "refused");
        log.extend(other);

        assert_eq!(log.len(), 3);
        assert_eq!(log.count(WarningCode::AssetMissing), 2);
        assert_eq!(log.count(WarningCode::StorageUploadFailure), 1);
        assert_eq!(log.into_vec()[2].path, "modules/a/z.png");
    }
}
