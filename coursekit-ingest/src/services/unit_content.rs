//! Unit body resolution
//!
//! First match wins:
//! 1. explicit content file relative to the module directory
//! 2. `units/<unit-slug>.md` inside the module directory
//! 3. inline body from the declaration
//!
//! A missing explicit file is a warning and leaves the unit without content;
//! it does not fall back to the conventional file or the inline body.

use std::path::Path;

use tracing::debug;

use crate::models::{UnitContent, UnitDeclaration, WarningCode, WarningLog, DEFAULT_CONTENT_FORMAT};
use crate::storage::normalize_key_path;

/// Subdirectory of a module holding conventional unit bodies
pub const UNITS_DIR: &str = "units";

/// Extension of conventional unit body files
pub const DEFAULT_UNIT_EXTENSION: &str = "md";

/// Resolve the body of one unit
///
/// `module_label` is the archive-relative module directory, used in warnings.
pub fn resolve_unit_content(
    module_dir: &Path,
    module_label: &str,
    unit_slug: &str,
    declaration: &UnitDeclaration,
    warnings: &mut WarningLog,
) -> Option<UnitContent> {
    let format = declaration
        .declared_format()
        .unwrap_or(DEFAULT_CONTENT_FORMAT)
        .to_string();

    if let Some(reference) = declaration.content_file_ref() {
        let rel = normalize_key_path(reference);
        let label = format!("{}/{}", module_label, rel);
        let escapes = rel.is_empty() || rel.split('/').any(|s| s == "..");
        let path = module_dir.join(&rel);

        if escapes || !path.is_file() {
            warnings.push(
                WarningCode::UnitContentMissing,
                label,
                format!("Unit '{}' references missing content file", unit_slug),
            );
            return None;
        }

        return match std::fs::read_to_string(&path) {
            Ok(body) => {
                debug!(unit = %unit_slug, file = %rel, "Unit content from referenced file");
                Some(UnitContent { format, body })
            }
            Err(e) => {
                warnings.push(
                    WarningCode::UnitContentMissing,
                    label,
                    format!("Unit '{}' content file unreadable: {}", unit_slug, e),
                );
                None
            }
        };
    }

    let conventional = module_dir
        .join(UNITS_DIR)
        .join(format!("{}.{}", unit_slug, DEFAULT_UNIT_EXTENSION));
    if conventional.is_file() {
        match std::fs::read_to_string(&conventional) {
            Ok(body) => {
                debug!(unit = %unit_slug, "Unit content from conventional file");
                return Some(UnitContent { format, body });
            }
            Err(e) => warnings.push(
                WarningCode::UnitContentMissing,
                format!(
                    "{}/{}/{}.{}",
                    module_label, UNITS_DIR, unit_slug, DEFAULT_UNIT_EXTENSION
                ),
                format!("Conventional unit file unreadable: {}", e),
            ),
        }
    }

    declaration.inline_body().map(|body| UnitContent {
        format,
        body: body.to_string(),
    })
}
