//! Module and unit resolution
//!
//! Merges each archive-level module declaration with the optional
//! `modules/<dir>/module.json`, then resolves every unit's slug, content and
//! assets. Values set on the archive-level declaration are kept; the module
//! manifest fills the gaps, except for the slug and the unit list, where the
//! module manifest is authoritative.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::asset_uploader::AssetUploader;
use super::slug::{slugify, SiblingSlugs};
use super::unit_content::resolve_unit_content;
use crate::models::{
    ModuleDeclaration, ModuleManifest, ResolvedModule, ResolvedUnit, UnitDeclaration,
    WarningCode, WarningLog, DEFAULT_UNIT_TYPE,
};
use crate::storage::normalize_key_path;

/// Directory under the course root holding one directory per module
pub const MODULES_DIR: &str = "modules";

/// Per-module manifest file name
pub const MODULE_MANIFEST: &str = "module.json";

pub struct ModuleResolver<'a> {
    course_root: &'a Path,
    course_slug: &'a str,
    uploader: &'a AssetUploader,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(course_root: &'a Path, course_slug: &'a str, uploader: &'a AssetUploader) -> Self {
        Self {
            course_root,
            course_slug,
            uploader,
        }
    }

    /// Resolve all declared modules in archive order
    pub async fn resolve_all(
        &self,
        declarations: &[ModuleDeclaration],
        warnings: &mut WarningLog,
    ) -> Vec<ResolvedModule> {
        let mut siblings = SiblingSlugs::new();
        let mut modules = Vec::with_capacity(declarations.len());

        for (i, declaration) in declarations.iter().enumerate() {
            let module = self
                .resolve_module(i + 1, declaration, &mut siblings, warnings)
                .await;
            modules.push(module);
        }

        info!(
            course_slug = %self.course_slug,
            modules = modules.len(),
            units = modules.iter().map(|m| m.units.len()).sum::<usize>(),
            "Resolved course modules"
        );
        modules
    }

    async fn resolve_module(
        &self,
        index: usize,
        declaration: &ModuleDeclaration,
        siblings: &mut SiblingSlugs,
        warnings: &mut WarningLog,
    ) -> ResolvedModule {
        let fallback = format!("module-{}", index);
        let mut slug = match declaration.declared_slug() {
            Some(declared) => slugify(declared, &fallback),
            None => slugify(declaration.title.as_deref().unwrap_or_default(), &fallback),
        };

        let mut directory = self.locate_directory(&[
            declaration.directory.as_deref(),
            declaration.declared_slug(),
            Some(slug.as_str()),
        ]);

        let manifest = self.read_module_manifest(&directory, warnings);

        if let Some(override_slug) = manifest.as_ref().and_then(|m| m.declared_slug()) {
            let overridden = slugify(override_slug, &fallback);
            debug!(from = %slug, to = %overridden, "Module manifest overrides slug");
            let renamed = self.existing_directory(&[Some(override_slug), Some(overridden.as_str())]);
            if let Some(dir) = renamed {
                directory = dir;
            }
            slug = overridden;
        }

        let slug = siblings.claim(&slug);
        let manifest = manifest.unwrap_or_default();

        let title = declaration
            .title
            .clone()
            .or(manifest.title.clone())
            .unwrap_or_else(|| format!("Module {}", index));
        let description = declaration
            .description
            .clone()
            .or(manifest.description.clone());
        let order_index = declaration
            .order_index
            .or(manifest.order_index)
            .unwrap_or(index as i64);
        let duration_minutes = declaration.duration_minutes.or(manifest.duration_minutes);

        let unit_declarations: &[UnitDeclaration] = match &manifest.units {
            Some(units) => units,
            None => &declaration.units,
        };

        let module_dir = self.module_path(&directory);
        let units = self
            .resolve_units(&slug, &directory, &module_dir, unit_declarations, warnings)
            .await;

        debug!(module = %slug, directory = %directory, units = units.len(), "Resolved module");

        ResolvedModule {
            slug,
            directory,
            title,
            description,
            order_index,
            duration_minutes,
            units,
        }
    }

    async fn resolve_units(
        &self,
        module_slug: &str,
        directory: &str,
        module_dir: &Path,
        declarations: &[UnitDeclaration],
        warnings: &mut WarningLog,
    ) -> Vec<ResolvedUnit> {
        let module_label = format!("{}/{}", MODULES_DIR, directory);
        let mut siblings = SiblingSlugs::new();
        let mut units = Vec::with_capacity(declarations.len());

        for (j, declaration) in declarations.iter().enumerate() {
            let index = j + 1;
            let fallback = format!("unit-{}", index);
            let base_slug = match declaration.slug.as_deref() {
                Some(declared) => slugify(declared, &fallback),
                None => slugify(declaration.title.as_deref().unwrap_or_default(), &fallback),
            };

            let slug = siblings.claim(&base_slug);
            if slug != base_slug {
                debug!(module = %module_slug, unit = %slug, "Duplicate unit slug disambiguated");
            }

            let content =
                resolve_unit_content(module_dir, &module_label, &slug, declaration, warnings);
            let assets = self
                .uploader
                .upload_unit_assets(
                    self.course_slug,
                    directory,
                    module_dir,
                    &declaration.assets,
                    warnings,
                )
                .await;

            units.push(ResolvedUnit {
                slug,
                title: declaration
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Unit {}", index)),
                unit_type: declaration
                    .unit_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_UNIT_TYPE.to_string()),
                order_index: declaration.order_index.unwrap_or(index as i64),
                duration_minutes: declaration.duration_minutes,
                content,
                assets,
            });
        }

        units
    }

    /// First candidate naming an existing module directory, else the last
    /// usable candidate
    fn locate_directory(&self, candidates: &[Option<&str>]) -> String {
        if let Some(found) = self.existing_directory(candidates) {
            return found;
        }
        candidates
            .iter()
            .rev()
            .flatten()
            .filter_map(|c| safe_directory(c))
            .next()
            .unwrap_or_default()
    }

    fn existing_directory(&self, candidates: &[Option<&str>]) -> Option<String> {
        candidates
            .iter()
            .flatten()
            .filter_map(|c| safe_directory(c))
            .find(|dir| self.module_path(dir).is_dir())
    }

    fn module_path(&self, directory: &str) -> PathBuf {
        directory
            .split('/')
            .fold(self.course_root.join(MODULES_DIR), |path, segment| path.join(segment))
    }

    fn read_module_manifest(
        &self,
        directory: &str,
        warnings: &mut WarningLog,
    ) -> Option<ModuleManifest> {
        let path = self.module_path(directory).join(MODULE_MANIFEST);
        if !path.is_file() {
            return None;
        }

        let label = format!("{}/{}/{}", MODULES_DIR, directory, MODULE_MANIFEST);
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<ModuleManifest>(&raw).map_err(|e| e.to_string()));

        match parsed {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warnings.push(
                    WarningCode::ModuleManifestReadError,
                    label,
                    format!("Ignoring unreadable module manifest: {}", e),
                );
                None
            }
        }
    }
}

/// Normalized relative directory, or `None` if it would leave `modules/`
fn safe_directory(raw: &str) -> Option<String> {
    let normalized = normalize_key_path(raw);
    if normalized.is_empty() || normalized.split('/').any(|s| s == "..") {
        None
    } else {
        Some(normalized)
    }
}
