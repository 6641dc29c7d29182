//! Asset resolution and upload
//!
//! Every upload is independent: a missing file or a failed/timed-out upload
//! drops that one asset with a warning and never affects its siblings.
//! Uploads within one batch run concurrently up to `concurrency`, and results
//! come back in declaration order.
//!
//! Storage key layout:
//! - unit assets: `courses/<course>/modules/<module-dir>/<path>`
//! - loose assets: `courses/<course>/<path>`
//! - extracted tree: `courses/<course>/source/<path>`
//! - original upload: `archives/<course>/<timestamp>-<file name>`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::{AssetDeclaration, LooseAsset, StoredAsset, WarningCode, WarningLog};
use crate::storage::{content_type_for, normalize_key_path, ObjectStore, StorageError};

/// One file to push to the object store
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub source: PathBuf,
    pub key: String,
    pub content_type: String,
    /// Archive-relative path for warnings
    pub label: String,
}

/// A finished upload
#[derive(Debug, Clone)]
pub struct Uploaded {
    pub key: String,
    pub size_bytes: u64,
}

pub struct AssetUploader {
    store: Arc<dyn ObjectStore>,
    upload_timeout: Duration,
    concurrency: usize,
}

impl AssetUploader {
    pub fn new(store: Arc<dyn ObjectStore>, upload_timeout: Duration, concurrency: usize) -> Self {
        Self {
            store,
            upload_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload the assets declared on one unit
    pub async fn upload_unit_assets(
        &self,
        course_slug: &str,
        module_dir_name: &str,
        module_dir: &Path,
        declarations: &[AssetDeclaration],
        warnings: &mut WarningLog,
    ) -> Vec<StoredAsset> {
        let label_root = format!("modules/{}", module_dir_name);
        let key_root = format!("courses/{}/modules/{}", course_slug, module_dir_name);

        let resolved = self.resolve_declarations(module_dir, &label_root, &key_root, declarations, warnings);
        let (decls, jobs): (Vec<&AssetDeclaration>, Vec<UploadJob>) = resolved.into_iter().unzip();
        let results = self.upload_all(jobs, warnings).await;

        decls
            .into_iter()
            .zip(results)
            .filter_map(|(decl, uploaded)| uploaded.map(|u| stored_asset(decl, u)))
            .collect()
    }

    /// Upload archive-level assets, keeping their attachment targets
    pub async fn upload_loose_assets(
        &self,
        course_slug: &str,
        course_root: &Path,
        declarations: &[AssetDeclaration],
        warnings: &mut WarningLog,
    ) -> Vec<LooseAsset> {
        let key_root = format!("courses/{}", course_slug);

        let resolved = self.resolve_declarations(course_root, "", &key_root, declarations, warnings);
        let (decls, jobs): (Vec<&AssetDeclaration>, Vec<UploadJob>) = resolved.into_iter().unzip();
        let results = self.upload_all(jobs, warnings).await;

        decls
            .into_iter()
            .zip(results)
            .filter_map(|(decl, uploaded)| {
                uploaded.map(|u| LooseAsset {
                    asset: stored_asset(decl, u),
                    module_slug: decl.module_slug.clone(),
                    unit_slug: decl.unit_slug.clone(),
                })
            })
            .collect()
    }

    /// Upload every file under `course_root` for archival reference
    ///
    /// Returns the number of files stored.
    pub async fn archive_tree(
        &self,
        course_slug: &str,
        course_root: &Path,
        warnings: &mut WarningLog,
    ) -> usize {
        let jobs: Vec<UploadJob> = WalkDir::new(course_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(course_root).ok()?;
                let rel = normalize_key_path(&rel.to_string_lossy());
                Some(UploadJob {
                    source: entry.path().to_path_buf(),
                    key: format!("courses/{}/source/{}", course_slug, rel),
                    content_type: content_type_for(entry.path()),
                    label: rel,
                })
            })
            .collect();

        let total = jobs.len();
        let stored = self
            .upload_all(jobs, warnings)
            .await
            .into_iter()
            .flatten()
            .count();
        info!(course_slug, stored, total, "Archived extracted tree");
        stored
    }

    /// Upload the original archive; returns its object key
    pub async fn upload_original(
        &self,
        course_slug: &str,
        archive_path: &Path,
        archive_name: &str,
        warnings: &mut WarningLog,
    ) -> Option<String> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let key = format!(
            "archives/{}/{}-{}",
            course_slug,
            stamp,
            safe_file_name(archive_name)
        );
        let job = UploadJob {
            source: archive_path.to_path_buf(),
            key,
            content_type: "application/zip".to_string(),
            label: archive_name.to_string(),
        };

        self.upload_all(vec![job], warnings)
            .await
            .into_iter()
            .flatten()
            .next()
            .map(|uploaded| uploaded.key)
    }

    /// Resolve declarations under `owner_dir` into upload jobs
    ///
    /// Missing or escaping references become `AssetMissing` warnings.
    fn resolve_declarations<'d>(
        &self,
        owner_dir: &Path,
        label_root: &str,
        key_root: &str,
        declarations: &'d [AssetDeclaration],
        warnings: &mut WarningLog,
    ) -> Vec<(&'d AssetDeclaration, UploadJob)> {
        let mut resolved = Vec::with_capacity(declarations.len());

        for decl in declarations {
            let raw = decl.file.as_deref().unwrap_or_default();
            let rel = normalize_key_path(raw);
            let label = join_label(label_root, if rel.is_empty() { raw } else { &rel });

            let escapes = rel.split('/').any(|s| s == "..");
            let source = owner_dir.join(&rel);
            if rel.is_empty() || escapes || !source.is_file() {
                warnings.push(
                    WarningCode::AssetMissing,
                    label,
                    "Referenced asset file not found in archive",
                );
                continue;
            }

            let content_type = decl
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(&source));

            resolved.push((
                decl,
                UploadJob {
                    source,
                    key: format!("{}/{}", key_root, rel),
                    content_type,
                    label,
                },
            ));
        }

        resolved
    }

    /// Run uploads concurrently; `None` marks a dropped upload
    pub async fn upload_all(
        &self,
        jobs: Vec<UploadJob>,
        warnings: &mut WarningLog,
    ) -> Vec<Option<Uploaded>> {
        let results: Vec<(String, Result<Uploaded, String>)> = stream::iter(jobs)
            .map(|job| async move {
                let label = job.label.clone();
                (label, self.upload_one(job).await)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .map(|(label, result)| match result {
                Ok(uploaded) => Some(uploaded),
                Err(message) => {
                    warnings.push(WarningCode::StorageUploadFailure, label, message);
                    None
                }
            })
            .collect()
    }

    async fn upload_one(&self, job: UploadJob) -> Result<Uploaded, String> {
        let bytes = tokio::fs::read(&job.source)
            .await
            .map_err(|e| format!("Cannot read {}: {}", job.label, e))?;
        let size_bytes = bytes.len() as u64;

        let put = self.store.put(&job.key, bytes, &job.content_type);
        let stored = match tokio::time::timeout(self.upload_timeout, put).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => return Err(upload_failure(self.store.name(), &job.key, &e)),
            Err(_) => {
                return Err(format!(
                    "Upload of {} timed out after {}s",
                    job.key,
                    self.upload_timeout.as_secs()
                ))
            }
        };

        debug!(key = %stored.key, size_bytes, "Uploaded asset");
        Ok(Uploaded {
            key: stored.key,
            size_bytes,
        })
    }
}

fn upload_failure(backend: &str, key: &str, error: &StorageError) -> String {
    format!("{} store refused {}: {}", backend, key, error)
}

fn stored_asset(decl: &AssetDeclaration, uploaded: Uploaded) -> StoredAsset {
    let file_name = decl.file_name.clone().unwrap_or_else(|| {
        uploaded
            .key
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    });
    let content_type = decl
        .content_type
        .clone()
        .unwrap_or_else(|| content_type_for(Path::new(&uploaded.key)));

    StoredAsset {
        file_name,
        storage_path: uploaded.key,
        content_type,
        size_bytes: i64::try_from(uploaded.size_bytes).unwrap_or(i64::MAX),
        metadata: decl.metadata.clone(),
    }
}

fn join_label(root: &str, rel: &str) -> String {
    if root.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", root, rel)
    }
}

/// File name reduced to `[A-Za-z0-9._-]`
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "upload.zip".to_string()
    } else {
        cleaned
    }
}
