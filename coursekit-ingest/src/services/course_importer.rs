//! Course import orchestration
//!
//! authorize → scoped workspace → extract → parse manifest → claim the course
//! row and its final slug → resolve modules, units and assets (uploading under
//! that slug as it goes) → archive the extracted tree and the original upload
//! → persist.
//!
//! The workspace is a `TempDir`, removed on every exit path including early
//! returns and panics. Authorization happens before it is created, so a
//! rejected caller never causes disk or storage activity.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use coursekit_common::auth::{IdentityProvider, SessionUser, DEFAULT_ADMIN_ROLES};
use tempfile::TempDir;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::archive_extractor::{extract_archive, locate_course_root, ArchiveLimits};
use super::asset_uploader::AssetUploader;
use super::manifest_parser::{parse_course_manifest, COURSE_MANIFEST};
use super::module_resolver::ModuleResolver;
use super::structure_persister::{StructurePersister, DEFAULT_MAX_SLUG_ATTEMPTS};
use crate::db::CourseStore;
use crate::error::IngestError;
use crate::models::{CourseTree, ImportOutcome, WarningLog};
use crate::storage::ObjectStore;

const WORKSPACE_PREFIX: &str = "coursekit-import-";

/// Tunables for the import pipeline
#[derive(Debug, Clone)]
pub struct ImporterSettings {
    pub limits: ArchiveLimits,
    pub extraction_timeout: Duration,
    pub upload_timeout: Duration,
    pub upload_concurrency: usize,
    /// Also upload every extracted file under `courses/<slug>/source/`
    pub archive_extracted_tree: bool,
    pub admin_roles: Vec<String>,
    pub max_slug_attempts: u32,
    /// Parent directory for workspaces; system temp dir when `None`
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ImporterSettings {
    fn default() -> Self {
        Self {
            limits: ArchiveLimits::default(),
            extraction_timeout: Duration::from_secs(120),
            upload_timeout: Duration::from_secs(60),
            upload_concurrency: 4,
            archive_extracted_tree: true,
            admin_roles: DEFAULT_ADMIN_ROLES.iter().map(|r| r.to_string()).collect(),
            max_slug_attempts: DEFAULT_MAX_SLUG_ATTEMPTS,
            scratch_dir: None,
        }
    }
}

/// Proof that a session passed the administrator check
///
/// Only [`CourseImporter::authorize`] can build one.
#[derive(Debug, Clone)]
pub struct AdminSession {
    user: SessionUser,
}

impl AdminSession {
    pub fn user(&self) -> &SessionUser {
        &self.user
    }
}

/// One import call
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub session_token: String,
    pub archive_path: PathBuf,
    /// Client-supplied file name, used for the archived copy's key
    pub archive_name: String,
    /// Existing course to replace; `None` creates a new course
    pub target_course_id: Option<Uuid>,
}

pub struct CourseImporter {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn CourseStore>,
    uploader: AssetUploader,
    settings: ImporterSettings,
}

impl CourseImporter {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn CourseStore>,
        object_store: Arc<dyn ObjectStore>,
        settings: ImporterSettings,
    ) -> Self {
        let uploader = AssetUploader::new(
            object_store,
            settings.upload_timeout,
            settings.upload_concurrency,
        );
        Self {
            identity,
            store,
            uploader,
            settings,
        }
    }

    pub fn settings(&self) -> &ImporterSettings {
        &self.settings
    }

    /// Resolve `token` and require an administrative role
    pub async fn authorize(&self, token: &str) -> Result<AdminSession, IngestError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IngestError::Unauthorized("Missing session token".to_string()));
        }

        let user = match self.identity.resolve_session(token).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(IngestError::Unauthorized(
                    "Invalid or expired session".to_string(),
                ))
            }
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                return Err(IngestError::Unauthorized(
                    "Session could not be verified".to_string(),
                ));
            }
        };

        if !user.has_any_role(&self.settings.admin_roles) {
            warn!(user = %user.email, role = %user.role, "Course import refused: not an administrator");
            return Err(IngestError::Unauthorized(
                "Administrator role required".to_string(),
            ));
        }

        Ok(AdminSession { user })
    }

    /// Fresh scoped workspace; removed when the returned value drops
    pub fn create_workspace(&self) -> Result<TempDir, IngestError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let workspace = match &self.settings.scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        Ok(workspace)
    }

    /// Authorize, then import
    pub async fn import(&self, request: ImportRequest) -> Result<ImportOutcome, IngestError> {
        let session = self.authorize(&request.session_token).await?;
        self.import_as(
            &session,
            &request.archive_path,
            &request.archive_name,
            request.target_course_id,
        )
        .await
    }

    /// Import on behalf of an already authorized administrator
    pub async fn import_as(
        &self,
        session: &AdminSession,
        archive_path: &Path,
        archive_name: &str,
        target_course_id: Option<Uuid>,
    ) -> Result<ImportOutcome, IngestError> {
        let started = Instant::now();
        info!(
            user = %session.user.email,
            archive = %archive_name,
            target_course_id = ?target_course_id,
            "Course import started"
        );

        let workspace = self.create_workspace()?;
        let result = self
            .run_pipeline(workspace.path(), archive_path, archive_name, target_course_id)
            .await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %workspace_path.display(), error = %e, "Workspace cleanup failed");
        }

        match &result {
            Ok(outcome) => info!(
                course_id = %outcome.course_id,
                course_slug = %outcome.slug,
                warnings = outcome.warnings.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "Course import finished"
            ),
            Err(e) => error!(code = e.code(), error = %e, "Course import aborted"),
        }
        result
    }

    async fn run_pipeline(
        &self,
        workspace: &Path,
        archive_path: &Path,
        archive_name: &str,
        target_course_id: Option<Uuid>,
    ) -> Result<ImportOutcome, IngestError> {
        let extract_dir = workspace.join("extracted");
        self.extract(archive_path, &extract_dir).await?;

        let course_root = locate_course_root(&extract_dir, COURSE_MANIFEST);
        let parsed = parse_course_manifest(&course_root)?;
        info!(
            course_slug = %parsed.course.slug,
            modules = parsed.modules.len(),
            loose_assets = parsed.assets.len(),
            "Manifest parsed"
        );

        let persister = StructurePersister::new(self.store.as_ref())
            .with_max_slug_attempts(self.settings.max_slug_attempts);
        let claimed = persister
            .claim_course(&parsed.course, !parsed.modules.is_empty(), target_course_id)
            .await?;
        let storage_slug = claimed.slug.as_str();
        let mut warnings = WarningLog::new();

        let loose_assets = self
            .uploader
            .upload_loose_assets(storage_slug, &course_root, &parsed.assets, &mut warnings)
            .await;

        let modules = ModuleResolver::new(&course_root, storage_slug, &self.uploader)
            .resolve_all(&parsed.modules, &mut warnings)
            .await;

        if self.settings.archive_extracted_tree {
            self.uploader
                .archive_tree(storage_slug, &course_root, &mut warnings)
                .await;
        }

        let source_file_path = self
            .uploader
            .upload_original(storage_slug, archive_path, archive_name, &mut warnings)
            .await;

        let tree = CourseTree {
            has_structured_content: !parsed.modules.is_empty(),
            course: parsed.course,
            source_file_path: source_file_path.clone(),
            modules,
            loose_assets,
        };

        let persisted = persister.persist(&claimed, &tree, &mut warnings).await?;

        let mut message = format!(
            "Course '{}' imported as '{}' with {} modules, {} units and {} assets",
            tree.course.title, persisted.slug, persisted.modules, persisted.units, persisted.assets
        );
        if !warnings.is_empty() {
            message.push_str(&format!(" ({} items skipped)", warnings.len()));
        }

        Ok(ImportOutcome {
            course_id: persisted.course_id,
            slug: persisted.slug,
            message,
            source_file_url: source_file_path,
            modules_imported: persisted.modules,
            units_imported: persisted.units,
            assets_imported: persisted.assets,
            warnings: warnings.into_vec(),
        })
    }

    /// Extract on a blocking thread under the extraction timeout
    async fn extract(&self, archive_path: &Path, extract_dir: &Path) -> Result<(), IngestError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let limits = self.settings.limits;
        let task = tokio::task::spawn_blocking({
            let archive_path = archive_path.to_path_buf();
            let extract_dir = extract_dir.to_path_buf();
            let cancel = Arc::clone(&cancel);
            move || extract_archive(&archive_path, &extract_dir, &limits, &cancel)
        });

        match tokio::time::timeout(self.settings.extraction_timeout, task).await {
            Ok(Ok(result)) => result.map(|_| ()),
            Ok(Err(join_error)) => Err(IngestError::ArchiveInvalid(format!(
                "Extraction aborted: {}",
                join_error
            ))),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(IngestError::Timeout {
                    stage: "Extraction",
                    secs: self.settings.extraction_timeout.as_secs(),
                })
            }
        }
    }
}
