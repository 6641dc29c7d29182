//! Shared fixtures for coursekit-ingest integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coursekit_common::auth::{IdentityProvider, SessionUser};
use coursekit_ingest::db::{
    init_memory_pool, AssetRow, CourseStore, CourseSummary, ModuleRow, NewModule, NewUnit,
    NewUnitAsset, SqliteCourseStore, StoreError, StructureCounts, UnitRow,
};
use coursekit_ingest::models::CourseRecord;
use coursekit_ingest::services::{CourseImporter, ImportRequest, ImporterSettings};
use coursekit_ingest::storage::{ObjectStore, StorageError, StoredObject};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const ADMIN_TOKEN: &str = "admin-session-token";
pub const STUDENT_TOKEN: &str = "student-session-token";

/// ZIP archive assembled in memory
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<Entry>,
}

enum Entry {
    File(String, Vec<u8>),
    Dir(String),
    Symlink(String, String),
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, contents: impl AsRef<[u8]>) -> Self {
        self.entries
            .push(Entry::File(name.to_string(), contents.as_ref().to_vec()));
        self
    }

    pub fn json(self, name: &str, value: &Value) -> Self {
        let text = serde_json::to_vec_pretty(value).unwrap();
        self.file(name, text)
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(Entry::Dir(name.to_string()));
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        self.entries
            .push(Entry::Symlink(name.to_string(), target.to_string()));
        self
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        for entry in self.entries {
            match entry {
                Entry::File(name, bytes) => {
                    writer.start_file(name, options).unwrap();
                    writer.write_all(&bytes).unwrap();
                }
                Entry::Dir(name) => writer.add_directory(name, options).unwrap(),
                Entry::Symlink(name, target) => writer.add_symlink(name, target, options).unwrap(),
            }
        }

        writer.finish().unwrap().into_inner()
    }

    /// Write the archive into `dir` and return its path
    pub fn write_to(self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.to_bytes()).unwrap();
        path
    }
}

/// Object store keeping everything in memory, with injectable failures
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    failing: Mutex<Vec<String>>,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every key containing `fragment`
    pub fn fail_keys_containing(&self, fragment: &str) {
        self.failing.lock().unwrap().push(fragment.to_string());
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| key.contains(fragment.as_str()));
        if refused {
            return Err(StorageError::Rejected {
                status: 503,
                body: "injected failure".to_string(),
            });
        }

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(StoredObject {
            key: key.to_string(),
            public_url: None,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Token → user table; counts lookups
#[derive(Default)]
pub struct StaticIdentity {
    users: HashMap<String, SessionUser>,
    lookups: AtomicUsize,
}

impl StaticIdentity {
    pub fn with_defaults() -> Self {
        let mut users = HashMap::new();
        users.insert(ADMIN_TOKEN.to_string(), user("admin@example.com", "admin"));
        users.insert(STUDENT_TOKEN.to_string(), user("student@example.com", "student"));
        Self {
            users,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn user(email: &str, role: &str) -> SessionUser {
    SessionUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        role: role.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn resolve_session(&self, token: &str) -> coursekit_common::Result<Option<SessionUser>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.get(token).cloned())
    }
}

/// SQLite store that fails selected module/unit inserts
pub struct FlakyCourseStore {
    inner: SqliteCourseStore,
    failing_modules: HashSet<String>,
    failing_units: HashSet<String>,
}

impl FlakyCourseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteCourseStore::new(pool),
            failing_modules: HashSet::new(),
            failing_units: HashSet::new(),
        }
    }

    pub fn fail_module(mut self, slug: &str) -> Self {
        self.failing_modules.insert(slug.to_string());
        self
    }

    pub fn fail_unit(mut self, slug: &str) -> Self {
        self.failing_units.insert(slug.to_string());
        self
    }
}

#[async_trait]
impl CourseStore for FlakyCourseStore {
    async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, StoreError> {
        self.inner.find_course(id).await
    }

    async fn insert_course(&self, course: &CourseRecord) -> Result<(), StoreError> {
        self.inner.insert_course(course).await
    }

    async fn upsert_course(&self, course: &CourseRecord) -> Result<(), StoreError> {
        self.inner.upsert_course(course).await
    }

    async fn clear_structure(&self, course_id: Uuid) -> Result<u64, StoreError> {
        self.inner.clear_structure(course_id).await
    }

    async fn insert_module(&self, module: &NewModule) -> Result<Uuid, StoreError> {
        if self.failing_modules.contains(&module.slug) {
            return Err(StoreError::Corrupt("injected module failure".to_string()));
        }
        self.inner.insert_module(module).await
    }

    async fn insert_unit(&self, unit: &NewUnit) -> Result<Uuid, StoreError> {
        if self.failing_units.contains(&unit.slug) {
            return Err(StoreError::Corrupt("injected unit failure".to_string()));
        }
        self.inner.insert_unit(unit).await
    }

    async fn insert_unit_asset(&self, asset: &NewUnitAsset) -> Result<Uuid, StoreError> {
        self.inner.insert_unit_asset(asset).await
    }

    async fn list_courses(&self) -> Result<Vec<CourseSummary>, StoreError> {
        self.inner.list_courses().await
    }

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<ModuleRow>, StoreError> {
        self.inner.list_modules(course_id).await
    }

    async fn list_units(&self, course_id: Uuid) -> Result<Vec<UnitRow>, StoreError> {
        self.inner.list_units(course_id).await
    }

    async fn list_unit_assets(&self, course_id: Uuid) -> Result<Vec<AssetRow>, StoreError> {
        self.inner.list_unit_assets(course_id).await
    }

    async fn count_structure(&self, course_id: Uuid) -> Result<StructureCounts, StoreError> {
        self.inner.count_structure(course_id).await
    }
}

/// Importer wired to in-memory collaborators
pub struct TestEnv {
    pub pool: SqlitePool,
    pub store: Arc<dyn CourseStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub identity: Arc<StaticIdentity>,
    pub importer: CourseImporter,
    /// Parent of the importer's workspaces
    pub scratch: TempDir,
    /// Where test archives are written
    pub uploads: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let pool = init_memory_pool().await.unwrap();
        let store: Arc<dyn CourseStore> = Arc::new(SqliteCourseStore::new(pool.clone()));
        Self::with_store(pool, store, ImporterSettings::default())
    }

    pub async fn with_settings(settings: ImporterSettings) -> Self {
        let pool = init_memory_pool().await.unwrap();
        let store: Arc<dyn CourseStore> = Arc::new(SqliteCourseStore::new(pool.clone()));
        Self::with_store(pool, store, settings)
    }

    pub fn with_store(
        pool: SqlitePool,
        store: Arc<dyn CourseStore>,
        mut settings: ImporterSettings,
    ) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        settings.scratch_dir = Some(scratch.path().to_path_buf());

        let objects = Arc::new(MemoryObjectStore::new());
        let identity = Arc::new(StaticIdentity::with_defaults());
        let importer = CourseImporter::new(
            identity.clone(),
            store.clone(),
            objects.clone(),
            settings,
        );

        Self {
            pool,
            store,
            objects,
            identity,
            importer,
            scratch,
            uploads,
        }
    }

    pub fn request(&self, archive: ArchiveBuilder, target: Option<Uuid>) -> ImportRequest {
        self.request_as(ADMIN_TOKEN, archive, target)
    }

    pub fn request_as(
        &self,
        token: &str,
        archive: ArchiveBuilder,
        target: Option<Uuid>,
    ) -> ImportRequest {
        let file_name = format!("{}.zip", Uuid::new_v4());
        let archive_path = archive.write_to(self.uploads.path(), &file_name);
        ImportRequest {
            session_token: token.to_string(),
            archive_path,
            archive_name: "course.zip".to_string(),
            target_course_id: target,
        }
    }

    /// Entries left behind in the scratch directory
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
