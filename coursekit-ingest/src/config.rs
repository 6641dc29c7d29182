//! Configuration for coursekit-ingest
//!
//! Resolution priority, highest first: command line → `COURSEKIT_*`
//! environment variables → `coursekit-ingest.toml` → compiled defaults.
//! Command-line values are applied by the binary after [`IngestConfig::load`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use coursekit_common::config::{env_override, load_toml_config};
use coursekit_common::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::services::{ArchiveLimits, ImporterSettings};

/// Config file name inside the root folder
pub const CONFIG_FILE_NAME: &str = "coursekit-ingest.toml";

/// Database file name inside the root folder
pub const DB_FILE_NAME: &str = "coursekit.db";

pub const DEFAULT_PORT: u16 = 5780;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub bind_address: String,
    pub port: u16,
    /// Database file; `<root>/coursekit.db` when unset
    pub database_path: Option<PathBuf>,
    pub object_store: ObjectStoreConfig,
    pub limits: ArchiveLimits,
    pub timeouts: TimeoutConfig,
    pub upload_concurrency: usize,
    pub archive_extracted_tree: bool,
    pub admin_roles: Vec<String>,
    /// Parent of per-import workspaces; system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let importer = ImporterSettings::default();
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database_path: None,
            object_store: ObjectStoreConfig::default(),
            limits: importer.limits,
            timeouts: TimeoutConfig::default(),
            upload_concurrency: importer.upload_concurrency,
            archive_extracted_tree: importer.archive_extracted_tree,
            admin_roles: importer.admin_roles,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub extraction_secs: u64,
    pub upload_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extraction_secs: 120,
            upload_secs: 60,
        }
    }
}

/// Object storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectStoreConfig {
    /// Files under `directory` (`<root>/objects` when unset)
    Local {
        #[serde(default)]
        directory: Option<PathBuf>,
        #[serde(default)]
        public_base_url: Option<String>,
    },
    /// Bucket/object REST endpoint
    Http {
        base_url: String,
        bucket: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        ObjectStoreConfig::Local {
            directory: None,
            public_base_url: None,
        }
    }
}

impl IngestConfig {
    /// Load the TOML file (missing file = defaults) and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: IngestConfig = load_toml_config(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `COURSEKIT_*` environment variables on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_override::<String>("COURSEKIT_BIND_ADDRESS")? {
            self.bind_address = v;
        }
        if let Some(v) = env_override::<u16>("COURSEKIT_PORT")? {
            self.port = v;
        }
        if let Some(v) = env_override::<PathBuf>("COURSEKIT_DATABASE_PATH")? {
            self.database_path = Some(v);
        }
        if let Some(v) = env_override::<u64>("COURSEKIT_MAX_ARCHIVE_BYTES")? {
            self.limits.max_archive_bytes = v;
        }
        if let Some(v) = env_override::<u64>("COURSEKIT_EXTRACTION_TIMEOUT_SECS")? {
            self.timeouts.extraction_secs = v;
        }
        if let Some(v) = env_override::<u64>("COURSEKIT_UPLOAD_TIMEOUT_SECS")? {
            self.timeouts.upload_secs = v;
        }
        if let Some(v) = env_override::<usize>("COURSEKIT_UPLOAD_CONCURRENCY")? {
            self.upload_concurrency = v;
        }
        if let Some(v) = env_override::<bool>("COURSEKIT_ARCHIVE_EXTRACTED_TREE")? {
            self.archive_extracted_tree = v;
        }
        if let Some(v) = env_override::<String>("COURSEKIT_ADMIN_ROLES")? {
            self.admin_roles = v
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
        if let Some(base_url) = env_override::<String>("COURSEKIT_STORAGE_URL")? {
            let bucket = env_override::<String>("COURSEKIT_STORAGE_BUCKET")?
                .unwrap_or_else(|| "course-files".to_string());
            let api_key = env_override::<String>("COURSEKIT_STORAGE_KEY")?;
            info!("Object store configured from environment: {}", base_url);
            self.object_store = ObjectStoreConfig::Http {
                base_url,
                bucket,
                api_key,
            };
        }
        Ok(())
    }

    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join(DB_FILE_NAME))
    }

    pub fn importer_settings(&self) -> ImporterSettings {
        ImporterSettings {
            limits: self.limits,
            extraction_timeout: Duration::from_secs(self.timeouts.extraction_secs.max(1)),
            upload_timeout: Duration::from_secs(self.timeouts.upload_secs.max(1)),
            upload_concurrency: self.upload_concurrency.max(1),
            archive_extracted_tree: self.archive_extracted_tree,
            admin_roles: self.admin_roles.clone(),
            scratch_dir: self.scratch_dir.clone(),
            ..ImporterSettings::default()
        }
    }
}
