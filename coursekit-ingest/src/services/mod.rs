//! Course import pipeline

pub mod archive_extractor;
pub mod asset_uploader;
pub mod course_importer;
pub mod manifest_parser;
pub mod module_resolver;
pub mod slug;
pub mod structure_persister;
pub mod unit_content;

pub use crate::error::IngestError;
pub use archive_extractor::{extract_archive, locate_course_root, ArchiveLimits};
pub use asset_uploader::AssetUploader;
pub use course_importer::{AdminSession, CourseImporter, ImportRequest, ImporterSettings};
pub use manifest_parser::{parse_course_manifest, ParsedManifest, COURSE_MANIFEST};
pub use module_resolver::ModuleResolver;
pub use slug::slugify;
pub use structure_persister::{ClaimedCourse, PersistedCourse, StructurePersister};
pub use unit_content::resolve_unit_content;
