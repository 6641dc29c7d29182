//! Data models for coursekit-ingest

pub mod course;
pub mod import_result;
pub mod lenient;
pub mod manifest;

pub use course::{
    CoursePayload, CourseRecord, CourseTree, LooseAsset, ResolvedModule, ResolvedUnit,
    StoredAsset, UnitContent, DEFAULT_CONTENT_FORMAT, DEFAULT_UNIT_TYPE,
};
pub use import_result::{ImportOutcome, ImportWarning, WarningCode, WarningLog};
pub use manifest::{
    AssetDeclaration, ContentDeclaration, CourseManifest, ModuleDeclaration, ModuleManifest,
    UnitDeclaration,
};
