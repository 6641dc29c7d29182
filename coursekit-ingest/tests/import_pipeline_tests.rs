//! End-to-end tests of the course import pipeline against in-memory
//! collaborators

mod helpers;

use std::sync::Arc;

use coursekit_ingest::db::{init_memory_pool, CourseStore};
use coursekit_ingest::models::WarningCode;
use coursekit_ingest::services::{ArchiveLimits, ImportRequest, ImporterSettings, IngestError};
use helpers::{ArchiveBuilder, FlakyCourseStore, TestEnv, STUDENT_TOKEN};
use serde_json::json;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

/// Two modules, three units, one unit asset and one loose asset
fn biology_archive() -> ArchiveBuilder {
    biology_archive_under("")
}

fn biology_archive_under(prefix: &str) -> ArchiveBuilder {
    let p = |name: &str| format!("{}{}", prefix, name);
    ArchiveBuilder::new()
        .json(
            &p("course.json"),
            &json!({
                "title": "Biology 101",
                "description": "Cells and organisms",
                "keywords": "cells, dna",
                "duration": "90",
                "modules": [
                    {
                        "slug": "intro",
                        "title": "Introduction",
                        "units": [
                            {"slug": "welcome", "title": "Welcome", "assets": ["assets\\img.png"]},
                            {"slug": "cells", "title": "Cells", "content": "# Inline cells"}
                        ]
                    },
                    "genetics"
                ],
                "assets": [
                    {"file": "handouts/syllabus.pdf", "module": "intro", "unit": "welcome"}
                ]
            }),
        )
        .file(&p("modules/intro/units/welcome.md"), "# Welcome\n\nHello.")
        .file(&p("modules/intro/assets/img.png"), PNG_BYTES)
        .json(
            &p("modules/genetics/module.json"),
            &json!({
                "title": "Genetics",
                "units": [
                    {"slug": "dna", "title": "DNA", "content_file": "lessons/dna.md", "format": "html"}
                ]
            }),
        )
        .file(&p("modules/genetics/lessons/dna.md"), "<p>Double helix</p>")
        .file(&p("handouts/syllabus.pdf"), b"%PDF-1.4 fake")
}

fn titled_archive(title: &str) -> ArchiveBuilder {
    ArchiveBuilder::new().json(
        "course.json",
        &json!({"title": title, "modules": [{"slug": "m", "units": [{"title": "Only", "content": "x"}]}]}),
    )
}

fn raw_request(env: &TestEnv, bytes: &[u8]) -> ImportRequest {
    let archive_path = env.uploads.path().join("raw-upload.zip");
    std::fs::write(&archive_path, bytes).unwrap();
    ImportRequest {
        session_token: helpers::ADMIN_TOKEN.to_string(),
        archive_path,
        archive_name: "raw-upload.zip".to_string(),
        target_course_id: None,
    }
}

#[tokio::test]
async fn test_full_import_builds_course_tree() {
    let env = TestEnv::new().await;

    let outcome = env
        .importer
        .import(env.request(biology_archive(), None))
        .await
        .expect("import should succeed");

    assert_eq!(outcome.slug, "biology-101");
    assert_eq!(outcome.modules_imported, 2);
    assert_eq!(outcome.units_imported, 3);
    assert_eq!(outcome.assets_imported, 2);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert!(outcome.message.contains("Biology 101"));
    assert!(outcome.message.contains("biology-101"));

    let course = env
        .store
        .find_course(outcome.course_id)
        .await
        .unwrap()
        .expect("course row");
    assert_eq!(course.title, "Biology 101");
    assert_eq!(course.description.as_deref(), Some("Cells and organisms"));
    assert_eq!(course.keywords, vec!["cells", "dna"]);
    assert_eq!(course.duration_minutes, Some(90));
    assert!(course.has_structured_content);
    assert_eq!(course.source_file_path, outcome.source_file_url);

    let modules = env.store.list_modules(outcome.course_id).await.unwrap();
    let module_slugs: Vec<&str> = modules.iter().map(|m| m.slug.as_str()).collect();
    assert_eq!(module_slugs, vec!["intro", "genetics"]);
    assert_eq!(modules[1].title, "Genetics");

    let units = env.store.list_units(outcome.course_id).await.unwrap();
    let welcome = units.iter().find(|u| u.slug == "welcome").unwrap();
    assert_eq!(welcome.content_body.as_deref(), Some("# Welcome\n\nHello."));
    assert_eq!(welcome.content_format.as_deref(), Some("markdown"));
    assert_eq!(welcome.unit_type, "chapter");

    let cells = units.iter().find(|u| u.slug == "cells").unwrap();
    assert_eq!(cells.content_body.as_deref(), Some("# Inline cells"));

    let dna = units.iter().find(|u| u.slug == "dna").unwrap();
    assert_eq!(dna.module_slug, "genetics");
    assert_eq!(dna.content_body.as_deref(), Some("<p>Double helix</p>"));
    assert_eq!(dna.content_format.as_deref(), Some("html"));

    // Both assets land on the welcome unit: one declared there, one loose
    let assets = env.store.list_unit_assets(outcome.course_id).await.unwrap();
    assert_eq!(assets.len(), 2);
    assert!(assets.iter().all(|a| a.unit_slug == "welcome"));

    let image = assets.iter().find(|a| a.file_name == "img.png").unwrap();
    assert_eq!(image.storage_path, "courses/biology-101/modules/intro/assets/img.png");
    assert_eq!(image.content_type, "image/png");
    assert_eq!(image.size_bytes, PNG_BYTES.len() as i64);
    assert_eq!(
        env.objects.get(&image.storage_path).as_deref(),
        Some(PNG_BYTES)
    );

    let syllabus = assets.iter().find(|a| a.file_name == "syllabus.pdf").unwrap();
    assert_eq!(syllabus.storage_path, "courses/biology-101/handouts/syllabus.pdf");
    assert_eq!(syllabus.content_type, "application/pdf");
}

#[tokio::test]
async fn test_archives_extracted_tree_and_original_upload() {
    let env = TestEnv::new().await;

    let outcome = env
        .importer
        .import(env.request(biology_archive(), None))
        .await
        .unwrap();

    let keys = env.objects.keys();
    assert!(keys.contains(&"courses/biology-101/source/course.json".to_string()));
    assert!(keys.contains(&"courses/biology-101/source/modules/genetics/lessons/dna.md".to_string()));

    let original = outcome.source_file_url.expect("archived upload key");
    assert!(original.starts_with("archives/biology-101/"), "{}", original);
    assert!(original.ends_with("-course.zip"), "{}", original);
    assert_eq!(env.objects.content_type(&original).as_deref(), Some("application/zip"));
}

#[tokio::test]
async fn test_extracted_tree_archival_can_be_disabled() {
    let env = TestEnv::with_settings(ImporterSettings {
        archive_extracted_tree: false,
        ..ImporterSettings::default()
    })
    .await;

    let outcome = env
        .importer
        .import(env.request(biology_archive(), None))
        .await
        .unwrap();

    assert!(env.objects.keys().iter().all(|k| !k.contains("/source/")));
    assert!(outcome.source_file_url.is_some());
}

#[tokio::test]
async fn test_reimport_replaces_structure() {
    let env = TestEnv::new().await;

    let first = env
        .importer
        .import(env.request(biology_archive(), None))
        .await
        .unwrap();
    let second = env
        .importer
        .import(env.request(biology_archive(), Some(first.course_id)))
        .await
        .unwrap();

    assert_eq!(second.course_id, first.course_id);
    assert_eq!(second.slug, first.slug);

    let counts = env.store.count_structure(first.course_id).await.unwrap();
    assert_eq!(counts.modules, 2);
    assert_eq!(counts.units, 3);
    assert_eq!(counts.assets, 2);
    assert_eq!(env.store.list_courses().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reimport_keeps_existing_slug_unless_declared() {
    let env = TestEnv::new().await;

    let first = env
        .importer
        .import(env.request(titled_archive("Biology 101"), None))
        .await
        .unwrap();
    let created_at = env
        .store
        .find_course(first.course_id)
        .await
        .unwrap()
        .unwrap()
        .created_at;

    let renamed = env
        .importer
        .import(env.request(titled_archive("Advanced Biology"), Some(first.course_id)))
        .await
        .unwrap();
    assert_eq!(renamed.slug, "biology-101");

    let course = env.store.find_course(first.course_id).await.unwrap().unwrap();
    assert_eq!(course.title, "Advanced Biology");
    assert_eq!(course.created_at, created_at);

    let declared = ArchiveBuilder::new().json(
        "course.json",
        &json!({"title": "Advanced Biology", "slug": "Adv Bio"}),
    );
    let redeclared = env
        .importer
        .import(env.request(declared, Some(first.course_id)))
        .await
        .unwrap();
    assert_eq!(redeclared.slug, "adv-bio");
}

#[tokio::test]
async fn test_same_title_gets_suffixed_slug() {
    let env = TestEnv::new().await;

    let first = env
        .importer
        .import(env.request(titled_archive("Biology 101"), None))
        .await
        .unwrap();
    let second = env
        .importer
        .import(env.request(titled_archive("Biology 101"), None))
        .await
        .unwrap();

    assert_eq!(first.slug, "biology-101");
    assert_eq!(second.slug, "biology-101-1");
    assert_ne!(first.course_id, second.course_id);
}

#[tokio::test]
async fn test_concurrent_imports_with_same_title_both_succeed() {
    let env = TestEnv::new().await;
    let a = env.request(titled_archive("Biology 101"), None);
    let b = env.request(titled_archive("Biology 101"), None);

    let (a, b) = tokio::join!(env.importer.import(a), env.importer.import(b));
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut slugs = vec![a.slug, b.slug];
    slugs.sort();
    assert_eq!(slugs, vec!["biology-101", "biology-101-1"]);
    assert_eq!(env.store.list_courses().await.unwrap().len(), 2);
}

fn handout_archive(handout: &[u8]) -> ArchiveBuilder {
    ArchiveBuilder::new()
        .json(
            "course.json",
            &json!({
                "title": "Biology 101",
                "modules": [{"slug": "intro", "units": [{"slug": "welcome", "assets": ["assets/handout.txt"]}]}]
            }),
        )
        .file("modules/intro/units/welcome.md", "Hello")
        .file("modules/intro/assets/handout.txt", handout)
}

#[tokio::test]
async fn test_same_title_imports_keep_separate_objects() {
    let env = TestEnv::new().await;

    let first = env
        .importer
        .import(env.request(handout_archive(b"FIRST-COURSE"), None))
        .await
        .unwrap();
    let second = env
        .importer
        .import(env.request(handout_archive(b"SECOND-COURSE"), None))
        .await
        .unwrap();
    assert_eq!(first.slug, "biology-101");
    assert_eq!(second.slug, "biology-101-1");

    let first_assets = env.store.list_unit_assets(first.course_id).await.unwrap();
    assert_eq!(first_assets.len(), 1);
    assert_eq!(
        first_assets[0].storage_path,
        "courses/biology-101/modules/intro/assets/handout.txt"
    );
    assert_eq!(
        env.objects.get(&first_assets[0].storage_path).as_deref(),
        Some(&b"FIRST-COURSE"[..])
    );

    let second_assets = env.store.list_unit_assets(second.course_id).await.unwrap();
    assert_eq!(second_assets.len(), 1);
    assert_eq!(
        second_assets[0].storage_path,
        "courses/biology-101-1/modules/intro/assets/handout.txt"
    );
    assert_eq!(
        env.objects.get(&second_assets[0].storage_path).as_deref(),
        Some(&b"SECOND-COURSE"[..])
    );

    let first_source = first.source_file_url.unwrap();
    let second_source = second.source_file_url.unwrap();
    assert!(first_source.starts_with("archives/biology-101/"));
    assert!(second_source.starts_with("archives/biology-101-1/"));
}

#[tokio::test]
async fn test_duplicate_unit_titles_read_their_own_content_files() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new()
        .json(
            "course.json",
            &json!({
                "title": "Chemistry",
                "modules": [{"slug": "basics", "units": [{"title": "Intro"}, {"title": "Intro"}]}]
            }),
        )
        .file("modules/basics/units/intro.md", "FIRST BODY")
        .file("modules/basics/units/intro-1.md", "SECOND BODY");

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);

    let units = env.store.list_units(outcome.course_id).await.unwrap();
    let body = |slug: &str| {
        units
            .iter()
            .find(|u| u.slug == slug)
            .and_then(|u| u.content_body.clone())
    };
    assert_eq!(body("intro").as_deref(), Some("FIRST BODY"));
    assert_eq!(body("intro-1").as_deref(), Some("SECOND BODY"));
}

#[tokio::test]
async fn test_module_manifest_id_overrides_slug() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new()
        .json(
            "course.json",
            &json!({
                "title": "Chemistry",
                "modules": [{"slug": "week-1", "directory": "week1", "title": "Week one"}]
            }),
        )
        .json(
            "modules/week1/module.json",
            &json!({"id": "Getting Started", "title": "Ignored title", "units": ["Atoms"]}),
        )
        .file("modules/week1/units/atoms.md", "Protons and neutrons");

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();

    let modules = env.store.list_modules(outcome.course_id).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].slug, "getting-started");
    assert_eq!(modules[0].title, "Week one");

    let units = env.store.list_units(outcome.course_id).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].slug, "atoms");
    assert_eq!(units[0].content_body.as_deref(), Some("Protons and neutrons"));
}

#[tokio::test]
async fn test_missing_content_file_leaves_unit_empty() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new()
        .json(
            "course.json",
            &json!({
                "title": "Physics",
                "modules": [{
                    "slug": "motion",
                    "units": [
                        {"slug": "ghost", "content_file": "lessons/missing.md", "body": "not used"},
                        {"slug": "speed"}
                    ]
                }]
            }),
        )
        .file("modules/motion/units/speed.md", "v = d / t");

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();

    assert_eq!(outcome.units_imported, 2);
    assert_eq!(outcome.count_by_code(WarningCode::UnitContentMissing), 1);
    assert!(outcome.message.contains("1 items skipped"));

    let units = env.store.list_units(outcome.course_id).await.unwrap();
    let ghost = units.iter().find(|u| u.slug == "ghost").unwrap();
    assert_eq!(ghost.content_body, None);
    let speed = units.iter().find(|u| u.slug == "speed").unwrap();
    assert_eq!(speed.content_body.as_deref(), Some("v = d / t"));
}

#[tokio::test]
async fn test_missing_asset_is_warning() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new().json(
        "course.json",
        &json!({
            "title": "Art",
            "modules": [{"slug": "color", "units": [{"slug": "hue", "assets": ["img/missing.png"]}]}]
        }),
    );

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();

    assert_eq!(outcome.count_by_code(WarningCode::AssetMissing), 1);
    assert_eq!(outcome.assets_imported, 0);
    assert_eq!(outcome.units_imported, 1);
}

#[tokio::test]
async fn test_malformed_module_manifest_falls_back_to_declaration() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new()
        .json(
            "course.json",
            &json!({
                "title": "Math",
                "modules": [{"slug": "algebra", "title": "Algebra", "units": ["Variables"]}]
            }),
        )
        .file("modules/algebra/module.json", "{broken");

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();

    assert_eq!(outcome.count_by_code(WarningCode::ModuleManifestReadError), 1);
    assert_eq!(outcome.modules_imported, 1);
    assert_eq!(outcome.units_imported, 1);
}

#[tokio::test]
async fn test_upload_failure_skips_asset_only() {
    let env = TestEnv::new().await;
    env.objects.fail_keys_containing("img.png");

    let outcome = env
        .importer
        .import(env.request(biology_archive(), None))
        .await
        .unwrap();

    assert!(outcome.count_by_code(WarningCode::StorageUploadFailure) >= 1);
    assert_eq!(outcome.units_imported, 3);
    assert_eq!(outcome.assets_imported, 1);

    let assets = env.store.list_unit_assets(outcome.course_id).await.unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].file_name, "syllabus.pdf");
}

#[tokio::test]
async fn test_insert_failures_skip_subtree() {
    let pool = init_memory_pool().await.unwrap();
    let store = Arc::new(FlakyCourseStore::new(pool.clone()).fail_module("genetics").fail_unit("cells"));
    let env = TestEnv::with_store(pool, store, ImporterSettings::default());

    let outcome = env
        .importer
        .import(env.request(biology_archive(), None))
        .await
        .expect("item failures must not abort the import");

    assert_eq!(outcome.modules_imported, 1);
    assert_eq!(outcome.units_imported, 1);
    assert_eq!(outcome.count_by_code(WarningCode::ModuleInsertFailed), 1);
    assert_eq!(outcome.count_by_code(WarningCode::UnitInsertFailed), 1);
}

#[tokio::test]
async fn test_wrapper_directory_is_tolerated() {
    let env = TestEnv::new().await;

    let outcome = env
        .importer
        .import(env.request(biology_archive_under("biology/"), None))
        .await
        .unwrap();

    assert_eq!(outcome.modules_imported, 2);
    assert_eq!(outcome.units_imported, 3);
}

#[tokio::test]
async fn test_non_admin_is_rejected_before_any_work() {
    let env = TestEnv::new().await;

    let result = env
        .importer
        .import(env.request_as(STUDENT_TOKEN, biology_archive(), None))
        .await;
    assert!(matches!(result, Err(IngestError::Unauthorized(_))));

    let result = env
        .importer
        .import(env.request_as("unknown-token", biology_archive(), None))
        .await;
    assert!(matches!(result, Err(IngestError::Unauthorized(_))));

    let result = env
        .importer
        .import(env.request_as("", biology_archive(), None))
        .await;
    assert!(matches!(result, Err(IngestError::Unauthorized(_))));

    assert_eq!(env.identity.lookups(), 2);
    assert_eq!(env.objects.put_count(), 0);
    assert_eq!(env.scratch_entries(), 0);
    assert!(env.store.list_courses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_zip_upload_is_rejected() {
    let env = TestEnv::new().await;

    let result = env
        .importer
        .import(raw_request(&env, b"this is not a zip archive"))
        .await;

    assert!(matches!(result, Err(IngestError::ArchiveInvalid(_))));
    assert_eq!(env.objects.put_count(), 0);
    assert!(env.store.list_courses().await.unwrap().is_empty());
    assert_eq!(env.scratch_entries(), 0);
}

#[tokio::test]
async fn test_missing_manifest_is_rejected() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new().file("readme.txt", "no manifest here");

    let result = env.importer.import(env.request(archive, None)).await;

    assert!(matches!(result, Err(IngestError::ManifestMissing(_))));
    assert_eq!(env.objects.put_count(), 0);
    assert_eq!(env.scratch_entries(), 0);
}

#[tokio::test]
async fn test_malformed_manifest_is_rejected() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new().file("course.json", "{\"title\": ");

    let result = env.importer.import(env.request(archive, None)).await;

    assert!(matches!(result, Err(IngestError::ManifestMalformed(_))));
    assert!(env.store.list_courses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_path_traversal_rejects_whole_archive() {
    let env = TestEnv::new().await;
    let archive = titled_archive("Sneaky").file("../escape.txt", "gotcha");

    let result = env.importer.import(env.request(archive, None)).await;

    assert!(matches!(result, Err(IngestError::ArchiveInvalid(_))));
    assert!(!env.uploads.path().join("escape.txt").exists());
    assert_eq!(env.objects.put_count(), 0);
}

#[tokio::test]
async fn test_symlink_entries_are_not_materialized() {
    let env = TestEnv::new().await;
    let archive = titled_archive("Links").symlink("modules/m/units/only.md", "/etc/passwd");

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();

    let units = env.store.list_units(outcome.course_id).await.unwrap();
    assert_eq!(units[0].content_body.as_deref(), Some("x"));
    assert!(env.objects.keys().iter().all(|k| !k.ends_with("only.md")));
}

#[tokio::test]
async fn test_entry_limit_rejects_archive() {
    let env = TestEnv::with_settings(ImporterSettings {
        limits: ArchiveLimits {
            max_entries: 2,
            ..ArchiveLimits::default()
        },
        ..ImporterSettings::default()
    })
    .await;

    let result = env
        .importer
        .import(env.request(biology_archive(), None))
        .await;

    assert!(matches!(result, Err(IngestError::ArchiveInvalid(_))));
}

#[tokio::test]
async fn test_flat_course_without_modules() {
    let env = TestEnv::new().await;
    let archive = ArchiveBuilder::new().json(
        "course.json",
        &json!({"title": "Reading List", "prerequisites": ["none"], "learning_outcomes": "read, think"}),
    );

    let outcome = env.importer.import(env.request(archive, None)).await.unwrap();

    let course = env.store.find_course(outcome.course_id).await.unwrap().unwrap();
    assert!(!course.has_structured_content);
    assert_eq!(course.prerequisites, vec!["none"]);
    assert_eq!(course.learning_outcomes, vec!["read", "think"]);
    assert_eq!(outcome.modules_imported, 0);
    assert_eq!(env.scratch_entries(), 0);
}
