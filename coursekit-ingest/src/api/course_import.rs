//! Course archive import endpoint
//!
//! POST /api/admin/courses/import[?course_id=<uuid>]
//!
//! Multipart form with a `file` field holding the ZIP archive. The session
//! token is read from `Authorization: Bearer <token>` and checked before any
//! of the body is consumed.

use std::path::Path;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use coursekit_common::auth::bearer_token;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::ImportWarning;
use crate::AppState;

/// Multipart field carrying the archive
pub const ARCHIVE_FIELD: &str = "file";

/// Headroom above the archive limit for multipart framing
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub course_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub course_id: Uuid,
    pub slug: String,
    pub message: String,
    pub source_file_url: Option<String>,
    pub warnings: Vec<ImportWarning>,
}

/// POST /api/admin/courses/import
pub async fn import_course(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportResponse>> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .unwrap_or_default();
    let session = state.importer.authorize(token).await?;

    let target_course_id = parse_course_id(query.course_id.as_deref())?;

    let upload_dir = state.importer.create_workspace()?;
    let archive_path = upload_dir.path().join("upload.zip");
    let archive_name = receive_archive(&mut multipart, &archive_path, state.max_upload_bytes).await?;

    let result = state
        .importer
        .import_as(&session, &archive_path, &archive_name, target_course_id)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            *state.last_error.write().await = Some(format!("{}: {}", e.code(), e));
            return Err(e.into());
        }
    };

    info!(
        course_id = %outcome.course_id,
        course_slug = %outcome.slug,
        user = %session.user().email,
        "Import request completed"
    );

    Ok(Json(ImportResponse {
        success: true,
        course_id: outcome.course_id,
        slug: outcome.slug,
        message: outcome.message,
        source_file_url: outcome.source_file_url,
        warnings: outcome.warnings,
    }))
}

fn parse_course_id(raw: Option<&str>) -> ApiResult<Option<Uuid>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("course_id is not a valid id: {}", raw))),
    }
}

/// Stream the archive field to `dest`; returns the client's file name
async fn receive_archive(
    multipart: &mut Multipart,
    dest: &Path,
    max_bytes: u64,
) -> ApiResult<String> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(ARCHIVE_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "course.zip".to_string());

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ApiError::Internal(format!("Creating upload file failed: {}", e)))?;
        let mut written: u64 = 0;

        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "Archive exceeds {} bytes",
                    max_bytes
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::Internal(format!("Writing upload failed: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::Internal(format!("Writing upload failed: {}", e)))?;

        if written == 0 {
            return Err(ApiError::BadRequest("Uploaded archive is empty".to_string()));
        }
        debug!(file_name = %file_name, bytes = written, "Archive received");
        return Ok(file_name);
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        ARCHIVE_FIELD
    )))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

pub fn import_routes(max_upload_bytes: u64) -> Router<AppState> {
    let limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/api/admin/courses/import", post(import_course))
        .layer(DefaultBodyLimit::max(limit))
}
