//! Course listing

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db::CourseSummary;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CourseListResponse {
    pub courses: Vec<CourseSummary>,
    pub total: usize,
}

/// GET /api/courses
pub async fn list_courses(State(state): State<AppState>) -> ApiResult<Json<CourseListResponse>> {
    let courses = state
        .store
        .list_courses()
        .await
        .map_err(|e| ApiError::Internal(format!("Listing courses failed: {}", e)))?;

    Ok(Json(CourseListResponse {
        total: courses.len(),
        courses,
    }))
}

pub fn course_routes() -> Router<AppState> {
    Router::new().route("/api/courses", get(list_courses))
}
