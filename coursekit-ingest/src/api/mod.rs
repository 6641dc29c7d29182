//! HTTP API handlers for coursekit-ingest

pub mod course_import;
pub mod courses;
pub mod health;

pub use course_import::import_routes;
pub use courses::course_routes;
pub use health::health_routes;
