//! # Coursekit Common Library
//!
//! Shared code for the coursekit services:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - SQLite pool initialization
//! - Session/role identity lookups

pub mod auth;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
