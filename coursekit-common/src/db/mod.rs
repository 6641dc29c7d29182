//! Database initialization shared by coursekit services

pub mod init;

pub use init::*;
