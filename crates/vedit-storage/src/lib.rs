//! S3-compatible object storage.
//!
//! This crate provides:
//! - Streaming download of uploaded assets to a local path
//! - Upload of rendered outputs
//! - The [`ObjectStore`] seam the edit pipeline depends on

pub mod client;
pub mod error;

pub use client::{content_type_for, ObjectStore, S3Client, S3Config};
pub use error::{StorageError, StorageResult};
