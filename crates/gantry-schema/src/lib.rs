//! Shared data model for gantry: the package manifest, its validation rules,
//! and the ignore-pattern matcher.
//!
//! This crate is pure data and policy -- no I/O. The deploy engine
//! (`gantry-core`) reads a fetched working copy and hands the raw manifest
//! document to [`Manifest::parse`], which deserializes and validates in a
//! single pass.

pub mod ignore;
pub mod manifest;
pub mod types;

// Re-exports
pub use ignore::is_ignored;
pub use manifest::{ContentEntry, Dependency, MANIFEST_FILE, Manifest, ValidationError};
pub use types::PackageName;
