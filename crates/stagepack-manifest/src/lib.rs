//! Stagepack package graph and metadata
//!
//! This crate owns the two read-mostly models every build shares: the
//! `PackageCache` (installed packages and their dependency edges, built once per
//! build) and the package metadata block stored under `"ember-addon"` in each
//! `package.json`.

pub mod errors;
pub mod manifest_writer;
pub mod metadata;
pub mod package_cache;
pub mod types;

pub use errors::ManifestError;
pub use metadata::{parse_meta, render_manifest, MetadataStore};
pub use package_cache::PackageCache;
pub use types::{
    schema_of, MetaType, Package, PackageId, PackageMeta, PackageRole, Schema, ADDON_KEYWORD,
    META_KEY, SCHEMA_VERSION,
};

pub use manifest_writer::read_from_path;
