//! Manifest file helpers for explicit paths, used by the CLI `meta` command.
//! The pipeline never writes to the source tree.

use crate::errors::ManifestError;
use crate::metadata::parse_meta;
use crate::types::PackageMeta;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Read and validate the metadata block of the `package.json` at `manifest_path`
pub fn read_from_path(manifest_path: &Path) -> Result<PackageMeta, ManifestError> {
    debug!("Reading package metadata from: {:?}", manifest_path);

    if !manifest_path.exists() {
        return Err(ManifestError::MissingManifest(manifest_path.to_path_buf()));
    }

    let content = fs::read_to_string(manifest_path)?;
    let manifest: Value =
        serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
            path: manifest_path.to_path_buf(),
            source,
        })?;
    let meta = parse_meta(manifest_path, &manifest)?;

    info!(
        "Package metadata loaded: {} implicit modules, {} public assets",
        meta.implicit_modules.len(),
        meta.public_assets.len()
    );

    Ok(meta)
}
