use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the package graph or reading/writing package metadata
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize package metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt package metadata in {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    #[error("No package.json found at {0}")]
    MissingManifest(PathBuf),

    #[error("Package '{package}' depends on '{dependency}', which is not installed")]
    MissingDependency { package: String, dependency: String },

    #[error("No package in this build is rooted at {0}")]
    UnknownPackage(PathBuf),

    #[error("Package metadata for {0} was already written in this build")]
    DuplicateWrite(PathBuf),
}
