use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while scanning or rewriting module and template sources
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("{file}: colocated component module has no default export to attach its template to")]
    MissingDefaultExport { file: PathBuf },

    #[error("{file}: unsupported default export form: {form}")]
    UnsupportedDefaultExport { file: PathBuf, form: String },

    #[error("Invalid scanner pattern '{0}'")]
    Pattern(&'static str),
}
