use stagepack_ast::ScanError;
use stagepack_config::ConfigError;
use stagepack_manifest::ManifestError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Build-fatal errors. Every variant names the offending file, specifier or path.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{file}: cannot resolve '{specifier}': {reason}")]
    UnresolvedSpecifier {
        file: String,
        specifier: String,
        reason: String,
    },

    #[error("Ambiguous colocation for '{identity}': {}", .candidates.join(", "))]
    AmbiguousColocation {
        identity: String,
        candidates: Vec<String>,
    },

    #[error("Synthesis collision at '{path}': generated from {}", .sources.join(" and "))]
    SynthesisCollision { path: String, sources: Vec<String> },

    #[error("Package '{package}' lists implicit module '{specifier}', which is not in its output")]
    InvalidImplicitModule { package: String, specifier: String },

    #[error("Dependency cycle between packages being converted: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Build cancelled: {0}")]
    Cancelled(String),

    #[error("{file}: template compilation failed: {reason}")]
    TemplateCompile { file: String, reason: String },

    #[error("Warning treated as error: {0}")]
    Warning(Warning),

    #[error("{file}: unreadable resolve record: {source}")]
    ResolveRecord {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Did this error come from another package's failure?
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }
}

/// Non-fatal findings, promoted to errors with `warnings-as-errors`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Deprecated `<name>/component.js` + `<name>/template.hbs` layout
    PodLayout { package: String, path: String },
    /// A `renamed-modules` entry no module of the build imports
    UnusedRenamedModule {
        package: String,
        old: String,
        new: String,
    },
    /// An ambiguous component identity settled by `prefer-authored`
    AmbiguityResolved {
        package: String,
        identity: String,
        kept: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PodLayout { package, path } => {
                write!(f, "{}: '{}' uses the deprecated pod layout", package, path)
            }
            Warning::UnusedRenamedModule { package, old, new } => write!(
                f,
                "{}: renamed module '{}' -> '{}' is never imported",
                package, old, new
            ),
            Warning::AmbiguityResolved {
                package,
                identity,
                kept,
            } => write!(
                f,
                "{}: ambiguous component '{}', keeping authored module '{}'",
                package, identity, kept
            ),
        }
    }
}
