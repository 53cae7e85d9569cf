//! Configuration management for the stagepack pipeline
//!
//! Shared by the pipeline and the CLI so both agree on where options live and
//! how per-package overrides are applied.

pub mod options;

pub use options::{
    user_config_path, AmbiguityPolicy, BuildOptions, ConfigError, PackageOptions, StaticMode,
    CONFIG_ENV, PACKAGE_CONFIG_FILE, RESOLVE_ONLY_ENV,
};
