//! Error type shared by the command handlers

use stagepack_config::ConfigError;
use stagepack_manifest::ManifestError;
use stagepack_pipeline::PipelineError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = CommandError::InvalidArgs("missing package.json".to_string());
        assert_eq!(err.to_string(), "Invalid arguments: missing package.json");

        let err = CommandError::from(ConfigError::UnknownKey("colour".to_string()));
        assert!(err.to_string().starts_with("Configuration error: Unknown config key: colour"));
    }
}
