//! Common types and utilities shared across modules

use crate::errors::CommandError;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Global CLI options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Decrease verbosity")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[arg(long, global = true, help = "Only log to file, keep the console quiet")]
    pub no_stdout: bool,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: quiet/warn only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

/// Canonical package root for a command, defaulting to the working directory
pub fn package_root(path: Option<&Path>) -> Result<PathBuf, CommandError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if !path.join("package.json").is_file() {
        return Err(CommandError::InvalidArgs(format!(
            "{} does not contain a package.json",
            path.display()
        )));
    }
    Ok(path.canonicalize()?)
}
