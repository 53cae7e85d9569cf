use crate::config_manager::{user_config_path, BuildOptions, CONFIG_ENV};
use crate::errors::CommandError;
use crate::logger;
use crate::GlobalOpts;
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    Show,
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
    },
    /// Print the config file the build would read.
    /// Falls back to the user-level path when no file exists yet.
    Path,
}

/// The file `config` reads and writes: `$STAGEPACK_CONFIG`, a package-local
/// `stagepack.toml` in the working directory, or the user-level file
fn config_path() -> Result<PathBuf, CommandError> {
    let cwd = std::env::current_dir()?;
    BuildOptions::path(Some(&cwd))
        .or_else(user_config_path)
        .ok_or_else(|| {
            CommandError::InvalidArgs(format!(
                "no home directory found; set {} to choose a config file",
                CONFIG_ENV
            ))
        })
}

pub fn handle_config(action: ConfigAction, opts: &GlobalOpts) -> Result<(), CommandError> {
    let path = config_path()?;
    logger::debug(&format!("Using config file: {}", path.display()));

    match action {
        ConfigAction::Show => {
            let options = load(&path)?;
            println!("{}", "Configuration:".bold().green());
            for (key, value) in options.values_iter() {
                println!("  {}: {}", key.cyan(), value);
            }
            if opts.verbosity_level() > 0 {
                for (name, package) in &options.packages {
                    let mode = package.mode.map(|m| m.as_str()).unwrap_or("inherit");
                    println!("  {} {}: {}", "package".dimmed(), name.cyan(), mode);
                }
            }
        }
        ConfigAction::Get { key } => {
            let options = load(&path)?;
            match options.get(&key) {
                Some(value) => println!("{}", value),
                None => {
                    return Err(stagepack_config::ConfigError::UnknownKey(key).into());
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut options = load(&path)?;
            options.set(&key, value.clone())?;
            options.save_to_path(&path)?;
            logger::success(&format!("Set {} = {}", key, value));
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn load(path: &std::path::Path) -> Result<BuildOptions, CommandError> {
    if path.exists() {
        Ok(BuildOptions::load_from_path(path)?)
    } else {
        Ok(BuildOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_gives_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let options = load(&dir.path().join("stagepack.toml"))?;
        assert_eq!(options, BuildOptions::default());
        Ok(())
    }

    #[test]
    fn test_set_then_load_round_trips_through_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stagepack.toml");
        let mut options = load(&path)?;
        options.set("mode", "static".to_string())?;
        options.save_to_path(&path)?;
        assert_eq!(load(&path)?.get("mode").as_deref(), Some("static"));
        Ok(())
    }
}
