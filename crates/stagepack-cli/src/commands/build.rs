use crate::common::{package_root, GlobalOpts};
use crate::errors::CommandError;
use crate::logger;
use clap::Parser;
use colored::*;
use stagepack_config::{BuildOptions, StaticMode};
use stagepack_pipeline::{BuildMode, BuildResult, Pipeline};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    /// Package root to build (default: current directory)
    pub path: Option<PathBuf>,

    /// Output directory (default: <path>/dist)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Stop after resolution; nothing is packaged or installed
    #[arg(long)]
    pub resolve_only: bool,

    /// Override the resolution mode for every package (static or dynamic)
    #[arg(long)]
    pub mode: Option<StaticMode>,

    /// Precompile templates during the build
    #[arg(long)]
    pub compile_templates: bool,

    /// Treat build warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl BuildCommand {
    pub fn build_mode(&self) -> BuildMode {
        if self.resolve_only {
            BuildMode::ResolveOnly
        } else {
            BuildMode::from_env()
        }
    }

    /// Load options for `root` and apply the command line overrides
    pub fn options(&self, root: &std::path::Path) -> Result<BuildOptions, CommandError> {
        let mut options = BuildOptions::load(Some(root))?;
        if let Some(mode) = self.mode {
            options.mode = mode;
            for package in options.packages.values_mut() {
                package.mode = None;
            }
        }
        if self.compile_templates {
            options.compile_templates = true;
        }
        if self.strict {
            options.warnings_as_errors = true;
        }
        Ok(options)
    }
}

pub fn handle_build(cmd: BuildCommand, opts: &GlobalOpts) -> Result<(), CommandError> {
    let root = package_root(cmd.path.as_deref())?;
    let options = cmd.options(&root)?;
    let mode = cmd.build_mode();
    let out_dir = cmd.out.clone().unwrap_or_else(|| root.join("dist"));

    logger::debug(&format!("Building {} in {:?} mode", root.display(), mode));
    logger::spinner_start(&format!("Building {}", root.display()));

    let pipeline = Pipeline::new(options);
    let result = match pipeline.build(&root, mode) {
        Ok(result) => result,
        Err(e) => {
            logger::spinner_error("Build failed");
            return Err(e.into());
        }
    };

    if mode == BuildMode::Full {
        logger::spinner_message(&format!("Installing into {}", out_dir.display()));
        if let Err(e) = result.install(&out_dir) {
            logger::spinner_error("Install failed");
            return Err(e.into());
        }
        logger::spinner_success(&format!(
            "Built {} packages into {}",
            result.packages.len(),
            out_dir.display()
        ));
    } else {
        logger::spinner_success(&format!("Resolved {} packages", result.packages.len()));
    }

    info!(
        "Build finished: {} packages, {} warnings",
        result.packages.len(),
        result.warnings.len()
    );
    print_summary(&result, opts);
    Ok(())
}

fn print_summary(result: &BuildResult, opts: &GlobalOpts) {
    for output in &result.packages {
        let meta = output
            .meta
            .as_ref()
            .and_then(|m| m.meta_type)
            .map(|t| format!("{:?}", t).to_lowercase())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} ({} files, {} rewrites)",
            output.package.name.as_ref().cyan(),
            meta.dimmed(),
            output.tree.len(),
            output.report.rewrites
        );
        if opts.verbosity_level() > 0 {
            for module in &output.report.virtual_modules {
                println!("    {} {}", "virtual".dimmed(), module);
            }
        }
    }
    for warning in &result.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_only_flag_wins() {
        let cmd = BuildCommand::parse_from(["build", "--resolve-only"]);
        assert_eq!(cmd.build_mode(), BuildMode::ResolveOnly);
    }

    #[test]
    fn test_overrides_applied_to_options() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("stagepack.toml"),
            "mode = \"dynamic\"\n\n[packages.my-addon]\nmode = \"dynamic\"\n",
        )?;
        let cmd = BuildCommand::parse_from(["build", "--mode", "static", "--strict"]);
        let options = cmd.options(dir.path())?;
        assert!(options.mode_for("my-addon").is_static());
        assert!(options.warnings_as_errors);
        assert!(!options.compile_templates);
        Ok(())
    }
}
