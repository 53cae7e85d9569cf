use crate::common::{package_root, GlobalOpts};
use crate::errors::CommandError;
use crate::logger;
use colored::*;
use stagepack_config::BuildOptions;
use stagepack_pipeline::{BuildMode, Pipeline};
use std::path::PathBuf;

/// Run layout and resolution only, then report what resolution did per package
pub fn handle_resolve(path: Option<PathBuf>, opts: &GlobalOpts) -> Result<(), CommandError> {
    let root = package_root(path.as_deref())?;
    let options = BuildOptions::load(Some(&root))?;

    logger::spinner_start(&format!("Resolving {}", root.display()));
    let result = match Pipeline::new(options).build(&root, BuildMode::ResolveOnly) {
        Ok(result) => result,
        Err(e) => {
            logger::spinner_error("Resolution failed");
            return Err(e.into());
        }
    };
    logger::spinner_success(&format!("Resolved {} packages", result.packages.len()));

    println!("{}", "Resolution report:".bold().green());
    for output in &result.packages {
        let report = &output.report;
        println!(
            "  {}: {} rewrites, {} runtime lookups, {} virtual modules",
            output.package.name.as_ref().cyan(),
            report.rewrites,
            report.runtime_lookups.len(),
            report.virtual_modules.len()
        );
        if opts.verbosity_level() > 0 || !report.runtime_lookups.is_empty() {
            for name in &report.runtime_lookups {
                println!("    {} {}", "runtime".yellow(), name);
            }
        }
        if opts.verbosity_level() > 0 {
            for module in &report.virtual_modules {
                println!("    {} {}", "virtual".dimmed(), module);
            }
        }
    }
    for warning in &result.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    Ok(())
}
