use clap::{Parser, Subcommand};
use stagepack::{
    commands::{
        build::{self, BuildCommand},
        config::{self, ConfigAction},
        meta, resolve,
    },
    init_logging, logger, GlobalOpts,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagepack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Ember package conversion and packaging pipeline",
    long_about = "Stagepack converts legacy addons and apps into v2 packages with resolved imports."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, resolve and package a project into an output directory
    Build(BuildCommand),
    /// Resolve a project without packaging it and print what changed
    Resolve {
        /// Package root (default: current directory)
        path: Option<PathBuf>,
    },
    /// Print the v2 metadata block of a package
    Meta {
        /// Package directory or package.json path (default: current directory)
        path: Option<PathBuf>,
    },
    /// Show or change build options
    #[command(subcommand_required = false, arg_required_else_help = false)]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_with_verbosity(cli.global.verbosity_level(), cli.global.no_stdout)
    {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    init_logging();

    let result = match cli.command {
        Commands::Build(cmd) => build::handle_build(cmd, &cli.global),
        Commands::Resolve { path } => resolve::handle_resolve(path, &cli.global),
        Commands::Meta { path } => meta::handle_meta(path),
        Commands::Config { action } => {
            config::handle_config(action.unwrap_or(ConfigAction::Show), &cli.global)
        }
    };

    if let Err(e) = result {
        logger::error(&e.to_string());
        if cli.global.verbosity_level() > 0 {
            logger::show_log_path();
        }
        std::process::exit(1);
    }
}
