//! stagepack library - expose modules for testing
//!
//! This library exposes the command handlers so they can be driven from tests.

pub mod commands;
pub mod common;
pub mod errors;

pub use common::GlobalOpts;
pub use stagepack_config as config_manager;
pub use stagepack_logger as logger;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the `tracing` subscriber; `RUST_LOG` wins over the verbosity flags
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| logger::verbosity_to_filter().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init();
}
