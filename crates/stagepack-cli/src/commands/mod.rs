pub mod build;
pub mod config;
pub mod meta;
pub mod resolve;
