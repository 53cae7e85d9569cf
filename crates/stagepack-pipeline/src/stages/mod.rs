//! Per-package stages, in the order a build runs them

pub mod layout;
pub mod resolve;
pub mod templates;

pub use layout::LayoutStage;
pub use resolve::ResolveStage;
pub use templates::TemplateStage;

pub const LAYOUT: &str = "layout";
pub const RESOLVE: &str = "resolve";
pub const COMPILE_TEMPLATES: &str = "compile-templates";
pub const PACKAGE: &str = "package";
