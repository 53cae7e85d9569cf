//! Stagepack build pipeline
//!
//! Converts packages that use the legacy directory convention into
//! self-describing packages any bundler can consume:
//! 1. `layout` maps the legacy directories onto the package's module namespace
//! 2. `resolve` resolves every import and template name, rewriting specifiers
//! 3. `compile-templates` runs the injected `TemplateCompiler`
//! 4. `package` materializes colocated components and writes the metadata
//!
//! Trees passed between stages are immutable snapshots (`BuildTree`); each
//! package runs its stages on its own thread and waits for the packages it
//! depends on through completion signals.

pub mod build_tree;
pub mod cache;
pub mod errors;
pub mod packager;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod signal;
pub mod stage;
pub mod stages;
pub mod template_compiler;

pub use build_tree::{BuildTree, TreeBuilder, TreeChange};
pub use cache::{CacheStats, StageCache};
pub use errors::{PipelineError, Warning};
pub use packager::{PackageStage, APP_MODULES_FILE, IMPLICIT_MODULES_FILE};
pub use pipeline::{BuildMode, BuildResult, PackageOutput, Pipeline};
pub use registry::{DefineEmitter, ModuleRegistry, RegistryEmitter};
pub use resolver::{ModuleRequest, Resolution, Resolver, Target};
pub use stage::{BuildContext, ResolutionReport, Stage, StageContext};
pub use template_compiler::{PrecompileTemplateCompiler, TemplateCompiler};
