//! Stage abstraction and the state shared by every stage of one build

use crate::build_tree::BuildTree;
use crate::cache::{ContextDigest, Fingerprint, StageCache};
use crate::errors::{PipelineError, Warning};
use crate::registry::RegistryEmitter;
use crate::resolver::Resolver;
use crate::template_compiler::TemplateCompiler;
use parking_lot::Mutex;
use stagepack_config::{BuildOptions, StaticMode};
use stagepack_logger as logger;
use stagepack_manifest::{MetadataStore, Package, PackageCache};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One transformation from tree to tree.
///
/// A stage reads only its input tree, the `PackageCache`, the options and the
/// published output of packages the current one depends on.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, input: &BuildTree, cx: &StageContext<'_>) -> Result<BuildTree, PipelineError>;
}

/// What the resolve stage did to one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Specifiers rewritten to their resolved form
    pub rewrites: usize,
    /// Template names left to runtime lookup (dynamic mode only)
    pub runtime_lookups: BTreeSet<String>,
    /// Modules created or rewritten by colocation
    pub virtual_modules: BTreeSet<String>,
    /// `renamed-modules` entries imported, as (declaring package, old specifier)
    pub renames_used: BTreeSet<(String, String)>,
}

/// State shared by all packages of one build
pub struct BuildContext {
    pub packages: Arc<PackageCache>,
    pub options: Arc<BuildOptions>,
    pub resolver: Resolver,
    pub metadata: MetadataStore,
    pub compiler: Arc<dyn TemplateCompiler>,
    pub emitter: Arc<dyn RegistryEmitter>,
    pub cache: Arc<StageCache>,
    options_digest: Fingerprint,
    warnings: Mutex<Vec<Warning>>,
}

impl BuildContext {
    pub fn new(
        packages: Arc<PackageCache>,
        options: Arc<BuildOptions>,
        compiler: Arc<dyn TemplateCompiler>,
        emitter: Arc<dyn RegistryEmitter>,
        cache: Arc<StageCache>,
    ) -> Self {
        let options_digest = ContextDigest::new()
            .add(options.fingerprint_source())
            .add(compiler.id())
            .finish();
        BuildContext {
            resolver: Resolver::new(Arc::clone(&packages), Arc::clone(&options)),
            packages,
            options,
            metadata: MetadataStore::new(),
            compiler,
            emitter,
            cache,
            options_digest,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Digest of the options and adapters, part of every cache key
    pub fn options_digest(&self) -> &Fingerprint {
        &self.options_digest
    }

    pub fn warn(&self, warning: Warning) {
        logger::warn(&warning.to_string());
        self.warnings.lock().push(warning);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    /// First recorded warning, when warnings are treated as errors
    pub fn promoted_warning(&self) -> Option<PipelineError> {
        if !self.options.warnings_as_errors {
            return None;
        }
        self.warnings
            .lock()
            .first()
            .cloned()
            .map(PipelineError::Warning)
    }
}

/// Per-package view handed to each stage
pub struct StageContext<'a> {
    pub build: &'a BuildContext,
    pub package: &'a Arc<Package>,
    pub mode: StaticMode,
    pub report: &'a Mutex<ResolutionReport>,
}

impl<'a> StageContext<'a> {
    pub fn options(&self) -> &BuildOptions {
        &self.build.options
    }

    pub fn warn(&self, warning: Warning) {
        self.build.warn(warning);
    }
}
