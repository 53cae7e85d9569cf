//! Build orchestration
//!
//! One thread per conversion target. A target starts once every dependency
//! that is itself a target has finished its terminal stage, then runs the
//! stages in order, settling its (stage, package) signal after each. The first
//! failure cancels the whole build; output is installed only once every
//! package succeeded.

use crate::build_tree::BuildTree;
use crate::cache::{CacheStats, StageCache};
use crate::errors::{PipelineError, Warning};
use crate::packager::PackageStage;
use crate::registry::{DefineEmitter, RegistryEmitter};
use crate::signal::SignalBoard;
use crate::stage::{BuildContext, ResolutionReport, Stage, StageContext};
use crate::stages::{LayoutStage, ResolveStage, TemplateStage};
use crate::template_compiler::{PrecompileTemplateCompiler, TemplateCompiler};
use parking_lot::Mutex;
use stagepack_config::BuildOptions;
use stagepack_logger as logger;
use stagepack_manifest::{Package, PackageCache, PackageId, PackageMeta};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// How far a build goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Full,
    /// Stop after the resolve stage; nothing is packaged
    ResolveOnly,
}

impl BuildMode {
    /// `ResolveOnly` when `STAGE2_ONLY` is set, otherwise `Full`
    pub fn from_env() -> Self {
        if BuildOptions::resolve_only_from_env() {
            BuildMode::ResolveOnly
        } else {
            BuildMode::Full
        }
    }

    fn stages(self) -> Vec<Box<dyn Stage>> {
        match self {
            BuildMode::Full => vec![
                Box::new(LayoutStage),
                Box::new(ResolveStage),
                Box::new(TemplateStage),
                Box::new(PackageStage),
            ],
            BuildMode::ResolveOnly => vec![Box::new(LayoutStage), Box::new(ResolveStage)],
        }
    }
}

/// Final tree and findings of one converted package
#[derive(Debug, Clone)]
pub struct PackageOutput {
    pub package: Arc<Package>,
    pub tree: BuildTree,
    pub report: ResolutionReport,
    /// Metadata written by the packager; `None` in resolve-only builds
    pub meta: Option<PackageMeta>,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub mode: BuildMode,
    /// Converted packages, in discovery order (the root first)
    pub packages: Vec<PackageOutput>,
    pub warnings: Vec<Warning>,
}

impl BuildResult {
    pub fn package(&self, name: &str) -> Option<&PackageOutput> {
        self.packages
            .iter()
            .find(|output| output.package.name.as_ref() == name)
    }

    /// Write every package below `out_dir/<package-name>`.
    ///
    /// Output goes to a sibling staging directory first and replaces `out_dir`
    /// with a rename, so a failed install never leaves partial output behind.
    pub fn install(&self, out_dir: &Path) -> Result<(), PipelineError> {
        let name = out_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "out".to_string());
        let staging = out_dir.with_file_name(format!(".{}.staging", name));
        let backup = out_dir.with_file_name(format!(".{}.previous", name));

        for stale in [&staging, &backup] {
            if stale.exists() {
                fs::remove_dir_all(stale).map_err(|e| PipelineError::io(stale, e))?;
            }
        }
        fs::create_dir_all(&staging).map_err(|e| PipelineError::io(&staging, e))?;

        for output in &self.packages {
            output
                .tree
                .write_to(&staging.join(output.package.name.as_ref()))?;
        }

        if out_dir.exists() {
            fs::rename(out_dir, &backup).map_err(|e| PipelineError::io(out_dir, e))?;
        }
        fs::rename(&staging, out_dir).map_err(|e| PipelineError::io(out_dir, e))?;
        if backup.exists() {
            fs::remove_dir_all(&backup).map_err(|e| PipelineError::io(&backup, e))?;
        }

        logger::debug(&format!(
            "Installed {} packages into {:?}",
            self.packages.len(),
            out_dir
        ));
        Ok(())
    }
}

/// Builds packages with shared adapters and an incremental cache.
///
/// Every `build` call snapshots the file system anew; only per-file stage
/// outputs are reused between calls.
pub struct Pipeline {
    options: Arc<BuildOptions>,
    compiler: Arc<dyn TemplateCompiler>,
    emitter: Arc<dyn RegistryEmitter>,
    cache: Arc<StageCache>,
}

impl Pipeline {
    pub fn new(options: BuildOptions) -> Self {
        let emitter = DefineEmitter::new(options.registry_define.clone());
        Pipeline {
            options: Arc::new(options),
            compiler: Arc::new(PrecompileTemplateCompiler),
            emitter: Arc::new(emitter),
            cache: Arc::new(StageCache::new()),
        }
    }

    pub fn with_template_compiler(mut self, compiler: Arc<dyn TemplateCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_registry_emitter(mut self, emitter: Arc<dyn RegistryEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Convert every legacy package reachable from `root`
    pub fn build(&self, root: &Path, mode: BuildMode) -> Result<BuildResult, PipelineError> {
        let start = Instant::now();
        let packages = Arc::new(PackageCache::build(root)?);
        let targets = packages.conversion_targets();
        let ids: Vec<PackageId> = targets.iter().map(|p| p.id).collect();

        if let Some(cycle) = packages.dependency_cycle(&ids) {
            return Err(PipelineError::DependencyCycle(
                cycle.iter().map(ToString::to_string).collect(),
            ));
        }

        let context = BuildContext::new(
            Arc::clone(&packages),
            Arc::clone(&self.options),
            Arc::clone(&self.compiler),
            Arc::clone(&self.emitter),
            Arc::clone(&self.cache),
        );
        let stages = mode.stages();
        let names: Vec<&'static str> = stages.iter().map(|s| s.name()).collect();
        let board = SignalBoard::new(&names, &ids);

        info!(
            "Building {} packages ({} stages) from {:?}",
            targets.len(),
            names.len(),
            root
        );

        let results: Vec<Result<PackageOutput, PipelineError>> = {
            let context = &context;
            let board = &board;
            let stages = &stages;
            thread::scope(|scope| {
                let handles: Vec<_> = targets
                    .iter()
                    .map(|package| {
                        scope.spawn(move || {
                            let result = run_package(package, context, stages, board);
                            if let Err(e) = &result {
                                board.cancel(&format!("{} failed: {}", package.name, e));
                            }
                            result
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            board.cancel("package worker panicked");
                            Err(PipelineError::Cancelled("package worker panicked".to_string()))
                        })
                    })
                    .collect()
            })
        };

        let mut outputs = Vec::with_capacity(results.len());
        let mut cancellation = None;
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(e) if e.is_cancellation() => {
                    cancellation.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(e) = cancellation {
            return Err(e);
        }

        warn_unused_renames(&outputs, &context);
        if let Some(promoted) = context.promoted_warning() {
            return Err(promoted);
        }

        let stats = self.cache.stats();
        info!(
            "Built {} packages in {:.2}ms (cache: {} hits, {} misses)",
            outputs.len(),
            start.elapsed().as_secs_f64() * 1000.0,
            stats.hits,
            stats.misses
        );
        Ok(BuildResult {
            mode,
            packages: outputs,
            warnings: context.warnings(),
        })
    }
}

/// Renamed-module entries that no package of the build imported
fn warn_unused_renames(outputs: &[PackageOutput], context: &BuildContext) {
    let used: BTreeSet<&(String, String)> = outputs
        .iter()
        .flat_map(|output| output.report.renames_used.iter())
        .collect();
    for output in outputs {
        let Some(meta) = &output.meta else {
            continue;
        };
        let package = output.package.name.to_string();
        for (old, new) in &meta.renamed_modules {
            if !used.contains(&(package.clone(), old.clone())) {
                context.warn(Warning::UnusedRenamedModule {
                    package: package.clone(),
                    old: old.clone(),
                    new: new.clone(),
                });
            }
        }
    }
}

fn run_package(
    package: &Arc<Package>,
    context: &BuildContext,
    stages: &[Box<dyn Stage>],
    board: &SignalBoard,
) -> Result<PackageOutput, PipelineError> {
    for dep in context.packages.dependencies_of(package) {
        if dep.id != package.id && dep.is_conversion_target() {
            if let Some(signal) = board.terminal(dep.id) {
                debug!("{} waiting for {}", package.name, dep.name);
                signal.wait()?;
            }
        }
    }
    board.check()?;

    let report = Mutex::new(ResolutionReport::default());
    let cx = StageContext {
        build: context,
        package,
        mode: context.options.mode_for(&package.name),
        report: &report,
    };

    let mut tree = BuildTree::from_dir(&package.root)?;
    for (index, stage) in stages.iter().enumerate() {
        let is_terminal = index + 1 == stages.len();
        let outcome = board
            .check()
            .and_then(|()| stage.run(&tree, &cx))
            .and_then(|output| {
                if let Some(promoted) = context.promoted_warning() {
                    return Err(promoted);
                }
                if is_terminal {
                    context.resolver.publish(package, output.clone())?;
                }
                Ok(output)
            });

        match outcome {
            Ok(output) => {
                tree = output;
                board.resolve(stage.name(), package.id);
            }
            Err(e) => {
                board.reject(stage.name(), package.id, &e.to_string());
                return Err(e);
            }
        }
    }

    let meta = if stages.iter().any(|s| s.name() == crate::stages::PACKAGE) {
        context
            .resolver
            .view(package)?
            .and_then(|view| view.meta().cloned())
    } else {
        None
    };

    Ok(PackageOutput {
        package: Arc::clone(package),
        tree,
        report: report.into_inner(),
        meta,
    })
}
