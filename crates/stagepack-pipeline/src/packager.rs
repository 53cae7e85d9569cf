//! Packager - the terminal stage
//!
//! Turns a resolved tree into a self-describing package: colocated components
//! are materialized (authored modules wrapped, template-only components
//! synthesized), the metadata block is computed and written exactly once, and
//! apps get their runtime registry modules.

use crate::build_tree::{relative_specifier, BuildTree, TreeBuilder};
use crate::errors::{PipelineError, Warning};
use crate::registry::ModuleRegistry;
use crate::stage::{Stage, StageContext};
use ahash::AHashSet;
use serde_json::Value;
use stagepack_ast::{is_module_path, CompanionSource};
use stagepack_config::AmbiguityPolicy;
use stagepack_manifest::{MetaType, Package, PackageMeta, PackageRole};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub const APP_MODULES_FILE: &str = "-embroider-app-modules.js";
pub const IMPLICIT_MODULES_FILE: &str = "-embroider-implicit-modules.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `x.js` + `x.hbs`
    Flat,
    /// `x/component.js` + `x/template.hbs`
    Pod,
}

/// Where a file sits in a companion pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionFile {
    pub identity: String,
    pub layout: Layout,
    pub is_template: bool,
}

/// Classify a path inside a colocation directory
pub fn companion_file(path: &str, colocation_dirs: &[String]) -> Option<CompanionFile> {
    let inside = colocation_dirs.iter().any(|dir| {
        path.strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    });
    if !inside || path.ends_with(".d.ts") {
        return None;
    }

    let is_template = path.ends_with(".hbs");
    if !is_template && !is_module_path(path) {
        return None;
    }

    let (dir, file) = path.rsplit_once('/')?;
    let (layout, identity) = match file {
        "component.js" | "component.ts" | "template.hbs" => (Layout::Pod, dir.to_string()),
        _ => {
            let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
            (Layout::Flat, format!("{}/{}", dir, stem))
        }
    };
    Some(CompanionFile {
        identity,
        layout,
        is_template,
    })
}

#[derive(Debug, Default)]
struct Companions {
    modules: Vec<(String, Layout)>,
    templates: Vec<(String, Layout)>,
}

impl Companions {
    fn candidates(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .modules
            .iter()
            .chain(self.templates.iter())
            .map(|(path, _)| path.clone())
            .collect();
        all.sort();
        all
    }
}

/// Tree path a module specifier like `./components/x` refers to
fn module_file(tree: &BuildTree, specifier: &str) -> Option<String> {
    let path = specifier.trim_start_matches("./");
    [
        path.to_string(),
        format!("{}.js", path),
        format!("{}.ts", path),
    ]
    .into_iter()
    .find(|candidate| is_module_path(candidate) && tree.contains(candidate))
}

fn strip_ext(path: &str) -> &str {
    path.strip_suffix(".js")
        .or_else(|| path.strip_suffix(".ts"))
        .unwrap_or(path)
}

pub struct PackageStage;

impl PackageStage {
    /// Wrap or synthesize every companion pair of the tree
    fn materialize_companions(
        input: &BuildTree,
        cx: &StageContext<'_>,
    ) -> Result<BuildTree, PipelineError> {
        let options = cx.options();
        let mut groups: BTreeMap<String, Companions> = BTreeMap::new();
        for path in input.paths() {
            let Some(file) = companion_file(path, &options.colocation_dirs) else {
                continue;
            };
            let group = groups.entry(file.identity).or_default();
            if file.is_template {
                group.templates.push((path.to_string(), file.layout));
            } else {
                group.modules.push((path.to_string(), file.layout));
            }
        }

        let modules = cx.build.resolver.binding_modules();
        let mut builder = input.builder();
        let mut synthesized: BTreeMap<String, String> = BTreeMap::new();

        for (identity, group) in &groups {
            if group.modules.len() > 1 || group.templates.len() > 1 {
                return Err(PipelineError::AmbiguousColocation {
                    identity: identity.clone(),
                    candidates: group.candidates(),
                });
            }

            match (group.modules.first(), group.templates.first()) {
                (Some((module, module_layout)), Some((template, template_layout))) => {
                    if module_layout != template_layout {
                        if options.ambiguous_colocation != AmbiguityPolicy::PreferAuthored {
                            return Err(PipelineError::AmbiguousColocation {
                                identity: identity.clone(),
                                candidates: group.candidates(),
                            });
                        }
                        cx.warn(Warning::AmbiguityResolved {
                            package: cx.package.name.to_string(),
                            identity: identity.clone(),
                            kept: module.clone(),
                        });
                        continue;
                    }

                    let Some(source) = input.get_str(module) else {
                        continue;
                    };
                    let specifier = relative_specifier(module, template);
                    if let Some(wrapped) = CompanionSource::generate(
                        Path::new(module),
                        Some(source),
                        &specifier,
                        modules,
                    )? {
                        builder.insert(module.clone(), wrapped.into_bytes());
                    }
                }
                (None, Some((template, layout))) => {
                    let module = match layout {
                        Layout::Flat => format!("{}.js", identity),
                        Layout::Pod => format!("{}/component.js", identity),
                    };
                    if let Some(previous) = synthesized.insert(module.clone(), template.clone()) {
                        return Err(PipelineError::SynthesisCollision {
                            path: module,
                            sources: vec![previous, template.clone()],
                        });
                    }
                    if builder.contains(&module) {
                        return Err(PipelineError::SynthesisCollision {
                            path: module.clone(),
                            sources: vec![module, template.clone()],
                        });
                    }
                    let specifier = relative_specifier(&module, template);
                    if let Some(source) =
                        CompanionSource::generate(Path::new(&module), None, &specifier, modules)?
                    {
                        builder.insert(module, source.into_bytes());
                    }
                }
                _ => {}
            }
        }

        Ok(builder.build())
    }

    /// `(specifier, tree path)` of every module to register at boot, in tree order
    fn dynamic_implicit_modules(tree: &BuildTree, implicit_dirs: &[String]) -> Vec<(String, String)> {
        let mut seen = AHashSet::new();
        let mut modules = Vec::new();
        for path in tree.paths() {
            let inside = implicit_dirs.iter().any(|dir| {
                path.strip_prefix(dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            });
            if !inside || !is_module_path(path) || path.ends_with(".d.ts") {
                continue;
            }
            let specifier = format!("./{}", strip_ext(path));
            if seen.insert(specifier.clone()) {
                modules.push((specifier, path.to_string()));
            }
        }
        modules
    }

    /// Caller-listed implicit modules, checked against the output tree
    fn listed_modules(
        tree: &BuildTree,
        package: &Package,
        listed: &[String],
    ) -> Result<Vec<(String, String)>, PipelineError> {
        let mut seen = AHashSet::new();
        let mut modules = Vec::new();
        for specifier in listed {
            let file = (!specifier.ends_with(".hbs"))
                .then(|| module_file(tree, specifier))
                .flatten();
            let Some(file) = file else {
                return Err(PipelineError::InvalidImplicitModule {
                    package: package.name.to_string(),
                    specifier: specifier.clone(),
                });
            };
            let normalized = format!("./{}", strip_ext(specifier.trim_start_matches("./")));
            if seen.insert(normalized.clone()) {
                modules.push((normalized, file));
            }
        }
        Ok(modules)
    }

    fn build_meta(
        tree: &BuildTree,
        cx: &StageContext<'_>,
        implicit: &[(String, String)],
    ) -> Result<PackageMeta, PipelineError> {
        let package = cx.package;
        let package_options = cx.options().package(&package.name);
        let mut meta = PackageMeta {
            meta_type: Some(match package.role {
                PackageRole::App => MetaType::App,
                PackageRole::Addon | PackageRole::Library => MetaType::Addon,
            }),
            main: tree.contains("index.js").then(|| "./index.js".to_string()),
            implicit_modules: implicit.iter().map(|(specifier, _)| specifier.clone()).collect(),
            ..PackageMeta::default()
        };

        if let Some(listed) = package_options.map(|p| &p.implicit_test_modules) {
            meta.implicit_test_modules = Self::listed_modules(tree, package, listed)?
                .into_iter()
                .map(|(specifier, _)| specifier)
                .collect();
        }

        if package.role == PackageRole::Addon {
            for (path, _) in tree.files_under("public") {
                let served = path.trim_start_matches("public/");
                meta.public_assets
                    .insert(format!("./{}", path), format!("/{}/{}", package.name, served));
            }
            for (path, _) in tree.files_under("_app_") {
                let merged = path.trim_start_matches("_app_/");
                meta.app_js
                    .insert(format!("./{}", merged), format!("./{}", path));
            }
        }

        if let Some(renamed) = package_options.map(|p| &p.renamed_modules) {
            meta.renamed_modules
                .extend(renamed.iter().map(|(old, new)| (old.clone(), new.clone())));
        }

        if let Some(externals) = package
            .meta_block()
            .and_then(|block| block.get("externals"))
            .and_then(Value::as_array)
        {
            meta.externals = externals
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<BTreeSet<_>>();
        }

        Ok(meta)
    }

    /// Registry of the implicit modules of every addon the app depends on
    fn addon_registry(cx: &StageContext<'_>) -> Result<ModuleRegistry, PipelineError> {
        let mut registry = ModuleRegistry::new();
        let mut visited = AHashSet::new();
        let mut stack: Vec<(Arc<Package>, bool)> = cx
            .build
            .packages
            .dependencies_of(cx.package)
            .into_iter()
            .rev()
            .map(|dep| (dep, false))
            .collect();

        // Post-order: a dependency's modules register before its dependents'
        while let Some((package, expanded)) = stack.pop() {
            if package.role != PackageRole::Addon {
                continue;
            }
            if expanded {
                let Some(view) = cx.build.resolver.view(&package)? else {
                    continue;
                };
                let Some(meta) = view.meta() else {
                    continue;
                };
                for specifier in &meta.implicit_modules {
                    let path = specifier.trim_start_matches("./");
                    let file = [format!("{}.js", path), format!("{}.ts", path), path.to_string()]
                        .into_iter()
                        .find(|candidate| view.contains(candidate))
                        .unwrap_or_else(|| path.to_string());
                    registry.register(
                        format!("{}/{}", package.name, path),
                        format!("{}/{}", package.name, file),
                    );
                }
                continue;
            }
            if !visited.insert(package.id) {
                continue;
            }
            stack.push((Arc::clone(&package), true));
            for dep in cx.build.packages.dependencies_of(&package).into_iter().rev() {
                if !visited.contains(&dep.id) {
                    stack.push((dep, false));
                }
            }
        }
        Ok(registry)
    }

    fn emit_app_modules(
        builder: &mut TreeBuilder,
        cx: &StageContext<'_>,
        implicit: &[(String, String)],
    ) -> Result<(), PipelineError> {
        if !cx.mode.is_static() {
            let mut registry = ModuleRegistry::new();
            for (specifier, path) in implicit {
                registry.register(
                    format!("{}/{}", cx.package.name, specifier.trim_start_matches("./")),
                    format!("./{}", path),
                );
            }
            builder.insert(APP_MODULES_FILE, cx.build.emitter.emit(&registry).into_bytes());
        }

        let addons = Self::addon_registry(cx)?;
        builder.insert(IMPLICIT_MODULES_FILE, cx.build.emitter.emit(&addons).into_bytes());
        Ok(())
    }
}

impl Stage for PackageStage {
    fn name(&self) -> &'static str {
        crate::stages::PACKAGE
    }

    fn run(&self, input: &BuildTree, cx: &StageContext<'_>) -> Result<BuildTree, PipelineError> {
        let start = Instant::now();
        let package = cx.package;
        let tree = Self::materialize_companions(input, cx)?;

        let implicit = if cx.mode.is_static() {
            let listed = cx
                .options()
                .package(&package.name)
                .map(|p| p.implicit_modules.as_slice())
                .unwrap_or_default();
            Self::listed_modules(&tree, package, listed)?
        } else {
            Self::dynamic_implicit_modules(&tree, &cx.options().implicit_dirs)
        };

        let meta = Self::build_meta(&tree, cx, &implicit)?;
        let manifest = cx.build.metadata.write(package, &meta)?;

        let mut builder = tree.builder();
        builder.insert("package.json", manifest.into_bytes());
        if package.is_app() {
            Self::emit_app_modules(&mut builder, cx, &implicit)?;
        }
        let output = builder.build();

        info!(
            "{}: packaged {} files ({} implicit modules) in {:.2}ms",
            package.name,
            output.len(),
            meta.implicit_modules.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> Vec<String> {
        vec!["components".to_string()]
    }

    #[test]
    fn test_companion_classification() {
        let flat = companion_file("components/widget.hbs", &dirs());
        assert_eq!(
            flat,
            Some(CompanionFile {
                identity: "components/widget".to_string(),
                layout: Layout::Flat,
                is_template: true,
            })
        );

        let pod = companion_file("components/widget/component.ts", &dirs());
        assert_eq!(
            pod,
            Some(CompanionFile {
                identity: "components/widget".to_string(),
                layout: Layout::Pod,
                is_template: false,
            })
        );

        assert_eq!(companion_file("helpers/format.js", &dirs()), None);
        assert_eq!(companion_file("components/types.d.ts", &dirs()), None);
        assert_eq!(companion_file("components/readme.md", &dirs()), None);
        assert_eq!(companion_file("componentsx/a.js", &dirs()), None);
    }

    #[test]
    fn test_dynamic_implicit_modules_dedupe_and_skip_templates() {
        let tree = BuildTree::from_files([
            ("components/a.hbs", b"".to_vec()),
            ("components/a.js", b"".to_vec()),
            ("components/b/component.js", b"".to_vec()),
            ("components/b/template.hbs", b"".to_vec()),
            ("components/c.js", b"".to_vec()),
            ("components/c.ts", b"".to_vec()),
            ("helpers/format.ts", b"".to_vec()),
            ("utils/x.js", b"".to_vec()),
        ]);
        let dirs = vec!["components".to_string(), "helpers".to_string()];
        let specifiers: Vec<String> = PackageStage::dynamic_implicit_modules(&tree, &dirs)
            .into_iter()
            .map(|(specifier, _)| specifier)
            .collect();
        assert_eq!(
            specifiers,
            vec![
                "./components/a",
                "./components/b/component",
                "./components/c",
                "./helpers/format",
            ]
        );
    }

    #[test]
    fn test_module_file_probing() {
        let tree = BuildTree::from_files([
            ("components/a.ts", b"".to_vec()),
            ("components/b.hbs", b"".to_vec()),
        ]);
        assert_eq!(module_file(&tree, "./components/a").as_deref(), Some("components/a.ts"));
        assert_eq!(module_file(&tree, "./components/b"), None);
        assert_eq!(module_file(&tree, "./components/b.hbs"), None);
    }
}
