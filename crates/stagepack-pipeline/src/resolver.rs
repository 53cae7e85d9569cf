//! Module resolution
//!
//! Given a specifier, the file it appears in and the package that file belongs
//! to, decide what the specifier refers to. Resolution is a pure function of
//! the package graph and the trees visible to the call: the requesting
//! package's current tree, the published output of packages already converted
//! in this build, and a one-time file index of packages that are not converted.
//!
//! Precedence:
//! 1. relative specifier naming an existing file
//! 2. relative specifier naming a component module with a template sibling
//!    that it does not attach itself (rewritten)
//! 3. relative specifier naming a missing component module whose template
//!    exists (synthesized)
//! 4. bare specifier of a dependency or of the package itself
//! 5. configured or declared externals
//! 6. unresolved

use crate::build_tree::{join_relative, parent_dir, relative_specifier, BuildTree};
use crate::cache::{ContextDigest, Fingerprint};
use crate::errors::PipelineError;
use ahash::AHashMap;
use parking_lot::RwLock;
use serde_json::Value;
use stagepack_ast::{
    is_module_path, scan_module, template_only_source, wrap_authored_module, BindingModules,
    NameKind, NameRef,
};
use stagepack_config::{BuildOptions, StaticMode};
use stagepack_manifest::{
    parse_meta, schema_of, ManifestError, Package, PackageCache, PackageId, PackageMeta,
    PackageRole, Schema, META_KEY,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Extensions tried, in order, after the verbatim path
const MODULE_PROBES: &[&str] = &[".js", ".ts", "/index.js", "/index.ts"];

/// Tried last, once no module or synthesized component matched
const TEMPLATE_EXTENSION: &str = ".hbs";

/// One import specifier to resolve
#[derive(Debug, Clone, Copy)]
pub struct ModuleRequest<'a> {
    pub specifier: &'a str,
    /// Tree path of the importing file
    pub from_file: &'a str,
    pub from_package: &'a Arc<Package>,
}

/// A module inside some package's output namespace
#[derive(Debug, Clone)]
pub struct Target {
    pub package: Arc<Package>,
    /// Tree path, e.g. `components/widget.js`
    pub path: String,
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.package.id == other.package.id && self.path == other.path
    }
}

impl Eq for Target {}

impl Target {
    fn new(package: &Arc<Package>, path: impl Into<String>) -> Self {
        Target {
            package: Arc::clone(package),
            path: path.into(),
        }
    }

    /// Location of the module below the package root
    pub fn real_path(&self) -> PathBuf {
        self.package.root.join(&self.path)
    }

    /// Package-qualified id, e.g. `my-addon/components/widget.js`
    pub fn virtual_id(&self) -> String {
        format!("{}/{}", self.package.name, self.path)
    }
}

/// Outcome of resolving one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An existing module or file
    Found(Target),
    /// A module that does not exist yet; `source` is its generated body
    Synthesized { target: Target, source: String },
    /// An existing module whose body must change; `source` is the new body
    Rewritten { target: Target, source: String },
    /// Left for the runtime
    External(String),
    Unresolved(String),
}

impl Resolution {
    pub fn target(&self) -> Option<&Target> {
        match self {
            Resolution::Found(target)
            | Resolution::Synthesized { target, .. }
            | Resolution::Rewritten { target, .. } => Some(target),
            Resolution::External(_) | Resolution::Unresolved(_) => None,
        }
    }

    /// Extension-explicit form of `original` as written in `from_file`.
    ///
    /// Relative specifiers stay relative; bare specifiers stay
    /// package-qualified; externals are returned unchanged.
    pub fn output_specifier(&self, from: &Package, from_file: &str, original: &str) -> Option<String> {
        match self {
            Resolution::External(specifier) => Some(specifier.clone()),
            Resolution::Unresolved(_) => None,
            _ => {
                let target = self.target()?;
                if is_relative(original) && target.package.id == from.id {
                    Some(relative_specifier(from_file, &target.path))
                } else {
                    Some(target.virtual_id())
                }
            }
        }
    }
}

/// What the resolver knows about a package other than the requesting one
#[derive(Debug)]
pub enum DependencyView {
    /// Output of a package converted earlier in this build
    Built {
        tree: BuildTree,
        meta: Option<PackageMeta>,
    },
    /// A package that is not converted, indexed once from disk
    OnDisk {
        files: BTreeSet<String>,
        meta: Option<PackageMeta>,
        main: Option<String>,
    },
}

impl DependencyView {
    fn files(&self) -> Files<'_> {
        match self {
            DependencyView::Built { tree, .. } => Files::Tree(tree),
            DependencyView::OnDisk { files, .. } => Files::Index(files),
        }
    }

    pub fn meta(&self) -> Option<&PackageMeta> {
        match self {
            DependencyView::Built { meta, .. } | DependencyView::OnDisk { meta, .. } => {
                meta.as_ref()
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files().has(path)
    }

    /// Tree path of the package entry point
    fn main(&self) -> String {
        let declared = match self {
            DependencyView::Built { meta, .. } => meta.as_ref().and_then(|m| m.main.clone()),
            DependencyView::OnDisk { meta, main, .. } => meta
                .as_ref()
                .and_then(|m| m.main.clone())
                .or_else(|| main.clone()),
        };
        declared
            .map(|m| m.trim_start_matches("./").to_string())
            .unwrap_or_else(|| "index.js".to_string())
    }

    /// Digest of everything resolution against this view can observe
    pub fn fingerprint(&self) -> Fingerprint {
        let mut digest = ContextDigest::new();
        match self.files() {
            Files::Tree(tree) => {
                for path in tree.paths() {
                    digest.add(path);
                }
            }
            Files::Index(index) => {
                for path in index {
                    digest.add(path);
                }
            }
        }
        if let Some(meta) = self.meta() {
            digest.add(serde_json::to_vec(meta).unwrap_or_default());
        }
        digest.finish()
    }
}

#[derive(Clone, Copy)]
enum Files<'a> {
    Tree(&'a BuildTree),
    Index(&'a BTreeSet<String>),
}

impl<'a> Files<'a> {
    fn has(&self, path: &str) -> bool {
        match self {
            Files::Tree(tree) => tree.contains(path),
            Files::Index(index) => index.contains(path),
        }
    }

    fn source(&self, path: &str) -> Option<&'a str> {
        match self {
            Files::Tree(tree) => tree.get_str(path),
            Files::Index(_) => None,
        }
    }
}

/// Resolves module requests and template names for one build
pub struct Resolver {
    packages: Arc<PackageCache>,
    options: Arc<BuildOptions>,
    modules: BindingModules,
    views: RwLock<AHashMap<PackageId, Arc<DependencyView>>>,
}

impl Resolver {
    pub fn new(packages: Arc<PackageCache>, options: Arc<BuildOptions>) -> Self {
        let modules = BindingModules {
            template_binding: options.template_binding_module.clone(),
            template_only: options.template_only_module.clone(),
        };
        Resolver {
            packages,
            options,
            modules,
            views: RwLock::new(AHashMap::new()),
        }
    }

    pub fn binding_modules(&self) -> &BindingModules {
        &self.modules
    }

    /// Make a converted package's output visible to its dependents
    pub fn publish(&self, package: &Package, tree: BuildTree) -> Result<(), PipelineError> {
        let meta = match tree.get_str("package.json") {
            Some(text) => {
                let path = package.manifest_path();
                let manifest: Value =
                    serde_json::from_str(text).map_err(|source| ManifestError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                match schema_of(manifest.get(META_KEY)) {
                    Schema::V2 => Some(parse_meta(&path, &manifest)?),
                    _ => None,
                }
            }
            None => None,
        };
        debug!("Publishing output of {} ({} files)", package.name, tree.len());
        self.views
            .write()
            .insert(package.id, Arc::new(DependencyView::Built { tree, meta }));
        Ok(())
    }

    /// View of a package other than the requesting one
    pub fn view(&self, package: &Arc<Package>) -> Result<Option<Arc<DependencyView>>, PipelineError> {
        if let Some(view) = self.views.read().get(&package.id) {
            return Ok(Some(Arc::clone(view)));
        }
        if package.is_conversion_target() {
            // Not built yet; callers wait on its signal before resolving into it
            return Ok(None);
        }

        let view = Arc::new(index_from_disk(package)?);
        let mut views = self.views.write();
        let entry = views.entry(package.id).or_insert(view);
        Ok(Some(Arc::clone(entry)))
    }

    /// Digest of the dependency views `package` can resolve into
    pub fn dependency_fingerprint(&self, package: &Arc<Package>) -> Result<Fingerprint, PipelineError> {
        let mut digest = ContextDigest::new();
        for dep in self.packages.dependencies_of(package) {
            digest.add(dep.name.as_bytes());
            if let Some(view) = self.view(&dep)? {
                digest.add(view.fingerprint());
            }
        }
        Ok(digest.finish())
    }

    fn in_colocation_dir(&self, path: &str) -> bool {
        self.options
            .colocation_dirs
            .iter()
            .any(|dir| path.starts_with(dir.as_str()) && path[dir.len()..].starts_with('/'))
    }

    /// Resolve one import specifier against `tree`, the requesting package's current tree
    pub fn resolve(
        &self,
        request: &ModuleRequest<'_>,
        tree: &BuildTree,
    ) -> Result<Resolution, PipelineError> {
        let specifier = request.specifier;
        let from = request.from_package;

        if is_relative(specifier) {
            let Some(path) = join_relative(parent_dir(request.from_file), specifier) else {
                return Ok(Resolution::Unresolved(format!(
                    "'{}' points outside the package",
                    specifier
                )));
            };
            return self.resolve_path(from, Files::Tree(tree), &path, true);
        }
        if specifier.starts_with('/') {
            return Ok(Resolution::Unresolved(
                "absolute specifiers are not supported".to_string(),
            ));
        }

        let (name, _) = split_bare(specifier);
        let target = if name == from.name.as_ref() {
            Some(Arc::clone(from))
        } else {
            self.packages.resolve_dependency(from, name)
        };
        if let Some(target) = target {
            return self.resolve_in_package(from, tree, &target, specifier);
        }

        if self.options.is_external(specifier) || declares_external(from, specifier) {
            return Ok(Resolution::External(specifier.to_string()));
        }

        Ok(Resolution::Unresolved(format!(
            "'{}' is not a dependency of {}",
            name, from.name
        )))
    }

    /// The `renamed-modules` entry a bare specifier goes through, as
    /// (declaring package, old specifier)
    pub fn renamed_entry(
        &self,
        from: &Arc<Package>,
        specifier: &str,
    ) -> Result<Option<(String, String)>, PipelineError> {
        if is_relative(specifier) || specifier.starts_with('/') {
            return Ok(None);
        }
        let (name, _) = split_bare(specifier);
        let target = if name == from.name.as_ref() {
            Some(Arc::clone(from))
        } else {
            self.packages.resolve_dependency(from, name)
        };
        let Some(target) = target else {
            return Ok(None);
        };
        let declared = if target.id == from.id {
            self.options
                .package(&from.name)
                .is_some_and(|p| p.renamed_modules.contains_key(specifier))
        } else {
            self.view(&target)?.is_some_and(|view| {
                view.meta()
                    .is_some_and(|m| m.renamed_modules.contains_key(specifier))
            })
        };
        Ok(declared.then(|| (target.name.to_string(), specifier.to_string())))
    }

    fn resolve_in_package(
        &self,
        from: &Arc<Package>,
        own_tree: &BuildTree,
        target: &Arc<Package>,
        specifier: &str,
    ) -> Result<Resolution, PipelineError> {
        if target.id == from.id {
            let renamed = self
                .options
                .package(&from.name)
                .and_then(|p| p.renamed_modules.get(specifier))
                .map_or(specifier, String::as_str);
            let (_, subpath) = split_bare(renamed);
            let path = if subpath.is_empty() { "index.js" } else { subpath };
            return self.resolve_path(from, Files::Tree(own_tree), path, true);
        }

        let Some(view) = self.view(target)? else {
            return Ok(Resolution::Unresolved(format!(
                "package {} has not been built yet",
                target.name
            )));
        };

        let renamed = view.meta().map_or(specifier, |m| m.rename(specifier));
        let (renamed_name, subpath) = split_bare(renamed);
        if renamed_name != target.name.as_ref() {
            // Renamed into another package; follow it once from the target's point of view
            let Some(next) = self.packages.resolve_dependency(target, renamed_name) else {
                return Ok(Resolution::Unresolved(format!(
                    "'{}' is renamed to '{}', which is not a dependency of {}",
                    specifier, renamed, target.name
                )));
            };
            let Some(next_view) = self.view(&next)? else {
                return Ok(Resolution::Unresolved(format!(
                    "package {} has not been built yet",
                    next.name
                )));
            };
            return self.resolve_subpath(&next, &next_view, subpath);
        }

        self.resolve_subpath(target, &view, subpath)
    }

    fn resolve_subpath(
        &self,
        target: &Arc<Package>,
        view: &DependencyView,
        subpath: &str,
    ) -> Result<Resolution, PipelineError> {
        let path = if subpath.is_empty() {
            view.main()
        } else {
            subpath.to_string()
        };
        let colocation = matches!(view, DependencyView::Built { .. });
        self.resolve_path(target, view.files(), &path, colocation)
    }

    fn resolve_path(
        &self,
        package: &Arc<Package>,
        files: Files<'_>,
        path: &str,
        colocation: bool,
    ) -> Result<Resolution, PipelineError> {
        let candidates = std::iter::once(path.to_string())
            .chain(MODULE_PROBES.iter().map(|ext| format!("{}{}", path, ext)));

        for candidate in candidates {
            if !files.has(&candidate) {
                continue;
            }
            if colocation && is_module_path(&candidate) && self.in_colocation_dir(&candidate) {
                if let Some(template) = companion_template(&candidate, files) {
                    return self.colocated_module(package, files, candidate, &template);
                }
            }
            return Ok(Resolution::Found(Target::new(package, candidate)));
        }

        if colocation && self.in_colocation_dir(path) {
            let module = format!("{}.js", strip_module_ext(path));
            if let Some(template) = companion_template(&module, files) {
                let source =
                    template_only_source(&relative_specifier(&module, &template), &self.modules);
                return Ok(Resolution::Synthesized {
                    target: Target::new(package, module),
                    source,
                });
            }
        }

        // `import layout from '../templates/components/x-foo'`
        let template = format!("{}{}", path, TEMPLATE_EXTENSION);
        if files.has(&template) {
            return Ok(Resolution::Found(Target::new(package, template)));
        }

        Ok(Resolution::Unresolved(format!(
            "no module at '{}' in {}",
            path, package.name
        )))
    }

    fn colocated_module(
        &self,
        package: &Arc<Package>,
        files: Files<'_>,
        module: String,
        template: &str,
    ) -> Result<Resolution, PipelineError> {
        let Some(source) = files.source(&module) else {
            return Ok(Resolution::Found(Target::new(package, module)));
        };
        let scan = scan_module(Path::new(&module), source);
        let specifier = relative_specifier(&module, template);
        match wrap_authored_module(Path::new(&module), source, &scan, &specifier, &self.modules)? {
            Some(wrapped) => Ok(Resolution::Rewritten {
                target: Target::new(package, module),
                source: wrapped,
            }),
            None => Ok(Resolution::Found(Target::new(package, module))),
        }
    }

    /// Resolve a component, helper or modifier referenced by name from a template
    pub fn resolve_template_name(
        &self,
        from: &Arc<Package>,
        tree: &BuildTree,
        name: &NameRef,
        mode: StaticMode,
    ) -> Result<Resolution, PipelineError> {
        let candidates = name_candidates(name);

        if let Some(found) = candidates.iter().find(|c| tree.contains(c)) {
            return Ok(Resolution::Found(Target::new(from, found.clone())));
        }

        for dep in self.packages.dependencies_of(from) {
            if dep.role != PackageRole::Addon {
                continue;
            }
            let Some(view) = self.view(&dep)? else {
                continue;
            };
            for candidate in &candidates {
                if let Some(app_js) = view.meta().and_then(|m| m.app_js.get(&format!("./{}", candidate))) {
                    return Ok(Resolution::Found(Target::new(
                        &dep,
                        app_js.trim_start_matches("./"),
                    )));
                }
                let merged = format!("_app_/{}", candidate);
                if view.contains(&merged) {
                    return Ok(Resolution::Found(Target::new(&dep, merged)));
                }
            }
        }

        if mode.is_static() {
            let what = match name.kind {
                NameKind::Component => "component",
                NameKind::Helper => "helper",
                NameKind::Either => "component or helper",
                NameKind::Modifier => "modifier",
            };
            Ok(Resolution::Unresolved(format!(
                "no {} named '{}' in {} or its addons",
                what, name.name, from.name
            )))
        } else {
            Ok(Resolution::External(name.name.clone()))
        }
    }
}

/// Tree paths a template name may live at, most specific first
fn name_candidates(name: &NameRef) -> Vec<String> {
    let mut candidates = Vec::new();
    if name.kind == NameKind::Modifier {
        let base = format!("modifiers/{}", name.path);
        candidates.push(format!("{}.js", base));
        candidates.push(format!("{}.ts", base));
        return candidates;
    }
    if name.kind != NameKind::Helper {
        let base = format!("components/{}", name.path);
        for suffix in [
            ".js",
            ".ts",
            ".hbs",
            "/component.js",
            "/component.ts",
            "/template.hbs",
            "/index.js",
            "/index.ts",
        ] {
            candidates.push(format!("{}{}", base, suffix));
        }
    }
    if name.kind != NameKind::Component {
        let base = format!("helpers/{}", name.path);
        candidates.push(format!("{}.js", base));
        candidates.push(format!("{}.ts", base));
    }
    candidates
}

/// Template attached to a component module by naming convention
fn companion_template(module: &str, files: Files<'_>) -> Option<String> {
    let base = strip_module_ext(module);
    let candidate = match base.strip_suffix("/component") {
        Some(dir) => format!("{}/template.hbs", dir),
        None => format!("{}.hbs", base),
    };
    files.has(&candidate).then_some(candidate)
}

fn strip_module_ext(path: &str) -> &str {
    path.strip_suffix(".js")
        .or_else(|| path.strip_suffix(".ts"))
        .unwrap_or(path)
}

pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// `@scope/name/sub/path` -> (`@scope/name`, `sub/path`)
pub fn split_bare(specifier: &str) -> (&str, &str) {
    let mut slashes = specifier.match_indices('/');
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some((i, _)) => (&specifier[..i], &specifier[i + 1..]),
        None => (specifier, ""),
    }
}

fn declares_external(package: &Package, specifier: &str) -> bool {
    package
        .meta_block()
        .and_then(|b| b.get("externals"))
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().any(|v| v.as_str() == Some(specifier)))
}

fn index_from_disk(package: &Package) -> Result<DependencyView, PipelineError> {
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(&package.root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if let Ok(relative) = entry.path().strip_prefix(&package.root) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key);
        }
    }

    let meta = match package.schema() {
        Schema::V2 | Schema::Unknown(_) => Some(parse_meta(&package.manifest_path(), &package.manifest)?),
        Schema::Missing | Schema::Legacy => None,
    };
    let main = ["module", "main"].iter().find_map(|field| {
        package
            .manifest
            .get(*field)
            .and_then(Value::as_str)
            .map(|m| m.trim_start_matches("./").to_string())
    });

    debug!(
        "Indexed {} files of {} from {:?}",
        files.len(),
        package.name,
        package.root
    );
    Ok(DependencyView::OnDisk { files, meta, main })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    struct Fixture {
        _dir: TempDir,
        packages: Arc<PackageCache>,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let dir = TempDir::new()?;
        let root = dir.path();
        write(
            &root.join("package.json"),
            r#"{"name": "my-app", "dependencies": {"v2-addon": "*", "lodash-es": "*"}}"#,
        )?;
        write(
            &root.join("node_modules/v2-addon/package.json"),
            r#"{"name": "v2-addon", "keywords": ["ember-addon"], "ember-addon": {"version": 2, "type": "addon", "main": "./index.js", "renamed-modules": {"v2-addon/old": "v2-addon/components/fancy.js"}, "app-js": {"./components/fancy.js": "./_app_/components/fancy.js"}}}"#,
        )?;
        write(&root.join("node_modules/v2-addon/index.js"), "export default 1;")?;
        write(&root.join("node_modules/v2-addon/components/fancy.js"), "export default 1;")?;
        write(&root.join("node_modules/v2-addon/_app_/components/fancy.js"), "export { default } from 'v2-addon/components/fancy';")?;
        write(
            &root.join("node_modules/lodash-es/package.json"),
            r#"{"name": "lodash-es", "module": "lodash.js"}"#,
        )?;
        write(&root.join("node_modules/lodash-es/lodash.js"), "")?;
        write(&root.join("node_modules/lodash-es/get.js"), "")?;
        let packages = Arc::new(PackageCache::build(root)?);
        Ok(Fixture {
            _dir: dir,
            packages,
        })
    }

    fn app_tree() -> BuildTree {
        BuildTree::from_files([
            ("components/widget.hbs", b"<div>hi</div>".to_vec()),
            ("components/card.js", b"export default class Card {}\n".to_vec()),
            ("components/card.hbs", b"{{@title}}".to_vec()),
            ("components/plain.js", b"export default 1;\n".to_vec()),
            ("components/pod/template.hbs", b"pod".to_vec()),
            ("utils/format.js", b"export default 1;\n".to_vec()),
            ("utils/page.hbs", b"not colocated".to_vec()),
        ])
    }

    fn resolve(fx: &Fixture, tree: &BuildTree, from_file: &str, specifier: &str) -> anyhow::Result<Resolution> {
        let resolver = Resolver::new(Arc::clone(&fx.packages), Arc::new(BuildOptions::default()));
        let request = ModuleRequest {
            specifier,
            from_file,
            from_package: fx.packages.root(),
        };
        Ok(resolver.resolve(&request, tree)?)
    }

    #[test]
    fn test_found_with_extension_probing() -> anyhow::Result<()> {
        let fx = fixture()?;
        let tree = app_tree();
        let resolution = resolve(&fx, &tree, "components/plain.js", "../utils/format")?;
        assert_eq!(
            resolution.output_specifier(fx.packages.root(), "components/plain.js", "../utils/format"),
            Some("../utils/format.js".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_synthesizes_template_only_component() -> anyhow::Result<()> {
        let fx = fixture()?;
        let resolution = resolve(&fx, &app_tree(), "app.js", "./components/widget")?;
        let Resolution::Synthesized { target, source } = &resolution else {
            panic!("expected synthesized, got {:?}", resolution);
        };
        assert_eq!(target.path, "components/widget.js");
        assert!(source.contains("import TEMPLATE from \"./widget.hbs\";"));
        assert!(source.contains("templateOnlyComponent()"));
        Ok(())
    }

    #[test]
    fn test_pod_template_synthesizes_component_module() -> anyhow::Result<()> {
        let fx = fixture()?;
        let resolution = resolve(&fx, &app_tree(), "app.js", "./components/pod/component")?;
        assert!(matches!(
            &resolution,
            Resolution::Synthesized { target, source }
                if target.path == "components/pod/component.js"
                    && source.contains("import TEMPLATE from \"./template.hbs\";")
        ));
        Ok(())
    }

    #[test]
    fn test_rewrites_authored_module_with_template() -> anyhow::Result<()> {
        let fx = fixture()?;
        let resolution = resolve(&fx, &app_tree(), "app.js", "./components/card")?;
        assert!(matches!(
            &resolution,
            Resolution::Rewritten { target, source }
                if target.path == "components/card.js"
                    && source.contains("export default setComponentTemplate(TEMPLATE, Card);")
        ));
        Ok(())
    }

    #[test]
    fn test_template_outside_colocation_dir_is_just_a_file() -> anyhow::Result<()> {
        let fx = fixture()?;
        let tree = app_tree();
        assert!(matches!(
            resolve(&fx, &tree, "app.js", "./utils/page.hbs")?,
            Resolution::Found(t) if t.path == "utils/page.hbs"
        ));
        assert!(matches!(
            resolve(&fx, &tree, "app.js", "./utils/missing")?,
            Resolution::Unresolved(_)
        ));
        Ok(())
    }

    #[test]
    fn test_extensionless_template_import_gets_hbs_extension() -> anyhow::Result<()> {
        let fx = fixture()?;
        let tree = BuildTree::from_files([
            ("components/x-foo.js", b"import layout from '../templates/components/x-foo';\n".to_vec()),
            ("templates/components/x-foo.hbs", b"{{yield}}".to_vec()),
        ]);
        let specifier = "../templates/components/x-foo";
        let resolution = resolve(&fx, &tree, "components/x-foo.js", specifier)?;
        assert!(matches!(
            &resolution,
            Resolution::Found(t) if t.path == "templates/components/x-foo.hbs"
        ));
        assert_eq!(
            resolution.output_specifier(fx.packages.root(), "components/x-foo.js", specifier),
            Some("../templates/components/x-foo.hbs".to_string())
        );

        // a colocated template still yields a synthesized module, not the bare file
        assert!(matches!(
            resolve(&fx, &app_tree(), "app.js", "./components/widget")?,
            Resolution::Synthesized { .. }
        ));
        Ok(())
    }

    #[test]
    fn test_cross_package_resolution() -> anyhow::Result<()> {
        let fx = fixture()?;
        let tree = app_tree();
        let root = fx.packages.root();

        let main = resolve(&fx, &tree, "app.js", "v2-addon")?;
        assert_eq!(
            main.output_specifier(root, "app.js", "v2-addon"),
            Some("v2-addon/index.js".to_string())
        );

        let renamed = resolve(&fx, &tree, "app.js", "v2-addon/old")?;
        assert_eq!(
            renamed.target().map(|t| t.path.as_str()),
            Some("components/fancy.js")
        );

        let library = resolve(&fx, &tree, "app.js", "lodash-es/get")?;
        assert_eq!(
            library.output_specifier(root, "app.js", "lodash-es/get"),
            Some("lodash-es/get.js".to_string())
        );

        assert!(matches!(
            resolve(&fx, &tree, "app.js", "v2-addon/missing")?,
            Resolution::Unresolved(_)
        ));
        Ok(())
    }

    #[test]
    fn test_externals_and_unknown_packages() -> anyhow::Result<()> {
        let fx = fixture()?;
        let tree = app_tree();
        assert_eq!(
            resolve(&fx, &tree, "app.js", "@glimmer/component")?,
            Resolution::External("@glimmer/component".to_string())
        );
        assert!(matches!(
            resolve(&fx, &tree, "app.js", "left-pad")?,
            Resolution::Unresolved(reason) if reason.contains("left-pad")
        ));
        assert!(matches!(
            resolve(&fx, &tree, "app.js", "../outside")?,
            Resolution::Unresolved(_)
        ));
        Ok(())
    }

    #[test]
    fn test_template_names_follow_static_mode() -> anyhow::Result<()> {
        let fx = fixture()?;
        let tree = app_tree();
        let resolver = Resolver::new(Arc::clone(&fx.packages), Arc::new(BuildOptions::default()));
        let root = fx.packages.root();
        let name = |n: &str, path: &str| NameRef {
            name: n.to_string(),
            path: path.to_string(),
            kind: NameKind::Component,
            offset: 0,
        };

        let local = resolver.resolve_template_name(root, &tree, &name("Widget", "widget"), StaticMode::Static)?;
        assert_eq!(local.target().map(|t| t.path.as_str()), Some("components/widget.hbs"));

        let from_addon = resolver.resolve_template_name(root, &tree, &name("Fancy", "fancy"), StaticMode::Static)?;
        assert_eq!(
            from_addon.target().map(|t| t.virtual_id()),
            Some("v2-addon/_app_/components/fancy.js".to_string())
        );

        let modifier = NameRef {
            kind: NameKind::Modifier,
            ..name("auto-focus", "auto-focus")
        };
        let modifier_tree = BuildTree::from_files([("modifiers/auto-focus.js", b"export default 1;\n".to_vec())]);
        let local_modifier = resolver.resolve_template_name(root, &modifier_tree, &modifier, StaticMode::Static)?;
        assert_eq!(local_modifier.target().map(|t| t.path.as_str()), Some("modifiers/auto-focus.js"));
        assert!(matches!(
            resolver.resolve_template_name(root, &tree, &modifier, StaticMode::Static)?,
            Resolution::Unresolved(reason) if reason.contains("no modifier named 'auto-focus'")
        ));

        let missing = name("Nope", "nope");
        assert!(matches!(
            resolver.resolve_template_name(root, &tree, &missing, StaticMode::Static)?,
            Resolution::Unresolved(_)
        ));
        assert_eq!(
            resolver.resolve_template_name(root, &tree, &missing, StaticMode::Dynamic)?,
            Resolution::External("Nope".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_split_bare() {
        assert_eq!(split_bare("lodash"), ("lodash", ""));
        assert_eq!(split_bare("lodash/get"), ("lodash", "get"));
        assert_eq!(split_bare("@scope/pkg/a/b"), ("@scope/pkg", "a/b"));
        assert_eq!(split_bare("@scope/pkg"), ("@scope/pkg", ""));
    }
}
