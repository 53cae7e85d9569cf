//! Package graph for one build
//!
//! `PackageCache::build` walks the dependency manifests once, starting at the
//! root package, and produces an immutable graph. Dependencies are located the
//! way node does it: `node_modules/<name>` in the requesting package's root,
//! then in each parent directory. Only apps and addons have their dependencies
//! followed; plain libraries are leaves.

use crate::errors::ManifestError;
use crate::types::{Package, PackageId, PackageRole, ADDON_KEYWORD, META_KEY};
use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Immutable package graph, one per build
#[derive(Debug)]
pub struct PackageCache {
    packages: Vec<Arc<Package>>,
    by_root: AHashMap<PathBuf, PackageId>,
    edges: Vec<SmallVec<[PackageId; 4]>>,
    root: PackageId,
}

impl PackageCache {
    /// Build the graph rooted at `root_dir`
    pub fn build(root_dir: &Path) -> Result<Self, ManifestError> {
        let start = Instant::now();
        let root_dir = normalize(root_dir);

        let mut packages: Vec<Arc<Package>> = Vec::new();
        let mut by_root: AHashMap<PathBuf, PackageId> = AHashMap::new();
        let mut edges: Vec<SmallVec<[PackageId; 4]>> = Vec::new();

        let root_pkg = load_package(&root_dir, PackageId(0), true)?;
        by_root.insert(root_pkg.root.clone(), root_pkg.id);
        packages.push(Arc::new(root_pkg));
        edges.push(SmallVec::new());

        let mut queue = VecDeque::from([PackageId(0)]);
        while let Some(id) = queue.pop_front() {
            let pkg = Arc::clone(&packages[id.index()]);
            if pkg.role == PackageRole::Library {
                continue;
            }

            let optional = optional_dependencies(&pkg.manifest);
            let mut deps: SmallVec<[PackageId; 4]> = SmallVec::new();
            for dep_name in &pkg.dependency_names {
                let Some(dep_root) = locate_dependency(&pkg.root, dep_name) else {
                    if optional.contains(dep_name.as_ref()) {
                        debug!("Optional dependency {} of {} not installed", dep_name, pkg.name);
                        continue;
                    }
                    return Err(ManifestError::MissingDependency {
                        package: pkg.name.to_string(),
                        dependency: dep_name.to_string(),
                    });
                };

                let dep_id = match by_root.get(&dep_root) {
                    Some(&existing) => existing,
                    None => {
                        let new_id = PackageId(packages.len() as u32);
                        let dep = load_package(&dep_root, new_id, false)?;
                        by_root.insert(dep.root.clone(), new_id);
                        packages.push(Arc::new(dep));
                        edges.push(SmallVec::new());
                        queue.push_back(new_id);
                        new_id
                    }
                };
                if !deps.contains(&dep_id) {
                    deps.push(dep_id);
                }
            }
            edges[id.index()] = deps;
        }

        info!(
            "PackageCache::build: {} packages in {:.2}ms",
            packages.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(PackageCache {
            packages,
            by_root,
            edges,
            root: PackageId(0),
        })
    }

    /// The package the build was started from
    pub fn root(&self) -> &Arc<Package> {
        &self.packages[self.root.index()]
    }

    pub fn get(&self, id: PackageId) -> Option<&Arc<Package>> {
        self.packages.get(id.index())
    }

    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Look up the package rooted exactly at `path`
    pub fn package_at(&self, path: &Path) -> Result<&Arc<Package>, ManifestError> {
        let normalized = normalize(path);
        self.by_root
            .get(&normalized)
            .map(|id| &self.packages[id.index()])
            .ok_or(ManifestError::UnknownPackage(normalized))
    }

    /// The innermost package whose root contains `path`
    pub fn owner_of_file(&self, path: &Path) -> Option<&Arc<Package>> {
        let normalized = normalize(path);
        normalized
            .ancestors()
            .find_map(|dir| self.by_root.get(dir))
            .map(|id| &self.packages[id.index()])
    }

    /// Dependencies of `package`, in declaration order
    pub fn dependencies_of(&self, package: &Package) -> Vec<Arc<Package>> {
        self.edges
            .get(package.id.index())
            .map(|deps| {
                deps.iter()
                    .map(|id| Arc::clone(&self.packages[id.index()]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Where does the package named `name` live, as seen from `from`?
    ///
    /// A package may always refer to itself by name.
    pub fn resolve_dependency(&self, from: &Package, name: &str) -> Option<Arc<Package>> {
        if from.name.as_ref() == name {
            return self.packages.get(from.id.index()).cloned();
        }
        self.edges.get(from.id.index())?.iter().find_map(|id| {
            let dep = &self.packages[id.index()];
            (dep.name.as_ref() == name).then(|| Arc::clone(dep))
        })
    }

    /// Packages the pipeline converts: legacy apps and addons, in discovery order
    pub fn conversion_targets(&self) -> Vec<Arc<Package>> {
        self.packages
            .iter()
            .filter(|p| p.is_conversion_target())
            .cloned()
            .collect()
    }

    /// Find a dependency cycle among the given packages, if any.
    ///
    /// Returns the package names along the cycle, first name repeated last.
    pub fn dependency_cycle(&self, among: &[PackageId]) -> Option<Vec<Arc<str>>> {
        let members: AHashSet<PackageId> = among.iter().copied().collect();
        let mut state: AHashMap<PackageId, VisitState> = AHashMap::new();
        let mut stack: Vec<PackageId> = Vec::new();

        for &start in among {
            if let Some(cycle) = self.visit(start, &members, &mut state, &mut stack) {
                return Some(
                    cycle
                        .into_iter()
                        .map(|id| Arc::clone(&self.packages[id.index()].name))
                        .collect(),
                );
            }
        }
        None
    }

    fn visit(
        &self,
        id: PackageId,
        members: &AHashSet<PackageId>,
        state: &mut AHashMap<PackageId, VisitState>,
        stack: &mut Vec<PackageId>,
    ) -> Option<Vec<PackageId>> {
        match state.get(&id) {
            Some(VisitState::Done) => return None,
            Some(VisitState::InProgress) => {
                let pos = stack.iter().position(|&s| s == id).unwrap_or(0);
                let mut cycle = stack[pos..].to_vec();
                cycle.push(id);
                return Some(cycle);
            }
            None => {}
        }

        state.insert(id, VisitState::InProgress);
        stack.push(id);
        for &dep in self.edges.get(id.index()).map(|e| e.as_slice()).unwrap_or(&[]) {
            if !members.contains(&dep) {
                continue;
            }
            if let Some(cycle) = self.visit(dep, members, state, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        state.insert(id, VisitState::Done);
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn load_package(root: &Path, id: PackageId, is_root: bool) -> Result<Package, ManifestError> {
    let manifest_path = root.join("package.json");
    if !manifest_path.is_file() {
        return Err(ManifestError::MissingManifest(manifest_path));
    }

    let text = fs::read_to_string(&manifest_path)?;
    let manifest: Value = serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
        path: manifest_path.clone(),
        source,
    })?;

    let name = manifest
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestError::CorruptMetadata {
            path: manifest_path.clone(),
            reason: "package.json has no \"name\"".to_string(),
        })?;
    let version = manifest
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0");

    let role = classify(&manifest, is_root);

    let mut sections = vec!["dependencies"];
    if is_root {
        sections.push("devDependencies");
    }
    let mut dependency_names: SmallVec<[Arc<str>; 4]> = SmallVec::new();
    for section in sections {
        if let Some(deps) = manifest.get(section).and_then(Value::as_object) {
            for dep in deps.keys() {
                if !dependency_names.iter().any(|d| d.as_ref() == dep) {
                    dependency_names.push(Arc::from(dep.as_str()));
                }
            }
        }
    }

    debug!("Loaded package {}@{} ({:?}) at {:?}", name, version, role, root);

    Ok(Package {
        id,
        name: Arc::from(name),
        version: Arc::from(version),
        root: root.to_path_buf(),
        role,
        manifest_text: Arc::from(text.as_str()),
        manifest,
        dependency_names,
    })
}

fn classify(manifest: &Value, is_root: bool) -> PackageRole {
    let declared_app = manifest
        .get(META_KEY)
        .and_then(|b| b.get("type"))
        .and_then(Value::as_str)
        == Some("app");
    let addon_keyword = manifest
        .get("keywords")
        .and_then(Value::as_array)
        .is_some_and(|k| k.iter().any(|v| v.as_str() == Some(ADDON_KEYWORD)));

    if declared_app {
        PackageRole::App
    } else if addon_keyword {
        PackageRole::Addon
    } else if is_root {
        PackageRole::App
    } else {
        PackageRole::Library
    }
}

fn optional_dependencies(manifest: &Value) -> AHashSet<String> {
    manifest
        .get("optionalDependencies")
        .and_then(Value::as_object)
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default()
}

/// Node-style lookup of `node_modules/<name>` from `from_root` upwards
fn locate_dependency(from_root: &Path, name: &str) -> Option<PathBuf> {
    from_root.ancestors().find_map(|dir| {
        if dir.file_name().is_some_and(|n| n == "node_modules") {
            return None;
        }
        let candidate = dir.join("node_modules").join(name);
        candidate
            .join("package.json")
            .is_file()
            .then(|| normalize(&candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(dir: &Path, manifest: &str) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("package.json"), manifest)?;
        Ok(())
    }

    fn fixture() -> anyhow::Result<TempDir> {
        let temp_dir = TempDir::new()?;
        let app = temp_dir.path();
        write_package(
            app,
            r#"{"name": "my-app", "dependencies": {"lodash": "*"}, "devDependencies": {"my-addon": "*"}}"#,
        )?;
        write_package(
            &app.join("node_modules/my-addon"),
            r#"{"name": "my-addon", "keywords": ["ember-addon"], "dependencies": {"v2-addon": "*"}}"#,
        )?;
        write_package(
            &app.join("node_modules/v2-addon"),
            r#"{"name": "v2-addon", "keywords": ["ember-addon"], "ember-addon": {"version": 2, "type": "addon"}}"#,
        )?;
        write_package(
            &app.join("node_modules/lodash"),
            r#"{"name": "lodash", "dependencies": {"not-installed": "*"}}"#,
        )?;
        Ok(temp_dir)
    }

    #[test]
    fn test_build_graph() -> anyhow::Result<()> {
        let temp_dir = fixture()?;
        let cache = PackageCache::build(temp_dir.path())?;

        assert_eq!(cache.len(), 4);
        let app = cache.root();
        assert_eq!(app.role, PackageRole::App);

        let deps: Vec<String> = cache
            .dependencies_of(app)
            .iter()
            .map(|p| p.name.to_string())
            .collect();
        assert_eq!(deps, vec!["lodash", "my-addon"]);

        let addon = cache.resolve_dependency(app, "my-addon");
        assert!(addon.as_ref().is_some_and(|a| a.role == PackageRole::Addon));
        assert!(addon.as_ref().is_some_and(|a| a.is_conversion_target()));

        let v2 = addon.and_then(|a| cache.resolve_dependency(&a, "v2-addon"));
        assert!(v2.is_some_and(|p| p.is_v2() && !p.is_conversion_target()));
        Ok(())
    }

    #[test]
    fn test_libraries_are_leaves() -> anyhow::Result<()> {
        let temp_dir = fixture()?;
        let cache = PackageCache::build(temp_dir.path())?;
        let lodash = cache.resolve_dependency(cache.root(), "lodash");
        assert!(lodash.is_some_and(|l| l.role == PackageRole::Library
            && cache.dependencies_of(&l).is_empty()));
        Ok(())
    }

    #[test]
    fn test_missing_dependency_fails_fast() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        write_package(
            temp_dir.path(),
            r#"{"name": "my-app", "devDependencies": {"ghost-addon": "*"}}"#,
        )?;
        let result = PackageCache::build(temp_dir.path());
        assert!(matches!(
            result,
            Err(ManifestError::MissingDependency { ref dependency, .. }) if dependency == "ghost-addon"
        ));
        Ok(())
    }

    #[test]
    fn test_missing_optional_dependency_is_skipped() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        write_package(
            temp_dir.path(),
            r#"{"name": "my-app", "dependencies": {"maybe": "*"}, "optionalDependencies": {"maybe": "*"}}"#,
        )?;
        let cache = PackageCache::build(temp_dir.path())?;
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_root_manifest() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(matches!(
            PackageCache::build(temp_dir.path()),
            Err(ManifestError::MissingManifest(_))
        ));
        Ok(())
    }

    #[test]
    fn test_owner_of_file_prefers_innermost_package() -> anyhow::Result<()> {
        let temp_dir = fixture()?;
        let cache = PackageCache::build(temp_dir.path())?;

        let nested = temp_dir.path().join("node_modules/my-addon/addon/components/x.js");
        fs::create_dir_all(temp_dir.path().join("node_modules/my-addon/addon/components"))?;
        fs::write(&nested, "export default 1;")?;
        assert_eq!(
            cache.owner_of_file(&nested).map(|p| p.name.to_string()),
            Some("my-addon".to_string())
        );

        let app_file = temp_dir.path().join("app.js");
        fs::write(&app_file, "")?;
        assert_eq!(
            cache.owner_of_file(&app_file).map(|p| p.name.to_string()),
            Some("my-app".to_string())
        );

        assert!(cache.package_at(&temp_dir.path().join("node_modules/v2-addon")).is_ok());
        assert!(matches!(
            cache.package_at(&temp_dir.path().join("node_modules")),
            Err(ManifestError::UnknownPackage(_))
        ));
        Ok(())
    }

    #[test]
    fn test_dependency_cycle_among_targets() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let app = temp_dir.path();
        write_package(app, r#"{"name": "my-app", "devDependencies": {"a": "*"}}"#)?;
        write_package(
            &app.join("node_modules/a"),
            r#"{"name": "a", "keywords": ["ember-addon"], "dependencies": {"b": "*"}}"#,
        )?;
        write_package(
            &app.join("node_modules/b"),
            r#"{"name": "b", "keywords": ["ember-addon"], "dependencies": {"a": "*"}}"#,
        )?;
        let cache = PackageCache::build(app)?;
        let targets: Vec<PackageId> = cache.conversion_targets().iter().map(|p| p.id).collect();
        let cycle = cache.dependency_cycle(&targets);
        assert!(cycle.is_some_and(|c| c.first() == c.last() && c.len() == 3));
        Ok(())
    }
}
