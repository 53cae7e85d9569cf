//! Immutable file trees passed between stages
//!
//! A `BuildTree` maps slash-separated, package-relative paths to file contents
//! or a deletion marker. Trees are never mutated; `TreeBuilder` starts from an
//! existing tree and produces a new one, sharing unchanged contents.

use crate::errors::PipelineError;
use stagepack_logger as logger;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

/// One path in a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(Arc<[u8]>),
    /// Present in the tree this one was derived from, removed here
    Deleted,
}

/// Difference between two trees for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    Added(String),
    Modified(String),
    Removed(String),
}

/// Immutable snapshot of a package's files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTree {
    entries: Arc<BTreeMap<String, Entry>>,
}

impl BuildTree {
    pub fn new() -> Self {
        BuildTree::default()
    }

    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Arc<[u8]>>,
    {
        let entries = files
            .into_iter()
            .map(|(p, c)| (p.into(), Entry::File(c.into())))
            .collect();
        BuildTree {
            entries: Arc::new(entries),
        }
    }

    fn is_ignored_dir(entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            return false;
        }

        matches!(
            entry.file_name().to_string_lossy().as_ref(),
            ".git" | ".hg" | ".svn" | "node_modules" | "dist" | "tmp" | ".cache" | "coverage"
        )
    }

    /// Snapshot every file below `root`
    pub fn from_dir(root: &Path) -> Result<Self, PipelineError> {
        let start = Instant::now();
        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !Self::is_ignored_dir(entry))
        {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                PipelineError::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let content = fs::read(entry.path()).map_err(|e| PipelineError::io(entry.path(), e))?;
            entries.insert(key, Entry::File(Arc::from(content)));
        }

        logger::debug(&format!(
            "BuildTree::from_dir: {} files from {:?} in {:.2}ms",
            entries.len(),
            root,
            start.elapsed().as_secs_f64() * 1000.0
        ));

        Ok(BuildTree {
            entries: Arc::new(entries),
        })
    }

    pub fn get(&self, path: &str) -> Option<&Arc<[u8]>> {
        match self.entries.get(path) {
            Some(Entry::File(content)) => Some(content),
            _ => None,
        }
    }

    /// File content as UTF-8, if it is valid UTF-8
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|c| std::str::from_utf8(c).ok())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Live files in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &Arc<[u8]>)> {
        self.entries.iter().filter_map(|(path, entry)| match entry {
            Entry::File(content) => Some((path.as_str(), content)),
            Entry::Deleted => None,
        })
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files().map(|(path, _)| path)
    }

    /// Live files below `dir/`, in path order
    pub fn files_under<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, &'a Arc<[u8]>)> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files()
            .filter(move |(path, _)| path.starts_with(prefix.as_str()))
    }

    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Number of live files
    pub fn len(&self) -> usize {
        self.files().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a new tree from this one
    pub fn builder(&self) -> TreeBuilder {
        TreeBuilder {
            entries: (*self.entries).clone(),
        }
    }

    /// Changes that turn `previous` into `self`
    pub fn diff(&self, previous: &BuildTree) -> Vec<TreeChange> {
        let mut changes = Vec::new();
        for (path, content) in self.files() {
            match previous.get(path) {
                None => changes.push(TreeChange::Added(path.to_string())),
                Some(old) if old != content => changes.push(TreeChange::Modified(path.to_string())),
                Some(_) => {}
            }
        }
        for path in previous.paths() {
            if !self.contains(path) {
                changes.push(TreeChange::Removed(path.to_string()));
            }
        }
        changes.sort_by(|a, b| change_path(a).cmp(change_path(b)));
        changes
    }

    /// Write every live file below `dir`
    pub fn write_to(&self, dir: &Path) -> Result<(), PipelineError> {
        for (path, content) in self.files() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
            fs::write(&target, &content[..]).map_err(|e| PipelineError::io(&target, e))?;
        }
        Ok(())
    }
}

fn change_path(change: &TreeChange) -> &str {
    match change {
        TreeChange::Added(p) | TreeChange::Modified(p) | TreeChange::Removed(p) => p,
    }
}

/// Produces a new `BuildTree`; the source tree stays untouched
#[derive(Debug, Default)]
pub struct TreeBuilder {
    entries: BTreeMap<String, Entry>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Arc<[u8]>>) -> &mut Self {
        self.entries.insert(path.into(), Entry::File(content.into()));
        self
    }

    /// Remove a path; if it existed, leave a deletion marker
    pub fn remove(&mut self, path: &str) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(path) {
            *entry = Entry::Deleted;
        }
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        matches!(self.entries.get(path), Some(Entry::File(_)))
    }

    pub fn build(self) -> BuildTree {
        BuildTree {
            entries: Arc::new(self.entries),
        }
    }
}

/// Directory part of a tree path ("" at the root)
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

/// Join a relative specifier onto a directory, normalizing `.` and `..`.
///
/// Returns `None` when the result would leave the tree root.
pub fn join_relative(dir: &str, specifier: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Relative specifier from the directory of `from_file` to `target`
pub fn relative_specifier(from_file: &str, target: &str) -> String {
    let from: Vec<&str> = parent_dir(from_file)
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();
    let to: Vec<&str> = target.split('/').collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let common = common.min(to.len().saturating_sub(1));

    let mut out: Vec<&str> = Vec::new();
    out.extend(std::iter::repeat("..").take(from.len() - common));
    out.extend(&to[common..]);
    let joined = out.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_dir_skips_ignored_dirs() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("addon/components"))?;
        fs::create_dir_all(root.join("node_modules/dep"))?;
        fs::write(root.join("addon/components/widget.hbs"), "<div>hi</div>")?;
        fs::write(root.join("node_modules/dep/index.js"), "")?;
        fs::write(root.join("package.json"), "{}")?;

        let tree = BuildTree::from_dir(root)?;
        let paths: Vec<&str> = tree.paths().collect();
        assert_eq!(paths, vec!["addon/components/widget.hbs", "package.json"]);
        assert_eq!(tree.get_str("addon/components/widget.hbs"), Some("<div>hi</div>"));
        Ok(())
    }

    #[test]
    fn test_builder_leaves_source_untouched() {
        let tree = BuildTree::from_files([("a.js", b"a".to_vec()), ("b.js", b"b".to_vec())]);
        let mut builder = tree.builder();
        builder.insert("c.js", b"c".to_vec()).remove("a.js");
        let next = builder.build();

        assert!(tree.contains("a.js"));
        assert!(!next.contains("a.js"));
        assert_eq!(next.entry("a.js"), Some(&Entry::Deleted));
        assert_eq!(
            next.diff(&tree),
            vec![
                TreeChange::Removed("a.js".to_string()),
                TreeChange::Added("c.js".to_string()),
            ]
        );
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative("components", "./widget").as_deref(), Some("components/widget"));
        assert_eq!(join_relative("components/ui", "../util").as_deref(), Some("components/util"));
        assert_eq!(join_relative("", "../escape"), None);
    }

    #[test]
    fn test_relative_specifier() {
        assert_eq!(relative_specifier("components/a.js", "components/b.js"), "./b.js");
        assert_eq!(relative_specifier("components/ui/a.js", "helpers/x.js"), "../../helpers/x.js");
        assert_eq!(relative_specifier("index.js", "components/x.js"), "./components/x.js");
        assert_eq!(relative_specifier("components/x/component.js", "components/x.js"), "../x.js");
    }
}
