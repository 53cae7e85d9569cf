//! Package and package-metadata types
//!
//! `Package` is the immutable view of one installed package for the lifetime of
//! a build. `PackageMeta` is the typed form of the `"ember-addon"` block in its
//! `package.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Key of the metadata block inside `package.json`
pub const META_KEY: &str = "ember-addon";

/// Keyword that marks a package as an addon
pub const ADDON_KEYWORD: &str = "ember-addon";

/// The only metadata schema this crate reads and writes
pub const SCHEMA_VERSION: u64 = 2;

/// Index of a package inside one `PackageCache`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub u32);

impl PackageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Role a package plays in the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageRole {
    App,
    Addon,
    /// Plain npm package; never converted, never consulted for metadata
    Library,
}

/// Metadata schema found in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// No metadata block at all
    Missing,
    /// A block without `version`, or `version: 1`
    Legacy,
    /// `version: 2`
    V2,
    /// Any other version
    Unknown(u64),
}

/// Represents a single installed package
#[derive(Debug, Clone)]
pub struct Package {
    pub id: PackageId,
    pub name: Arc<str>,
    pub version: Arc<str>,
    /// Canonical root directory
    pub root: PathBuf,
    pub role: PackageRole,
    /// Parsed `package.json`
    pub manifest: Value,
    /// Raw `package.json` text, kept for byte-stable round trips
    pub manifest_text: Arc<str>,
    /// Declared dependency names, in declaration order
    pub dependency_names: SmallVec<[Arc<str>; 4]>,
}

impl Package {
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("package.json")
    }

    pub fn meta_block(&self) -> Option<&Value> {
        self.manifest.get(META_KEY)
    }

    pub fn schema(&self) -> Schema {
        schema_of(self.meta_block())
    }

    pub fn is_v2(&self) -> bool {
        self.schema() == Schema::V2
    }

    /// Apps and addons that still use the legacy layout are converted by the pipeline
    pub fn is_conversion_target(&self) -> bool {
        self.role != PackageRole::Library && !self.is_v2()
    }

    pub fn is_app(&self) -> bool {
        self.role == PackageRole::App
    }
}

/// Classify the metadata block of a manifest
pub fn schema_of(block: Option<&Value>) -> Schema {
    let Some(block) = block else {
        return Schema::Missing;
    };
    match block.get("version").and_then(Value::as_u64) {
        None | Some(1) => Schema::Legacy,
        Some(SCHEMA_VERSION) => Schema::V2,
        Some(other) => Schema::Unknown(other),
    }
}

/// `type` field of the metadata block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaType {
    Addon,
    App,
}

/// Typed view of the `"ember-addon"` block (schema version 2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageMeta {
    pub version: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub meta_type: Option<MetaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implicit_modules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implicit_test_modules: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub public_assets: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub renamed_modules: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub externals: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app_js: BTreeMap<String, String>,
    /// Keys this crate does not model, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for PackageMeta {
    fn default() -> Self {
        PackageMeta {
            version: SCHEMA_VERSION,
            meta_type: None,
            main: None,
            implicit_modules: Vec::new(),
            implicit_test_modules: Vec::new(),
            public_assets: BTreeMap::new(),
            renamed_modules: BTreeMap::new(),
            externals: BTreeSet::new(),
            app_js: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl PackageMeta {
    /// Apply `renamed-modules` to a package-qualified specifier
    pub fn rename<'a>(&'a self, specifier: &'a str) -> &'a str {
        self.renamed_modules
            .get(specifier)
            .map(String::as_str)
            .unwrap_or(specifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_classification() {
        assert_eq!(schema_of(None), Schema::Missing);
        assert_eq!(schema_of(Some(&json!({"configPath": "x"}))), Schema::Legacy);
        assert_eq!(schema_of(Some(&json!({"version": 1}))), Schema::Legacy);
        assert_eq!(schema_of(Some(&json!({"version": 2}))), Schema::V2);
        assert_eq!(schema_of(Some(&json!({"version": 7}))), Schema::Unknown(7));
    }

    #[test]
    fn test_rename_falls_back_to_specifier() {
        let mut meta = PackageMeta::default();
        meta.renamed_modules
            .insert("my-addon/old".to_string(), "my-addon/new".to_string());
        assert_eq!(meta.rename("my-addon/old"), "my-addon/new");
        assert_eq!(meta.rename("my-addon/other"), "my-addon/other");
    }

    #[test]
    fn test_empty_collections_are_omitted() -> anyhow::Result<()> {
        let meta = PackageMeta {
            meta_type: Some(MetaType::Addon),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta)?;
        assert_eq!(value, json!({"version": 2, "type": "addon"}));
        Ok(())
    }
}
