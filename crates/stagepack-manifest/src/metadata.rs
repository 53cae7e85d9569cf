//! Package metadata model - reading, validating and writing the metadata block
//!
//! `MetadataStore` is the single point of mutation for package metadata. Each
//! build owns one store, and the store refuses a second write for the same
//! package.

use crate::errors::ManifestError;
use crate::types::{
    schema_of, MetaType, Package, PackageMeta, Schema, ADDON_KEYWORD, META_KEY, SCHEMA_VERSION,
};
use ahash::AHashSet;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-build metadata reader/writer
#[derive(Debug, Default)]
pub struct MetadataStore {
    written: Mutex<AHashSet<PathBuf>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        MetadataStore::default()
    }

    /// Read and validate the v2 metadata of a package
    pub fn read(&self, package: &Package) -> Result<PackageMeta, ManifestError> {
        parse_meta(&package.manifest_path(), &package.manifest)
    }

    /// Read the metadata of a package that may still be in legacy form.
    ///
    /// Returns `None` for packages without a v2 block; a block with an unknown
    /// version is still an error.
    pub fn read_existing(&self, package: &Package) -> Result<Option<PackageMeta>, ManifestError> {
        match package.schema() {
            Schema::Missing | Schema::Legacy => Ok(None),
            Schema::V2 | Schema::Unknown(_) => self.read(package).map(Some),
        }
    }

    /// Render the package's `package.json` with `meta` as its metadata block.
    ///
    /// Must be called at most once per package per build. When `meta` equals
    /// the metadata already on disk the original text is returned unchanged.
    pub fn write(&self, package: &Package, meta: &PackageMeta) -> Result<String, ManifestError> {
        {
            let mut written = self.written.lock();
            if !written.insert(package.root.clone()) {
                return Err(ManifestError::DuplicateWrite(package.manifest_path()));
            }
        }

        validate_meta(&package.manifest_path(), meta)?;

        if let Ok(Some(existing)) = self.read_existing(package) {
            if &existing == meta && has_addon_keyword(&package.manifest) {
                debug!("Metadata for {} unchanged", package.name);
                return Ok(package.manifest_text.to_string());
            }
        }

        render_manifest(&package.manifest, meta)
    }

    /// Has metadata for this package root been written in this build?
    pub fn was_written(&self, root: &Path) -> bool {
        self.written.lock().contains(root)
    }
}

/// Parse and validate the metadata block of a manifest
pub fn parse_meta(path: &Path, manifest: &Value) -> Result<PackageMeta, ManifestError> {
    let corrupt = |reason: String| ManifestError::CorruptMetadata {
        path: path.to_path_buf(),
        reason,
    };

    let block = manifest
        .get(META_KEY)
        .ok_or_else(|| corrupt(format!("missing \"{}\" block", META_KEY)))?;

    match schema_of(Some(block)) {
        Schema::V2 => {}
        Schema::Missing | Schema::Legacy => {
            return Err(corrupt(format!(
                "expected schema version {}, found a legacy block",
                SCHEMA_VERSION
            )))
        }
        Schema::Unknown(v) => {
            return Err(corrupt(format!(
                "expected schema version {}, found {}",
                SCHEMA_VERSION, v
            )))
        }
    }

    let meta: PackageMeta =
        serde_json::from_value(block.clone()).map_err(|e| corrupt(e.to_string()))?;
    validate_meta(path, &meta)?;
    Ok(meta)
}

fn validate_meta(path: &Path, meta: &PackageMeta) -> Result<(), ManifestError> {
    let corrupt = |reason: String| ManifestError::CorruptMetadata {
        path: path.to_path_buf(),
        reason,
    };

    if meta.version != SCHEMA_VERSION {
        return Err(corrupt(format!(
            "expected schema version {}, found {}",
            SCHEMA_VERSION, meta.version
        )));
    }

    for (field, list) in [
        ("implicit-modules", &meta.implicit_modules),
        ("implicit-test-modules", &meta.implicit_test_modules),
    ] {
        let mut seen = AHashSet::new();
        for specifier in list {
            if !seen.insert(specifier.as_str()) {
                return Err(corrupt(format!("duplicate entry '{}' in {}", specifier, field)));
            }
            if specifier.ends_with(".hbs") {
                return Err(corrupt(format!(
                    "'{}' in {} names a template, not a module",
                    specifier, field
                )));
            }
        }
    }

    Ok(())
}

fn has_addon_keyword(manifest: &Value) -> bool {
    manifest.as_object().is_some_and(object_has_addon_keyword)
}

fn object_has_addon_keyword(object: &serde_json::Map<String, Value>) -> bool {
    object
        .get("keywords")
        .and_then(Value::as_array)
        .is_some_and(|k| k.iter().any(|v| v.as_str() == Some(ADDON_KEYWORD)))
}

/// Serialize `manifest` with `meta` in place of its metadata block
pub fn render_manifest(manifest: &Value, meta: &PackageMeta) -> Result<String, ManifestError> {
    let mut manifest = manifest.clone();
    let Some(object) = manifest.as_object_mut() else {
        return Err(ManifestError::CorruptMetadata {
            path: PathBuf::from("package.json"),
            reason: "package.json is not a JSON object".to_string(),
        });
    };

    if meta.meta_type != Some(MetaType::App) && !object_has_addon_keyword(object) {
        let keywords = object
            .entry("keywords")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(list) = keywords.as_array_mut() {
            list.push(Value::String(ADDON_KEYWORD.to_string()));
        }
    }

    object.insert(META_KEY.to_string(), serde_json::to_value(meta)?);

    let mut text = serde_json::to_string_pretty(&manifest)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PackageId, PackageRole};
    use serde_json::json;
    use smallvec::SmallVec;
    use std::sync::Arc;

    fn package(manifest: Value, text: &str) -> Package {
        Package {
            id: PackageId(0),
            name: Arc::from("my-addon"),
            version: Arc::from("1.0.0"),
            root: PathBuf::from("/work/my-addon"),
            role: PackageRole::Addon,
            manifest,
            manifest_text: Arc::from(text),
            dependency_names: SmallVec::new(),
        }
    }

    #[test]
    fn test_read_rejects_wrong_version() {
        let pkg = package(json!({"name": "my-addon", "ember-addon": {"version": 3}}), "");
        let err = MetadataStore::new().read(&pkg);
        assert!(matches!(err, Err(ManifestError::CorruptMetadata { .. })));
    }

    #[test]
    fn test_read_rejects_missing_block() {
        let pkg = package(json!({"name": "my-addon"}), "");
        assert!(matches!(
            MetadataStore::new().read(&pkg),
            Err(ManifestError::CorruptMetadata { .. })
        ));
        assert!(matches!(MetadataStore::new().read_existing(&pkg), Ok(None)));
    }

    #[test]
    fn test_read_rejects_wrong_field_type() {
        let pkg = package(
            json!({"ember-addon": {"version": 2, "implicit-modules": "./components/x"}}),
            "",
        );
        assert!(matches!(
            MetadataStore::new().read(&pkg),
            Err(ManifestError::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn test_read_rejects_duplicate_implicit_modules() {
        let pkg = package(
            json!({"ember-addon": {"version": 2, "implicit-modules": ["./a", "./a"]}}),
            "",
        );
        assert!(matches!(
            MetadataStore::new().read(&pkg),
            Err(ManifestError::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn test_write_twice_is_rejected() -> anyhow::Result<()> {
        let pkg = package(json!({"name": "my-addon"}), "{\"name\": \"my-addon\"}\n");
        let store = MetadataStore::new();
        let meta = PackageMeta::default();
        store.write(&pkg, &meta)?;
        assert!(store.was_written(&pkg.root));
        assert!(matches!(
            store.write(&pkg, &meta),
            Err(ManifestError::DuplicateWrite(_))
        ));
        Ok(())
    }

    #[test]
    fn test_write_unchanged_is_byte_stable() -> anyhow::Result<()> {
        let text = "{\n    \"name\": \"my-addon\",\n    \"keywords\": [\"ember-addon\"],\n    \"ember-addon\": {\"version\": 2, \"type\": \"addon\", \"main\": \"./index.js\"}\n}\n";
        let manifest: Value = serde_json::from_str(text)?;
        let pkg = package(manifest, text);
        let store = MetadataStore::new();
        let meta = store.read(&pkg)?;
        assert_eq!(store.write(&pkg, &meta)?, text);
        Ok(())
    }

    #[test]
    fn test_write_preserves_key_order_and_adds_keyword() -> anyhow::Result<()> {
        let text = "{\"name\": \"my-addon\", \"version\": \"1.0.0\", \"ember-addon\": {\"configPath\": \"tests\"}, \"scripts\": {}}";
        let manifest: Value = serde_json::from_str(text)?;
        let pkg = package(manifest, text);
        let meta = PackageMeta {
            meta_type: Some(MetaType::Addon),
            implicit_modules: vec!["./components/widget".to_string()],
            ..Default::default()
        };
        let rendered = MetadataStore::new().write(&pkg, &meta)?;
        let name_at = rendered.find("\"name\"").unwrap_or(usize::MAX);
        let block_at = rendered.find("\"ember-addon\": {").unwrap_or(usize::MAX);
        let scripts_at = rendered.find("\"scripts\"").unwrap_or(usize::MAX);
        assert!(name_at < block_at && block_at < scripts_at);
        assert!(rendered.contains("\"./components/widget\""));
        assert!(rendered.ends_with("}\n"));

        let reparsed: Value = serde_json::from_str(&rendered)?;
        assert_eq!(reparsed["keywords"], json!(["ember-addon"]));
        Ok(())
    }
}
