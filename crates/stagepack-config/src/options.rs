//! Build options for the stagepack pipeline
//!
//! Options are read from TOML. The lookup order is:
//! - `STAGEPACK_CONFIG` (explicit override for tests / isolated runs)
//! - `<package-root>/stagepack.toml`
//! - the user config file (`~/.config/stagepack/stagepack.toml`)
//! - built-in defaults

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding an explicit config file path
pub const CONFIG_ENV: &str = "STAGEPACK_CONFIG";

/// Environment toggle that stops the pipeline after the resolve stage
pub const RESOLVE_ONLY_ENV: &str = "STAGE2_ONLY";

/// Name of the per-package config file
pub const PACKAGE_CONFIG_FILE: &str = "stagepack.toml";

/// Error type for loading and saving build options
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read or written
    Io(PathBuf, std::io::Error),
    /// The config file is not valid TOML for `BuildOptions`
    Parse(PathBuf, String),
    /// `set` was called with a key that does not exist
    UnknownKey(String),
    /// `set` was called with a value that does not fit the key
    InvalidValue { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            ConfigError::Parse(path, msg) => {
                write!(f, "Invalid config file {}: {}", path.display(), msg)
            }
            ConfigError::UnknownKey(key) => write!(
                f,
                "Unknown config key: {}. Supported keys: {}",
                key,
                SETTABLE_KEYS.join(", ")
            ),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for config key '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const SETTABLE_KEYS: &[&str] = &[
    "mode",
    "template-binding-module",
    "template-only-module",
    "compile-templates",
    "ambiguous-colocation",
    "warnings-as-errors",
    "registry-define",
];

/// How component/helper references made by name inside templates are treated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StaticMode {
    /// Every name must resolve at build time; nothing is registered at runtime.
    Static,
    /// Unresolved names are left to the runtime registry.
    #[default]
    Dynamic,
}

impl StaticMode {
    pub fn is_static(self) -> bool {
        matches!(self, StaticMode::Static)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StaticMode::Static => "static",
            StaticMode::Dynamic => "dynamic",
        }
    }
}

impl std::str::FromStr for StaticMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(StaticMode::Static),
            "dynamic" => Ok(StaticMode::Dynamic),
            other => Err(format!("expected 'static' or 'dynamic', got '{}'", other)),
        }
    }
}

/// What to do when an authored module and a synthesis-eligible template claim
/// the same component identity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    #[default]
    Error,
    PreferAuthored,
}

impl std::str::FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(AmbiguityPolicy::Error),
            "prefer-authored" => Ok(AmbiguityPolicy::PreferAuthored),
            other => Err(format!(
                "expected 'error' or 'prefer-authored', got '{}'",
                other
            )),
        }
    }
}

/// Per-package overrides, keyed by package name in `[packages."<name>"]`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PackageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<StaticMode>,
    /// Caller-specified implicit modules used in static mode
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub implicit_modules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub implicit_test_modules: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub renamed_modules: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct BuildOptions {
    pub mode: StaticMode,
    /// Specifiers left for the runtime; a trailing `*` matches a prefix
    pub externals: Vec<String>,
    /// Directories whose modules are auto-registered in dynamic mode
    pub implicit_dirs: Vec<String>,
    /// Directories where template/component colocation applies
    pub colocation_dirs: Vec<String>,
    pub template_binding_module: String,
    pub template_only_module: String,
    pub compile_templates: bool,
    pub template_plugins: Vec<String>,
    pub ambiguous_colocation: AmbiguityPolicy,
    pub warnings_as_errors: bool,
    /// Name of the runtime registry's define function
    pub registry_define: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub packages: BTreeMap<String, PackageOptions>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            mode: StaticMode::Dynamic,
            externals: vec![
                "@ember/*".to_string(),
                "@glimmer/*".to_string(),
                "ember".to_string(),
                "rsvp".to_string(),
                "require".to_string(),
            ],
            implicit_dirs: vec!["components".to_string(), "helpers".to_string()],
            colocation_dirs: vec!["components".to_string()],
            template_binding_module: "@ember/component".to_string(),
            template_only_module: "@ember/component/template-only".to_string(),
            compile_templates: false,
            template_plugins: Vec::new(),
            ambiguous_colocation: AmbiguityPolicy::Error,
            warnings_as_errors: false,
            registry_define: "d".to_string(),
            packages: BTreeMap::new(),
        }
    }
}

impl BuildOptions {
    /// Resolve the config file path for a package root
    pub fn path(package_root: Option<&Path>) -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }

        if let Some(root) = package_root {
            let local = root.join(PACKAGE_CONFIG_FILE);
            if local.is_file() {
                return Some(local);
            }
        }

        user_config_path().filter(|p| p.is_file())
    }

    /// Load options for a package root, falling back to defaults
    pub fn load(package_root: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::path(package_root) {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(BuildOptions::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml(&content).map_err(|msg| ConfigError::Parse(path.to_path_buf(), msg))
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Stable text form used to fingerprint cached stage outputs
    pub fn fingerprint_source(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    /// Effective resolution mode for one package
    pub fn mode_for(&self, package_name: &str) -> StaticMode {
        self.packages
            .get(package_name)
            .and_then(|p| p.mode)
            .unwrap_or(self.mode)
    }

    pub fn package(&self, package_name: &str) -> Option<&PackageOptions> {
        self.packages.get(package_name)
    }

    /// Does `specifier` match one of the configured external patterns?
    pub fn is_external(&self, specifier: &str) -> bool {
        self.externals
            .iter()
            .any(|pattern| external_matches(pattern, specifier))
    }

    /// Whether the resolve-only build mode was requested via the environment
    pub fn resolve_only_from_env() -> bool {
        std::env::var(RESOLVE_ONLY_ENV)
            .map(|v| matches!(v.trim(), "true" | "1"))
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "mode" => Some(self.mode.as_str().to_string()),
            "template-binding-module" => Some(self.template_binding_module.clone()),
            "template-only-module" => Some(self.template_only_module.clone()),
            "compile-templates" => Some(self.compile_templates.to_string()),
            "ambiguous-colocation" => Some(
                match self.ambiguous_colocation {
                    AmbiguityPolicy::Error => "error",
                    AmbiguityPolicy::PreferAuthored => "prefer-authored",
                }
                .to_string(),
            ),
            "warnings-as-errors" => Some(self.warnings_as_errors.to_string()),
            "registry-define" => Some(self.registry_define.clone()),
            "externals" => Some(self.externals.join(", ")),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), ConfigError> {
        let invalid = |value: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "mode" => self.mode = value.parse().map_err(|_| invalid(&value))?,
            "template-binding-module" => self.template_binding_module = value,
            "template-only-module" => self.template_only_module = value,
            "compile-templates" => {
                self.compile_templates = value.parse().map_err(|_| invalid(&value))?;
            }
            "ambiguous-colocation" => {
                self.ambiguous_colocation = value.parse().map_err(|_| invalid(&value))?;
            }
            "warnings-as-errors" => {
                self.warnings_as_errors = value.parse().map_err(|_| invalid(&value))?;
            }
            "registry-define" => self.registry_define = value,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn values_iter(&self) -> Vec<(&'static str, String)> {
        let mut values = Vec::new();
        for key in SETTABLE_KEYS.iter().copied().chain(std::iter::once("externals")) {
            if let Some(value) = self.get(key) {
                values.push((key, value));
            }
        }
        values
    }
}

/// Default user-level config file path
pub fn user_config_path() -> Option<PathBuf> {
    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir().map(|h| h.join(".config").join("stagepack").join(PACKAGE_CONFIG_FILE))
    }

    #[cfg(target_os = "windows")]
    {
        dirs::config_dir().map(|c| c.join("stagepack").join(PACKAGE_CONFIG_FILE))
    }
}

fn external_matches(pattern: &str, specifier: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => specifier.starts_with(prefix),
        None => pattern == specifier,
    }
}
