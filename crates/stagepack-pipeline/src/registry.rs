//! Runtime module registry
//!
//! The packager builds an explicit `runtime name -> module` table for an app.
//! How the table is turned into source is up to a `RegistryEmitter`, so the
//! define call used at runtime can be swapped without touching the packager.

/// One runtime registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Name the runtime looks the module up by, e.g. `my-app/components/x`
    pub runtime_name: String,
    /// Import specifier of the module, e.g. `./components/x.js`
    pub import_specifier: String,
}

/// Ordered, duplicate-free registry table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// Add an entry; a runtime name registered twice keeps its first module
    pub fn register(&mut self, runtime_name: impl Into<String>, import_specifier: impl Into<String>) {
        let runtime_name = runtime_name.into();
        if self.entries.iter().any(|e| e.runtime_name == runtime_name) {
            return;
        }
        self.entries.push(RegistryEntry {
            runtime_name,
            import_specifier: import_specifier.into(),
        });
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn lookup(&self, runtime_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.runtime_name == runtime_name)
            .map(|e| e.import_specifier.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turns a registry table into module source
pub trait RegistryEmitter: Send + Sync {
    fn emit(&self, registry: &ModuleRegistry) -> String;
}

/// `import * as appModN from "..."; d("name", function() { return appModN; });`
#[derive(Debug, Clone)]
pub struct DefineEmitter {
    define: String,
}

impl DefineEmitter {
    pub fn new(define: impl Into<String>) -> Self {
        DefineEmitter {
            define: define.into(),
        }
    }
}

impl Default for DefineEmitter {
    fn default() -> Self {
        DefineEmitter::new("d")
    }
}

impl RegistryEmitter for DefineEmitter {
    fn emit(&self, registry: &ModuleRegistry) -> String {
        let mut out = String::new();
        for (i, entry) in registry.entries().iter().enumerate() {
            out.push_str(&format!(
                "import * as appMod{} from {};\n",
                i,
                quote(&entry.import_specifier)
            ));
        }
        for (i, entry) in registry.entries().iter().enumerate() {
            out.push_str(&format!(
                "{}({}, function() {{ return appMod{}; }});\n",
                self.define,
                quote(&entry.runtime_name),
                i
            ));
        }
        out
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_emitter() {
        let mut registry = ModuleRegistry::new();
        registry.register("my-app/components/widget", "./components/widget.js");
        registry.register("my-app/helpers/format", "./helpers/format.js");
        registry.register("my-app/components/widget", "./other.js");

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup("my-app/components/widget"),
            Some("./components/widget.js")
        );

        let source = DefineEmitter::default().emit(&registry);
        assert_eq!(
            source,
            "import * as appMod0 from \"./components/widget.js\";\n\
             import * as appMod1 from \"./helpers/format.js\";\n\
             d(\"my-app/components/widget\", function() { return appMod0; });\n\
             d(\"my-app/helpers/format\", function() { return appMod1; });\n"
        );
    }

    #[test]
    fn test_custom_define_function() {
        let mut registry = ModuleRegistry::new();
        registry.register("a/b", "a/b.js");
        let source = DefineEmitter::new("window.define").emit(&registry);
        assert!(source.contains("window.define(\"a/b\", function() { return appMod0; });"));
    }
}
