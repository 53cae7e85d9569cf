//! Import/export analysis of JavaScript and TypeScript modules using ast-grep
//!
//! One parse per file yields everything the resolver and the packager need:
//! the byte ranges of every module specifier (static imports, re-exports and
//! dynamic `import()` calls), the shape of the default export, whether the
//! module already attaches a template itself, and the identifiers it binds.

use ast_grep_core::source::StrDoc;
use ast_grep_core::{AstGrep, Node};
use ast_grep_language::SupportLang;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

type JsNode<'r> = Node<'r, StrDoc<SupportLang>>;

/// Call that attaches a template to a component definition
pub const TEMPLATE_BINDING_CALL: &str = "setComponentTemplate";

/// How a specifier is referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from "x"`
    Static,
    /// `export ... from "x"`
    ReExport,
    /// `import("x")`
    Dynamic,
}

/// One module specifier occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    /// Byte range of the specifier text, quotes excluded
    pub range: Range<usize>,
    pub kind: ImportKind,
}

/// Shape of a module's default export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultExport {
    None,
    /// `export default <expression>;`
    Expression {
        statement: Range<usize>,
        value: Range<usize>,
    },
    /// `export default class Foo {}` / `export default function foo() {}`
    Declaration {
        statement: Range<usize>,
        declaration: Range<usize>,
        name: Option<String>,
    },
    /// `export { Foo as default }` or `export { default } from "./x"`
    Clause {
        statement: Range<usize>,
        /// Local (or imported) name being exported as default
        local: String,
        source: Option<String>,
        /// The remaining specifiers of the clause, verbatim
        others: Vec<String>,
    },
}

impl DefaultExport {
    pub fn exists(&self) -> bool {
        !matches!(self, DefaultExport::None)
    }
}

/// Result of scanning one module
#[derive(Debug, Clone)]
pub struct ModuleScan {
    pub imports: SmallVec<[ImportRef; 8]>,
    pub default_export: DefaultExport,
    /// The module calls `setComponentTemplate` itself
    pub wraps_template: bool,
    /// Every identifier appearing in the module
    pub bindings: HashSet<String>,
}

impl ModuleScan {
    pub fn binds(&self, name: &str) -> bool {
        self.bindings.contains(name)
    }
}

/// Grammar used for a module path
pub fn language_for(path: &Path) -> SupportLang {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts" | "mts" | "cts") => SupportLang::TypeScript,
        Some("tsx") => SupportLang::Tsx,
        _ => SupportLang::JavaScript,
    }
}

/// Is this path a JS/TS module the scanner understands?
pub fn is_module_path(path: &str) -> bool {
    [".js", ".ts", ".mjs", ".mts", ".cjs", ".cts", ".tsx", ".jsx"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// Scan a module source
pub fn scan_module(path: &Path, content: &str) -> ModuleScan {
    let start = Instant::now();
    let sg = AstGrep::new(content, language_for(path));
    let root = sg.root();

    let mut imports: SmallVec<[ImportRef; 8]> = SmallVec::new();
    let mut default_export = DefaultExport::None;
    let mut bindings = HashSet::new();
    let mut has_errors = false;

    for node in root.dfs() {
        let kind = node.kind();
        match kind.as_ref() {
            "import_statement" => {
                if let Some(import) = node.field("source").and_then(|s| string_ref(&s)) {
                    imports.push(ImportRef {
                        kind: ImportKind::Static,
                        ..import
                    });
                }
            }
            "export_statement" => {
                if let Some(import) = node.field("source").and_then(|s| string_ref(&s)) {
                    imports.push(ImportRef {
                        kind: ImportKind::ReExport,
                        ..import
                    });
                }
                if !default_export.exists() {
                    default_export = default_export_of(&node);
                }
            }
            "call_expression" => {
                if let Some(import) = dynamic_import(&node) {
                    imports.push(import);
                }
            }
            "ERROR" => has_errors = true,
            k if k.ends_with("identifier") => {
                bindings.insert(node.text().to_string());
            }
            _ => {}
        }
    }

    let wrapper_pattern = format!("{}($$$ARGS)", TEMPLATE_BINDING_CALL);
    let wraps_template = root.find_all(wrapper_pattern.as_str()).next().is_some();

    if has_errors {
        debug!("{:?} parsed with recoverable syntax errors", path);
    }
    debug!(
        "Scanned {:?}: {} specifiers, default export: {}, in {:.2}ms",
        path.file_name().unwrap_or_default(),
        imports.len(),
        default_export.exists(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    ModuleScan {
        imports,
        default_export,
        wraps_template,
        bindings,
    }
}

/// Specifier of a plain string literal node
fn string_ref(node: &JsNode<'_>) -> Option<ImportRef> {
    let text = node.text();
    let range = node.range();
    match node.kind().as_ref() {
        "string" => {}
        // `import(\`./x\`)` without substitutions
        "template_string" if !node.children().any(|c| c.kind() == "template_substitution") => {}
        _ => return None,
    }
    if text.len() < 2 {
        return None;
    }
    Some(ImportRef {
        specifier: text[1..text.len() - 1].to_string(),
        range: range.start + 1..range.end - 1,
        kind: ImportKind::Static,
    })
}

fn dynamic_import(node: &JsNode<'_>) -> Option<ImportRef> {
    let callee = node.field("function")?;
    if callee.kind() != "import" {
        return None;
    }
    let arguments = node.field("arguments")?;
    let first = arguments.children().find(|c| c.is_named())?;
    string_ref(&first).map(|import| ImportRef {
        kind: ImportKind::Dynamic,
        ..import
    })
}

fn default_export_of(statement: &JsNode<'_>) -> DefaultExport {
    let range = statement.range();
    let is_default = statement.children().any(|c| c.kind() == "default")
        || statement
            .text()
            .trim_start_matches("export")
            .trim_start()
            .strip_prefix("default")
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'));

    if is_default {
        if let Some(declaration) = statement.field("declaration") {
            let name = declaration.field("name").map(|n| n.text().to_string());
            return DefaultExport::Declaration {
                statement: range,
                declaration: declaration.range(),
                name,
            };
        }
        if let Some(value) = statement.field("value") {
            return DefaultExport::Expression {
                statement: range,
                value: value.range(),
            };
        }
        return DefaultExport::None;
    }

    let Some(clause) = statement.children().find(|c| c.kind() == "export_clause") else {
        return DefaultExport::None;
    };

    let mut local = None;
    let mut others = Vec::new();
    for specifier in clause.children().filter(|c| c.kind() == "export_specifier") {
        let text = specifier.text();
        let mut parts = text.split_whitespace();
        let name = parts.next().unwrap_or_default().to_string();
        let exported = match (parts.next(), parts.next()) {
            (Some("as"), Some(alias)) => alias.to_string(),
            _ => name.clone(),
        };
        if exported == "default" && local.is_none() {
            local = Some(name);
        } else {
            others.push(specifier.text().to_string());
        }
    }

    match local {
        Some(local) => DefaultExport::Clause {
            statement: range,
            local,
            source: statement
                .field("source")
                .and_then(|s| string_ref(&s))
                .map(|s| s.specifier),
            others,
        },
        None => DefaultExport::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scan(source: &str) -> ModuleScan {
        scan_module(&PathBuf::from("component.js"), source)
    }

    #[test]
    fn test_collects_all_specifier_forms() {
        let source = r#"import Component from "@glimmer/component";
import { helper } from './helper';
export { format } from "../utils/format";
const lazy = () => import("./lazy-thing");
export default class extends Component {}
"#;
        let result = scan(source);
        let specifiers: Vec<(&str, ImportKind)> = result
            .imports
            .iter()
            .map(|i| (i.specifier.as_str(), i.kind))
            .collect();
        assert_eq!(
            specifiers,
            vec![
                ("@glimmer/component", ImportKind::Static),
                ("./helper", ImportKind::Static),
                ("../utils/format", ImportKind::ReExport),
                ("./lazy-thing", ImportKind::Dynamic),
            ]
        );
        for import in &result.imports {
            assert_eq!(&source[import.range.clone()], import.specifier);
        }
    }

    #[test]
    fn test_default_export_expression() {
        let source = "import Component from '@glimmer/component';\nexport default class extends Component {}\n";
        let result = scan(source);
        let DefaultExport::Expression { value, .. } = &result.default_export else {
            panic!("expected expression, got {:?}", result.default_export);
        };
        assert_eq!(&source[value.clone()], "class extends Component {}");
        assert!(!result.wraps_template);
    }

    #[test]
    fn test_default_export_named_declaration() {
        let source = "export default class Widget extends Component {}\nexport const size = 2;\n";
        let result = scan(source);
        assert!(matches!(
            &result.default_export,
            DefaultExport::Declaration { name: Some(name), .. } if name == "Widget"
        ));
    }

    #[test]
    fn test_default_export_clause() {
        let result = scan("const Foo = 1;\nconst bar = 2;\nexport { Foo as default, bar };\n");
        assert!(matches!(
            &result.default_export,
            DefaultExport::Clause { local, source: None, others, .. }
                if local == "Foo" && others == &vec!["bar".to_string()]
        ));

        let result = scan("export { default } from './base';\n");
        assert!(matches!(
            &result.default_export,
            DefaultExport::Clause { local, source: Some(source), .. }
                if local == "default" && source == "./base"
        ));
    }

    #[test]
    fn test_detects_existing_template_binding() {
        let source = r#"import { setComponentTemplate } from "@ember/component";
import TEMPLATE from "./widget.hbs";
export default setComponentTemplate(TEMPLATE, class {});
"#;
        let result = scan(source);
        assert!(result.wraps_template);
        assert!(result.binds("TEMPLATE"));
    }

    #[test]
    fn test_no_default_export() {
        let result = scan("export const a = 1;\n");
        assert_eq!(result.default_export, DefaultExport::None);
    }

    #[test]
    fn test_typescript_module() {
        let source = "import type { Args } from './types';\nexport default class Widget<T> {}\n";
        let result = scan_module(&PathBuf::from("widget.ts"), source);
        assert_eq!(result.imports.len(), 1);
        assert!(result.default_export.exists());
    }
}
