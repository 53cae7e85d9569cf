//! Source synthesis for component/template companion pairs
//!
//! A template-only component gets a generated module; an authored component
//! module gets its default export wrapped so that the template is attached at
//! definition time. Every other statement of an authored module is kept
//! verbatim.

use crate::errors::ScanError;
use crate::module_scanner::{DefaultExport, ModuleScan, TEMPLATE_BINDING_CALL};
use crate::naming::unique_binding;
use std::path::Path;

/// Modules the synthesized code imports its helpers from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingModules {
    /// Module exporting `setComponentTemplate`
    pub template_binding: String,
    /// Module whose default export is `templateOnlyComponent`
    pub template_only: String,
}

impl Default for BindingModules {
    fn default() -> Self {
        BindingModules {
            template_binding: "@ember/component".to_string(),
            template_only: "@ember/component/template-only".to_string(),
        }
    }
}

/// Module body for a template without a component module
pub fn template_only_source(template_specifier: &str, modules: &BindingModules) -> String {
    format!(
        "import {{ {call} }} from \"{binding}\";\n\
         import templateOnlyComponent from \"{only}\";\n\
         import TEMPLATE from \"{template}\";\n\
         export default {call}(TEMPLATE, templateOnlyComponent());\n",
        call = TEMPLATE_BINDING_CALL,
        binding = modules.template_binding,
        only = modules.template_only,
        template = template_specifier,
    )
}

/// Attach `template_specifier` to the default export of an authored module.
///
/// Returns `None` when the module already attaches a template itself.
pub fn wrap_authored_module(
    file: &Path,
    source: &str,
    scan: &ModuleScan,
    template_specifier: &str,
    modules: &BindingModules,
) -> Result<Option<String>, ScanError> {
    if scan.wraps_template {
        return Ok(None);
    }

    let template = unique_binding("TEMPLATE", |n| scan.binds(n));
    let binding = if scan.binds(TEMPLATE_BINDING_CALL) {
        unique_binding(TEMPLATE_BINDING_CALL, |n| scan.binds(n))
    } else {
        TEMPLATE_BINDING_CALL.to_string()
    };
    let wrap = |inner: &str| format!("export default {}({}, {});", binding, template, inner);

    let (statement, replacement) = match &scan.default_export {
        DefaultExport::None => {
            return Err(ScanError::MissingDefaultExport {
                file: file.to_path_buf(),
            })
        }
        DefaultExport::Expression { statement, value } => {
            (statement.clone(), wrap(&source[value.clone()]))
        }
        DefaultExport::Declaration {
            statement,
            declaration,
            name: Some(name),
        } => (
            statement.clone(),
            format!("{}\n{}", &source[declaration.clone()], wrap(name)),
        ),
        DefaultExport::Declaration {
            statement,
            declaration,
            name: None,
        } => (statement.clone(), wrap(&source[declaration.clone()])),
        DefaultExport::Clause {
            statement,
            local,
            source: reexport_from,
            others,
        } => {
            let mut text = String::new();
            let inner = match reexport_from {
                Some(from) => {
                    let imported = unique_binding("COMPONENT", |n| scan.binds(n));
                    if local == "default" {
                        text.push_str(&format!("import {} from \"{}\";\n", imported, from));
                    } else {
                        text.push_str(&format!(
                            "import {{ {} as {} }} from \"{}\";\n",
                            local, imported, from
                        ));
                    }
                    if !others.is_empty() {
                        text.push_str(&format!(
                            "export {{ {} }} from \"{}\";\n",
                            others.join(", "),
                            from
                        ));
                    }
                    imported
                }
                None => {
                    if !others.is_empty() {
                        text.push_str(&format!("export {{ {} }};\n", others.join(", ")));
                    }
                    local.clone()
                }
            };
            text.push_str(&wrap(&inner));
            (statement.clone(), text)
        }
    };

    let mut output = String::with_capacity(source.len() + 160);
    output.push_str(&format!("import {} from \"{}\";\n", template, template_specifier));
    if binding == TEMPLATE_BINDING_CALL {
        output.push_str(&format!(
            "import {{ {} }} from \"{}\";\n",
            TEMPLATE_BINDING_CALL, modules.template_binding
        ));
    } else {
        output.push_str(&format!(
            "import {{ {} as {} }} from \"{}\";\n",
            TEMPLATE_BINDING_CALL, binding, modules.template_binding
        ));
    }
    output.push_str(&source[..statement.start]);
    output.push_str(&replacement);
    output.push_str(&source[statement.end..]);
    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_scanner::scan_module;
    use std::path::PathBuf;

    fn wrap(source: &str) -> anyhow::Result<Option<String>> {
        let file = PathBuf::from("components/widget.js");
        let scan = scan_module(&file, source);
        Ok(wrap_authored_module(
            &file,
            source,
            &scan,
            "./widget.hbs",
            &BindingModules::default(),
        )?)
    }

    #[test]
    fn test_template_only_source() {
        let source = template_only_source("./widget.hbs", &BindingModules::default());
        assert!(source.contains("import TEMPLATE from \"./widget.hbs\";"));
        assert!(source.contains("import { setComponentTemplate } from \"@ember/component\";"));
        assert!(source.contains(
            "import templateOnlyComponent from \"@ember/component/template-only\";"
        ));
        assert!(source.contains("export default setComponentTemplate(TEMPLATE, templateOnlyComponent());"));
    }

    #[test]
    fn test_wraps_class_expression_and_keeps_other_exports() -> anyhow::Result<()> {
        let source = "import Component from '@glimmer/component';\nexport const SIZE = 3;\nexport default class extends Component {}\nexport function helper() {}\n";
        let output = wrap(source)?.unwrap_or_default();
        assert!(output.starts_with("import TEMPLATE from \"./widget.hbs\";\n"));
        assert!(output.contains("import { setComponentTemplate } from \"@ember/component\";"));
        assert!(output.contains(
            "export default setComponentTemplate(TEMPLATE, class extends Component {});"
        ));
        assert!(output.contains("export const SIZE = 3;"));
        assert!(output.contains("export function helper() {}"));
        Ok(())
    }

    #[test]
    fn test_wraps_named_declaration() -> anyhow::Result<()> {
        let source = "export default class Widget extends Component {\n  size = 2;\n}\n";
        let output = wrap(source)?.unwrap_or_default();
        assert!(output.contains("class Widget extends Component {\n  size = 2;\n}\nexport default setComponentTemplate(TEMPLATE, Widget);"));
        Ok(())
    }

    #[test]
    fn test_wraps_export_clause() -> anyhow::Result<()> {
        let output = wrap("class Widget {}\nconst a = 1;\nexport { Widget as default, a };\n")?
            .unwrap_or_default();
        assert!(output.contains("export { a };\nexport default setComponentTemplate(TEMPLATE, Widget);"));

        let output = wrap("export { default } from './base';\n")?.unwrap_or_default();
        assert!(output.contains("import COMPONENT from \"./base\";"));
        assert!(output.contains("export default setComponentTemplate(TEMPLATE, COMPONENT);"));
        Ok(())
    }

    #[test]
    fn test_existing_wrapper_is_left_alone() -> anyhow::Result<()> {
        let source = "import { setComponentTemplate } from '@ember/component';\nimport t from './widget.hbs';\nexport default setComponentTemplate(t, class {});\n";
        assert_eq!(wrap(source)?, None);
        Ok(())
    }

    #[test]
    fn test_template_binding_name_collision() -> anyhow::Result<()> {
        let source = "const TEMPLATE = 'x';\nexport default class extends Component {}\n";
        let output = wrap(source)?.unwrap_or_default();
        assert!(output.starts_with("import TEMPLATE0 from \"./widget.hbs\";"));
        assert!(output.contains("setComponentTemplate(TEMPLATE0, class extends Component {})"));
        Ok(())
    }

    #[test]
    fn test_missing_default_export() {
        let result = wrap("export const a = 1;\n");
        assert!(result.is_err());
    }
}
