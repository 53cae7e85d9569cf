//! Template compiler adapter
//!
//! The template language itself is opaque to the pipeline. A compiler only has
//! to be pure: identical `(source, plugins)` must give byte-identical output,
//! which the incremental cache relies on.

use crate::errors::PipelineError;

pub trait TemplateCompiler: Send + Sync {
    /// Stable identifier, part of every cached output fingerprint
    fn id(&self) -> &str;

    fn compile(&self, source: &str, plugins: &[String]) -> Result<String, String>;
}

/// Emits a module deferring compilation to the runtime's `precompileTemplate`
#[derive(Debug, Clone, Default)]
pub struct PrecompileTemplateCompiler;

impl TemplateCompiler for PrecompileTemplateCompiler {
    fn id(&self) -> &str {
        "precompile-template/1"
    }

    fn compile(&self, source: &str, plugins: &[String]) -> Result<String, String> {
        let escaped = serde_json::to_string(source).map_err(|e| e.to_string())?;
        let plugin_list = serde_json::to_string(plugins).map_err(|e| e.to_string())?;
        Ok(format!(
            "import {{ precompileTemplate }} from \"@ember/template-compilation\";\n\
             export default precompileTemplate({}, {{ plugins: {} }});\n",
            escaped, plugin_list
        ))
    }
}

/// Compile one template file, naming it in the error
pub fn compile_file(
    compiler: &dyn TemplateCompiler,
    file: &str,
    source: &str,
    plugins: &[String],
) -> Result<String, PipelineError> {
    compiler
        .compile(source, plugins)
        .map_err(|reason| PipelineError::TemplateCompile {
            file: file.to_string(),
            reason,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precompile_is_deterministic() -> anyhow::Result<()> {
        let compiler = PrecompileTemplateCompiler;
        let plugins = vec!["strip-test-selectors".to_string()];
        let source = "<div class=\"a\">{{@title}}</div>\n";
        let first = compiler.compile(source, &plugins).map_err(anyhow::Error::msg)?;
        let second = compiler.compile(source, &plugins).map_err(anyhow::Error::msg)?;
        assert_eq!(first, second);
        assert!(first.contains(r#"precompileTemplate("<div class=\"a\">{{@title}}</div>\n""#));
        assert!(first.contains(r#"plugins: ["strip-test-selectors"]"#));
        Ok(())
    }

    struct Failing;

    impl TemplateCompiler for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        fn compile(&self, _source: &str, _plugins: &[String]) -> Result<String, String> {
            Err("unclosed element".to_string())
        }
    }

    #[test]
    fn test_compile_file_names_the_file() {
        let result = compile_file(&Failing, "components/widget.hbs", "<div>", &[]);
        assert!(result.is_err_and(|e| e.to_string().contains("components/widget.hbs")));
    }
}
