//! Source analysis for the stagepack pipeline
//!
//! This crate provides the static analysis the resolver and the packager rely on:
//! 1. Parsing JS/TS modules with ast-grep to find every module specifier and the
//!    shape of the default export (`module_scanner`)
//! 2. Finding component/helper name references in templates (`template_scanner`)
//! 3. Generating or rewriting the module of a component/template pair
//!    (`colocation`)
//!
//! Nothing here touches the file system; callers pass file contents in.
pub mod colocation;
pub mod errors;
pub mod module_scanner;
pub mod naming;
pub mod template_scanner;

use stagepack_logger as logger;
use std::path::Path;

pub use colocation::{template_only_source, wrap_authored_module, BindingModules};
pub use errors::ScanError;
pub use module_scanner::{
    is_module_path, scan_module, DefaultExport, ImportKind, ImportRef, ModuleScan,
};
pub use template_scanner::{scan_template, NameKind, NameRef};

/// Companion module source for a component/template pair
pub struct CompanionSource;

impl CompanionSource {
    /// Produce the module that attaches `template_specifier` to a component.
    ///
    /// With `authored` set, the authored module is rewritten (or returned as
    /// `None` when it already attaches a template); otherwise a template-only
    /// module is generated.
    pub fn generate(
        file: &Path,
        authored: Option<&str>,
        template_specifier: &str,
        modules: &BindingModules,
    ) -> Result<Option<String>, ScanError> {
        match authored {
            Some(source) => {
                let scan = scan_module(file, source);
                let wrapped =
                    wrap_authored_module(file, source, &scan, template_specifier, modules)?;
                if wrapped.is_some() {
                    logger::debug(&format!(
                        "Attached {} to authored module {:?}",
                        template_specifier, file
                    ));
                }
                Ok(wrapped)
            }
            None => {
                logger::debug(&format!(
                    "Synthesized template-only module {:?} for {}",
                    file, template_specifier
                ));
                Ok(Some(template_only_source(template_specifier, modules)))
            }
        }
    }
}
