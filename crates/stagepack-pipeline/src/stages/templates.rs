//! Template compile stage

use crate::build_tree::BuildTree;
use crate::cache::{fingerprint, ContextDigest};
use crate::errors::PipelineError;
use crate::stage::{Stage, StageContext};
use crate::template_compiler::compile_file;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Replaces each `.hbs` file's content with its compiled module, in place
pub struct TemplateStage;

impl Stage for TemplateStage {
    fn name(&self) -> &'static str {
        super::COMPILE_TEMPLATES
    }

    fn run(&self, input: &BuildTree, cx: &StageContext<'_>) -> Result<BuildTree, PipelineError> {
        if !cx.options().compile_templates {
            return Ok(input.clone());
        }

        let context = ContextDigest::new()
            .add(cx.build.options_digest())
            .add(cx.build.compiler.id())
            .finish();
        let templates: Vec<(&str, &Arc<[u8]>)> = input
            .files()
            .filter(|(path, _)| path.ends_with(".hbs"))
            .collect();

        let compiled: Vec<Result<Arc<[u8]>, PipelineError>> = templates
            .par_iter()
            .map(|(path, content)| {
                let key = fingerprint(super::COMPILE_TEMPLATES, path, content, &context);
                cx.build.cache.get_or_compute(key, || {
                    let source = String::from_utf8_lossy(content);
                    compile_file(
                        cx.build.compiler.as_ref(),
                        path,
                        &source,
                        &cx.options().template_plugins,
                    )
                    .map(String::into_bytes)
                })
            })
            .collect();

        let mut builder = input.builder();
        for ((path, _), output) in templates.iter().zip(compiled) {
            builder.insert(*path, output?);
        }
        debug!("{}: compiled {} templates", cx.package.name, templates.len());
        Ok(builder.build())
    }
}
