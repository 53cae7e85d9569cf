//! Resolve stage
//!
//! Every import, re-export and dynamic import in a JS/TS module is resolved and
//! rewritten to its extension-explicit form. Every name a template references is
//! resolved under the package's `StaticMode`. Per-file work runs in parallel
//! and is cached by content fingerprint.

use crate::build_tree::BuildTree;
use crate::cache::{fingerprint, ContextDigest, Fingerprint};
use crate::errors::PipelineError;
use crate::resolver::{ModuleRequest, Resolution};
use crate::stage::{ResolutionReport, Stage, StageContext};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stagepack_ast::{is_module_path, scan_module, scan_template};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct ResolveStage;

/// Cached outcome of resolving one file
#[derive(Debug, Default, Serialize, Deserialize)]
struct ResolvedFile {
    /// New content; `None` when the file is unchanged
    source: Option<String>,
    rewrites: usize,
    runtime_lookups: Vec<String>,
    virtual_modules: Vec<String>,
    renames_used: Vec<(String, String)>,
}

impl ResolveStage {
    fn context_digest(input: &BuildTree, cx: &StageContext<'_>) -> Result<Fingerprint, PipelineError> {
        let mut digest = ContextDigest::new();
        digest
            .add(cx.build.options_digest())
            .add(cx.package.name.as_bytes())
            .add(cx.mode.as_str())
            .add(cx.build.resolver.dependency_fingerprint(cx.package)?);
        for path in input.paths() {
            digest.add(path);
        }
        Ok(digest.finish())
    }

    fn resolve_module(
        input: &BuildTree,
        cx: &StageContext<'_>,
        path: &str,
        content: &str,
    ) -> Result<ResolvedFile, PipelineError> {
        let scan = scan_module(Path::new(path), content);
        let mut resolved = ResolvedFile::default();
        let mut edits = Vec::new();

        for import in &scan.imports {
            let request = ModuleRequest {
                specifier: &import.specifier,
                from_file: path,
                from_package: cx.package,
            };
            let resolution = cx.build.resolver.resolve(&request, input)?;
            if let Some(entry) = cx.build.resolver.renamed_entry(cx.package, &import.specifier)? {
                resolved.renames_used.push(entry);
            }
            match &resolution {
                Resolution::Unresolved(reason) => {
                    return Err(PipelineError::UnresolvedSpecifier {
                        file: format!("{}/{}", cx.package.name, path),
                        specifier: import.specifier.clone(),
                        reason: reason.clone(),
                    })
                }
                Resolution::Synthesized { target, .. } | Resolution::Rewritten { target, .. } => {
                    resolved.virtual_modules.push(target.virtual_id());
                }
                Resolution::Found(_) | Resolution::External(_) => {}
            }
            if let Some(rewritten) = resolution.output_specifier(cx.package, path, &import.specifier) {
                if rewritten != import.specifier {
                    edits.push((import.range.clone(), rewritten));
                }
            }
        }

        if !edits.is_empty() {
            resolved.rewrites = edits.len();
            let mut source = content.to_string();
            edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
            for (range, replacement) in edits {
                source.replace_range(range, &replacement);
            }
            resolved.source = Some(source);
        }
        Ok(resolved)
    }

    fn resolve_template(
        input: &BuildTree,
        cx: &StageContext<'_>,
        path: &str,
        content: &str,
    ) -> Result<ResolvedFile, PipelineError> {
        let mut resolved = ResolvedFile::default();
        for name in scan_template(content)? {
            match cx
                .build
                .resolver
                .resolve_template_name(cx.package, input, &name, cx.mode)?
            {
                Resolution::Unresolved(reason) => {
                    return Err(PipelineError::UnresolvedSpecifier {
                        file: format!("{}/{}", cx.package.name, path),
                        specifier: name.name,
                        reason,
                    })
                }
                Resolution::External(runtime_name) => resolved.runtime_lookups.push(runtime_name),
                _ => {}
            }
        }
        Ok(resolved)
    }

    fn resolve_file(
        input: &BuildTree,
        cx: &StageContext<'_>,
        context: &Fingerprint,
        path: &str,
        content: &Arc<[u8]>,
    ) -> Result<Option<ResolvedFile>, PipelineError> {
        let is_template = path.ends_with(".hbs");
        if !is_template && (!is_module_path(path) || path.ends_with(".d.ts")) {
            return Ok(None);
        }
        let Ok(text) = std::str::from_utf8(content) else {
            return Ok(None);
        };

        let key = fingerprint(super::RESOLVE, path, content, context);
        let record_name = format!("{}/{}", cx.package.name, path);
        let cached = cx.build.cache.get_or_compute(key, || {
            let resolved = if is_template {
                Self::resolve_template(input, cx, path, text)?
            } else {
                Self::resolve_module(input, cx, path, text)?
            };
            encode_record(&record_name, &resolved)
        })?;

        decode_record(&record_name, &cached).map(Some)
    }
}

fn encode_record(file: &str, resolved: &ResolvedFile) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec(resolved).map_err(|source| PipelineError::ResolveRecord {
        file: file.to_string(),
        source,
    })
}

fn decode_record(file: &str, bytes: &[u8]) -> Result<ResolvedFile, PipelineError> {
    serde_json::from_slice(bytes).map_err(|source| PipelineError::ResolveRecord {
        file: file.to_string(),
        source,
    })
}

impl Stage for ResolveStage {
    fn name(&self) -> &'static str {
        super::RESOLVE
    }

    fn run(&self, input: &BuildTree, cx: &StageContext<'_>) -> Result<BuildTree, PipelineError> {
        let start = Instant::now();
        let context = Self::context_digest(input, cx)?;
        let files: Vec<(&str, &Arc<[u8]>)> = input.files().collect();

        let results: Vec<Result<Option<ResolvedFile>, PipelineError>> = files
            .par_iter()
            .map(|(path, content)| Self::resolve_file(input, cx, &context, path, content))
            .collect();

        let mut builder = input.builder();
        let mut report = ResolutionReport::default();
        for ((path, _), result) in files.iter().zip(results) {
            let Some(resolved) = result? else {
                continue;
            };
            report.rewrites += resolved.rewrites;
            report.runtime_lookups.extend(resolved.runtime_lookups);
            report.virtual_modules.extend(resolved.virtual_modules);
            report.renames_used.extend(resolved.renames_used);
            if let Some(source) = resolved.source {
                builder.insert(*path, source.into_bytes());
            }
        }

        info!(
            "{}: resolved {} files ({} rewrites) in {:.2}ms",
            cx.package.name,
            files.len(),
            report.rewrites,
            start.elapsed().as_secs_f64() * 1000.0
        );
        if !report.runtime_lookups.is_empty() {
            debug!(
                "{}: left to runtime lookup: {:?}",
                cx.package.name, report.runtime_lookups
            );
        }
        *cx.report.lock() = report;
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_record_survives_the_cache() -> anyhow::Result<()> {
        let resolved = ResolvedFile {
            source: Some("import a from \"./a.js\";".to_string()),
            rewrites: 1,
            runtime_lookups: vec!["Missing".to_string()],
            renames_used: vec![("my-addon".to_string(), "my-addon/old".to_string())],
            ..ResolvedFile::default()
        };
        let bytes = encode_record("my-app/app.js", &resolved)?;
        let decoded = decode_record("my-app/app.js", &bytes)?;
        assert_eq!(decoded.source, resolved.source);
        assert_eq!(decoded.rewrites, 1);
        assert_eq!(decoded.runtime_lookups, vec!["Missing".to_string()]);
        assert_eq!(decoded.renames_used, resolved.renames_used);
        Ok(())
    }

    #[test]
    fn test_corrupt_record_is_an_error() -> anyhow::Result<()> {
        let records: [&[u8]; 3] = [b"", b"not json", b"{\"rewrites\": \"many\"}"];
        for bytes in records {
            let err = decode_record("my-app/app.js", bytes);
            assert!(matches!(
                err,
                Err(PipelineError::ResolveRecord { ref file, .. }) if file == "my-app/app.js"
            ));
        }
        Ok(())
    }
}
