//! Legacy directory layout -> package module namespace

use crate::build_tree::{BuildTree, TreeBuilder};
use crate::errors::{PipelineError, Warning};
use crate::stage::{Stage, StageContext};
use stagepack_manifest::PackageRole;
use std::collections::BTreeMap;
use tracing::debug;

/// (source prefix, output prefix) pairs for addons
const ADDON_LAYOUT: &[(&str, &str)] = &[
    ("addon/", ""),
    ("addon-test-support/", "test-support/"),
    ("app/", "_app_/"),
    ("public/", "public/"),
];

const APP_LAYOUT: &[(&str, &str)] = &[("app/", ""), ("public/", "public/")];

pub struct LayoutStage;

impl LayoutStage {
    /// Output path of a source path, or `None` when the file is dropped
    pub fn map_path(role: PackageRole, path: &str) -> Option<String> {
        if path == "package.json" {
            return Some(path.to_string());
        }
        let layout = match role {
            PackageRole::App => APP_LAYOUT,
            PackageRole::Addon => ADDON_LAYOUT,
            PackageRole::Library => return None,
        };
        layout.iter().find_map(|(from, to)| {
            path.strip_prefix(from)
                .filter(|rest| !rest.is_empty())
                .map(|rest| format!("{}{}", to, rest))
        })
    }
}

fn is_pod_file(path: &str) -> bool {
    matches!(
        path.rsplit('/').next(),
        Some("component.js" | "component.ts" | "template.hbs")
    )
}

impl Stage for LayoutStage {
    fn name(&self) -> &'static str {
        super::LAYOUT
    }

    fn run(&self, input: &BuildTree, cx: &StageContext<'_>) -> Result<BuildTree, PipelineError> {
        let package = cx.package;
        let mut sources: BTreeMap<String, &str> = BTreeMap::new();
        let mut builder = TreeBuilder::new();
        let mut dropped = 0usize;

        for (path, content) in input.files() {
            let Some(mapped) = Self::map_path(package.role, path) else {
                dropped += 1;
                continue;
            };
            if let Some(previous) = sources.insert(mapped.clone(), path) {
                return Err(PipelineError::SynthesisCollision {
                    path: mapped,
                    sources: vec![previous.to_string(), path.to_string()],
                });
            }

            let in_colocation_dir = cx
                .options()
                .colocation_dirs
                .iter()
                .any(|dir| mapped.starts_with(&format!("{}/", dir)));
            if in_colocation_dir && is_pod_file(&mapped) {
                cx.warn(Warning::PodLayout {
                    package: package.name.to_string(),
                    path: mapped.clone(),
                });
            }

            builder.insert(mapped, content.clone());
        }

        debug!(
            "{}: laid out {} files, dropped {}",
            package.name,
            sources.len(),
            dropped
        );
        Ok(builder.build())
    }
}
