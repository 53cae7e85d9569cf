use crate::errors::CommandError;
use crate::logger;
use stagepack_manifest::read_from_path;
use std::path::{Path, PathBuf};

/// Print the validated v2 metadata block of a package as JSON
pub fn handle_meta(path: Option<PathBuf>) -> Result<(), CommandError> {
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    let manifest = manifest_path(&root);
    logger::debug(&format!("Reading metadata from {}", manifest.display()));

    let meta = read_from_path(&manifest)?;
    let text = serde_json::to_string_pretty(&meta)
        .map_err(|e| CommandError::InvalidArgs(format!("cannot render metadata: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Accept either a package directory or a `package.json` path
fn manifest_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join("package.json")
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_path_accepts_dir_or_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(manifest_path(dir.path()), dir.path().join("package.json"));
        let file = dir.path().join("package.json");
        assert_eq!(manifest_path(&file), file);
        Ok(())
    }
}
