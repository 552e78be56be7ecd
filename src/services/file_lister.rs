//! Repository file enumeration.
//!
//! Primary path asks the version-control index for tracked files; when that
//! fails (no git, no repo) a filtered directory walk takes over.

use ignore::WalkBuilder;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::models::error::ConsensusError;

/// Directory names pruned during the fallback walk.
const PRUNE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "dist",
    "build",
    "target",
    "__pycache__",
    ".pytest_cache",
];

/// Extensions excluded during the fallback walk (binary and lock noise).
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "pdf", "zip", "tar", "gz", "rar", "exe", "dll",
    "so", "dylib", "pyc", "pyo", "class", "o", "lock", "sum",
];

/// Enumerate repository files relative to `root`, git index first.
pub async fn list_tracked_files(root: &Path) -> Result<Vec<String>, ConsensusError> {
    match git_ls_files(root).await {
        Ok(files) if !files.is_empty() => {
            debug!("git index listed {} files", files.len());
            return Ok(files);
        }
        Ok(_) => debug!("git index empty, falling back to directory walk"),
        Err(e) => debug!("git enumeration failed ({e}), falling back to directory walk"),
    }

    let files = walk_files(root);
    if files.is_empty() {
        // An empty repository is legal; only a root that cannot be walked
        // at all is an enumeration failure.
        if !root.is_dir() {
            return Err(ConsensusError::SourceEnumeration {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
    }
    Ok(files)
}

async fn git_ls_files(root: &Path) -> Result<Vec<String>, ConsensusError> {
    let output = Command::new("git")
        .arg("ls-files")
        .arg("-z")
        .current_dir(root)
        .output()
        .await
        .map_err(ConsensusError::Io)?;

    if !output.status.success() {
        return Err(ConsensusError::SourceEnumeration {
            path: root.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .split('\0')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect())
}

fn walk_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_some_and(|t| t.is_dir())
                && PRUNE_DIRS.iter().any(|d| *d == name))
        })
        .build();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if has_excluded_extension(entry.path()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            let joined = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !joined.is_empty() {
                files.push(joined);
            }
        }
    }
    files.sort();
    files
}

fn has_excluded_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| EXCLUDED_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
#[path = "file_lister_tests.rs"]
mod tests;
