//! Working-tree digest used as the cache key.
//!
//! The digest combines the porcelain status output and the current HEAD
//! revision, hashed with SHA-256. A project without usable version control
//! gets a placeholder digest, which downgrades cache freshness to the
//! max-age-only policy.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Placeholder for repositories where no digest can be computed.
pub const NO_VCS_DIGEST: &str = "no-vcs";

/// Compute the SHA-256 working-tree digest, or the placeholder when the
/// project is not under version control.
pub async fn working_tree_digest(root: &Path) -> String {
    let status = match git_output(root, &["status", "--porcelain"]).await {
        Some(s) => s,
        None => {
            debug!("git status unavailable in {}", root.display());
            return NO_VCS_DIGEST.to_string();
        }
    };
    let head = match git_output(root, &["rev-parse", "HEAD"]).await {
        Some(h) => h,
        // A repo with no commits yet still has a meaningful status.
        None => String::from("(no-head)"),
    };

    let mut hasher = Sha256::new();
    hasher.update(status.as_bytes());
    hasher.update(b"\n");
    hasher.update(head.trim().as_bytes());
    hex::encode(hasher.finalize())
}

async fn git_output(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}
