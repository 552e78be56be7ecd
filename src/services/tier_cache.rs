//! Tier-keyed on-disk cache of analysis results.
//!
//! Results live at `<project>/.loco/knowledge/<tier>/analysis.json`. A
//! cached result is fresh while the repository's working-tree digest still
//! matches and the tier's max age has not elapsed; with no usable digest,
//! max age alone decides. Write failures are logged and swallowed - the
//! pipeline's result stands regardless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::models::ranking::{ConsensusResult, Tier};
use crate::services::git_digest::NO_VCS_DIGEST;

/// Serialized cache envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub digest: String,
    pub generated_at: DateTime<Utc>,
    pub result: ConsensusResult,
}

pub struct TierCache {
    project_root: PathBuf,
}

impl TierCache {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Conventional path for a tier's cached analysis.
    pub fn path_for(&self, tier: Tier) -> PathBuf {
        self.project_root
            .join(".loco")
            .join("knowledge")
            .join(tier.dir_name())
            .join("analysis.json")
    }

    /// Load the cached result if it is still fresh for `current_digest`.
    pub fn load_fresh(&self, tier: Tier, current_digest: &str) -> Option<ConsensusResult> {
        let cached = self.load_any(tier)?;

        let age = Utc::now().signed_duration_since(cached.generated_at);
        let max_age = chrono::Duration::from_std(tier.max_age()).ok()?;
        if age > max_age {
            debug!("{tier} cache expired (age {age})");
            return None;
        }

        let digest_usable = current_digest != NO_VCS_DIGEST && cached.digest != NO_VCS_DIGEST;
        if digest_usable && cached.digest != current_digest {
            debug!("{tier} cache stale (working tree changed)");
            return None;
        }

        debug!("{tier} cache hit");
        Some(cached.result)
    }

    /// Load whatever is cached for a tier, fresh or not. Corrupt files are
    /// treated as absent.
    pub fn load_any(&self, tier: Tier) -> Option<CachedAnalysis> {
        let path = self.path_for(tier);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("Ignoring corrupt cache at {}: {e}", path.display());
                None
            }
        }
    }

    /// Persist a result. Never fails: cache trouble is logged, not raised.
    pub fn store(&self, tier: Tier, digest: &str, result: &ConsensusResult) {
        let path = self.path_for(tier);
        let envelope = CachedAnalysis {
            digest: digest.to_string(),
            generated_at: Utc::now(),
            result: result.clone(),
        };

        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&envelope)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            std::fs::write(&path, json)
        };
        if let Err(e) = write() {
            warn!("Failed to write {tier} cache at {}: {e}", path.display());
        }
    }

    /// Freshness verdict for status reporting, without deserializing twice.
    pub fn describe(&self, tier: Tier, current_digest: &str) -> Option<(DateTime<Utc>, bool)> {
        let cached = self.load_any(tier)?;
        let fresh = self.load_fresh(tier, current_digest).is_some();
        Some((cached.generated_at, fresh))
    }
}

#[cfg(test)]
#[path = "tier_cache_tests.rs"]
mod tests;
