use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::models::error::ConsensusError;

/// Default worker focus rotation. Worker `i` uses `focuses[i % len]`.
pub const DEFAULT_FOCUSES: [&str; 5] = [
    "entry/init",
    "config/build",
    "core/domain",
    "api/handlers",
    "tests/docs",
];

/// Recognized options for the Quick tier consensus engine.
///
/// Loaded from `<project>/.loco/config.json` when present; every field has
/// a default so a missing file means a default run. Unknown keys are
/// ignored. `LOCO_DEBUG=true` forces `debug` on irrespective of config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickConfig {
    /// Count of worker invocations.
    pub workers: usize,
    /// Upper bound on simultaneously in-flight workers.
    pub worker_concurrency: usize,
    /// Max retries per worker.
    pub worker_retry: u32,
    /// Abort if any worker ultimately fails.
    pub strict_fail: bool,
    /// Cap on paths shown to any single worker.
    pub max_paths_per_call: usize,
    /// Per-worker output cap.
    pub top_file_ranking_count: usize,
    /// Cap on adjudicated output.
    pub final_top_k: usize,
    /// Per-worker focus rotation.
    pub focuses: Vec<String>,
    /// Use the model adjudicator vs the local sort fallback.
    pub use_model_adjudicator: bool,
    /// Max retries on adjudicator failure.
    pub adjudicator_retry: u32,
    /// Provider n_ctx override for workers; 0 means provider default.
    pub worker_context_size: i64,
    /// Worker max_tokens; -1 means unlimited.
    pub max_completion_tokens_worker: i64,
    /// Adjudicator max_tokens; -1 means unlimited.
    pub max_completion_tokens_adjudicator: i64,
    /// Per-call timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Toggle NL (free-text synthesis) vs ranking mode.
    pub natural_language_workers: bool,
    /// NL-mode word cap per worker.
    pub worker_summary_word_limit: usize,
    /// Emit the debug artifact bundle.
    pub debug: bool,
    /// Ignore a fresh cache and re-run the pipeline.
    pub refresh: bool,
    /// Base URL of the OpenAI-compatible provider.
    pub base_url: String,
    /// Model name forwarded to the provider, when it wants one.
    pub model: Option<String>,
}

impl Default for QuickConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            worker_concurrency: 2,
            worker_retry: 1,
            strict_fail: true,
            max_paths_per_call: 400,
            top_file_ranking_count: 20,
            final_top_k: 100,
            focuses: DEFAULT_FOCUSES.iter().map(|s| s.to_string()).collect(),
            use_model_adjudicator: true,
            adjudicator_retry: 1,
            worker_context_size: 0,
            max_completion_tokens_worker: -1,
            max_completion_tokens_adjudicator: -1,
            request_timeout_ms: 120_000,
            natural_language_workers: false,
            worker_summary_word_limit: 200,
            debug: false,
            refresh: false,
            base_url: "http://localhost:1234".to_string(),
            model: None,
        }
    }
}

impl QuickConfig {
    /// Load configuration for a project, falling back to defaults when no
    /// config file exists. Malformed JSON is a hard error - silently
    /// ignoring a typo'd config would change run semantics invisibly.
    pub fn load(project_root: &Path) -> Result<Self, ConsensusError> {
        let path = project_root.join(".loco").join("config.json");
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<QuickConfig>(&raw).map_err(|e| ConsensusError::Config {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            debug!("No config at {}, using defaults", path.display());
            QuickConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Fold environment overrides in. `LOCO_DEBUG=true` wins over config.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("LOCO_DEBUG") {
            if v.eq_ignore_ascii_case("true") || v == "1" {
                self.debug = true;
            }
        }
    }

    /// Focus for worker `i`, rotating through the configured list.
    pub fn focus_for(&self, index: usize) -> &str {
        if self.focuses.is_empty() {
            DEFAULT_FOCUSES[index % DEFAULT_FOCUSES.len()]
        } else {
            &self.focuses[index % self.focuses.len()]
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
