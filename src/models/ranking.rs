use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Hard cap on the length of a ranking justification.
pub const MAX_REASON_CHARS: usize = 120;

/// Role a file plays in the repository, as judged from its path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Entry,
    Config,
    Core,
    Util,
    Test,
    Doc,
    Other,
}

impl FileCategory {
    /// Normalize a free-form model label into the category enum.
    /// Anything unrecognized collapses to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "entry" => FileCategory::Entry,
            "config" => FileCategory::Config,
            "core" => FileCategory::Core,
            "util" => FileCategory::Util,
            "test" => FileCategory::Test,
            "doc" => FileCategory::Doc,
            _ => FileCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Entry => "entry",
            FileCategory::Config => "config",
            FileCategory::Core => "core",
            FileCategory::Util => "util",
            FileCategory::Test => "test",
            FileCategory::Doc => "doc",
            FileCategory::Other => "other",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file's assessment by the crowd.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRanking {
    pub path: String,
    pub importance: f64,
    pub reason: String,
    pub category: FileCategory,
    #[serde(default = "default_vote_count")]
    pub vote_count: u32,
}

fn default_vote_count() -> u32 {
    1
}

impl FileRanking {
    /// Enforce the field invariants in place: importance clamped into
    /// [1, 10], reason trimmed to `MAX_REASON_CHARS`, vote count at least 1.
    pub fn normalize(&mut self) {
        if !self.importance.is_finite() {
            self.importance = 1.0;
        }
        self.importance = self.importance.clamp(1.0, 10.0);
        self.reason = truncate_chars(self.reason.trim(), MAX_REASON_CHARS);
        if self.vote_count == 0 {
            self.vote_count = 1;
        }
    }
}

/// Char-boundary-safe truncation.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// The ranker's output: an ordered ranking (ranking mode) or a templated
/// markdown summary (NL mode), plus structure statistics either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    #[serde(default)]
    pub rankings: Vec<FileRanking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub top_directories: BTreeMap<String, usize>,
    #[serde(default)]
    pub file_types: BTreeMap<String, usize>,
    pub total_files: usize,
    pub consensus_time: Duration,
    #[serde(default)]
    pub confidence: f64,
}

impl ConsensusResult {
    pub fn empty() -> Self {
        Self {
            rankings: Vec::new(),
            summary_markdown: None,
            project_purpose: None,
            structure_overview: None,
            notes: None,
            top_directories: BTreeMap::new(),
            file_types: BTreeMap::new(),
            total_files: 0,
            consensus_time: Duration::ZERO,
            confidence: 0.0,
        }
    }

    /// Render the result for terminal display: the summary verbatim in NL
    /// mode, a ranking table otherwise.
    pub fn to_markdown(&self) -> String {
        if let Some(ref summary) = self.summary_markdown {
            return summary.clone();
        }

        let mut out = String::from("# File Importance Ranking\n\n");
        out.push_str(&format!(
            "{} files analyzed, confidence {:.2}\n\n",
            self.total_files, self.confidence
        ));
        out.push_str("| # | File | Imp | Votes | Category | Reason |\n");
        out.push_str("|---|------|-----|-------|----------|--------|\n");
        for (i, r) in self.rankings.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {:.1} | {} | {} | {} |\n",
                i + 1,
                r.path,
                r.importance,
                r.vote_count,
                r.category,
                r.reason.replace('|', "\\|"),
            ));
        }
        out
    }
}

/// Internal per-worker result. In ranking mode `rankings` is populated; in
/// NL mode `summary` carries the worker's free-text paragraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub index: usize,
    pub focus: String,
    #[serde(default)]
    pub rankings: Vec<FileRanking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerOutput {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// A pipeline milestone, delivered to the single-consumer progress sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: Tier,
    pub total: usize,
    pub completed: usize,
    pub current: String,
}

/// Single-consumer progress callback. The library never prints; the caller
/// adapts events to whatever surface it owns.
pub type ProgressSink = Arc<dyn Fn(Progress) + Send + Sync>;

/// Analysis depth. Only `Quick` has an engine today; the remaining tiers
/// participate in the cache layout and freshness policy so they can be
/// filled in without re-cutting the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Quick,
    Detailed,
    Deep,
    Full,
}

impl Tier {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Tier::Quick => "quick",
            Tier::Detailed => "detailed",
            Tier::Deep => "deep",
            Tier::Full => "full",
        }
    }

    /// Maximum cache age when the working-tree digest is unavailable.
    pub fn max_age(&self) -> Duration {
        match self {
            Tier::Quick => Duration::from_secs(60 * 60),
            Tier::Detailed => Duration::from_secs(24 * 60 * 60),
            Tier::Deep => Duration::from_secs(7 * 24 * 60 * 60),
            Tier::Full => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A completed analysis with its provenance, the unit higher layers consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub tier: Tier,
    pub generated: DateTime<Utc>,
    pub project_path: PathBuf,
    pub duration: Duration,
    pub result: ConsensusResult,
}

impl Analysis {
    /// Compact text block for downstream prompt builders.
    pub fn format_for_prompt(&self) -> String {
        let mut out = format!(
            "[{} analysis of {} - {} files]\n",
            self.tier,
            self.project_path.display(),
            self.result.total_files
        );
        if let Some(ref purpose) = self.result.project_purpose {
            out.push_str(&format!("Purpose: {purpose}\n"));
        }
        if let Some(ref summary) = self.result.summary_markdown {
            out.push_str(summary);
            out.push('\n');
        } else {
            for r in self.result.rankings.iter().take(20) {
                out.push_str(&format!(
                    "- {} ({}, imp {:.1}): {}\n",
                    r.path, r.category, r.importance, r.reason
                ));
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "ranking_tests.rs"]
mod tests;
