//! Second-pass adjudication: collapse the crowd into a final ranking, or
//! synthesize the strictly-templated project summary in NL mode.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::models::error::ConsensusError;
use crate::models::ranking::{FileCategory, FileRanking};
use crate::services::debug_writer::DebugWriter;
use crate::services::lm_client::{ChatCompletion, ChatMessage, CompletionOptions};

const RANKING_SYSTEM_PROMPT: &str =
    "Adjudicate crowd answers into a single JSON. Output only valid JSON.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You synthesize project summaries. Output only the requested template.";

/// The adjudicator's structured verdict in ranking mode.
#[derive(Debug, Clone, Default)]
pub struct Adjudicated {
    pub rankings: Vec<FileRanking>,
    pub confidence: f64,
    pub project_purpose: Option<String>,
    pub structure_overview: Option<String>,
    pub notes: Option<String>,
}

/// Build the ranking-mode adjudication prompt over the crowd lines.
pub fn build_ranking_prompt(
    crowd_lines: &str,
    structure_summary: &str,
    final_top_k: usize,
) -> Vec<ChatMessage> {
    let user = format!(
        "Below are crowd answers from independent analyzers ranking the most \
         important files of a repository (by path signals only). Choose a final \
         top-{final_top_k} consensus. Prefer files the crowd agrees on; where \
         answers split, pick the most plausible given the structure hints.\n\n\
         Emit exactly one JSON object:\n\
         {{\"rankings\":[{{\"path\":...,\"importance\":1-10,\"reason\":...,\
         \"category\":\"entry|config|core|util|test|doc|other\"}}...],\
         \"confidence\":0.0-1.0}}\n\n\
         Structure hints:\n{structure_summary}\n\
         Crowd answers:\n{crowd_lines}"
    );
    vec![
        ChatMessage::system(RANKING_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

/// Build the NL-mode synthesis prompt: the strict markdown template.
pub fn build_summary_prompt(
    worker_summaries: &[String],
    structure_summary: &str,
) -> Vec<ChatMessage> {
    let joined = worker_summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Analyst {}:\n{}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n");
    let user = format!(
        "Synthesize the analyst summaries below into one project summary. \
         Output ONLY this template, with no extra sections and no code fences:\n\n\
         # Project Summary\n\
         **Purpose**: <short string>\n\
         **Structure overview**:\n\
         <short paragraph grounded in path/name signals>\n\
         **Important files**:\n\
         - path \u{2014} role: reason\n\
         - path \u{2014} role: reason\n\
         **Notes**:\n\
         - <short caveats>\n\n\
         Constraints: do not enumerate the analyst summaries; use only paths \
         that appear in the analyst text or the structure hints; at most 10 \
         important files; role is one of entry|config|core|util|test|doc|other; \
         each reason at most 120 characters and anchored to the path.\n\n\
         Structure hints:\n{structure_summary}\n\n\
         {joined}"
    );
    vec![
        ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

#[derive(Deserialize)]
struct RawEntry {
    path: String,
    #[serde(default)]
    importance: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    category: String,
}

impl RawEntry {
    fn into_ranking(self) -> FileRanking {
        let mut r = FileRanking {
            path: self.path,
            importance: self.importance,
            reason: self.reason,
            category: FileCategory::from_label(&self.category),
            vote_count: 1,
        };
        r.normalize();
        r
    }
}

#[derive(Deserialize)]
struct RawAdjudicated {
    #[serde(default)]
    rankings: Vec<RawEntry>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    project_purpose: Option<String>,
    #[serde(default)]
    structure_overview: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Robust parse of the adjudicator reply: strip code fences, then try the
/// outermost JSON object; failing that, accept a bare array as `rankings`.
/// A bare array of objects must not be mistaken for the object form, so
/// whichever delimiter opens first is tried first.
pub fn parse_adjudicated(raw: &str) -> Result<Adjudicated, ConsensusError> {
    let cleaned = strip_code_fences(raw);

    let object_start = cleaned.find('{').unwrap_or(usize::MAX);
    let array_start = cleaned.find('[').unwrap_or(usize::MAX);
    if array_start < object_start {
        if let Some(adjudicated) = try_array_form(cleaned) {
            return Ok(adjudicated);
        }
        if let Some(adjudicated) = try_object_form(cleaned) {
            return Ok(adjudicated);
        }
    } else {
        if let Some(adjudicated) = try_object_form(cleaned) {
            return Ok(adjudicated);
        }
        if let Some(adjudicated) = try_array_form(cleaned) {
            return Ok(adjudicated);
        }
    }

    Err(ConsensusError::Parse(
        "adjudicator output is neither a JSON object nor array".to_string(),
    ))
}

fn try_object_form(cleaned: &str) -> Option<Adjudicated> {
    let object = extract_balanced(cleaned, '{', '}')?;
    let parsed = serde_json::from_str::<RawAdjudicated>(object).ok()?;
    Some(Adjudicated {
        rankings: dedupe(parsed.rankings.into_iter().map(RawEntry::into_ranking)),
        confidence: parsed.confidence.clamp(0.0, 1.0),
        project_purpose: parsed.project_purpose,
        structure_overview: parsed.structure_overview,
        notes: parsed.notes,
    })
}

fn try_array_form(cleaned: &str) -> Option<Adjudicated> {
    let array = extract_balanced(cleaned, '[', ']')?;
    let parsed = serde_json::from_str::<Vec<RawEntry>>(array).ok()?;
    Some(Adjudicated {
        rankings: dedupe(parsed.into_iter().map(RawEntry::into_ranking)),
        confidence: 0.0,
        ..Adjudicated::default()
    })
}

fn dedupe(rankings: impl Iterator<Item = FileRanking>) -> Vec<FileRanking> {
    let mut seen = std::collections::HashSet::new();
    rankings
        .filter(|r| !r.path.trim().is_empty() && seen.insert(r.path.clone()))
        .collect()
}

/// Drop ``` fence lines, keeping their payload.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. ```json) through the first newline.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// String-aware balanced extraction of the outermost `open...close` span.
fn extract_balanced(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&raw[start..start + offset + ch.len_utf8()]);
            }
        }
    }
    None
}

/// Mode-specific adjudication outcome.
#[derive(Debug)]
pub enum AdjudicatorVerdict {
    Ranking(Adjudicated),
    Summary(String),
}

/// Call the adjudicator with retries. Ranking replies must parse; NL
/// replies must be non-empty and are returned verbatim.
#[allow(clippy::too_many_arguments)]
pub async fn run_adjudicator(
    client: &dyn ChatCompletion,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    retries: u32,
    nl_mode: bool,
    cancel: &CancellationToken,
    debug_writer: &DebugWriter,
) -> Result<AdjudicatorVerdict, ConsensusError> {
    let rendered = messages
        .iter()
        .map(|m| format!("[{}]\n{}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    debug_writer.write("adjudicator_input.txt", &rendered);

    let attempts = 1 + retries;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(ConsensusError::Cancelled),
            result = client.complete(messages, options) => result,
        };

        match reply {
            Ok(raw) => {
                debug_writer.write("adjudicator_raw.txt", &raw);
                if nl_mode {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        last_error = "empty adjudicator summary".to_string();
                    } else {
                        return Ok(AdjudicatorVerdict::Summary(trimmed.to_string()));
                    }
                } else {
                    match parse_adjudicated(&raw) {
                        Ok(adjudicated) => {
                            debug_writer
                                .write_json("adjudicated_ranking.json", &adjudicated.rankings);
                            return Ok(AdjudicatorVerdict::Ranking(adjudicated));
                        }
                        Err(e) => last_error = e.to_string(),
                    }
                }
            }
            Err(e) => last_error = e.to_string(),
        }
        warn!("adjudicator attempt {attempt} failed: {last_error}");
    }

    Err(ConsensusError::AdjudicatorFailure {
        attempts,
        last_error,
    })
}

#[cfg(test)]
#[path = "adjudicator_tests.rs"]
mod tests;
