//! Ranking workers: prompt construction, LM invocation with a single
//! retry, and tolerant extraction of the JSON output contract.

use serde::Deserialize;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::error::ConsensusError;
use crate::models::ranking::{FileCategory, FileRanking, WorkerOutput};
use crate::services::debug_writer::DebugWriter;
use crate::services::lm_client::{ChatCompletion, ChatMessage, CompletionOptions};

const RANKING_SYSTEM_PROMPT: &str =
    "You are a file importance analyzer. Return valid JSON only.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a repository analyst. Respond with plain prose only, no code fences.";

/// Everything one worker needs for one run.
pub struct WorkerTask<'a> {
    pub index: usize,
    pub focus: &'a str,
    pub structure_summary: &'a str,
    pub paths: &'a [String],
    pub take_top: usize,
    pub nl_mode: bool,
    pub word_limit: usize,
    pub retries: u32,
    pub options: CompletionOptions,
}

/// Build the ranking-mode worker prompt: scoring scale, output contract,
/// structure hints, and the path list.
pub fn build_ranking_prompt(task: &WorkerTask<'_>) -> Vec<ChatMessage> {
    let user = format!(
        "Given this list of file paths, predict which files look most important \
         and rank them. Focus: {focus}. Use ONLY path/name signals; never guess \
         at file contents, length, or size.\n\n\
         Scoring scale:\n\
         - 10: application entrypoint\n\
         - 8-9: core domain logic\n\
         - 6-7: configuration or integration glue\n\
         - 4-5: utility/support code\n\
         - 2-3: tests and documentation\n\n\
         Output: a JSON array of at most {take_top} objects, each with fields \
         \"path\", \"importance\" (number 1-10), \"reason\" (short, grounded in \
         the path), \"category\" (one of entry|config|core|util|test|doc|other). \
         No prose before or after the array.\n\n\
         Repository structure:\n{hints}\n\
         Files:\n{files}",
        focus = task.focus,
        take_top = task.take_top,
        hints = task.structure_summary,
        files = task.paths.join("\n"),
    );
    vec![
        ChatMessage::system(RANKING_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

/// Build the NL-mode worker prompt: a bounded free-text synthesis.
pub fn build_summary_prompt(task: &WorkerTask<'_>) -> Vec<ChatMessage> {
    let user = format!(
        "Summarize what this project appears to be and how it is organized, \
         judging ONLY from file paths and names. Focus: {focus}. Write at most \
         {limit} words of plain prose. No code fences, no lists of every file.\n\n\
         Repository structure:\n{hints}\n\
         Files:\n{files}",
        focus = task.focus,
        limit = task.word_limit,
        hints = task.structure_summary,
        files = task.paths.join("\n"),
    );
    vec![
        ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

/// Locate the outermost JSON array in a reply that may carry surrounding
/// prose or ``` fences. Bracket balancing is string-aware.
pub fn extract_json_array(raw: &str) -> Result<&str, ConsensusError> {
    let start = raw
        .find('[')
        .ok_or_else(|| ConsensusError::Parse("no JSON array in worker output".to_string()))?;

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
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    Err(ConsensusError::Parse(
        "unbalanced JSON array in worker output".to_string(),
    ))
}

#[derive(Deserialize)]
struct RawRanking {
    path: String,
    #[serde(default)]
    importance: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    category: String,
}

/// Parse a worker reply into normalized rankings: clamp importance, trim
/// reasons, collapse unknown categories, dedupe by path, cap at `take_top`.
pub fn parse_worker_rankings(raw: &str, take_top: usize) -> Result<Vec<FileRanking>, ConsensusError> {
    let array = extract_json_array(raw)?;
    let parsed: Vec<RawRanking> =
        serde_json::from_str(array).map_err(|e| ConsensusError::Parse(e.to_string()))?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut rankings = Vec::new();
    for entry in parsed {
        if entry.path.trim().is_empty() || !seen.insert(entry.path.clone()) {
            continue;
        }
        let mut ranking = FileRanking {
            path: entry.path,
            importance: entry.importance,
            reason: entry.reason,
            category: FileCategory::from_label(&entry.category),
            vote_count: 1,
        };
        ranking.normalize();
        rankings.push(ranking);
        if rankings.len() >= take_top {
            break;
        }
    }
    Ok(rankings)
}

/// Run one worker to completion: build the prompt, call the LM under the
/// cancellation token, parse, and retry once on failure. Entries whose path
/// is not in the tracked set are dropped after a successful parse.
pub async fn run_worker(
    client: &dyn ChatCompletion,
    task: &WorkerTask<'_>,
    tracked: &HashSet<String>,
    cancel: &CancellationToken,
    debug_writer: &DebugWriter,
) -> Result<WorkerOutput, ConsensusError> {
    let messages = if task.nl_mode {
        build_summary_prompt(task)
    } else {
        build_ranking_prompt(task)
    };
    let rendered_prompt = render_messages(&messages);

    let attempts = 1 + task.retries;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }
        debug_writer.write(
            &format!("worker_{}_attempt_{}_prompt.txt", task.index, attempt),
            &rendered_prompt,
        );

        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(ConsensusError::Cancelled),
            result = client.complete(&messages, &task.options) => result,
        };

        match reply {
            Ok(raw) => {
                debug_writer.write(
                    &format!("worker_{}_attempt_{}_raw.txt", task.index, attempt),
                    &raw,
                );
                match finish_attempt(task, &raw, tracked) {
                    Ok(output) => {
                        if !task.nl_mode {
                            debug_writer.write_json(
                                &format!("worker_{}_rankings.json", task.index),
                                &output.rankings,
                            );
                        }
                        return Ok(output);
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        debug_writer.write(
                            &format!("worker_{}_attempt_{}_error.txt", task.index, attempt),
                            &last_error,
                        );
                        warn!("worker {} attempt {attempt} parse failure: {last_error}", task.index);
                    }
                }
            }
            Err(e) => {
                last_error = e.to_string();
                debug_writer.write(
                    &format!("worker_{}_attempt_{}_error.txt", task.index, attempt),
                    &last_error,
                );
                warn!("worker {} attempt {attempt} failed: {last_error}", task.index);
            }
        }
    }

    debug!("worker {} exhausted {attempts} attempts", task.index);
    Ok(WorkerOutput {
        index: task.index,
        focus: task.focus.to_string(),
        rankings: Vec::new(),
        summary: None,
        error: Some(last_error),
    })
}

/// Interpret a raw LM reply per the worker's mode. An empty NL summary and
/// an unparseable ranking both count as attempt failures.
fn finish_attempt(
    task: &WorkerTask<'_>,
    raw: &str,
    tracked: &HashSet<String>,
) -> Result<WorkerOutput, ConsensusError> {
    if task.nl_mode {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConsensusError::Parse("empty NL summary".to_string()));
        }
        return Ok(WorkerOutput {
            index: task.index,
            focus: task.focus.to_string(),
            rankings: Vec::new(),
            summary: Some(trimmed.to_string()),
            error: None,
        });
    }

    let mut rankings = parse_worker_rankings(raw, task.take_top)?;
    rankings.retain(|r| tracked.contains(&r.path));
    Ok(WorkerOutput {
        index: task.index,
        focus: task.focus.to_string(),
        rankings,
        summary: None,
        error: None,
    })
}

fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}]\n{}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
