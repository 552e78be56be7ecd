//! Vote-weighted merge of per-worker rankings.
//!
//! Order-independent by construction: the crowd map is a pure fold over
//! whatever subset of workers succeeded, in whatever order they finished.

use std::collections::HashMap;

use crate::models::ranking::{truncate_chars, FileCategory, FileRanking, WorkerOutput};

/// Cap on crowd lines handed to the adjudicator.
const MAX_CROWD_LINES: usize = 150;

/// Cap on a single crowd line rendering.
const MAX_LINE_CHARS: usize = 200;

/// Fold per-worker partial rankings into a voted crowd map.
///
/// For each non-empty worker list (sorted descending by importance) the top
/// `per_worker_top` entries are merged by path: importance becomes a running
/// mean over votes, the reason is kept from the highest-importance voter,
/// and `other` categories upgrade to any concrete one.
pub fn merge_worker_rankings(outputs: &[WorkerOutput], per_worker_top: usize) -> Vec<FileRanking> {
    let mut crowd: HashMap<String, FileRanking> = HashMap::new();

    for output in outputs {
        if output.rankings.is_empty() {
            continue;
        }
        let mut list = output.rankings.clone();
        list.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for incoming in list.into_iter().take(per_worker_top) {
            match crowd.get_mut(&incoming.path) {
                None => {
                    let mut entry = incoming;
                    entry.vote_count = 1;
                    crowd.insert(entry.path.clone(), entry);
                }
                Some(entry) => {
                    let replace_reason =
                        incoming.importance > entry.importance && !incoming.reason.trim().is_empty();
                    let votes = entry.vote_count as f64;
                    entry.importance = (entry.importance * votes + incoming.importance) / (votes + 1.0);
                    entry.vote_count += 1;
                    if replace_reason {
                        entry.reason = incoming.reason;
                    }
                    if entry.category == FileCategory::Other
                        && incoming.category != FileCategory::Other
                    {
                        entry.category = incoming.category;
                    }
                }
            }
        }
    }

    let mut merged: Vec<FileRanking> = crowd.into_values().collect();
    sort_crowd(&mut merged);
    merged
}

/// Stable crowd ordering: votes desc, importance desc, path asc.
pub fn sort_crowd(rankings: &mut [FileRanking]) {
    rankings.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then_with(|| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Compact text rendering of the crowd map for the adjudicator prompt.
pub fn render_crowd_lines(merged: &[FileRanking]) -> String {
    merged
        .iter()
        .take(MAX_CROWD_LINES)
        .map(|r| {
            truncate_chars(
                &format!(
                    "{} \u{2022} votes:{} \u{2022} imp:{:.2} \u{2022} reason:{}",
                    r.path, r.vote_count, r.importance, r.reason
                ),
                MAX_LINE_CHARS,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "merger_tests.rs"]
mod tests;
