//! Consensus controller: orchestrates enumeration, the worker fan-out,
//! the vote-weighted merge, adjudication, and cache persistence.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::config::QuickConfig;
use crate::models::error::ConsensusError;
use crate::models::ranking::{ConsensusResult, Progress, ProgressSink, Tier, WorkerOutput};
use crate::services::adjudicator::{self, Adjudicated, AdjudicatorVerdict};
use crate::services::debug_writer::DebugWriter;
use crate::services::file_lister;
use crate::services::git_digest;
use crate::services::lm_client::{ChatCompletion, CompletionOptions};
use crate::services::merger;
use crate::services::structure;
use crate::services::tier_cache::TierCache;
use crate::services::worker_pool::{self, WorkerTask};

const WORKER_TEMPERATURE: f32 = 0.2;
const ADJUDICATOR_TEMPERATURE: f32 = 0.0;

/// Quick-tier ensemble analyzer. Instantiable freely; the LM client is
/// injected so tier selection (and testing) happens in the caller.
pub struct ConsensusController {
    client: Arc<dyn ChatCompletion>,
    config: QuickConfig,
}

impl ConsensusController {
    pub fn new(client: Arc<dyn ChatCompletion>, config: QuickConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &QuickConfig {
        &self.config
    }

    /// Run the full pipeline for a project. Results are cached at the
    /// conventional tier path; a fresh cached result short-circuits the run
    /// with zero LM calls.
    pub async fn analyze(
        &self,
        project_path: &Path,
        cancel: &CancellationToken,
        progress: Option<ProgressSink>,
    ) -> Result<ConsensusResult, ConsensusError> {
        let start = Instant::now();
        let cfg = &self.config;

        let digest = git_digest::working_tree_digest(project_path).await;
        let cache = TierCache::new(project_path);
        if !cfg.refresh {
            if let Some(cached) = cache.load_fresh(Tier::Quick, &digest) {
                info!("Quick analysis served from cache");
                emit(&progress, 1, 1, "cached");
                return Ok(cached);
            }
        }

        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }

        // Enumerate and prefilter.
        let tracked = file_lister::list_tracked_files(project_path).await?;
        let total_files = tracked.len();
        let filtered = structure::prefilter(&tracked);
        emit(&progress, filtered.len(), 0, "prefiltered files");
        debug!("{} tracked files, {} after prefilter", total_files, filtered.len());

        let debug_writer = Arc::new(DebugWriter::new(project_path, cfg.debug));

        if filtered.is_empty() {
            let result = finalize(
                ConsensusResult::empty(),
                &structure::profile(&filtered),
                total_files,
                start.elapsed(),
            );
            cache.store(Tier::Quick, &digest, &result);
            emit(&progress, 0, 0, "complete");
            return Ok(result);
        }

        // Structure hints feed every prompt.
        let profile = structure::profile(&filtered);
        debug_writer.write("structure_hints.txt", &profile.summary);

        // Fan out the workers under the concurrency cap.
        let outputs = self
            .run_workers(&filtered, &tracked, &profile.summary, cancel, &progress, &debug_writer)
            .await?;

        let failures: Vec<(usize, String)> = outputs
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (o.index, e.clone())))
            .collect();
        if cfg.strict_fail {
            if let Some((index, last_error)) = failures.into_iter().next() {
                return Err(ConsensusError::WorkerFailure {
                    index,
                    attempts: 1 + cfg.worker_retry,
                    last_error,
                });
            }
        } else if !outputs.iter().any(|o| !o.failed()) {
            // Non-strict runs still need at least one usable answer.
            let (index, last_error) = outputs
                .iter()
                .filter_map(|o| o.error.as_ref().map(|e| (o.index, e.clone())))
                .next()
                .unwrap_or((0, "no workers ran".to_string()));
            return Err(ConsensusError::WorkerFailure {
                index,
                attempts: 1 + cfg.worker_retry,
                last_error,
            });
        }

        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }

        // Adjudicate the crowd into the final answer.
        let tracked_set: HashSet<String> = tracked.iter().cloned().collect();
        let result = if cfg.natural_language_workers {
            let summaries: Vec<String> = outputs.iter().filter_map(|o| o.summary.clone()).collect();
            let verdict = self
                .adjudicate_summary(&summaries, &profile.summary, cancel, &debug_writer)
                .await?;
            let mut result = ConsensusResult::empty();
            result.summary_markdown = Some(verdict);
            result
        } else {
            let successful: Vec<WorkerOutput> =
                outputs.into_iter().filter(|o| !o.failed()).collect();
            let merged = merger::merge_worker_rankings(&successful, cfg.top_file_ranking_count);
            let adjudicated = if merged.is_empty() {
                debug!("empty crowd map, skipping adjudication");
                Adjudicated::default()
            } else if cfg.use_model_adjudicator {
                let crowd_lines = merger::render_crowd_lines(&merged);
                self.adjudicate_ranking(&crowd_lines, &profile.summary, cancel, &debug_writer)
                    .await?
            } else {
                Adjudicated {
                    rankings: merged,
                    confidence: 0.0,
                    ..Adjudicated::default()
                }
            };

            // Post-filter hallucinated paths, then cap.
            let mut rankings = adjudicated.rankings;
            rankings.retain(|r| tracked_set.contains(&r.path));
            rankings.truncate(cfg.final_top_k);
            for r in &mut rankings {
                r.normalize();
            }

            let mut result = ConsensusResult::empty();
            result.rankings = rankings;
            result.confidence = adjudicated.confidence;
            result.project_purpose = adjudicated.project_purpose;
            result.structure_overview = adjudicated.structure_overview;
            result.notes = adjudicated.notes;
            result
        };

        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }

        let result = finalize(result, &profile, total_files, start.elapsed());
        cache.store(Tier::Quick, &digest, &result);
        let workers = cfg.workers.max(1);
        emit(&progress, workers, workers, "complete");
        info!("Quick consensus finished in {:?}", result.consensus_time);
        Ok(result)
    }

    async fn run_workers(
        &self,
        filtered: &[String],
        tracked: &[String],
        structure_summary: &str,
        cancel: &CancellationToken,
        progress: &Option<ProgressSink>,
        debug_writer: &Arc<DebugWriter>,
    ) -> Result<Vec<WorkerOutput>, ConsensusError> {
        let cfg = &self.config;
        let workers = cfg.workers.max(1);
        let slices = partition_paths(filtered, workers, cfg.max_paths_per_call);

        let semaphore = Arc::new(Semaphore::new(cfg.worker_concurrency.max(1)));
        let done = Arc::new(parking_lot::Mutex::new(0usize));
        let tracked_set: Arc<HashSet<String>> = Arc::new(tracked.iter().cloned().collect());
        let summary: Arc<str> = Arc::from(structure_summary);
        let options = CompletionOptions {
            temperature: WORKER_TEMPERATURE,
            max_tokens: cfg.max_completion_tokens_worker,
            context_size: cfg.worker_context_size,
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        };

        let mut set: JoinSet<Result<WorkerOutput, ConsensusError>> = JoinSet::new();
        for (index, paths) in slices.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let focus = cfg.focus_for(index).to_string();
            let summary = Arc::clone(&summary);
            let tracked_set = Arc::clone(&tracked_set);
            let semaphore = Arc::clone(&semaphore);
            let done = Arc::clone(&done);
            let debug_writer = Arc::clone(debug_writer);
            let cancel = cancel.clone();
            let progress = progress.clone();
            let take_top = cfg.top_file_ranking_count;
            let nl_mode = cfg.natural_language_workers;
            let word_limit = cfg.worker_summary_word_limit;
            let retries = cfg.worker_retry;

            set.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(ConsensusError::Cancelled),
                    permit = semaphore.acquire_owned() =>
                        permit.map_err(|_| ConsensusError::Cancelled)?,
                };
                let task = WorkerTask {
                    index,
                    focus: &focus,
                    structure_summary: &summary,
                    paths: &paths,
                    take_top,
                    nl_mode,
                    word_limit,
                    retries,
                    options,
                };
                let output =
                    worker_pool::run_worker(client.as_ref(), &task, &tracked_set, &cancel, &debug_writer)
                        .await?;

                let completed = {
                    let mut counter = done.lock();
                    *counter += 1;
                    *counter
                };
                emit(&progress, workers, completed, &format!("worker {index} ({focus})"));
                Ok(output)
            });
        }

        let mut outputs = Vec::with_capacity(workers);
        let mut cancelled = false;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) if e.is_cancellation() => cancelled = true,
                Ok(Err(e)) => warn!("worker task error: {e}"),
                Err(e) => warn!("worker task panicked: {e}"),
            }
        }
        if cancelled || cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }
        outputs.sort_by_key(|o| o.index);
        Ok(outputs)
    }

    async fn adjudicate_ranking(
        &self,
        crowd_lines: &str,
        structure_summary: &str,
        cancel: &CancellationToken,
        debug_writer: &DebugWriter,
    ) -> Result<Adjudicated, ConsensusError> {
        let cfg = &self.config;
        let messages =
            adjudicator::build_ranking_prompt(crowd_lines, structure_summary, cfg.final_top_k);
        let verdict = adjudicator::run_adjudicator(
            self.client.as_ref(),
            &messages,
            &self.adjudicator_options(),
            cfg.adjudicator_retry,
            false,
            cancel,
            debug_writer,
        )
        .await?;
        match verdict {
            AdjudicatorVerdict::Ranking(adjudicated) => Ok(adjudicated),
            AdjudicatorVerdict::Summary(_) => unreachable!("ranking adjudicator returned summary"),
        }
    }

    async fn adjudicate_summary(
        &self,
        summaries: &[String],
        structure_summary: &str,
        cancel: &CancellationToken,
        debug_writer: &DebugWriter,
    ) -> Result<String, ConsensusError> {
        let cfg = &self.config;
        let messages = adjudicator::build_summary_prompt(summaries, structure_summary);
        let verdict = adjudicator::run_adjudicator(
            self.client.as_ref(),
            &messages,
            &self.adjudicator_options(),
            cfg.adjudicator_retry,
            true,
            cancel,
            debug_writer,
        )
        .await?;
        match verdict {
            AdjudicatorVerdict::Summary(summary) => Ok(summary),
            AdjudicatorVerdict::Ranking(_) => unreachable!("NL adjudicator returned ranking"),
        }
    }

    /// Adjudicator requests run at temperature 0 with twice the worker's
    /// context window.
    fn adjudicator_options(&self) -> CompletionOptions {
        let cfg = &self.config;
        CompletionOptions {
            temperature: ADJUDICATOR_TEMPERATURE,
            max_tokens: cfg.max_completion_tokens_adjudicator,
            context_size: cfg.worker_context_size.saturating_mul(2),
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        }
    }
}

fn emit(sink: &Option<ProgressSink>, total: usize, completed: usize, current: &str) {
    if let Some(sink) = sink {
        sink(Progress {
            phase: Tier::Quick,
            total,
            completed,
            current: current.to_string(),
        });
    }
}

/// Assign each worker its path slice. Small repositories give every worker
/// the identical capped list so the same file can accrue independent votes;
/// larger ones are split into contiguous slices under the per-call cap.
fn partition_paths(paths: &[String], workers: usize, max_per_call: usize) -> Vec<Vec<String>> {
    if paths.len() <= max_per_call {
        let shared: Vec<String> = paths.to_vec();
        return (0..workers).map(|_| shared.clone()).collect();
    }

    let chunk = paths.len().div_ceil(workers).min(max_per_call);
    if chunk * workers < paths.len() {
        debug!(
            "path list exceeds worker coverage: {} of {} files visible",
            chunk * workers,
            paths.len()
        );
    }
    (0..workers)
        .map(|i| {
            let lo = (i * chunk).min(paths.len());
            let hi = ((i + 1) * chunk).min(paths.len());
            paths[lo..hi].to_vec()
        })
        .collect()
}

fn finalize(
    mut result: ConsensusResult,
    profile: &structure::StructureProfile,
    total_files: usize,
    elapsed: Duration,
) -> ConsensusResult {
    result.top_directories = to_map(&profile.dir_counts);
    result.file_types = to_map(&profile.type_counts);
    result.total_files = total_files;
    result.consensus_time = elapsed;
    result
}

fn to_map(entries: &[(String, usize)]) -> BTreeMap<String, usize> {
    entries.iter().cloned().collect()
}

#[cfg(test)]
#[path = "consensus_tests.rs"]
mod tests;
