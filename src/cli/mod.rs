//! Command handlers and terminal adapters. The library below this layer
//! never prints; everything user-facing happens here.

pub mod args;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::ranking::{Progress, ProgressSink, Tier};
use crate::models::QuickConfig;
use crate::services::git_digest;
use crate::services::{ConsensusController, LmClient, TierCache};

pub use args::{Cli, Commands, OutputFormat};

/// Dispatch a parsed CLI invocation.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            path,
            workers,
            nl,
            refresh,
            base_url,
            model,
            format,
            no_progress,
        } => {
            let mut config = QuickConfig::load(&path)?;
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            if model.is_some() {
                config.model = model;
            }
            config.natural_language_workers |= nl;
            config.refresh |= refresh;
            config.debug |= cli.debug;

            analyze(&path, config, format, no_progress, cancel).await
        }
        Commands::Models { base_url } => {
            let base_url = base_url.unwrap_or_else(|| QuickConfig::default().base_url);
            let client = LmClient::new(base_url, None);
            let models = client
                .list_models()
                .await
                .context("provider health check failed")?;
            for model in models {
                println!("{model}");
            }
            Ok(())
        }
        Commands::Status { path } => status(&path).await,
    }
}

async fn analyze(
    path: &Path,
    config: QuickConfig,
    format: OutputFormat,
    no_progress: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let client = Arc::new(LmClient::new(config.base_url.clone(), config.model.clone()));
    let controller = ConsensusController::new(client, config);

    let (sink, bar) = if no_progress {
        (None, None)
    } else {
        let (sink, bar) = progress_bar_sink();
        (Some(sink), Some(bar))
    };

    let result = controller.analyze(path, &cancel, sink).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let result = result?;

    match format {
        OutputFormat::Markdown => println!("{}", result.to_markdown()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

async fn status(path: &Path) -> Result<()> {
    let cache = TierCache::new(path);
    let digest = git_digest::working_tree_digest(path).await;
    for tier in [Tier::Quick, Tier::Detailed, Tier::Deep, Tier::Full] {
        match cache.describe(tier, &digest) {
            Some((generated_at, fresh)) => {
                let state = if fresh { "fresh" } else { "stale" };
                println!("{tier:>9}: {state}, generated {generated_at}");
            }
            None => println!("{tier:>9}: (not cached)"),
        }
    }
    Ok(())
}

/// Adapt the library's progress events to an indicatif bar.
fn progress_bar_sink() -> (ProgressSink, ProgressBar) {
    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    let sink_bar = bar.clone();
    let sink: ProgressSink = Arc::new(move |p: Progress| {
        sink_bar.set_length(p.total.max(1) as u64);
        sink_bar.set_position(p.completed as u64);
        sink_bar.set_message(format!("[{}] {}", p.phase, p.current));
    });
    (sink, bar)
}
