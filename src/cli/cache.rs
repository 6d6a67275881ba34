use std::path::Path;

use anyhow::{Context, Result};
use autoheal_selector_cache::{open_cache, CacheBackend, FileSelectorCache, PersistedCache};
use clap::{Args, Subcommand};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheAction {
    /// List persisted entries and their trust statistics
    Stats,

    /// Drop expired entries from the persisted cache
    Prune,

    /// Remove every cached selector
    Clear,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsReport {
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub entries: Vec<EntryReport>,
}

#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub key: String,
    pub selector: String,
    pub attempts: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub fingerprinted: bool,
    pub last_used: String,
}

impl CacheStatsReport {
    fn from_snapshot(path: &Path, snapshot: PersistedCache) -> Self {
        let entries = snapshot
            .entries
            .into_iter()
            .map(|(key, record)| EntryReport {
                key: key.to_string(),
                success_rate: if record.attempts == 0 {
                    0.0
                } else {
                    f64::from(record.successes) / f64::from(record.attempts)
                },
                selector: record.selector,
                attempts: record.attempts,
                successes: record.successes,
                fingerprinted: record.fingerprint.is_some(),
                last_used: record.last_used.to_rfc3339(),
            })
            .collect();
        Self {
            backend: "file",
            path: Some(path.display().to_string()),
            entries,
        }
    }
}

pub async fn cmd_cache(args: CacheArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = &ctx.config().cache;
    let CacheBackend::File { path } = &config.backend else {
        println!(
            "Memory cache backend keeps no state between runs; nothing to {}",
            verb(&args.action)
        );
        return Ok(());
    };

    match args.action {
        CacheAction::Stats => {
            let report = if fs::try_exists(path).await? {
                let snapshot = FileSelectorCache::read_snapshot(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                CacheStatsReport::from_snapshot(path, snapshot)
            } else {
                CacheStatsReport {
                    backend: "file",
                    path: Some(path.display().to_string()),
                    entries: Vec::new(),
                }
            };
            emit(output, &report, print_stats)?;
        }
        CacheAction::Prune => {
            let cache = open_cache(config).await?;
            let dropped = cache.evict_expired().await?;
            info!(dropped, path = %path.display(), "Pruned selector cache");
            println!("Pruned {} expired entries, {} remain", dropped, cache.size());
        }
        CacheAction::Clear => {
            let cache = open_cache(config).await?;
            let before = cache.size();
            cache.clear().await?;
            info!(cleared = before, path = %path.display(), "Cleared selector cache");
            println!("Cleared {} entries from {}", before, path.display());
        }
    }
    Ok(())
}

fn verb(action: &CacheAction) -> &'static str {
    match action {
        CacheAction::Stats => "report",
        CacheAction::Prune => "prune",
        CacheAction::Clear => "clear",
    }
}

fn print_stats(report: &CacheStatsReport) {
    println!(
        "Selector cache ({}, {} entries)",
        report.path.as_deref().unwrap_or(report.backend),
        report.entries.len()
    );
    for entry in &report.entries {
        println!(
            "  {} -> {}  {}/{} ({:.0}%){}",
            entry.key,
            entry.selector,
            entry.successes,
            entry.attempts,
            entry.success_rate * 100.0,
            if entry.fingerprinted { "  [fp]" } else { "" }
        );
    }
}
