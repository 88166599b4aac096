use anyhow::{Context, Result};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::Services;
use crate::search::{ChunkStore, Indexer, ProviderHealth, StoreStats};

static INDEXING: Emoji<'_, '_> = Emoji("📊 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");

fn indexer(services: &Services) -> Indexer {
    Indexer::new(
        services.store.clone(),
        Arc::clone(&services.embedder),
        &services.config.chunking,
    )
}

pub async fn run_index(services: &Services, path: &Path, no_embed: bool, prune: bool) -> Result<()> {
    let indexer = indexer(services);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("{}Indexing {}...", INDEXING, path.display()));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = indexer.index_all(path, !no_embed).await;
    pb.finish_and_clear();
    let stats = result.with_context(|| format!("Failed to index {}", path.display()))?;

    println!("\n{}Indexing complete!\n", SUCCESS);
    println!("  Files scanned:   {}", style(stats.files_scanned).green());
    println!("  Chunks indexed:  {}", style(stats.chunks_indexed).cyan());
    if stats.embeddings_enabled {
        println!(
            "  Embeddings:      {} created, {} unchanged",
            style(stats.embeddings_created).cyan(),
            style(stats.embeddings_reused).dim()
        );
    } else {
        println!(
            "  Embeddings:      {}",
            style("disabled (keyword-only index)").yellow()
        );
    }
    if stats.chunks_removed > 0 {
        println!("  Stale chunks:    {} removed", style(stats.chunks_removed).yellow());
    }
    println!("  Elapsed:         {:.2}s", stats.elapsed.as_secs_f64());

    if stats.errors > 0 || stats.embedding_errors > 0 {
        println!(
            "\n{}{} file error(s), {} embedding error(s). Re-run with --verbose for details.",
            WARNING,
            style(stats.errors).red(),
            style(stats.embedding_errors).red()
        );
    }

    if prune {
        let pruned = indexer
            .prune_deleted()
            .await
            .context("Failed to prune deleted sources")?;
        if pruned > 0 {
            println!(
                "\n  Pruned:          {} (deleted files removed from index)",
                style(pruned).yellow()
            );
        }
    }

    let totals = services.store.stats().await?;
    print_totals(&totals, services);
    Ok(())
}

pub async fn run_prune(services: &Services) -> Result<()> {
    let pruned = indexer(services)
        .prune_deleted()
        .await
        .context("Failed to prune deleted sources")?;

    if pruned == 0 {
        println!("{}Nothing to prune.", INFO);
    } else {
        println!(
            "{}Removed {} deleted source(s) from the index.",
            SUCCESS,
            style(pruned).yellow()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport<'a> {
    database: String,
    #[serde(flatten)]
    stats: &'a StoreStats,
    provider: &'a str,
    model: &'a str,
}

pub async fn run_status(services: &Services, json: bool) -> Result<()> {
    let stats = services.store.stats().await?;
    let health = services.embedder.health_check().await;
    let provider = match &health {
        ProviderHealth::Ready => "ready",
        ProviderHealth::ModelMissing { .. } => "model missing",
        ProviderHealth::Unavailable(_) => "unavailable",
    };

    if json {
        let report = StatusReport {
            database: services.config.store.path.display().to_string(),
            stats: &stats,
            provider,
            model: &services.config.embedder.model,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "\n{}Index Status: {}",
        INFO,
        services.config.store.path.display()
    );
    print_totals(&stats, services);

    let provider_line = match &health {
        ProviderHealth::Ready => style(provider.to_string()).green(),
        ProviderHealth::ModelMissing { .. } => style(format!(
            "{} (run `ollama pull {}`)",
            provider, services.config.embedder.model
        ))
        .yellow(),
        ProviderHealth::Unavailable(reason) => {
            style(format!("{} ({})", provider, reason)).red()
        }
    };
    println!(
        "  Embeddings via:  {} [{}]",
        services.config.embedder.endpoint, services.config.embedder.model
    );
    println!("  Provider:        {}", provider_line);
    Ok(())
}

fn print_totals(stats: &StoreStats, services: &Services) {
    println!("\n{}Index Statistics:", INFO);
    println!("  Total sources:   {}", style(stats.total_sources).green());
    println!("  Total chunks:    {}", style(stats.total_chunks).cyan());
    println!("  Embedded chunks: {}", style(stats.total_embeddings).cyan());
    if let Some(updated) = stats.last_updated {
        println!(
            "  Last updated:    {}",
            style(updated.format("%Y-%m-%d %H:%M:%S")).dim()
        );
    }
    if stats.total_chunks > 0 && stats.total_embeddings == 0 {
        println!(
            "  {}",
            style(format!(
                "Keyword-only index: start the embedding provider at {} and re-run `docsift index` for semantic search.",
                services.config.embedder.endpoint
            ))
            .dim()
        );
    }
}
