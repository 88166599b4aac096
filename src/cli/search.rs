use anyhow::{Context, Result};
use console::{style, Emoji};

use super::Services;
use crate::error::Error;
use crate::search::disclosure::CONTEXT_SEPARATOR;
use crate::search::MatchType;

static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "");
static FILE: Emoji<'_, '_> = Emoji("📄 ", "");

pub async fn run_search(
    services: &Services,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let top_k = top_k.unwrap_or(services.config.search.top_k);
    if top_k == 0 {
        anyhow::bail!("--top-k must be at least 1");
    }

    let summary = services
        .surface()
        .search_summary(query, top_k)
        .await
        .context("Search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.results.is_empty() {
        println!(
            "No results found for: {} ({} chunks indexed)",
            style(query).italic(),
            summary.total_candidates
        );
        return Ok(());
    }

    println!(
        "\n{}Found {} results for: {}\n",
        SEARCH,
        style(summary.results.len()).cyan(),
        style(query).yellow().bold()
    );

    for hit in &summary.results {
        let kind = match hit.match_type {
            MatchType::Hybrid => style(hit.match_type.as_str()).green(),
            MatchType::Semantic => style(hit.match_type.as_str()).magenta(),
            MatchType::Keyword => style(hit.match_type.as_str()).blue(),
        };
        println!(
            "{}[{}] {} ({}, {})",
            FILE,
            style(hit.id).bold(),
            style(&hit.title).green(),
            kind,
            style(format!("{:.3}", hit.score)).cyan()
        );
        println!("   Source: {}", style(&hit.source_path).dim());
        println!("   {}", style(hit.snippet.replace('\n', " ")).dim());
        println!();
    }
    println!(
        "{}",
        style("Run `docsift fetch <id>` for the full chunk and its neighbours.").dim()
    );

    Ok(())
}

pub async fn run_fetch(services: &Services, id: i64, json: bool) -> Result<()> {
    if id <= 0 {
        anyhow::bail!("Document id must be a positive integer (got {})", id);
    }

    let detail = match services.surface().fetch_details(id).await {
        Ok(detail) => detail,
        Err(Error::NotFound(_)) => anyhow::bail!("Document {} not found", id),
        Err(e) => return Err(anyhow::Error::new(e).context("Fetch failed")),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let chunk = &detail.chunk;
    println!(
        "\n{}[{}] {}",
        FILE,
        style(chunk.id).bold(),
        style(&chunk.title).green().bold()
    );
    println!(
        "   Source: {} {}",
        style(&chunk.source_path).dim(),
        style(format!("(chunk {})", chunk.chunk_index)).dim()
    );
    println!();

    for (i, part) in detail.context.iter().enumerate() {
        if i > 0 {
            println!("{}", style(CONTEXT_SEPARATOR.trim()).dim());
            println!();
        }
        if part.id == chunk.id {
            println!("{}", part.text);
        } else {
            println!("{}", style(&part.text).dim());
        }
        println!();
    }

    Ok(())
}
