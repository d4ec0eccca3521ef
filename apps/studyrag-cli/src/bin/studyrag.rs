use std::env;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use studyrag_chat::{classify_failure, relevance_score};
use studyrag_cli::{load_chunks, parse_args, Command, USAGE};
use studyrag_core::config::{Config, Settings};
use studyrag_core::error::Error;
use studyrag_core::logging;
use studyrag_core::types::MetadataFilter;
use studyrag_retrieval::RetrievalEngine;

fn main() -> Result<()> {
    logging::init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    tokio::runtime::Runtime::new()?.block_on(run(cmd, settings))
}

async fn run(cmd: Command, settings: Settings) -> Result<()> {
    let engine = RetrievalEngine::from_settings(&settings);
    match cmd {
        Command::Ingest { path, force } => ingest(&engine, &settings, &path, force).await?,
        Command::Search { query, limit, source } => {
            let k = limit.unwrap_or(settings.retrieval.top_k_results);
            let filter = source.map(|s| MetadataFilter::new().with("source", s));
            let hits = engine.search(&query, k, filter.as_ref()).await?;
            if hits.is_empty() {
                println!("No results for '{query}'");
            }
            for (rank, hit) in hits.iter().enumerate() {
                let distance =
                    hit.distance.map_or_else(|| "n/a".to_string(), |d| format!("{d:.4}"));
                let preview: String = hit.text.chars().take(160).collect();
                println!(
                    "{}. {}#{} distance={} relevance={:.2}\n   {}",
                    rank + 1,
                    hit.metadata.source,
                    hit.metadata.chunk_id,
                    distance,
                    relevance_score(hit.distance, settings.retrieval.default_relevance),
                    preview.replace('\n', " "),
                );
            }
        }
        Command::Stats => {
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Reset => {
            engine.delete_all().await?;
            println!("Index cleared");
        }
        Command::Classify { text } => {
            println!("{}", serde_json::to_string_pretty(&classify_failure(&text))?);
        }
    }
    Ok(())
}

async fn ingest(
    engine: &RetrievalEngine,
    settings: &Settings,
    path: &std::path::Path,
    force: bool,
) -> Result<()> {
    let start = Instant::now();
    let chunks = load_chunks(path)?;
    println!("Loaded {} chunks from {}", chunks.len(), path.display());
    if force {
        engine.delete_all().await?;
        println!("Existing index cleared (--force)");
    }
    if chunks.is_empty() {
        return Ok(());
    }
    engine.preload().await?;

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                 {pos}/{len} chunks ({percent}%)",
            )?
            .progress_chars("#>-"),
    );
    let batch_size = settings.index.batch_size;
    for (n, batch) in chunks.chunks(batch_size).enumerate() {
        let offset = n * batch_size;
        engine.ingest(batch).await.map_err(|e| {
            let resume = match &e {
                Error::Index(ie) => ie.resume_offset(batch_size),
                _ => None,
            };
            let msg = match resume {
                Some(r) => format!("ingest stopped; resume from chunk {}", offset + r),
                None => format!("ingest failed in chunks {offset}..{}", offset + batch.len()),
            };
            anyhow::Error::new(e).context(msg)
        })?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("done");

    let stats = engine.stats().await.context("reading index stats")?;
    tracing::info!(chunks = chunks.len(), count = stats.count, "ingest complete");
    println!(
        "Indexed {} chunks into '{}' ({} rows total) in {:.1}s",
        chunks.len(),
        stats.name,
        stats.count,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
