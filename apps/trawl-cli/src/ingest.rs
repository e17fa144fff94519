//! JSONL chunk ingestion.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use walkdir::WalkDir;

use trawl_core::User;
use trawl_hybrid::{check_distinct_parts, NewChunk, RetrievalService};

/// Expands `paths` into the JSONL files to read, in a stable order.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking {}", path.display()))?;
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "jsonl") {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Parses one `{content, metadata}` record per non-blank line.
pub fn read_chunks(file: &Path) -> Result<Vec<NewChunk>> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("{}:{}: invalid chunk record", file.display(), n + 1))
        })
        .collect()
}

/// Reads every file up front, so a malformed record or a repeated document
/// part aborts before anything is written, then upserts in gateway-sized
/// batches.
pub async fn ingest(service: &RetrievalService, collection: &str, paths: &[PathBuf], user: &User) -> Result<usize> {
    let mut chunks = Vec::new();
    for file in collect_files(paths)? {
        let parsed = read_chunks(&file)?;
        debug!(file = %file.display(), chunks = parsed.len(), "parsed");
        chunks.extend(parsed);
    }
    check_distinct_parts(&chunks)?;

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .context("progress template")?
            .progress_chars("#>-"),
    );

    let total = chunks.len();
    let batch_size = service.gateway().batch_size().max(1);
    let mut pending = chunks.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<NewChunk> = pending.by_ref().take(batch_size).collect();
        let len = batch.len() as u64;
        service
            .upsert(collection, batch, user)
            .await
            .with_context(|| format!("indexing into {collection}"))?;
        pb.inc(len);
    }
    pb.finish_with_message("done");
    Ok(total)
}
