//! Text and JSON rendering of command results.

use anyhow::Result;
use serde::Serialize;

use trawl_core::{Chunk, Collection, Document, ModelConfig, SearchResult};
use trawl_hybrid::{Answer, Rerank};

const SNIPPET_CHARS: usize = 160;

pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{cut}...")
}

pub fn results(prompt: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results for \"{prompt}\"");
    }
    let mut out = format!("{} results for \"{prompt}\"\n", results.len());
    for (i, r) in results.iter().enumerate() {
        let meta = &r.chunk.metadata;
        let name = meta.document_name.as_deref().unwrap_or(&meta.document_id);
        out.push_str(&format!("\n{:>3}. [{:.4}] {} #{} ({})\n", i + 1, r.score, name, meta.document_part, r.method));
        out.push_str(&format!("     {}\n", snippet(&r.chunk.content)));
    }
    out
}

pub fn answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.answer.trim());
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for (i, s) in answer.sources.iter().enumerate() {
            let meta = &s.chunk.metadata;
            let name = meta.document_name.as_deref().unwrap_or(&meta.document_id);
            out.push_str(&format!("  [{}] {} #{}\n", i + 1, name, meta.document_part));
        }
    }
    out
}

pub fn reranks(inputs: &[String], ranked: &[Rerank]) -> String {
    ranked
        .iter()
        .filter_map(|r| inputs.get(r.index).map(|input| format!("[{:.2}] {}", r.score, snippet(input))))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn collections(collections: &[Collection]) -> String {
    if collections.is_empty() {
        return "No collections".to_string();
    }
    collections
        .iter()
        .map(|c| format!("{}\t{}\t{}\t{}\t{} documents", c.id, c.collection_type, c.model, c.name, c.documents))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn documents(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents".to_string();
    }
    documents
        .iter()
        .map(|d| format!("{}\t{}\t{} chunks", d.id, d.name.as_deref().unwrap_or("-"), d.chunks))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("#{} {}\n{}", c.metadata.document_part, c.id, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn models(models: &[&ModelConfig]) -> String {
    models
        .iter()
        .map(|m| match m.vector_size {
            Some(dims) => format!("{}\t{}\t{dims} dims", m.id, m.model_type),
            None => format!("{}\t{}", m.id, m.model_type),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
