//! trawl-hybrid
//!
//! Rank fusion, the query orchestrator and the [`RetrievalService`] facade
//! that ties registry, embeddings and both search engines together.

pub mod fusion;
pub mod orchestrator;
pub mod service;

pub use fusion::fuse;
pub use orchestrator::HybridQueryOrchestrator;
pub use service::{check_distinct_parts, chunk_id, Answer, NewChunk, Rerank, RetrievalService};
