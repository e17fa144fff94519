//! trawl-vector
//!
//! Pure in-process vector store and the semantic (filtered kNN) search engine.

pub mod analysis;
pub mod bm25;
mod journal;
pub mod search;
pub mod store;

pub use search::SemanticSearchEngine;
pub use store::VectorStore;
