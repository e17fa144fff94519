//! trawl-text
//!
//! Tantivy chunk store and the lexical search engine.

pub mod search;
pub mod store;
pub mod tantivy_utils;

pub use search::LexicalSearchEngine;
pub use store::TantivyStore;
