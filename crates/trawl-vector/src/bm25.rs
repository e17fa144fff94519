//! Inverted index with BM25 Okapi scoring and fuzzy term expansion.

use std::collections::{HashMap, HashSet};

use trawl_core::query::Fuzziness;
use trawl_core::types::ChunkId;

use crate::analysis::{tokenize, within_distance};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
/// Constant credit for a document holding any term within edit distance of
/// a query token.
pub const FUZZY_BOOST: f32 = 0.5;

#[derive(Debug, Default)]
struct DocEntry {
    length: u32,
    terms: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InvertedIndex {
    /// term -> chunk id -> term frequency
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    docs: HashMap<ChunkId, DocEntry>,
    total_doc_length: u64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `text` under `id`, replacing any previous text of `id`.
    pub fn add_document(&mut self, id: &str, text: &str) {
        self.remove_document(id);
        let tokens = tokenize(text);
        let mut tf_map: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *tf_map.entry(token.clone()).or_insert(0) += 1;
        }
        let terms: Vec<String> = tf_map.keys().cloned().collect();
        for (term, tf) in tf_map {
            self.postings.entry(term).or_default().insert(id.to_string(), tf);
        }
        self.total_doc_length += tokens.len() as u64;
        self.docs.insert(id.to_string(), DocEntry { length: tokens.len() as u32, terms });
    }

    pub fn remove_document(&mut self, id: &str) {
        let Some(entry) = self.docs.remove(id) else { return };
        self.total_doc_length -= u64::from(entry.length);
        for term in entry.terms {
            if let Some(postings) = self.postings.get_mut(&term) {
                postings.remove(id);
                if postings.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Adds the score of every matching document to `scores`: BM25 for exact
    /// token hits plus [`FUZZY_BOOST`] per token with a fuzzy hit.
    pub fn score_into(&self, tokens: &[String], fuzziness: Fuzziness, scores: &mut HashMap<ChunkId, f32>) {
        if self.docs.is_empty() {
            return;
        }
        let n = self.docs.len() as f32;
        let avgdl = (self.total_doc_length as f32 / n).max(1.0);

        for token in tokens {
            if let Some(postings) = self.postings.get(token) {
                let df = postings.len() as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                for (id, tf) in postings {
                    let dl = self.docs.get(id).map_or(0.0, |d| d.length as f32);
                    let tf = *tf as f32;
                    let tf_norm = (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
                    *scores.entry(id.clone()).or_insert(0.0) += idf * tf_norm;
                }
            }

            let distance = fuzziness.distance_for(token) as usize;
            if distance > 0 {
                let mut matched: HashSet<&ChunkId> = HashSet::new();
                for (term, postings) in &self.postings {
                    if within_distance(token, term, distance) {
                        matched.extend(postings.keys());
                    }
                }
                for id in matched {
                    *scores.entry(id.clone()).or_insert(0.0) += FUZZY_BOOST;
                }
            }
        }
    }
}
