// Reciprocal Rank Fusion (RRF)

use std::collections::HashMap;

use trawl_core::SearchResult;

pub use trawl_core::types::DEFAULT_RFF_K;

/// Fuses ranked lists with RRF: the result at 0-based rank `r` of any list
/// contributes `1 / (rff_k + r + 1)` to its chunk's total.
///
/// Chunks are kept in first-seen order (first list, then rank) and sorted
/// stably, so equal totals keep that order. A chunk found by several lists
/// carries the `/`-joined methods that found it. Each returned `score` is the
/// fused score. `k` of `None` or `Some(0)` returns the full fused list.
pub fn fuse(result_lists: Vec<Vec<SearchResult>>, k: Option<usize>, rff_k: usize) -> Vec<SearchResult> {
    let mut fused: Vec<(SearchResult, f64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for results in result_lists {
        for (rank, result) in results.into_iter().enumerate() {
            let contribution = 1.0 / (rff_k + rank + 1) as f64;
            match positions.get(&result.chunk.id) {
                Some(&pos) => {
                    let (existing, score) = &mut fused[pos];
                    *score += contribution;
                    if !existing.method.split('/').any(|m| m == result.method) {
                        existing.method = format!("{}/{}", existing.method, result.method);
                    }
                }
                None => {
                    positions.insert(result.chunk.id.clone(), fused.len());
                    fused.push((result, contribution));
                }
            }
        }
    }

    // `sort_by` is stable: ties keep insertion order.
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranked: Vec<SearchResult> = fused
        .into_iter()
        .map(|(mut result, score)| {
            result.score = score;
            result
        })
        .collect();
    if let Some(k) = k.filter(|&k| k > 0) {
        ranked.truncate(k);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_core::{Chunk, ChunkMetadata};

    fn result(id: &str, method: &str, score: f64) -> SearchResult {
        SearchResult {
            score,
            method: method.to_string(),
            chunk: Chunk { id: id.to_string(), content: String::new(), metadata: ChunkMetadata::default() },
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn shared_chunks_accumulate_and_join_methods() {
        let lexical = vec![result("a", "lexical", 9.0), result("b", "lexical", 3.0)];
        let semantic = vec![result("b", "semantic", 0.9), result("c", "semantic", 0.8)];

        let fused = fuse(vec![lexical, semantic], Some(3), 20);

        assert_eq!(ids(&fused), vec!["b", "a", "c"]);
        assert!((fused[0].score - (1.0 / 22.0 + 1.0 / 21.0)).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 21.0).abs() < 1e-12);
        assert!((fused[2].score - 1.0 / 22.0).abs() < 1e-12);
        assert_eq!(fused[0].method, "lexical/semantic");
        assert_eq!(fused[1].method, "lexical");
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let lexical = vec![result("a", "lexical", 1.0)];
        let semantic = vec![result("z", "semantic", 1.0)];
        let fused = fuse(vec![lexical.clone(), semantic.clone()], None, 20);
        assert_eq!(ids(&fused), vec!["a", "z"]);

        let fused = fuse(vec![semantic, lexical], None, 20);
        assert_eq!(ids(&fused), vec!["z", "a"]);
    }

    #[test]
    fn zero_or_missing_k_returns_everything() {
        let lists = || vec![vec![result("a", "lexical", 1.0), result("b", "lexical", 1.0), result("c", "lexical", 1.0)]];
        assert_eq!(fuse(lists(), Some(0), 20).len(), 3);
        assert_eq!(fuse(lists(), None, 20).len(), 3);
        assert_eq!(fuse(lists(), Some(2), 20).len(), 2);
        assert!(fuse(Vec::new(), Some(4), 20).is_empty());
    }

    #[test]
    fn repeated_methods_are_not_duplicated() {
        let first = vec![result("a", "lexical", 1.0)];
        let second = vec![result("a", "lexical", 1.0)];
        let third = vec![result("a", "semantic", 1.0)];
        let fused = fuse(vec![first, second, third], None, 0);
        assert_eq!(fused[0].method, "lexical/semantic");
        assert!((fused[0].score - 3.0).abs() < 1e-12);
    }

    #[test]
    fn fused_scores_never_increase_down_the_list() {
        let a = vec![result("x", "lexical", 0.0), result("y", "lexical", 0.0), result("z", "lexical", 0.0)];
        let b = vec![result("z", "semantic", 0.0), result("w", "semantic", 0.0), result("x", "semantic", 0.0)];
        let fused = fuse(vec![a, b], Some(10), DEFAULT_RFF_K);
        for pair in fused.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(fused.len(), 4);
    }
}
