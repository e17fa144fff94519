//! Tokenization and edit distance used by the in-process text scoring.

use trawl_core::query::{MAX_TOKEN_LEN, STOP_WORDS};

/// Splits on non-alphanumeric characters, lowercases, and drops stop words
/// and overlong tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && t.len() < MAX_TOKEN_LEN)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Whether `a` and `b` are at most `max` edits apart, counting an adjacent
/// transposition as a single edit.
pub fn within_distance(a: &str, b: &str, max: usize) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return false;
    }
    if a.is_empty() || b.is_empty() {
        return a.len().max(b.len()) <= max;
    }

    let width = b.len() + 1;
    let mut prev2 = vec![0usize; width];
    let mut prev: Vec<usize> = (0..width).collect();
    let mut curr = vec![0usize; width];
    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = curr[0];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut value = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                value = value.min(prev2[j - 2] + 1);
            }
            curr[j] = value;
            row_min = row_min.min(value);
        }
        if row_min > max {
            return false;
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()] <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_matches_the_index_analyzer() {
        assert_eq!(tokenize("The Borrow-Checker and YOU!"), vec!["borrow", "checker", "you"]);
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn distance_counts_transpositions_once() {
        assert!(within_distance("borrow", "borrow", 0));
        assert!(within_distance("borow", "borrow", 1));
        assert!(within_distance("brorow", "borrow", 1));
        assert!(!within_distance("bread", "borrow", 2));
        assert!(within_distance("", "ab", 2));
        assert!(!within_distance("", "abc", 2));
    }
}
