//! Backend-neutral query bodies.
//!
//! Both storage backends receive the same [`SearchRequest`] values; each is
//! responsible for turning a [`TextMatch`] into its own native text query.

/// Prompts with this many whitespace tokens or more are matched exactly.
pub const FUZZY_TOKEN_LIMIT: usize = 25;

/// Candidate pool examined by kNN before truncating to `k`.
pub const DEFAULT_NUM_CANDIDATES: usize = 200;

/// Words dropped by every text analyzer before matching.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there",
    "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could",
    "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
];

/// Longest token kept by the analyzers.
pub const MAX_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuzziness {
    Off,
    /// Edit distance picked from the token length.
    Auto,
}

impl Fuzziness {
    /// Maximum edit distance tolerated for `token` under this policy.
    pub fn distance_for(&self, token: &str) -> u8 {
        match self {
            Fuzziness::Off => 0,
            Fuzziness::Auto => match token.chars().count() {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
        }
    }
}

/// Multi-field text match over a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub query: String,
    pub fuzziness: Fuzziness,
}

impl TextMatch {
    /// Short prompts get fuzzy matching; long ones would blow up the number
    /// of expanded terms and drift into false positives.
    pub fn for_prompt(prompt: &str) -> Self {
        let fuzziness = if prompt.split_whitespace().count() < FUZZY_TOKEN_LIMIT {
            Fuzziness::Auto
        } else {
            Fuzziness::Off
        };
        Self { query: prompt.to_string(), fuzziness }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchRequest {
    /// Relevance-ranked text match. Hits never carry embeddings.
    Match { clause: TextMatch, size: usize },
    /// Nearest neighbours of `vector`, restricted to documents matching `filter`.
    Knn {
        vector: Vec<f32>,
        k: usize,
        num_candidates: usize,
        filter: Option<TextMatch>,
    },
    /// Chunks of one document ordered by `document_part`.
    Document {
        document_id: String,
        limit: usize,
        offset: usize,
    },
}
