use crate::error::IndexError;
use regex::Regex;
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "don", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "s", "same", "she",
    "should", "so", "some", "such", "t", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Lowercases, tokenizes and drops stopwords, prefixing the file name so it
/// contributes to the embedding.
pub struct Preprocessor {
    word_re: Regex,
    stopwords: HashSet<&'static str>,
}

impl Preprocessor {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            word_re: Regex::new(r"\w+")?,
            stopwords: STOPWORDS.iter().copied().collect(),
        })
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn preprocess(&self, file_name: &str, raw_text: &str) -> String {
        let lowered = format!("{file_name} {raw_text}").to_lowercase();
        self.word_re
            .find_iter(&lowered)
            .map(|token| token.as_str())
            .filter(|token| !self.is_stopword(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
