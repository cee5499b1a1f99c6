//! RAKE keyword extraction.
//!
//! Rapid Automatic Keyword Extraction splits text into candidate phrases at
//! stopwords and punctuation, scores each word by `degree / frequency` and
//! ranks phrases by the sum of their word scores. Used to squeeze long
//! descriptions and transcripts into short embedding inputs.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static PHRASE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.,!?;:()\[\]{}"“”|/\\…\n\r\t]+|\s[-–—]+\s"#).expect("valid phrase regex")
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'’\-+#]*").expect("valid word regex"));

/// English stopwords (NLTK list).
const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// A RAKE extractor with a fixed stopword list.
#[derive(Debug, Clone)]
pub struct RakeExtractor {
    stopwords: HashSet<String>,
    max_phrase_words: usize,
}

impl Default for RakeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RakeExtractor {
    /// English stopwords, phrases of any length.
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().map(|s| s.to_string()).collect(),
            max_phrase_words: usize::MAX,
        }
    }

    /// Drops candidate phrases longer than `max` words.
    pub fn with_max_phrase_words(mut self, max: usize) -> Self {
        self.max_phrase_words = max.max(1);
        self
    }

    /// Candidate phrases as lowercase word lists, in text order.
    fn candidate_phrases(&self, text: &str) -> Vec<Vec<String>> {
        let mut phrases = Vec::new();

        for fragment in PHRASE_BREAK.split(text) {
            let mut current: Vec<String> = Vec::new();
            for m in WORD.find_iter(fragment) {
                let word = m.as_str().to_lowercase();
                if self.stopwords.contains(word.as_str()) {
                    if !current.is_empty() {
                        phrases.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(word);
                }
            }
            if !current.is_empty() {
                phrases.push(current);
            }
        }

        phrases
            .into_iter()
            .filter(|p| p.len() <= self.max_phrase_words)
            .collect()
    }

    /// Unique phrases ranked by score, highest first. Ties keep text order.
    pub fn ranked_phrases(&self, text: &str) -> Vec<String> {
        let phrases = self.candidate_phrases(text);

        let mut frequency: HashMap<&str, f64> = HashMap::new();
        let mut degree: HashMap<&str, f64> = HashMap::new();
        for phrase in &phrases {
            for word in phrase {
                *frequency.entry(word.as_str()).or_default() += 1.0;
                *degree.entry(word.as_str()).or_default() += phrase.len() as f64;
            }
        }

        let mut seen = HashSet::new();
        let mut scored: Vec<(String, f64)> = Vec::new();
        for phrase in &phrases {
            let joined = phrase.join(" ");
            if !seen.insert(joined.clone()) {
                continue;
            }
            let score: f64 = phrase
                .iter()
                .map(|w| degree[w.as_str()] / frequency[w.as_str()])
                .sum();
            scored.push((joined, score));
        }

        // stable sort keeps first occurrence first among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.into_iter().map(|(phrase, _)| phrase).collect()
    }

    /// The top `n` phrases joined by single spaces. Empty text yields "".
    pub fn top_phrases(&self, text: &str, n: usize) -> String {
        self.ranked_phrases(text)
            .into_iter()
            .take(n)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
