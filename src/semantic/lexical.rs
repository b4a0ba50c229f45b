//! Lexical (TF-IDF) ranking, the last-resort retrieval tier.
//!
//! Scoring per document:
//!   score(d) = Σ_t  (count(t, d) / |d|) × idf(t)
//!   idf(t)   = ln((N + 1) / (df(t) + 1)) + 1
//!
//! The smoothed idf keeps every weight positive, so a term that occurs in all
//! documents still contributes instead of zeroing out the score.

use std::collections::{HashMap, HashSet};

use crate::semantic::preprocess::{preview, title_from_path, tokenize};
use crate::types::RankedResult;

/// A document offered to the lexical ranker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalDoc {
    pub path: String,
    pub text: String,
}

impl LexicalDoc {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Smoothed inverse document frequency.
pub fn idf(total_docs: usize, doc_freq: usize) -> f32 {
    ((total_docs as f32 + 1.0) / (doc_freq as f32 + 1.0)).ln() + 1.0
}

/// Score every document against `query`.
///
/// All documents are returned, best first. Documents sharing no term with the
/// query score 0 and sort last. The sort is stable, so equal scores keep the
/// order of `docs`. An empty query scores everything 0.
pub fn rank(query: &str, docs: &[LexicalDoc]) -> Vec<RankedResult> {
    let query_terms: Vec<String> = {
        let mut seen = HashSet::new();
        tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    };

    let doc_terms: Vec<HashMap<String, usize>> = docs
        .iter()
        .map(|doc| term_counts(&doc.text))
        .collect();
    let doc_lengths: Vec<usize> = doc_terms.iter().map(|c| c.values().sum()).collect();

    let weights: Vec<(&str, f32)> = query_terms
        .iter()
        .map(|term| {
            let df = doc_terms.iter().filter(|c| c.contains_key(term)).count();
            (term.as_str(), idf(docs.len(), df))
        })
        .collect();

    let mut results: Vec<RankedResult> = docs
        .iter()
        .zip(doc_terms.iter().zip(doc_lengths.iter()))
        .map(|(doc, (counts, &len))| {
            let score = if len == 0 {
                0.0
            } else {
                weights
                    .iter()
                    .map(|(term, weight)| {
                        let tf = counts.get(*term).copied().unwrap_or(0) as f32 / len as f32;
                        tf * weight
                    })
                    .sum()
            };

            RankedResult {
                path: doc.path.clone(),
                score,
                title: title_from_path(&doc.path),
                preview: preview(&doc.text),
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score));

    results
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[(&str, &str)]) -> Vec<LexicalDoc> {
        items.iter().map(|(p, t)| LexicalDoc::new(*p, *t)).collect()
    }

    #[test]
    fn test_matching_doc_scores_higher() {
        let corpus = docs(&[("a", "hello world"), ("b", "goodbye")]);
        let results = rank("hello", &corpus);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "a");
        assert!(results[0].score > results[1].score);
        assert_eq!(results[1].score, 0.0);
    }

    #[test]
    fn test_identical_docs_score_identically() {
        let corpus = docs(&[("a", "rust async io"), ("b", "rust async io"), ("c", "cooking")]);
        let results = rank("rust io", &corpus);

        let a = results.iter().find(|r| r.path == "a").unwrap();
        let b = results.iter().find(|r| r.path == "b").unwrap();
        assert_eq!(a.score, b.score);
        // stable order for ties
        assert_eq!(results[0].path, "a");
        assert_eq!(results[1].path, "b");
    }

    #[test]
    fn test_empty_query_returns_all_with_zero_score() {
        let corpus = docs(&[("a", "hello"), ("b", "world")]);
        let results = rank("", &corpus);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 0.0));
        assert_eq!(results[0].path, "a");
        assert_eq!(results[1].path, "b");
    }

    #[test]
    fn test_empty_corpus() {
        assert!(rank("anything", &[]).is_empty());
    }

    #[test]
    fn test_empty_document_scores_zero() {
        let corpus = docs(&[("empty", ""), ("a", "term")]);
        let results = rank("term", &corpus);
        assert_eq!(results[0].path, "a");
        assert_eq!(results[1].score, 0.0);
    }

    #[test]
    fn test_score_matches_formula() {
        let corpus = docs(&[("a", "alpha beta beta gamma"), ("b", "delta")]);
        let results = rank("beta", &corpus);

        // tf = 2/4, df = 1, N = 2
        let expected = 0.5 * ((3.0f32 / 2.0).ln() + 1.0);
        assert!((results[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let corpus = docs(&[
            ("common", "note note note rare"),
            ("other", "note note note note"),
            ("third", "note note note note"),
        ]);

        assert!(idf(3, 1) > idf(3, 3));
        let results = rank("note rare", &corpus);
        assert_eq!(results[0].path, "common");
    }

    #[test]
    fn test_repeated_query_terms_count_once() {
        let corpus = docs(&[("a", "hello there"), ("b", "nothing")]);
        let once = rank("hello", &corpus);
        let twice = rank("hello hello", &corpus);
        assert_eq!(once[0].score, twice[0].score);
    }

    #[test]
    fn test_results_carry_title_and_preview() {
        let corpus = docs(&[("notes/Rust Tips.md", "Use   clippy\noften")]);
        let results = rank("clippy", &corpus);

        assert_eq!(results[0].title.as_deref(), Some("Rust Tips"));
        assert_eq!(results[0].preview.as_deref(), Some("Use clippy often"));
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let corpus = docs(&[("a", "RUST-lang!"), ("b", "python")]);
        let results = rank("rust", &corpus);
        assert_eq!(results[0].path, "a");
        assert!(results[0].score > 0.0);
    }
}
