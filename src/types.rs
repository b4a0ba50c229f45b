//! Data model shared by every retrieval tier.

use serde::{Deserialize, Serialize};

/// A precomputed note embedding loaded from the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteVector {
    pub id: String,
    pub note_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub vec: Vec<f32>,
}

/// Cached note body. Replaced as a whole, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content: String,
    /// Modification time in epoch milliseconds.
    pub mtime: i64,
}

/// One ranked note. `score` is tier-specific and not comparable across tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub path: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// Which tier produced a [`SearchOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Plugin,
    Files,
    Lexical,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Plugin => "plugin",
            SearchMethod::Files => "files",
            SearchMethod::Lexical => "lexical",
        }
    }
}

/// Provenance-tagged search result. All tiers normalize into this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub method: SearchMethod,
    pub results: Vec<RankedResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
    pub took_ms: u64,
}

impl SearchOutcome {
    pub fn new(method: SearchMethod, results: Vec<RankedResult>) -> Self {
        Self {
            method,
            results,
            encoder: None,
            dim: None,
            pool_size: None,
            took_ms: 0,
        }
    }

    /// The "nothing to search for" answer.
    pub fn empty() -> Self {
        Self::new(SearchMethod::Lexical, vec![])
    }

    pub fn with_encoder(mut self, encoder: Option<String>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size);
        self
    }
}
