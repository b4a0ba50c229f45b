//! Tiered note retrieval.
//!
//! [`QueryRouter::search`] tries, in order:
//! 1. the remote semantic-search endpoint (`plugin`)
//! 2. the local precomputed vector store (`files`), by anchor note or by an
//!    encoded query
//! 3. TF-IDF over cached note content (`lexical`)
//!
//! The first tier with a non-empty answer wins. Tier failures are logged and
//! never reach the caller; the worst outcome is an empty lexical result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::remote::RemoteSearchClient;
use crate::semantic::embeddings::{EmbeddingError, EncoderSource};
use crate::semantic::index::rank_neighbors;
use crate::semantic::lexical::{self, LexicalDoc};
use crate::semantic::paths::{normalize_path, resolve_unique, same_path};
use crate::semantic::store::{StoreError, VectorSource};
use crate::types::{RankedResult, SearchMethod, SearchOutcome};

/// Which tiers a search may use. The lexical tier is always available.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Auto,
    Plugin,
    Files,
}

impl SearchMode {
    pub fn allows_remote(&self) -> bool {
        matches!(self, SearchMode::Auto | SearchMode::Plugin)
    }

    pub fn allows_files(&self) -> bool {
        matches!(self, SearchMode::Auto | SearchMode::Files)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchInput {
    pub query: Option<String>,
    pub from_path: Option<String>,
    pub limit: Option<usize>,
    /// Overrides the configured mode for this call.
    pub mode: Option<SearchMode>,
}

#[cfg(test)]
impl SearchInput {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            from_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Corpus for the lexical tier.
pub trait DocumentSource: Send + Sync {
    /// Every document, in a stable order.
    fn documents(&self) -> Vec<LexicalDoc>;

    /// Look up a note by (possibly partial) path. Returns its canonical path
    /// and content.
    fn resolve(&self, path: &str) -> Option<(String, String)>;
}

/// Fixed in-memory corpus.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticDocuments(pub Vec<LexicalDoc>);

#[cfg(test)]
impl DocumentSource for StaticDocuments {
    fn documents(&self) -> Vec<LexicalDoc> {
        self.0.clone()
    }

    fn resolve(&self, path: &str) -> Option<(String, String)> {
        resolve_unique(&self.0, |d| d.path.as_str(), path).map(|d| (d.path.clone(), d.text.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub mode: SearchMode,
    /// Vector store root. `None` disables the files tier.
    pub embeddings_dir: Option<PathBuf>,
    pub local_query_encoding: bool,
    /// Preferred encoder model; otherwise the store's model is used as hint.
    pub model_hint: Option<String>,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            mode: SearchMode::Auto,
            embeddings_dir: None,
            local_query_encoding: false,
            model_hint: None,
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Why the files tier produced nothing.
#[derive(Debug, thiserror::Error)]
enum FilesSkip {
    #[error("no vector store configured")]
    NoStore,

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("anchor not found in vector store: {0}")]
    AnchorNotFound(String),

    #[error("local query encoding disabled")]
    EncodingDisabled,

    #[error("{0}")]
    Encoding(#[from] EmbeddingError),

    #[error("no results")]
    Empty,

    #[error("worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct QueryRouter {
    settings: RouterSettings,
    remote: Option<RemoteSearchClient>,
    vectors: Arc<dyn VectorSource>,
    encoders: Arc<dyn EncoderSource>,
    documents: Arc<dyn DocumentSource>,
}

impl QueryRouter {
    pub fn new(
        settings: RouterSettings,
        remote: Option<RemoteSearchClient>,
        vectors: Arc<dyn VectorSource>,
        encoders: Arc<dyn EncoderSource>,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            settings,
            remote,
            vectors,
            encoders,
            documents,
        }
    }

    /// Drop the cached vector list and the loaded encoder so the next search
    /// reloads both.
    pub fn invalidate_caches(&self) {
        self.vectors.invalidate();
        self.encoders.invalidate();
        log::info!("vector store and encoder caches invalidated");
    }

    fn clamp_limit(&self, limit: Option<usize>) -> usize {
        let max = self.settings.max_limit.max(1);
        limit.unwrap_or(self.settings.default_limit).clamp(1, max)
    }

    pub async fn search(&self, input: SearchInput) -> SearchOutcome {
        let started = Instant::now();
        let finish = |mut outcome: SearchOutcome| {
            outcome.took_ms = started.elapsed().as_millis() as u64;
            log::debug!(
                "search done: method={} results={} took_ms={}",
                outcome.method.as_str(),
                outcome.results.len(),
                outcome.took_ms
            );
            outcome
        };

        let query = input
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let from_path = input
            .from_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        if query.is_none() && from_path.is_none() {
            return finish(SearchOutcome::empty());
        }

        let limit = self.clamp_limit(input.limit);
        let mode = input.mode.unwrap_or(self.settings.mode);

        if mode.allows_remote() {
            if let Some(query) = query {
                if let Some(results) = self.remote_tier(query, limit).await {
                    return finish(SearchOutcome::new(SearchMethod::Plugin, results));
                }
            }
        }

        if mode.allows_files() {
            match self.files_tier(query, from_path, limit).await {
                Ok(outcome) => return finish(outcome),
                Err(reason) => log::info!("tier=files outcome=fallthrough reason={reason}"),
            }
        }

        finish(self.lexical_tier(query, from_path, limit))
    }

    async fn remote_tier(&self, query: &str, limit: usize) -> Option<Vec<RankedResult>> {
        let Some(remote) = &self.remote else {
            log::debug!("tier=remote outcome=skipped reason=disabled");
            return None;
        };

        match remote.request(query, limit).await {
            Ok(Some(mut results)) if !results.is_empty() => {
                results.truncate(limit);
                Some(results)
            }
            Ok(Some(_)) => {
                log::info!("tier=remote outcome=fallthrough reason=empty");
                None
            }
            Ok(None) => {
                log::info!("tier=remote outcome=fallthrough reason=unavailable");
                None
            }
            Err(e) => {
                log::warn!("tier=remote outcome=fallthrough reason=error: {e}");
                None
            }
        }
    }

    async fn files_tier(
        &self,
        query: Option<&str>,
        from_path: Option<&str>,
        limit: usize,
    ) -> Result<SearchOutcome, FilesSkip> {
        let dir = self.settings.embeddings_dir.clone().ok_or(FilesSkip::NoStore)?;
        if from_path.is_none() && !self.settings.local_query_encoding {
            return Err(FilesSkip::EncodingDisabled);
        }

        let vectors = self.vectors.clone();
        let encoders = self.encoders.clone();
        let model_hint = self.settings.model_hint.clone();
        let query = query.map(str::to_string);
        let from_path = from_path.map(str::to_string);

        // loading, encoding and scoring all block
        tokio::task::spawn_blocking(move || {
            let vectors = vectors.get_or_load(&dir)?;
            let dim = vectors.first().map(|v| v.vec.len()).unwrap_or(0);

            let (results, encoder) = match (from_path, query) {
                (Some(from_path), _) => {
                    let anchor = resolve_unique(vectors.as_slice(), |v| v.note_path.as_str(), &from_path)
                        .ok_or_else(|| FilesSkip::AnchorNotFound(from_path.clone()))?;
                    let results =
                        rank_neighbors(&vectors, &anchor.vec, Some(&anchor.note_path), limit);
                    (results, anchor.model.clone())
                }
                (None, Some(query)) => {
                    let hint = model_hint.or_else(|| vectors.iter().find_map(|v| v.model.clone()));
                    let encoder = encoders.get_or_load(hint.as_deref(), Some(dim))?;
                    if encoder.dimensions() != dim {
                        return Err(FilesSkip::Encoding(EmbeddingError::DimensionMismatch {
                            expected: dim,
                            got: encoder.dimensions(),
                        }));
                    }
                    let query_vec = encoder.encode(&query)?;
                    if query_vec.len() != dim {
                        return Err(FilesSkip::Encoding(EmbeddingError::DimensionMismatch {
                            expected: dim,
                            got: query_vec.len(),
                        }));
                    }
                    let results = rank_neighbors(&vectors, &query_vec, None, limit);
                    (results, Some(encoder.model_name().to_string()))
                }
                (None, None) => return Err(FilesSkip::Empty),
            };

            if results.is_empty() {
                return Err(FilesSkip::Empty);
            }

            Ok(SearchOutcome::new(SearchMethod::Files, results)
                .with_encoder(encoder)
                .with_dim(dim)
                .with_pool_size(vectors.len()))
        })
        .await?
    }

    fn lexical_tier(
        &self,
        query: Option<&str>,
        from_path: Option<&str>,
        limit: usize,
    ) -> SearchOutcome {
        let anchor = from_path.and_then(|p| self.documents.resolve(p));
        let anchor_path = anchor
            .as_ref()
            .map(|(path, _)| path.clone())
            .or_else(|| from_path.map(normalize_path));

        let query_text = match (query, &anchor) {
            (Some(query), _) => query.to_string(),
            (None, Some((_, content))) => content.clone(),
            (None, None) => {
                log::info!("tier=lexical outcome=empty reason=anchor not cached");
                return SearchOutcome::empty();
            }
        };

        let docs = self.documents.documents();
        let results: Vec<RankedResult> = lexical::rank(&query_text, &docs)
            .into_iter()
            .filter(|r| r.score > 0.0)
            .filter(|r| {
                anchor_path
                    .as_deref()
                    .map_or(true, |anchor| !same_path(&r.path, anchor))
            })
            .take(limit)
            .collect();

        SearchOutcome::new(SearchMethod::Lexical, results).with_pool_size(docs.len())
    }
}
