//! Ranking and vector infrastructure shared by the retrieval tiers.
//!
//! # Architecture
//!
//! - `embeddings`: Query encoder wrapping fastembed, loaded lazily per model
//! - `index`: Cosine similarity and nearest-neighbor ranking
//! - `lexical`: TF-IDF ranking over note text
//! - `paths`: Path normalization and anchor resolution
//! - `preprocess`: Tokenization, previews, titles
//! - `store`: Tolerant loading of precomputed note vectors, TTL cached

pub mod embeddings;
pub mod index;
pub mod lexical;
pub mod paths;
pub mod preprocess;
pub mod store;
