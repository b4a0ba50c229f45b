//! Query encoder backed by fastembed.
//!
//! Provides a high-level interface for turning query text into vectors that
//! can be compared against the precomputed note store:
//! - Model selection from a model hint or the store's dimensionality
//! - Lazy model loading, cached per resolved model
//! - Unit-length output vectors

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::semantic::index::l2_normalize;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Local query encoding is disabled")]
    Disabled,

    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// A model the encoder knows how to load.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: &'static str,
    pub dimensions: usize,
    model: fastembed::EmbeddingModel,
}

/// Default model: small, general purpose, 384 dimensions.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

fn known_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec {
            name: "all-MiniLM-L6-v2",
            dimensions: 384,
            model: fastembed::EmbeddingModel::AllMiniLML6V2,
        },
        ModelSpec {
            name: "bge-small-en-v1.5",
            dimensions: 384,
            model: fastembed::EmbeddingModel::BGESmallENV15,
        },
        ModelSpec {
            name: "bge-base-en-v1.5",
            dimensions: 768,
            model: fastembed::EmbeddingModel::BGEBaseENV15,
        },
        ModelSpec {
            name: "bge-large-en-v1.5",
            dimensions: 1024,
            model: fastembed::EmbeddingModel::BGELargeENV15,
        },
        ModelSpec {
            name: "multilingual-e5-small",
            dimensions: 384,
            model: fastembed::EmbeddingModel::MultilingualE5Small,
        },
        ModelSpec {
            name: "multilingual-e5-base",
            dimensions: 768,
            model: fastembed::EmbeddingModel::MultilingualE5Base,
        },
        ModelSpec {
            name: "multilingual-e5-large",
            dimensions: 1024,
            model: fastembed::EmbeddingModel::MultilingualE5Large,
        },
    ]
}

fn find_model(name: &str) -> ModelSpec {
    let models = known_models();
    let fallback = models[0].clone();
    models
        .into_iter()
        .find(|m| m.name == name)
        .unwrap_or(fallback)
}

/// Pick a model name from a hint and/or a target dimensionality.
///
/// Hint substrings are matched first (`e5`, `bge`, `minilm`, and the
/// `small`/`base`/`large` size words). Without a usable hint the dimension
/// decides: 768 maps to a base model, 1024 to a large one. Everything else
/// gets the default small model.
pub fn resolve_model_name(hint: Option<&str>, dimension: Option<usize>) -> &'static str {
    if let Some(hint) = hint {
        let hint = hint.to_lowercase();
        let size = if hint.contains("large") {
            Some("large")
        } else if hint.contains("base") {
            Some("base")
        } else if hint.contains("small") {
            Some("small")
        } else {
            None
        };

        if hint.contains("e5") {
            return match size {
                Some("large") => "multilingual-e5-large",
                Some("base") => "multilingual-e5-base",
                _ => "multilingual-e5-small",
            };
        }
        if hint.contains("minilm") {
            return "all-MiniLM-L6-v2";
        }
        if hint.contains("bge") || size.is_some() {
            match size {
                Some("large") => return "bge-large-en-v1.5",
                Some("base") => return "bge-base-en-v1.5",
                Some("small") => return "bge-small-en-v1.5",
                // a family without a size: let the dimension pick it
                _ => {}
            }
        }
    }

    match dimension {
        Some(768) => "bge-base-en-v1.5",
        Some(1024) => "bge-large-en-v1.5",
        _ => DEFAULT_MODEL,
    }
}

/// Resolve a full [`ModelSpec`], see [`resolve_model_name`].
pub fn resolve_model(hint: Option<&str>, dimension: Option<usize>) -> ModelSpec {
    find_model(resolve_model_name(hint, dimension))
}

/// Something that turns text into a fixed-length vector.
pub trait TextEncoder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Lazily loaded encoder, swapped when a different model is needed.
pub trait EncoderSource: Send + Sync {
    /// Return the encoder for the resolved model, loading it if needed.
    /// May block while a model downloads.
    fn get_or_load(
        &self,
        model_hint: Option<&str>,
        dimension: Option<usize>,
    ) -> Result<Arc<dyn TextEncoder>, EmbeddingError>;

    /// Drop the cached encoder.
    fn invalidate(&self);
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct FastembedEncoder {
    model: Mutex<TextEmbedding>,
    spec: ModelSpec,
}

impl FastembedEncoder {
    /// Load a model, downloading it into `cache_dir` on first use.
    pub fn new(spec: ModelSpec, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("loading embedding model '{}'", spec.name);
        let options = InitOptions::new(spec.model.clone())
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(model),
            spec,
        })
    }
}

impl TextEncoder for FastembedEncoder {
    fn model_name(&self) -> &str {
        self.spec.name
    }

    fn dimensions(&self) -> usize {
        self.spec.dimensions
    }

    /// fastembed mean-pools token embeddings; the result is re-normalized to
    /// unit length here.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))?;

        if embedding.len() != self.spec.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.spec.dimensions,
                got: embedding.len(),
            });
        }

        Ok(l2_normalize(embedding))
    }
}

/// [`EncoderSource`] that keeps one fastembed model in memory.
pub struct FastembedEncoderSource {
    enabled: bool,
    cache_dir: PathBuf,
    current: Mutex<Option<Arc<FastembedEncoder>>>,
}

impl FastembedEncoderSource {
    pub fn new(enabled: bool, cache_dir: PathBuf) -> Self {
        Self {
            enabled,
            cache_dir,
            current: Mutex::new(None),
        }
    }

    /// Name of the currently loaded model, if any.
    #[cfg(test)]
    pub fn loaded_model(&self) -> Option<&'static str> {
        self.current
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|e| e.spec.name))
    }
}

impl EncoderSource for FastembedEncoderSource {
    fn get_or_load(
        &self,
        model_hint: Option<&str>,
        dimension: Option<usize>,
    ) -> Result<Arc<dyn TextEncoder>, EmbeddingError> {
        if !self.enabled {
            return Err(EmbeddingError::Disabled);
        }

        let spec = resolve_model(model_hint, dimension);
        let mut guard = self.current.lock().map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to acquire encoder lock: {}", e))
        })?;

        if let Some(encoder) = guard.as_ref() {
            if encoder.spec.name == spec.name {
                return Ok(encoder.clone());
            }
            log::info!(
                "switching embedding model '{}' -> '{}'",
                encoder.spec.name,
                spec.name
            );
        }

        let encoder = Arc::new(FastembedEncoder::new(spec, self.cache_dir.clone())?);
        *guard = Some(encoder.clone());

        Ok(encoder)
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = None;
        }
    }
}
