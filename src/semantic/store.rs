//! Precomputed note vectors read from disk.
//!
//! Vector files come from external indexers, so the reader is tolerant:
//! - `.json` files hold one record, an array of records, or a keyed object
//!   of records
//! - `.ajson` / `.jsonl` / `.ndjson` files hold one record per line, either a
//!   bare object or a `"key": {record},` fragment
//! - the vector may be called `embedding`, `vector`, `vec` or `values`, and may
//!   sit under a per-model map (`"embeddings": {"<model>": {"vec": [..]}}`)
//! - the note path may be called `path`, `notePath`, `filePath` or `uri`
//!
//! Records that do not yield both a path and a numeric vector are skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::semantic::paths::normalize_path;
use crate::types::NoteVector;

/// Scanned in this order; each one non-recursively.
const CANDIDATE_SUBDIRS: &[&str] = &["", "multi", "vectors", "embeddings", "cache"];

const VECTOR_ALIASES: &[&str] = &["embedding", "vector", "vec", "values"];
const PATH_ALIASES: &[&str] = &["path", "notePath", "filePath", "uri"];
const MODEL_MAP_KEYS: &[&str] = &["embeddings", "embedding"];

/// Errors that can occur while loading vectors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no vectors found under {0}")]
    NoVectors(PathBuf),
}

/// Counters from one load, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub files: usize,
    pub records: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub dimension_mismatches: usize,
}

fn numeric_array(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }

    items
        .iter()
        .map(|v| v.as_f64().map(|n| n as f32).filter(|n| n.is_finite()))
        .collect::<Option<Vec<f32>>>()
}

fn vector_in_object(obj: &Map<String, Value>) -> Option<Vec<f32>> {
    VECTOR_ALIASES
        .iter()
        .find_map(|key| obj.get(*key).and_then(numeric_array))
}

/// Pick a vector from a per-model map. The preferred model wins when present,
/// otherwise the first entry (in key order) with a usable vector.
fn vector_in_model_map(
    map: &Map<String, Value>,
    preferred_model: Option<&str>,
) -> Option<(Vec<f32>, String)> {
    let extract = |value: &Value| -> Option<Vec<f32>> {
        numeric_array(value).or_else(|| value.as_object().and_then(vector_in_object))
    };

    if let Some(preferred) = preferred_model {
        if let Some(vec) = map.get(preferred).and_then(extract) {
            return Some((vec, preferred.to_string()));
        }
    }

    map.iter()
        .find_map(|(model, value)| extract(value).map(|vec| (vec, model.clone())))
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        obj.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Turn one JSON record into a [`NoteVector`], or `None` if it lacks a path
/// or a numeric vector.
pub fn normalize_note_vector(value: &Value, preferred_model: Option<&str>) -> Option<NoteVector> {
    let obj = value.as_object()?;

    let note_path = string_field(obj, PATH_ALIASES).map(|p| normalize_path(&p))?;
    if note_path.is_empty() {
        return None;
    }

    let explicit_model = string_field(obj, &["model"]);
    let (vec, map_model) = match vector_in_object(obj) {
        Some(vec) => (vec, None),
        None => {
            let (vec, model) = MODEL_MAP_KEYS.iter().find_map(|key| {
                obj.get(*key)
                    .and_then(Value::as_object)
                    .and_then(|map| vector_in_model_map(map, preferred_model))
            })?;
            (vec, Some(model))
        }
    };

    let tags = obj.get("tags").and_then(Value::as_array).map(|tags| {
        tags.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    Some(NoteVector {
        id: string_field(obj, &["id", "key"]).unwrap_or_else(|| note_path.clone()),
        note_path,
        title: string_field(obj, &["title"]),
        tags,
        model: explicit_model.or(map_model),
        vec,
    })
}

/// Records found in a parsed `.json` document.
fn records_in_document(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(obj) => {
            let as_record = Value::Object(obj);
            if normalize_note_vector(&as_record, None).is_some() {
                return vec![as_record];
            }

            // keyed collection: {"note.md": {..}, ..}
            let Value::Object(obj) = as_record else {
                return vec![];
            };
            if !obj.is_empty() && obj.values().all(Value::is_object) {
                obj.into_iter().map(|(_, v)| v).collect()
            } else {
                vec![Value::Object(obj)]
            }
        }
        _ => vec![],
    }
}

/// Records found in one line of a line-oriented file.
fn records_in_line(line: &str) -> Vec<Value> {
    let line = line.trim().trim_end_matches(',').trim_end();
    if line.is_empty() {
        return vec![];
    }

    let parsed = if line.starts_with('{') {
        serde_json::from_str::<Value>(line)
    } else if line.starts_with('"') {
        serde_json::from_str::<Value>(&format!("{{{line}}}"))
    } else {
        return vec![];
    };

    match parsed {
        Ok(Value::Object(obj)) if line.starts_with('"') => obj.into_iter().map(|(_, v)| v).collect(),
        Ok(value) => vec![value],
        Err(err) => {
            log::debug!("skipping malformed vector line: {err}");
            vec![]
        }
    }
}

fn is_line_oriented(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ajson" | "jsonl" | "ndjson")
    )
}

fn is_vector_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "ajson" | "jsonl" | "ndjson")
    )
}

/// Read all raw records from one file. Unreadable or unparseable files yield
/// nothing.
fn read_records(path: &Path) -> Vec<Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(err) => {
            log::debug!("skipping unreadable vector file {}: {err}", path.display());
            return vec![];
        }
    };

    if is_line_oriented(path) {
        return text.lines().flat_map(records_in_line).collect();
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => records_in_document(value),
        Err(err) => {
            log::debug!("skipping malformed vector file {}: {err}", path.display());
            vec![]
        }
    }
}

fn vector_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_vector_file(path))
            .collect(),
        Err(_) => return vec![],
    };

    files.sort();
    files
}

/// Load every usable vector under `dir`.
///
/// The dimensionality of the first loaded vector is authoritative; records of
/// another size are skipped. The first record seen for a note path wins.
/// Fails if nothing usable was found.
pub fn load_vectors(
    dir: &Path,
    preferred_model: Option<&str>,
) -> Result<(Vec<NoteVector>, LoadStats), StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::NoVectors(dir.to_path_buf()));
    }

    let mut stats = LoadStats::default();
    let mut vectors: Vec<NoteVector> = Vec::new();
    let mut seen_paths: HashSet<String> = HashSet::new();
    let mut dimension: Option<usize> = None;

    for sub in CANDIDATE_SUBDIRS {
        let candidate = if sub.is_empty() {
            dir.to_path_buf()
        } else {
            dir.join(sub)
        };

        for file in vector_files_in(&candidate) {
            stats.files += 1;

            for record in read_records(&file) {
                stats.records += 1;

                let Some(vector) = normalize_note_vector(&record, preferred_model) else {
                    stats.skipped += 1;
                    continue;
                };

                let dim = *dimension.get_or_insert(vector.vec.len());
                if vector.vec.len() != dim {
                    stats.dimension_mismatches += 1;
                    continue;
                }

                if !seen_paths.insert(vector.note_path.clone()) {
                    stats.duplicates += 1;
                    continue;
                }

                vectors.push(vector);
            }
        }
    }

    if vectors.is_empty() {
        return Err(StoreError::NoVectors(dir.to_path_buf()));
    }

    log::info!(
        "loaded {} vectors from {} (files={} skipped={} duplicates={} dim_mismatch={})",
        vectors.len(),
        dir.display(),
        stats.files,
        stats.skipped,
        stats.duplicates,
        stats.dimension_mismatches
    );

    Ok((vectors, stats))
}

/// Shared access to a loaded vector list.
pub trait VectorSource: Send + Sync {
    /// Return vectors for `dir`, loading them if the cache is cold, stale or
    /// for another directory. May block on file I/O.
    fn get_or_load(&self, dir: &Path) -> Result<Arc<Vec<NoteVector>>, StoreError>;

    /// Forget the cached list; the next call reloads.
    fn invalidate(&self);
}

struct LoadedVectors {
    dir: PathBuf,
    loaded_at: Instant,
    vectors: Arc<Vec<NoteVector>>,
}

/// [`VectorSource`] that caches the last load for a TTL.
///
/// The lock is not held while loading. Concurrent reloads may both run; the
/// last one to finish is kept.
pub struct CachedVectorStore {
    ttl: Duration,
    preferred_model: Option<String>,
    state: Mutex<Option<LoadedVectors>>,
}

impl CachedVectorStore {
    /// A zero `ttl` reloads on every call.
    pub fn new(ttl: Duration, preferred_model: Option<String>) -> Self {
        Self {
            ttl,
            preferred_model,
            state: Mutex::new(None),
        }
    }

    fn cached(&self, dir: &Path) -> Option<Arc<Vec<NoteVector>>> {
        let guard = self.state.lock().ok()?;
        let loaded = guard.as_ref()?;

        let fresh = !self.ttl.is_zero() && loaded.loaded_at.elapsed() < self.ttl;
        (loaded.dir.as_path() == dir && fresh).then(|| loaded.vectors.clone())
    }
}

impl VectorSource for CachedVectorStore {
    fn get_or_load(&self, dir: &Path) -> Result<Arc<Vec<NoteVector>>, StoreError> {
        if let Some(vectors) = self.cached(dir) {
            return Ok(vectors);
        }

        let (vectors, _stats) = load_vectors(dir, self.preferred_model.as_deref())?;
        let vectors = Arc::new(vectors);

        if let Ok(mut guard) = self.state.lock() {
            *guard = Some(LoadedVectors {
                dir: dir.to_path_buf(),
                loaded_at: Instant::now(),
                vectors: vectors.clone(),
            });
        }

        Ok(vectors)
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = None;
        }
    }
}
