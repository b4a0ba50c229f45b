//! Cosine similarity search over loaded note vectors.
//!
//! Vectors are scored in parallel with rayon; the final sort is stable so
//! equal scores keep store order.

use rayon::prelude::*;

use crate::semantic::paths::normalize_path;
use crate::semantic::preprocess::title_from_path;
use crate::types::{NoteVector, RankedResult};

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm >= f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Cosine similarity in [-1, 1]. Mismatched lengths or zero-norm inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let a_norm = l2_norm(a);
    let b_norm = l2_norm(b);
    if a_norm < f32::EPSILON || b_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let similarity = dot_product / (a_norm * b_norm);
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0)
}

/// Rank `vectors` by similarity to `query`, best first.
///
/// # Arguments
/// * `vectors` - Loaded store
/// * `query` - Query or anchor vector
/// * `exclude` - Note path to leave out (the anchor itself)
/// * `limit` - Maximum results to return
pub fn rank_neighbors(
    vectors: &[NoteVector],
    query: &[f32],
    exclude: Option<&str>,
    limit: usize,
) -> Vec<RankedResult> {
    let exclude = exclude.map(normalize_path);

    let mut results: Vec<RankedResult> = vectors
        .par_iter()
        .filter(|v| v.vec.len() == query.len())
        .filter(|v| {
            exclude
                .as_deref()
                .map_or(true, |ex| normalize_path(&v.note_path) != ex)
        })
        .map(|v| RankedResult {
            path: v.note_path.clone(),
            score: cosine_similarity(query, &v.vec),
            title: v.title.clone().or_else(|| title_from_path(&v.note_path)),
            preview: None,
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);

    results
}
