//! Core memory engine — write path ([`ingest`]), read path ([`search`]),
//! version history ([`history`]), and aggregation ([`index`], [`metrics`]).
//!
//! Input shaping lives in [`normalize`] and [`validate`]; type definitions in
//! [`types`]. The helpers below are the vector math shared by ingest and the
//! conflict detector.

pub mod history;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod normalize;
pub mod search;
pub mod types;
pub mod validate;

/// Element-wise mean of a batch of embeddings, at the given dimension.
///
/// Vectors shorter than `dimension` are skipped; an empty batch yields a zero
/// vector so callers can still store a well-typed column.
pub fn average_embedding(embeddings: &[Vec<f32>], dimension: usize) -> Vec<f32> {
    let dimension = if dimension == 0 {
        embeddings.first().map(|v| v.len()).unwrap_or(0)
    } else {
        dimension
    };
    if dimension == 0 {
        return Vec::new();
    }

    let mut sum = vec![0f32; dimension];
    let mut count = 0usize;
    for vec in embeddings {
        if vec.len() < dimension {
            continue;
        }
        for (i, slot) in sum.iter_mut().enumerate() {
            *slot += vec[i];
        }
        count += 1;
    }
    if count == 0 {
        return vec![0f32; dimension];
    }
    for slot in sum.iter_mut() {
        *slot /= count as f32;
    }
    sum
}

/// L2-normalize a vector. Zero vectors pass through unchanged.
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let sum_sq: f64 = vec.iter().map(|v| (*v as f64) * (*v as f64)).sum();
    if sum_sq == 0.0 {
        return vec.to_vec();
    }
    let norm = (1.0 / sum_sq.sqrt()) as f32;
    vec.iter().map(|v| v * norm).collect()
}

/// Cosine distance → similarity, clipped to `[-1, 1]`.
pub fn distance_to_similarity(distance: f64) -> f64 {
    (1.0 - distance).clamp(-1.0, 1.0)
}

/// Clip a configured similarity threshold to `(0, 1]`, defaulting to 0.85.
pub fn semantic_update_threshold(value: f64) -> f64 {
    if value <= 0.0 {
        0.85
    } else if value > 1.0 {
        1.0
    } else {
        value
    }
}

/// Truncate a string to at most `limit` runes.
pub fn truncate_runes(value: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    if value.chars().count() <= limit {
        return value.to_string();
    }
    value.chars().take(limit).collect()
}

/// Generate a fresh memory id: `mem_` + 32 hex.
pub fn new_memory_id() -> String {
    format!("mem_{}", uuid::Uuid::new_v4().simple())
}

/// Generate a fresh fragment id, keyed by chunk index.
pub fn new_fragment_id(index: usize) -> String {
    format!("frag_{}_{index}", uuid::Uuid::new_v4().simple())
}
