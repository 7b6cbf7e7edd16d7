//! Deterministic fixed-size rune chunking with overlap.
//!
//! Content is windowed over runes (not bytes) so multi-byte scripts chunk the
//! same way everywhere. Any non-empty input yields at least one chunk.

use crate::config::ChunkingConfig;

/// Split trimmed content into fixed-size rune windows.
///
/// `max_chars = chunk_size * approx_chars_per_token`; successive windows step
/// by `max_chars - overlap_chars`. An overlap at or above the window size is
/// clamped to a fifth of it. Each window is trimmed and empty windows dropped.
pub fn chunk_content(content: &str, cfg: &ChunkingConfig) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chunk_size = if cfg.chunk_size == 0 { 500 } else { cfg.chunk_size };
    let chars_per_token = if cfg.approx_chars_per_token == 0 {
        4
    } else {
        cfg.approx_chars_per_token
    };

    let max_chars = chunk_size * chars_per_token;
    let mut overlap_chars = cfg.overlap * chars_per_token;
    if overlap_chars >= max_chars {
        overlap_chars = max_chars / 5;
    }

    let runes: Vec<char> = trimmed.chars().collect();
    if runes.len() <= max_chars {
        return vec![trimmed.to_string()];
    }

    let mut step = max_chars - overlap_chars;
    if step == 0 {
        step = max_chars;
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < runes.len() {
        let end = (start + max_chars).min(runes.len());
        let chunk: String = runes[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == runes.len() {
            break;
        }
        start += step;
    }
    chunks
}
