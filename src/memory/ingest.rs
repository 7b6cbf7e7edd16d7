//! The write pipeline: normalize → dedup by hash → summary/tags → chunk +
//! embed → semantic conflict shortlist → LLM arbitration → transactional
//! apply.
//!
//! Identical content within a project is also guarded by a unique
//! (project_id, content_hash) index, so two racing ingests of the same text
//! collapse into one row: the loser of the race observes the unique
//! violation and takes the duplicate path.

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::app::AppState;
use crate::chunking::chunk_content;
use crate::db::{self, ArbitrationInsert, FragmentInsert, MemoryInsert};
use crate::error::{Error, Result};
use crate::llm::{fallback_summary, fallback_tags, Arbitration};
use crate::memory::normalize::normalize_ingest_input;
use crate::memory::types::{IngestMemoryInput, IngestMemoryOutput};
use crate::memory::validate::validate_ingest_input;
use crate::memory::{
    average_embedding, distance_to_similarity, l2_normalize, new_fragment_id, new_memory_id,
    semantic_update_threshold,
};

/// Content at or below this many runes never goes to the LLM.
const SKIP_LLM_RUNE_LIMIT: usize = 120;

/// SHA-256 hex of the raw content.
pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

struct Candidate {
    memory_id: String,
    similarity: f64,
    old_summary: String,
}

pub async fn ingest_memory(
    state: &AppState,
    input: IngestMemoryInput,
) -> Result<IngestMemoryOutput> {
    let now_ts = chrono::Utc::now().timestamp();
    let input = normalize_ingest_input(input, &state.config, now_ts)?;
    validate_ingest_input(&input, now_ts)?;

    let project = state
        .store
        .upsert_project(
            &input.owner_id,
            &input.project_key,
            &input.project_name,
            &input.machine_name,
            &input.project_path,
        )
        .await
        .map_err(Error::Internal)?;

    let content_hash = hash_content(&input.content);
    if let Some(duplicate_id) = state
        .store
        .find_duplicate_memory(project.id, &content_hash)
        .await
        .map_err(Error::Internal)?
    {
        state
            .store
            .update_memory_timestamp(&duplicate_id, input.ts)
            .await
            .map_err(Error::Internal)?;
        return Ok(IngestMemoryOutput {
            id: duplicate_id,
            status: "duplicate".into(),
            ts: input.ts,
        });
    }

    // Summary and tags: client values win, LLM fills the gaps, local
    // fallbacks cover short content and provider failures.
    let mut summary = input.summary.clone();
    let mut tags = input.tags.clone().unwrap_or_default();
    let content_runes = input.content.trim().chars().count();
    let skip_llm = input.skip_llm || content_runes <= SKIP_LLM_RUNE_LIMIT;
    if !skip_llm {
        if summary.is_empty() {
            summary = state.llm.summarize(&input.content).await;
        }
        if tags.is_empty() {
            tags = state.llm.extract_tags(&input.content).await;
        }
    }
    if summary.is_empty() {
        summary = fallback_summary(&input.content);
    }
    if tags.is_empty() {
        tags = fallback_tags(&input.content);
    }

    let chunks = chunk_content(&input.content, &state.config.chunking);
    if chunks.is_empty() {
        return Err(Error::Internal(anyhow::anyhow!("chunking produced no output")));
    }

    let embeddings = state
        .embedder
        .embed_batch(&chunks)
        .await
        .map_err(Error::Internal)?;
    if embeddings.len() != chunks.len() {
        return Err(Error::Internal(anyhow::anyhow!(
            "embedding count {} does not match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }
    let avg_embedding = l2_normalize(&average_embedding(&embeddings, state.embedder.dimension()));

    // Two-stage conflict detection: vector shortlist, then arbitration.
    let mut action = Arbitration::KeepBoth;
    let mut candidate: Option<Candidate> = None;
    if !avg_embedding.is_empty() {
        let threshold =
            semantic_update_threshold(state.config.versioning.semantic_similarity_threshold);
        let max_candidates = state.config.versioning.max_candidates.max(1) as i64;
        let rows = state
            .store
            .search_memory_vectors(&avg_embedding, project.id, max_candidates)
            .await
            .map_err(Error::Internal)?;
        if let Some(best) = rows.first() {
            let similarity = distance_to_similarity(best.distance);
            if similarity >= threshold {
                let old_summary = state
                    .store
                    .fetch_memory_summary(&best.id)
                    .await
                    .ok()
                    .flatten()
                    .map(|row| row.summary)
                    .unwrap_or_default();
                action = if old_summary.is_empty() {
                    // nothing to compare against: overwrite conservatively
                    Arbitration::Replace
                } else {
                    state.llm.arbitrate(&summary, &old_summary).await
                };
                candidate = Some(Candidate {
                    memory_id: best.id.clone(),
                    similarity,
                    old_summary,
                });
            }
        }
    }

    let memory_id = match (&action, &candidate) {
        (Arbitration::Replace | Arbitration::Skip, Some(candidate)) => {
            candidate.memory_id.clone()
        }
        _ => new_memory_id(),
    };

    let arbitration_log = candidate.as_ref().map(|c| ArbitrationInsert {
        owner_id: input.owner_id.clone(),
        project_id: project.id,
        candidate_memory_id: c.memory_id.clone(),
        new_memory_id: memory_id.clone(),
        action: action.as_str().into(),
        similarity: c.similarity,
        old_summary: c.old_summary.clone(),
        new_summary: summary.clone(),
        model: state.config.llm.model_arbitrate.clone(),
    });

    if action == Arbitration::Skip {
        if let Some(log) = &arbitration_log {
            // post-decision logging must not change the response
            if let Err(err) = state.store.insert_arbitration(log).await {
                warn!(error = %err, "failed to log SKIP arbitration");
            }
        }
        info!(id = %memory_id, "ingest skipped by arbitration");
        return Ok(IngestMemoryOutput {
            id: memory_id,
            status: "skipped".into(),
            ts: input.ts,
        });
    }

    let memory = MemoryInsert {
        id: memory_id.clone(),
        project_id: project.id,
        content_type: input.content_type.clone(),
        content: input.content.clone(),
        content_hash,
        ts: input.ts,
        summary,
        tags,
        axes: input.axes.clone(),
        index_path: input.index_path.clone().unwrap_or_default(),
        chunk_count: chunks.len() as i32,
        embedding_done: true,
        avg_embedding,
    };

    let fragments: Vec<FragmentInsert> = chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| FragmentInsert {
            id: new_fragment_id(idx),
            memory_id: memory_id.clone(),
            chunk_index: idx as i32,
            content: chunk.clone(),
            embedding: embeddings[idx].clone(),
        })
        .collect();

    let replacing = action == Arbitration::Replace && candidate.is_some();
    match apply_write(state, &memory, &fragments, arbitration_log.as_ref(), replacing).await {
        Ok(()) => {}
        Err(ApplyError::DuplicateContent) => {
            // lost the race against an identical ingest; fold into its row
            let duplicate_id = state
                .store
                .find_duplicate_memory(project.id, &memory.content_hash)
                .await
                .map_err(Error::Internal)?
                .ok_or_else(|| {
                    Error::Internal(anyhow::anyhow!("duplicate row vanished after conflict"))
                })?;
            state
                .store
                .update_memory_timestamp(&duplicate_id, input.ts)
                .await
                .map_err(Error::Internal)?;
            return Ok(IngestMemoryOutput {
                id: duplicate_id,
                status: "duplicate".into(),
                ts: input.ts,
            });
        }
        Err(ApplyError::Other(err)) => return Err(Error::Internal(err)),
    }

    let status = if replacing { "updated" } else { "created" };
    info!(id = %memory.id, status, project = %project.project_key, "memory ingested");
    Ok(IngestMemoryOutput {
        id: memory.id,
        status: status.into(),
        ts: input.ts,
    })
}

enum ApplyError {
    DuplicateContent,
    Other(anyhow::Error),
}

impl From<anyhow::Error> for ApplyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

/// Apply the arbitration decision in one transaction. Dropping the
/// transaction on any error path rolls everything back.
async fn apply_write(
    state: &AppState,
    memory: &MemoryInsert,
    fragments: &[FragmentInsert],
    arbitration_log: Option<&ArbitrationInsert>,
    replacing: bool,
) -> std::result::Result<(), ApplyError> {
    let mut tx = state.store.begin().await?;

    if replacing {
        state
            .store
            .insert_memory_version_from_memory_tx(&mut tx, &memory.id)
            .await?;
        if let Some(log) = arbitration_log {
            state.store.insert_arbitration_tx(&mut tx, log).await?;
        }
        state.store.update_memory_tx(&mut tx, memory).await?;
        state.store.delete_fragments_tx(&mut tx, &memory.id).await?;
    } else {
        if let Some(log) = arbitration_log {
            state.store.insert_arbitration_tx(&mut tx, log).await?;
        }
        if let Err(err) = state.store.insert_memory_tx(&mut tx, memory).await {
            if db::is_unique_violation(&err) {
                return Err(ApplyError::DuplicateContent);
            }
            return Err(ApplyError::Other(err.into()));
        }
    }

    state.store.insert_fragments_tx(&mut tx, fragments).await?;
    tx.commit()
        .await
        .map_err(|err| ApplyError::Other(anyhow::Error::new(err).context("commit failed")))?;
    Ok(())
}
