//! Arbitration log queries, the per-memory version chain, and rollback of a
//! REPLACE decision.

use crate::app::AppState;
use crate::db::ArbitrationRow;
use crate::error::{Error, Result};
use crate::memory::normalize::{normalize_arbitration_history_input, resolve_owner_id};
use crate::memory::types::{
    ArbitrationHistoryInput, ArbitrationHistoryResponse, ArbitrationRecord, MemoryChainInput,
    MemoryChainResponse, MemoryVersionItem, RollbackInput, RollbackOutput, SearchMetadata,
};
use crate::memory::validate::validate_arbitration_history_input;

/// How many arbitration rows the chain view pulls in.
const CHAIN_ARBITRATION_LIMIT: i64 = 50;

fn to_record(row: ArbitrationRow) -> ArbitrationRecord {
    ArbitrationRecord {
        id: row.id,
        candidate_memory_id: row.candidate_memory_id,
        new_memory_id: row.new_memory_id,
        action: row.action,
        similarity: row.similarity,
        old_summary: row.old_summary,
        new_summary: row.new_summary,
        model: row.model,
        created_at: row.created_at,
    }
}

pub async fn arbitration_history(
    state: &AppState,
    input: ArbitrationHistoryInput,
) -> Result<ArbitrationHistoryResponse> {
    let input = normalize_arbitration_history_input(input, &state.config)?;
    validate_arbitration_history_input(&input)?;

    let project_id = if input.project_key.is_empty() {
        None
    } else {
        state
            .store
            .find_project_id(&input.owner_id, &input.project_key)
            .await
            .map_err(Error::Internal)?
    };

    let rows = state
        .store
        .fetch_arbitration_history(&input.owner_id, &input.memory_id, project_id, input.limit)
        .await
        .map_err(Error::Internal)?;

    let results: Vec<ArbitrationRecord> = rows.into_iter().map(to_record).collect();
    let returned = results.len();
    Ok(ArbitrationHistoryResponse {
        results,
        metadata: SearchMetadata::counted(returned, returned),
    })
}

pub async fn memory_chain(
    state: &AppState,
    input: MemoryChainInput,
) -> Result<MemoryChainResponse> {
    let owner_id = resolve_owner_id(&input.owner_id, &state.config)?;
    let memory_id = input.memory_id.trim().to_string();
    if memory_id.is_empty() {
        return Err(Error::invalid(
            "ERR_INVALID_MEMORY_ID",
            "memory_id is required",
        ));
    }

    let current_summary = state
        .store
        .fetch_memory_summary(&memory_id)
        .await
        .map_err(Error::Internal)?
        .map(|row| row.summary)
        .unwrap_or_default();

    let versions = state
        .store
        .fetch_memory_versions(&memory_id)
        .await
        .map_err(Error::Internal)?
        .into_iter()
        .map(|v| MemoryVersionItem {
            version_id: v.version_id,
            summary: v.summary,
            content_type: v.content_type,
            ts: v.ts,
            replaced_at: v.replaced_at,
        })
        .collect();

    let arbitrations = state
        .store
        .fetch_arbitration_history(&owner_id, &memory_id, None, CHAIN_ARBITRATION_LIMIT)
        .await
        .map_err(Error::Internal)?
        .into_iter()
        .map(to_record)
        .collect();

    Ok(MemoryChainResponse {
        memory_id,
        current_summary,
        versions,
        arbitrations,
    })
}

/// Undo a REPLACE by copying the latest snapshot back over the live row.
/// Fragments are not restored; the snippet corpus may drift from the
/// restored content until the next REPLACE of that memory.
pub async fn rollback(state: &AppState, input: RollbackInput) -> Result<RollbackOutput> {
    resolve_owner_id(&input.owner_id, &state.config)?;
    if input.arbitration_id <= 0 {
        return Err(Error::invalid(
            "ERR_INVALID_ARBITRATION_ID",
            "arbitration_id must be a positive integer",
        ));
    }

    let arbitration = match state
        .store
        .fetch_arbitration_by_id(input.arbitration_id)
        .await
        .map_err(Error::Internal)?
    {
        Some(row) => row,
        None => {
            return Ok(RollbackOutput {
                status: "failed".into(),
                restored_memory_id: String::new(),
                message: "arbitration record not found".into(),
            })
        }
    };

    if arbitration.action != "REPLACE" {
        return Ok(RollbackOutput {
            status: "failed".into(),
            restored_memory_id: String::new(),
            message: "only REPLACE decisions can be rolled back".into(),
        });
    }

    let memory_id = arbitration.candidate_memory_id;
    if memory_id.is_empty() {
        return Ok(RollbackOutput {
            status: "failed".into(),
            restored_memory_id: String::new(),
            message: "arbitration does not name a memory to restore".into(),
        });
    }

    let restored = state
        .store
        .restore_memory_from_latest_version(&memory_id)
        .await
        .map_err(Error::Internal)?;
    if !restored {
        return Ok(RollbackOutput {
            status: "failed".into(),
            restored_memory_id: String::new(),
            message: "no version snapshot available to restore".into(),
        });
    }

    Ok(RollbackOutput {
        status: "success".into(),
        restored_memory_id: memory_id,
        message: "restored to the previous version".into(),
    })
}
