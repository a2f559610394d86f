/*!
 * Shared id-resolution and commit protocol for timestamp edits.
 *
 * Edits are validated locally before any network call. The sentence is only
 * patched after the server has accepted the change.
 */

use std::fmt;

use futures::future::try_join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::api::{ArticleApi, TimestampUpdate};
use crate::errors::EngineError;
use crate::sentence_index::{Sentence, SentenceIndex, SentenceKey, TimeWindow};

/// Which end of a sentence's range is edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Start,
    End,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Start => write!(f, "start"),
            Boundary::End => write!(f, "end"),
        }
    }
}

/// Full-track window a sentence would have after moving one boundary to `new_time_ms`
pub fn proposed_window(sentence: &Sentence, boundary: Boundary, new_time_ms: i64) -> Result<TimeWindow, EngineError> {
    let current = sentence.full_window()?;
    let proposed = match boundary {
        Boundary::Start => {
            if new_time_ms < 0 {
                return Err(EngineError::InvalidTimeWindow(format!(
                    "start {}ms of {} is negative",
                    new_time_ms, sentence.key
                )));
            }
            (new_time_ms, current.end_ms)
        }
        Boundary::End => (current.start_ms, new_time_ms),
    };
    TimeWindow::new(proposed.0, proposed.1).map_err(|_| {
        EngineError::InvalidTimeWindow(format!(
            "new {} {}ms of {} would leave start {}ms not before end {}ms",
            boundary, new_time_ms, sentence.key, proposed.0, proposed.1
        ))
    })
}

/// Database id of a sentence, looked up and cached on first use
pub async fn resolve_database_id(
    index: &mut SentenceIndex,
    key: SentenceKey,
    api: &dyn ArticleApi,
) -> Result<i64, EngineError> {
    if let Some(id) = index.require(key)?.database_id {
        return Ok(id);
    }
    let id = api
        .sentence_id_by_indices(key)
        .await
        .map_err(|e| EngineError::Resolution {
            key,
            reason: e.to_string(),
        })?;
    debug!("Resolved {} to database id {}", key, id);
    index.require_mut(key)?.database_id = Some(id);
    Ok(id)
}

/// Resolve several ids concurrently.
///
/// Ids are cached only when every lookup succeeded.
pub async fn resolve_database_ids(
    index: &mut SentenceIndex,
    keys: &[SentenceKey],
    api: &dyn ArticleApi,
) -> Result<Vec<i64>, EngineError> {
    let mut missing = Vec::new();
    for &key in keys {
        if index.require(key)?.database_id.is_none() {
            missing.push(key);
        }
    }

    let lookups = missing.iter().map(|&key| async move {
        api.sentence_id_by_indices(key)
            .await
            .map(|id| (key, id))
            .map_err(|e| EngineError::Resolution {
                key,
                reason: e.to_string(),
            })
    });
    let resolved = try_join_all(lookups).await?;
    for (key, id) in resolved {
        index.require_mut(key)?.database_id = Some(id);
    }

    keys.iter()
        .map(|&key| {
            index
                .require(key)?
                .database_id
                .ok_or(EngineError::UnknownSentence(key))
        })
        .collect()
}

/// Move one boundary of a sentence on the server, then locally.
///
/// Returns the sentence's new full-track window.
pub async fn commit_boundary(
    index: &mut SentenceIndex,
    key: SentenceKey,
    boundary: Boundary,
    new_time_ms: i64,
    api: &dyn ArticleApi,
) -> Result<TimeWindow, EngineError> {
    let proposed = proposed_window(index.require(key)?, boundary, new_time_ms).inspect_err(|e| {
        warn!("Rejected edit: {}", e);
    })?;

    let id = resolve_database_id(index, key, api).await?;
    api.update_timestamp(id, boundary, new_time_ms).await?;

    let sentence = index.require_mut(key)?;
    sentence.full_start_ms = proposed.start_ms;
    sentence.full_end_ms = proposed.end_ms;
    info!(
        "Updated {} of {} to {}ms (now {}..{}ms)",
        boundary, key, new_time_ms, proposed.start_ms, proposed.end_ms
    );
    Ok(proposed)
}

/// Patch full-track windows of sentences the server has updated.
///
/// Updates naming an unknown id are skipped. Returns the keys that changed.
pub fn apply_updates(index: &mut SentenceIndex, updates: &[TimestampUpdate]) -> Vec<SentenceKey> {
    let mut patched = Vec::with_capacity(updates.len());
    for update in updates {
        let Some(key) = index.key_for_database_id(update.id) else {
            warn!("Server updated unknown sentence id {}", update.id);
            continue;
        };
        if let Some(sentence) = index.get_mut(key) {
            sentence.full_start_ms = update.new_start_ms;
            sentence.full_end_ms = update.new_end_ms;
            patched.push(key);
        }
    }
    patched
}
