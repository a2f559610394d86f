/*!
 * Batch re-timing of a contiguous sentence run.
 *
 * `distribute` splits the ending sentence's window evenly over the run.
 * `execute_alignment_task` hands the run to the server-side aligner instead.
 * Both leave the index untouched unless the server accepts the whole batch.
 */

use log::{info, warn};

use crate::api::{AlignmentTaskRequest, ArticleApi, TaskSentence, TimestampUpdate};
use crate::editing::timestamps::{apply_updates, resolve_database_ids};
use crate::errors::EngineError;
use crate::sentence_index::{Direction, SentenceIndex, SentenceKey, TimeWindow};

/// Window assigned to one sentence of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWindow {
    pub key: SentenceKey,
    pub window: TimeWindow,
}

/// Inclusive run from `beginning` to `ending`, walked with non-wrapping adjacency
pub fn collect_run(
    index: &SentenceIndex,
    beginning: SentenceKey,
    ending: SentenceKey,
) -> Result<Vec<SentenceKey>, EngineError> {
    let mut run = vec![index.require(beginning)?.key];
    let mut cursor = beginning;
    while cursor != ending {
        match index.adjacent(cursor, Direction::Next) {
            Some(next) => {
                cursor = next.key;
                run.push(cursor);
            }
            None => {
                return Err(EngineError::InvalidSelection(format!(
                    "ending {} is not reachable from beginning {}",
                    ending, beginning
                )))
            }
        }
    }
    Ok(run)
}

/// Split `reference` over `run` in order.
///
/// Each window is rounded to the millisecond and the next one starts where the
/// previous rounded window ended; the last window always ends at `reference.end_ms`.
pub fn split_window(reference: TimeWindow, run: &[SentenceKey]) -> Result<Vec<PlannedWindow>, EngineError> {
    if run.is_empty() {
        return Err(EngineError::InvalidSelection("no sentences to distribute".to_string()));
    }
    let per_sentence = reference.duration_ms() as f64 / run.len() as f64;
    let mut cursor = reference.start_ms;
    let mut planned = Vec::with_capacity(run.len());
    for (i, &key) in run.iter().enumerate() {
        let end = if i + 1 == run.len() {
            reference.end_ms
        } else {
            (cursor as f64 + per_sentence).round() as i64
        };
        let window = TimeWindow::new(cursor, end).map_err(|_| {
            EngineError::InvalidTimeWindow(format!(
                "{}ms is too short to give each of {} sentences a window",
                reference.duration_ms(),
                run.len()
            ))
        })?;
        planned.push(PlannedWindow { key, window });
        cursor = end;
    }
    Ok(planned)
}

/// Compute the distribution without touching anything
pub fn plan_distribution(
    index: &SentenceIndex,
    beginning: SentenceKey,
    ending: SentenceKey,
) -> Result<Vec<PlannedWindow>, EngineError> {
    let reference = index.require(ending)?.full_window()?;
    let run = collect_run(index, beginning, ending)?;
    split_window(reference, &run)
}

/// Distribute the ending sentence's window over the run and commit it as one batch
pub async fn distribute(
    index: &mut SentenceIndex,
    beginning: SentenceKey,
    ending: SentenceKey,
    api: &dyn ArticleApi,
) -> Result<Vec<TimestampUpdate>, EngineError> {
    let planned = plan_distribution(index, beginning, ending)?;
    let keys: Vec<SentenceKey> = planned.iter().map(|p| p.key).collect();
    let ids = resolve_database_ids(index, &keys, api).await?;

    let updates: Vec<TimestampUpdate> = planned
        .iter()
        .zip(ids)
        .map(|(p, id)| TimestampUpdate {
            id,
            new_start_ms: p.window.start_ms,
            new_end_ms: p.window.end_ms,
        })
        .collect();

    api.batch_update_timestamps(&updates).await.inspect_err(|e| {
        warn!("Batch update of {} sentences failed: {}", updates.len(), e);
    })?;

    let patched = apply_updates(index, &updates);
    info!(
        "Distributed {}..{}ms over {} sentences ({} to {})",
        planned[0].window.start_ms,
        planned[planned.len() - 1].window.end_ms,
        patched.len(),
        beginning,
        ending
    );
    Ok(updates)
}

/// Ask the server to align the run's text against `[beginning.start, ending.end)`
/// and apply whatever windows it returns
pub async fn execute_alignment_task(
    index: &mut SentenceIndex,
    beginning: SentenceKey,
    ending: SentenceKey,
    api: &dyn ArticleApi,
) -> Result<Vec<TimestampUpdate>, EngineError> {
    let run = collect_run(index, beginning, ending)?;
    let window = TimeWindow::new(
        index.require(beginning)?.full_start_ms,
        index.require(ending)?.full_end_ms,
    )?;
    let ids = resolve_database_ids(index, &run, api).await?;

    let mut sentences_data = Vec::with_capacity(run.len());
    for (&key, id) in run.iter().zip(ids) {
        sentences_data.push(TaskSentence {
            id,
            text: index.require(key)?.text.clone(),
        });
    }
    let request = AlignmentTaskRequest {
        start_time_ms: window.start_ms,
        end_time_ms: window.end_ms,
        sentences_data,
    };

    let response = api.execute_task(&request).await?;
    let patched = apply_updates(index, &response.updated_sentences);
    info!(
        "Alignment task over {}..{}ms updated {} of {} sentences",
        window.start_ms,
        window.end_ms,
        patched.len(),
        run.len()
    );
    Ok(response.updated_sentences)
}
