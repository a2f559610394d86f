/*!
 * In-memory article API for tests and offline runs.
 *
 * `MockArticleApi` records every call it receives and can be told to fail
 * specific operations:
 * - `MockArticleApi::new()` - accepts everything
 * - `fail_updates()` / `fail_saves()` / `fail_lookups()` / `fail_downloads()` - reject one kind of call
 * - `hang_saves()` - `save_location` never answers, like a server that stopped responding
 */

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::api::{AlignmentTaskRequest, AlignmentTaskResponse, ArticleApi, TimestampUpdate};
use crate::editing::timestamps::Boundary;
use crate::errors::ApiError;
use crate::reading_location::ReadingLocation;
use crate::sentence_index::SentenceKey;

/// A call received by the mock, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    SaveLocation(ReadingLocation),
    FetchAudioPart(usize),
    UpdateTimestamp {
        sentence_db_id: i64,
        boundary: Boundary,
        new_time_ms: i64,
    },
    BatchUpdate(Vec<TimestampUpdate>),
    ExecuteTask(AlignmentTaskRequest),
    SentenceIdLookup(SentenceKey),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    ids: HashMap<SentenceKey, i64>,
    parts: HashMap<usize, Bytes>,
    task_response: Option<AlignmentTaskResponse>,
    fail_updates: bool,
    fail_saves: bool,
    fail_lookups: bool,
    fail_downloads: bool,
    hang_saves: bool,
}

/// Mock implementation of [`ArticleApi`]
#[derive(Debug, Clone, Default)]
pub struct MockArticleApi {
    state: Arc<Mutex<MockState>>,
}

impl MockArticleApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the id the lookup endpoint answers for a sentence
    pub fn with_sentence_id(self, key: SentenceKey, id: i64) -> Self {
        self.state.lock().ids.insert(key, id);
        self
    }

    /// Register the bytes served for an audio part
    pub fn with_part(self, part_index: usize, bytes: impl Into<Bytes>) -> Self {
        self.state.lock().parts.insert(part_index, bytes.into());
        self
    }

    /// Set the response returned by `execute_task`
    pub fn with_task_response(self, response: AlignmentTaskResponse) -> Self {
        self.state.lock().task_response = Some(response);
        self
    }

    /// Reject single and batch timestamp updates as well as alignment tasks
    pub fn fail_updates(self) -> Self {
        self.state.lock().fail_updates = true;
        self
    }

    pub fn fail_saves(self) -> Self {
        self.state.lock().fail_saves = true;
        self
    }

    pub fn hang_saves(self) -> Self {
        self.state.lock().hang_saves = true;
        self
    }

    pub fn fail_lookups(self) -> Self {
        self.state.lock().fail_lookups = true;
        self
    }

    pub fn fail_downloads(self) -> Self {
        self.state.lock().fail_downloads = true;
        self
    }

    /// Toggle update failures on a shared instance
    pub fn set_fail_updates(&self, fail: bool) {
        self.state.lock().fail_updates = fail;
    }

    /// All calls received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Locations passed to `save_location`, including rejected ones
    pub fn saved_locations(&self) -> Vec<ReadingLocation> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::SaveLocation(location) => Some(*location),
                _ => None,
            })
            .collect()
    }

    /// Number of calls that would modify timestamps on the server
    pub fn update_call_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    RecordedCall::UpdateTimestamp { .. } | RecordedCall::BatchUpdate(_)
                )
            })
            .count()
    }

    pub fn lookup_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::SentenceIdLookup(_)))
            .count()
    }

    fn record(&self, call: RecordedCall) {
        self.state.lock().calls.push(call);
    }

    fn rejected(message: &str) -> ApiError {
        ApiError::Rejected {
            status_code: 500,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ArticleApi for MockArticleApi {
    async fn save_location(&self, location: ReadingLocation) -> Result<(), ApiError> {
        self.record(RecordedCall::SaveLocation(location));
        let (fail, hang) = {
            let state = self.state.lock();
            (state.fail_saves, state.hang_saves)
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        if fail {
            return Err(Self::rejected("Simulated save failure"));
        }
        Ok(())
    }

    async fn fetch_audio_part(&self, part_index: usize) -> Result<Bytes, ApiError> {
        self.record(RecordedCall::FetchAudioPart(part_index));
        let state = self.state.lock();
        if state.fail_downloads {
            return Err(ApiError::ConnectionError("Simulated network failure".to_string()));
        }
        state.parts.get(&part_index).cloned().ok_or(ApiError::Rejected {
            status_code: 404,
            message: format!("No audio part {}", part_index),
        })
    }

    async fn update_timestamp(
        &self,
        sentence_db_id: i64,
        boundary: Boundary,
        new_time_ms: i64,
    ) -> Result<(), ApiError> {
        self.record(RecordedCall::UpdateTimestamp {
            sentence_db_id,
            boundary,
            new_time_ms,
        });
        if self.state.lock().fail_updates {
            return Err(Self::rejected("Simulated update failure"));
        }
        Ok(())
    }

    async fn batch_update_timestamps(&self, updates: &[TimestampUpdate]) -> Result<(), ApiError> {
        self.record(RecordedCall::BatchUpdate(updates.to_vec()));
        if self.state.lock().fail_updates {
            return Err(Self::rejected("Simulated batch failure"));
        }
        Ok(())
    }

    async fn execute_task(
        &self,
        request: &AlignmentTaskRequest,
    ) -> Result<AlignmentTaskResponse, ApiError> {
        self.record(RecordedCall::ExecuteTask(request.clone()));
        let state = self.state.lock();
        if state.fail_updates {
            return Err(Self::rejected("Simulated alignment failure"));
        }
        Ok(state.task_response.clone().unwrap_or(AlignmentTaskResponse {
            status: "success".to_string(),
            message: None,
            updated_sentences: Vec::new(),
        }))
    }

    async fn sentence_id_by_indices(&self, key: SentenceKey) -> Result<i64, ApiError> {
        self.record(RecordedCall::SentenceIdLookup(key));
        let state = self.state.lock();
        if state.fail_lookups {
            return Err(ApiError::ConnectionError("Simulated lookup failure".to_string()));
        }
        state.ids.get(&key).copied().ok_or(ApiError::Rejected {
            status_code: 404,
            message: format!("No sentence at {}", key),
        })
    }
}
