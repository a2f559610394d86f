/*!
 * Clients for the article endpoints.
 *
 * The engine talks to the server only through the [`ArticleApi`] trait:
 * - `http`: reqwest-backed client used by the command line front-end
 * - `mock`: in-memory implementation that records calls, used by tests
 */

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::editing::timestamps::Boundary;
use crate::errors::ApiError;
use crate::reading_location::ReadingLocation;
use crate::sentence_index::SentenceKey;

/// Common status envelope returned by every mutating endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    /// `"success"` or `"error"`
    pub status: String,
    /// Optional human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusMessage {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Body of a single boundary update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampUpdateRequest {
    pub timestamp_type: Boundary,
    pub new_time_ms: i64,
}

/// One entry of a batch timestamp update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampUpdate {
    /// Database id of the sentence
    pub id: i64,
    pub new_start_ms: i64,
    pub new_end_ms: i64,
}

/// Body of a batch update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub updates: Vec<TimestampUpdate>,
}

/// Sentence payload sent along with an alignment task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSentence {
    pub id: i64,
    pub text: String,
}

/// Server-side forced alignment over a window of the full track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTaskRequest {
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub sentences_data: Vec<TaskSentence>,
}

/// Result of an alignment task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignmentTaskResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_sentences: Vec<TimestampUpdate>,
}

/// Answer of the id lookup endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceIdResponse {
    pub sentence_db_id: Option<i64>,
}

/// Remote operations the engine depends on
///
/// All calls are scoped to a single article; implementations carry the article id.
#[async_trait]
pub trait ArticleApi: Send + Sync + Debug {
    /// Persist the reader's current location
    async fn save_location(&self, location: ReadingLocation) -> Result<(), ApiError>;

    /// Fetch the bytes of one audio part
    async fn fetch_audio_part(&self, part_index: usize) -> Result<Bytes, ApiError>;

    /// Update one boundary of a sentence, in full-track milliseconds
    async fn update_timestamp(
        &self,
        sentence_db_id: i64,
        boundary: Boundary,
        new_time_ms: i64,
    ) -> Result<(), ApiError>;

    /// Apply several updates at once; the server applies all or none
    async fn batch_update_timestamps(&self, updates: &[TimestampUpdate]) -> Result<(), ApiError>;

    /// Run forced alignment over a window of the full track
    async fn execute_task(
        &self,
        request: &AlignmentTaskRequest,
    ) -> Result<AlignmentTaskResponse, ApiError>;

    /// Look up the database id of a sentence by its position
    async fn sentence_id_by_indices(&self, key: SentenceKey) -> Result<i64, ApiError>;
}

pub mod http;
pub mod mock;
