use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{
    AlignmentTaskRequest, AlignmentTaskResponse, ArticleApi, BatchUpdateRequest,
    SentenceIdResponse, StatusMessage, TimestampUpdate, TimestampUpdateRequest,
};
use crate::editing::timestamps::Boundary;
use crate::errors::ApiError;
use crate::reading_location::ReadingLocation;
use crate::sentence_index::SentenceKey;

/// HTTP client for the article endpoints of one article
#[derive(Debug, Clone)]
pub struct HttpArticleApi {
    /// HTTP client for API requests
    client: Client,
    /// Server root, e.g. `http://localhost:5000/`
    base_url: Url,
    /// Article all requests are scoped to
    article_id: i64,
}

impl HttpArticleApi {
    /// Create a new client
    pub fn new(base_url: &str, article_id: i64, timeout_secs: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self::with_client(base_url, article_id, client)
    }

    /// Create a client around a preconfigured `reqwest::Client`
    pub fn with_client(base_url: &str, article_id: i64, client: Client) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ApiError::ConnectionError(format!("Invalid base URL '{}': {}", base_url, e)))?;
        // join() replaces the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            article_id,
        })
    }

    pub fn article_id(&self) -> i64 {
        self.article_id
    }

    /// Absolute URL of an article-scoped endpoint
    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(&format!("article/{}/{}", self.article_id, path))
            .map_err(|e| ApiError::ConnectionError(format!("Invalid endpoint '{}': {}", path, e)))
    }

    /// Streaming URL of an audio part
    pub fn part_url(&self, part_index: usize) -> Result<Url, ApiError> {
        self.endpoint(&format!("serve_mp3_part/{}", part_index))
    }

    /// URL that makes the server send the part as an attachment
    pub fn part_download_url(&self, part_index: usize) -> Result<Url, ApiError> {
        let mut url = self.part_url(part_index)?;
        url.query_pairs_mut().append_pair("download", "true");
        Ok(url)
    }

    /// Download an audio part as an attachment, for saving to a local file
    pub async fn download_part(&self, part_index: usize) -> Result<Bytes, ApiError> {
        let url = self.part_download_url(part_index)?;
        self.get_part_bytes(url, part_index).await
    }

    async fn get_part_bytes(&self, url: Url, part_index: usize) -> Result<Bytes, ApiError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(format!("Failed to download part {}: {}", part_index + 1, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Rejected {
                status_code: status.as_u16(),
                message: format!("Server refused audio part {}", part_index + 1),
            });
        }
        response
            .bytes()
            .await
            .map_err(|e| ApiError::ConnectionError(format!("Failed to read part {}: {}", part_index + 1, e)))
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(format!("Failed to send request to {}: {}", path, e)))?;
        Self::read_json(path, response).await
    }

    async fn read_json<R: DeserializeOwned>(path: &str, response: Response) -> Result<R, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            let message = serde_json::from_str::<StatusMessage>(&error_text)
                .ok()
                .and_then(|m| m.message)
                .unwrap_or(error_text);
            error!("Article API error on {} ({}): {}", path, status, message);
            return Err(ApiError::Rejected {
                status_code: status.as_u16(),
                message,
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::ParseError(format!("Failed to parse response of {}: {}", path, e)))
    }

    /// Turn a `{status, message}` envelope into a result
    fn check_status(status: StatusMessage) -> Result<(), ApiError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                status_code: 200,
                message: status
                    .message
                    .unwrap_or_else(|| "Server reported an error".to_string()),
            })
        }
    }
}

#[async_trait]
impl ArticleApi for HttpArticleApi {
    async fn save_location(&self, location: ReadingLocation) -> Result<(), ApiError> {
        let status: StatusMessage = self.post_json("save_location", &location).await?;
        Self::check_status(status)
    }

    async fn fetch_audio_part(&self, part_index: usize) -> Result<Bytes, ApiError> {
        let url = self.part_url(part_index)?;
        self.get_part_bytes(url, part_index).await
    }

    async fn update_timestamp(
        &self,
        sentence_db_id: i64,
        boundary: Boundary,
        new_time_ms: i64,
    ) -> Result<(), ApiError> {
        let body = TimestampUpdateRequest {
            timestamp_type: boundary,
            new_time_ms,
        };
        let path = format!("sentence/{}/update_timestamp", sentence_db_id);
        let status: StatusMessage = self.post_json(&path, &body).await?;
        Self::check_status(status)
    }

    async fn batch_update_timestamps(&self, updates: &[TimestampUpdate]) -> Result<(), ApiError> {
        let body = BatchUpdateRequest {
            updates: updates.to_vec(),
        };
        let status: StatusMessage = self.post_json("batch_update_timestamps", &body).await?;
        Self::check_status(status)
    }

    async fn execute_task(
        &self,
        request: &AlignmentTaskRequest,
    ) -> Result<AlignmentTaskResponse, ApiError> {
        let response: AlignmentTaskResponse = self.post_json("execute_task", request).await?;
        if response.status != "success" {
            return Err(ApiError::Rejected {
                status_code: 200,
                message: response
                    .message
                    .unwrap_or_else(|| "Alignment task failed".to_string()),
            });
        }
        Ok(response)
    }

    async fn sentence_id_by_indices(&self, key: SentenceKey) -> Result<i64, ApiError> {
        let mut url = self.endpoint("get_sentence_id_by_indices")?;
        url.query_pairs_mut()
            .append_pair("paragraph_index", &key.paragraph_index.to_string())
            .append_pair("sentence_index", &key.sentence_index.to_string());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(format!("Failed to look up id of {}: {}", key, e)))?;
        let body: SentenceIdResponse = Self::read_json("get_sentence_id_by_indices", response).await?;
        body.sentence_db_id
            .ok_or_else(|| ApiError::ParseError(format!("Id missing in lookup response for {}", key)))
    }
}
