/*!
 * Error types for the syncread engine.
 *
 * The taxonomy follows the way failures surface to the reader:
 * - `ApiError`: transport or server-side failures of the article endpoints
 * - `EngineError`: everything a component operation can refuse or fail with
 * - `AppError`: top-level wrapper used by the command line front-end
 *
 * All of them are built with the thiserror crate.
 */

use thiserror::Error;

use crate::sentence_index::SentenceKey;

/// Errors that can occur when talking to the article endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request could not be sent or the body could not be read
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// The response body did not have the expected shape
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The server answered with an error status or `{status: "error"}`
    #[error("API responded with error: {status_code} - {message}")]
    Rejected {
        /// HTTP status code
        status_code: u16,
        /// Error message reported by the server
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors produced by the synchronization and editing engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or unsupported audio bytes
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// A local part file did not match its published digest
    #[error("Checksum mismatch for part {}: expected ...{}, got ...{}", .part_index + 1, tail(.expected), tail(.actual))]
    ChecksumMismatch {
        /// Zero-based part index
        part_index: usize,
        /// Digest from the manifest
        expected: String,
        /// Digest of the supplied bytes
        actual: String,
    },

    /// Playback or editing was attempted before a source was ready
    #[error("Audio buffer not loaded")]
    BufferNotLoaded,

    /// An edit or playback window would be empty, inverted or out of bounds
    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    /// The database id of a sentence could not be looked up
    #[error("Could not resolve database id for sentence {key}: {reason}")]
    Resolution {
        /// Sentence whose id was requested
        key: SentenceKey,
        /// Why the lookup failed
        reason: String,
    },

    /// A remote save or update call failed
    #[error("Persistence failed: {0}")]
    Persistence(#[from] ApiError),

    /// Downloading an audio part from the server failed
    #[error("Failed to download audio part {}: {source}", .part_index + 1)]
    Download {
        /// Zero-based part index
        part_index: usize,
        /// Underlying transport error
        source: ApiError,
    },

    /// The audio output refused to start a clip
    #[error("Audio output error: {0}")]
    Output(String),

    /// A sentence key that is not part of the article
    #[error("Sentence {0} is not part of this article")]
    UnknownSentence(SentenceKey),

    /// A part index outside of the article's parts
    #[error("Audio part {index} does not exist (article has {num_parts} parts)")]
    InvalidPartIndex {
        /// Requested zero-based index
        index: usize,
        /// Number of parts the article has
        num_parts: usize,
    },

    /// Parts mode is active but the sentence lives in a part that is not loaded
    #[error("Sentence belongs to audio part {}, but {} is loaded", .needed + 1, describe_part(.loaded))]
    PartNotLoaded {
        /// Zero-based part the sentence needs
        needed: usize,
        /// Zero-based part currently loaded, if any
        loaded: Option<usize>,
    },

    /// The selection range is incomplete or out of document order
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// The game controller could not be read
    #[error("Controller read failed: {0}")]
    Device(String),

    /// The requested edit is not allowed in the current state
    #[error("Edit not permitted: {0}")]
    EditNotPermitted(String),
}

impl EngineError {
    /// Whether the failure should be shown to the reader rather than only logged.
    ///
    /// Low-level window rejections are neutralized with a warning, and unknown
    /// sentences are programming errors that get logged at error level instead.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            EngineError::InvalidTimeWindow(_) | EngineError::UnknownSentence(_)
        )
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the engine
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Error from the article endpoints
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

fn describe_part(part: &Option<usize>) -> String {
    match part {
        Some(index) => format!("part {}", index + 1),
        None => "no part".to_string(),
    }
}

/// Last ten characters of a digest, enough to tell two apart in a message
fn tail(digest: &str) -> &str {
    let start = digest
        .char_indices()
        .rev()
        .nth(9)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &digest[start..]
}
