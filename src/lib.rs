/*!
 * # syncread - sentence/audio synchronization for a read-along reader
 *
 * A Rust library that keeps an article's sentences in step with its narration
 * and lets the reader correct the sentence timestamps.
 *
 * ## Features
 *
 * - Sentence index with document-order adjacency
 * - Full-track or per-part audio sources, with SHA-256 checks for local part files
 * - Single-clip playback scheduling with stale-completion protection
 * - Waveform rendering and click-to-edit sentence boundaries
 * - Proportional redistribution and server-side alignment over a sentence range
 * - Reading location persistence with an autosave threshold
 * - Edge-triggered game controller input
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `sentence_index`: Sentence records, keys and time windows
 * - `audio`: Audio sources and playback:
 *   - `audio::decoder`: Compressed bytes to PCM
 *   - `audio::checksum`: Part digests
 *   - `audio::source`: Full/part source selection and loading
 *   - `audio::playback`: The single-clip scheduler and outputs
 * - `editing`: Timestamp correction:
 *   - `editing::waveform`: Envelope rendering and click gestures
 *   - `editing::timestamps`: Boundary commits and id resolution
 *   - `editing::selection`: Range selection for batch operations
 *   - `editing::batch`: Distribution and alignment over a range
 * - `api`: Article endpoint client and an in-memory mock
 * - `reading_location`: Activation sources and location persistence
 * - `controller`: Game controller adapter
 * - `session`: The reader session tying everything together
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod api;
pub mod app_config;
pub mod audio;
pub mod controller;
pub mod editing;
pub mod errors;
pub mod reading_location;
pub mod sentence_index;
pub mod session;

// Re-export main types for easier usage
pub use app_config::Config;
pub use audio::{AudioSource, AudioSourceManager, DecodedAudio, PlaybackScheduler};
pub use controller::{ControllerAction, ControllerInputAdapter};
pub use editing::WaveformEditor;
pub use errors::{ApiError, EngineError};
pub use reading_location::{ActivationSource, ReadingLocation, ReadingLocationTracker};
pub use sentence_index::{ArticleAnnotations, Direction, Sentence, SentenceIndex, SentenceKey, TimeWindow};
pub use session::ReaderSession;
