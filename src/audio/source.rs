use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::api::ArticleApi;
use crate::audio::checksum::{self, ChecksumManifest};
use crate::audio::playback::{PlaybackRequest, PlaybackScheduler};
use crate::audio::{AudioDecoder, DecodedAudio};
use crate::errors::EngineError;
use crate::sentence_index::Sentence;

/// Which audio track is current
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// One track covering the entire article
    Full,
    /// One of the independently downloadable parts
    Part(usize),
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Full => write!(f, "full track"),
            AudioSource::Part(index) => write!(f, "part {}", index + 1),
        }
    }
}

/// Owns the single decoded buffer and the active-source tag.
///
/// Every operation that replaces or discards the buffer stops playback first.
#[derive(Debug)]
pub struct AudioSourceManager {
    decoder: Arc<dyn AudioDecoder>,
    manifest: ChecksumManifest,
    num_parts: usize,
    active: Option<AudioSource>,
    buffer: Option<Arc<DecodedAudio>>,
}

impl AudioSourceManager {
    pub fn new(decoder: Arc<dyn AudioDecoder>, manifest: ChecksumManifest, num_parts: usize) -> Self {
        Self {
            decoder,
            manifest,
            num_parts,
            active: None,
            buffer: None,
        }
    }

    pub fn num_parts(&self) -> usize {
        self.num_parts
    }

    pub fn manifest(&self) -> &ChecksumManifest {
        &self.manifest
    }

    /// Switch to the full track, discarding any buffer
    pub fn activate_full(&mut self, playback: &mut PlaybackScheduler) {
        self.switch(AudioSource::Full, playback);
    }

    /// Switch to one part, discarding any buffer
    pub fn activate_part(&mut self, part_index: usize, playback: &mut PlaybackScheduler) -> Result<(), EngineError> {
        self.check_part(part_index)?;
        self.switch(AudioSource::Part(part_index), playback);
        Ok(())
    }

    fn switch(&mut self, source: AudioSource, playback: &mut PlaybackScheduler) {
        playback.stop();
        if self.buffer.take().is_some() {
            debug!("Discarded buffer of {:?}", self.active);
        }
        info!("Active audio source: {}", source);
        self.active = Some(source);
    }

    fn check_part(&self, part_index: usize) -> Result<(), EngineError> {
        if part_index >= self.num_parts {
            return Err(EngineError::InvalidPartIndex {
                index: part_index,
                num_parts: self.num_parts,
            });
        }
        Ok(())
    }

    /// Decode bytes into the buffer of the active source.
    ///
    /// Playback is stopped and the old buffer dropped before decoding; on failure
    /// the buffer stays empty. With no source active the full track is assumed.
    pub async fn load_from_bytes(
        &mut self,
        bytes: Bytes,
        playback: &mut PlaybackScheduler,
    ) -> Result<Arc<DecodedAudio>, EngineError> {
        playback.stop();
        self.buffer = None;
        let source = *self.active.get_or_insert(AudioSource::Full);

        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| EngineError::Decode(format!("decoder task panicked: {}", e)))??;

        info!(
            "Loaded {} ({:.1}s, {} Hz)",
            source,
            decoded.duration_ms() / 1000.0,
            decoded.sample_rate()
        );
        let decoded = Arc::new(decoded);
        self.buffer = Some(Arc::clone(&decoded));
        Ok(decoded)
    }

    /// Load a part from a local file, verifying it against `expected` when given.
    ///
    /// A mismatch aborts the load with the buffer left empty.
    pub async fn load_part_from_bytes_with_checksum(
        &mut self,
        bytes: Bytes,
        part_index: usize,
        expected: Option<&str>,
        playback: &mut PlaybackScheduler,
    ) -> Result<Arc<DecodedAudio>, EngineError> {
        self.activate_part(part_index, playback)?;

        match expected {
            Some(expected) => {
                let hashed = bytes.clone();
                let expected = expected.to_string();
                tokio::task::spawn_blocking(move || checksum::verify(part_index, &hashed, &expected))
                    .await
                    .map_err(|e| EngineError::Decode(format!("hashing task panicked: {}", e)))?
                    .inspect_err(|_| {
                        warn!("Rejected local file for part {}: checksum mismatch", part_index + 1)
                    })?;
                debug!("Checksum verified for part {}", part_index + 1);
            }
            None => warn!(
                "No checksum configured for part {}, loading unverified",
                part_index + 1
            ),
        }

        self.load_from_bytes(bytes, playback).await
    }

    /// Load a user-supplied part file, verified against the article's manifest
    pub async fn load_local_part(
        &mut self,
        bytes: Bytes,
        part_index: usize,
        playback: &mut PlaybackScheduler,
    ) -> Result<Arc<DecodedAudio>, EngineError> {
        let expected = self.manifest.expected_for(part_index).map(str::to_string);
        self.load_part_from_bytes_with_checksum(bytes, part_index, expected.as_deref(), playback)
            .await
    }

    /// Download a part from the server and load it; served files are trusted
    pub async fn fetch_part(
        &mut self,
        part_index: usize,
        api: &dyn ArticleApi,
        playback: &mut PlaybackScheduler,
    ) -> Result<Arc<DecodedAudio>, EngineError> {
        self.activate_part(part_index, playback)?;
        let bytes = api
            .fetch_audio_part(part_index)
            .await
            .map_err(|source| EngineError::Download { part_index, source })?;
        self.load_from_bytes(bytes, playback).await
    }

    /// The loaded buffer, if any
    pub fn current(&self) -> Option<&Arc<DecodedAudio>> {
        self.buffer.as_ref()
    }

    /// Source of the loaded buffer; `None` while nothing is loaded
    pub fn current_source_kind(&self) -> Option<AudioSource> {
        self.buffer.as_ref().and(self.active)
    }

    /// Selected source, loaded or not
    pub fn active_source(&self) -> Option<AudioSource> {
        self.active
    }

    pub fn loaded_part_index(&self) -> Option<usize> {
        match self.current_source_kind() {
            Some(AudioSource::Part(index)) => Some(index),
            _ => None,
        }
    }

    /// How a sentence would be played from the loaded buffer
    pub fn request_for(&self, sentence: &Sentence) -> Result<PlaybackRequest, EngineError> {
        match self.current_source_kind() {
            None => Err(EngineError::BufferNotLoaded),
            Some(AudioSource::Full) => Ok(PlaybackRequest::full()),
            Some(AudioSource::Part(loaded)) => match sentence.part_index {
                Some(needed) if needed == loaded => Ok(PlaybackRequest::part()),
                Some(needed) => Err(EngineError::PartNotLoaded {
                    needed,
                    loaded: Some(loaded),
                }),
                None => Err(EngineError::InvalidTimeWindow(format!(
                    "sentence {} has no part timing",
                    sentence.key
                ))),
            },
        }
    }
}
