/*!
 * Common test utilities for the syncread test suite
 */

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use syncread::api::mock::MockArticleApi;
use syncread::audio::checksum::sha256_hex;
use syncread::audio::playback::NullOutput;
use syncread::audio::SymphoniaDecoder;
use syncread::controller::ControllerDevice;
use syncread::editing::waveform::RecordingSurface;
use syncread::errors::EngineError;
use syncread::reading_location::ReadingLocation;
use syncread::sentence_index::AnnotatedSentence;
use syncread::{ArticleAnnotations, Config, ReaderSession, SentenceIndex, SentenceKey};

/// Sample rate of every generated test file
pub const SAMPLE_RATE: u32 = 8_000;

/// Route engine logs through env_logger once per test binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    std::fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Encode mono samples as a 16-bit WAV file in memory
pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Bytes {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer
                .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

/// A WAV file whose amplitude steps up by 0.1 every second
pub fn stepped_wav(duration_ms: u64) -> Bytes {
    let frames = (duration_ms * SAMPLE_RATE as u64 / 1000) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|i| {
            let second = i / SAMPLE_RATE as usize;
            let level = 0.1 * (second + 1) as f32;
            if i % 2 == 0 { level } else { -level }
        })
        .collect();
    wav_bytes(&samples, SAMPLE_RATE)
}

fn sentence(paragraph: usize, index: usize, id: i64, start: i64, end: i64, part: usize, part_start: i64) -> AnnotatedSentence {
    AnnotatedSentence {
        paragraph_index: paragraph,
        sentence_index: index,
        sentence_db_id: None,
        text: format!("Paragraph {} sentence {} with a few words.", paragraph, index),
        translation: format!("Translation {}", id),
        start_time_ms: start,
        end_time_ms: end,
        audio_part_index: Some(part),
        start_time_in_part_ms: Some(part_start),
        end_time_in_part_ms: Some(part_start + (end - start)),
    }
}

/// Database id the sample article gives a sentence
pub fn sample_id(key: SentenceKey) -> i64 {
    100 + (key.paragraph_index * 10 + key.sentence_index) as i64
}

/// Five sentences in two paragraphs over six seconds, split into two parts.
///
/// Part 0 holds P0 (0..3000ms), part 1 holds P1 (3000..6000ms).
pub fn sample_annotations() -> ArticleAnnotations {
    ArticleAnnotations {
        article_id: 42,
        has_timestamps: true,
        num_audio_parts: 2,
        audio_part_checksums: None,
        initial_location: Some(ReadingLocation {
            paragraph_index: 1,
            sentence_index_in_paragraph: 0,
        }),
        sentences: vec![
            sentence(0, 0, 100, 0, 1000, 0, 0),
            sentence(0, 1, 101, 1000, 2000, 0, 1000),
            sentence(0, 2, 102, 2000, 3000, 0, 2000),
            sentence(1, 0, 110, 3000, 4500, 1, 0),
            sentence(1, 1, 111, 4500, 6000, 1, 1500),
        ],
    }
}

pub fn sample_index() -> SentenceIndex {
    SentenceIndex::from_annotations(&sample_annotations()).unwrap()
}

/// Mock server that knows every sample sentence's id
pub fn sample_api() -> MockArticleApi {
    sample_index()
        .all()
        .iter()
        .fold(MockArticleApi::new(), |api, s| api.with_sentence_id(s.key, sample_id(s.key)))
}

/// Annotations whose manifest matches `parts`
pub fn annotations_with_checksums(parts: &[&[u8]]) -> ArticleAnnotations {
    let manifest = parts.iter().map(|p| sha256_hex(p)).collect::<Vec<_>>().join(";");
    ArticleAnnotations {
        audio_part_checksums: Some(manifest),
        ..sample_annotations()
    }
}

/// Session over the sample article with a recording output and surface
pub fn sample_session(api: MockArticleApi, annotations: &ArticleAnnotations) -> (ReaderSession, NullOutput) {
    init_logging();
    let output = NullOutput::new();
    let session = ReaderSession::new(
        Config::default(),
        annotations,
        Arc::new(api),
        Arc::new(SymphoniaDecoder),
        Box::new(output.clone()),
        Box::new(RecordingSurface::new()),
    )
    .unwrap();
    (session, output)
}

/// Controller that replays button frames, then reports itself unplugged
#[derive(Debug, Clone, Default)]
pub struct ScriptedController {
    frames: Arc<Mutex<VecDeque<Vec<bool>>>>,
}

impl ScriptedController {
    pub fn new(frames: Vec<Vec<bool>>) -> Self {
        Self {
            frames: Arc::new(Mutex::new(frames.into())),
        }
    }

    /// Buttons in `pressed` held down, four buttons total
    pub fn frame(pressed: &[usize]) -> Vec<bool> {
        (0..4).map(|i| pressed.contains(&i)).collect()
    }

    pub fn remaining(&self) -> usize {
        self.frames.lock().len()
    }
}

impl ControllerDevice for ScriptedController {
    fn id(&self) -> String {
        "scripted pad".to_string()
    }

    fn read_buttons(&mut self) -> Result<Vec<bool>, EngineError> {
        self.frames
            .lock()
            .pop_front()
            .ok_or_else(|| EngineError::Device("unplugged".to_string()))
    }
}
