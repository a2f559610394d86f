/*!
 * Ordered registry of the article's sentences.
 *
 * Sentences are built once from the article annotations and never removed during
 * a session. Their database id and timing fields are patched in place after the
 * server accepts an edit.
 */

use std::collections::HashMap;
use std::fmt;

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Positional identity of a sentence: paragraph and index within the paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SentenceKey {
    /// Zero-based paragraph index
    pub paragraph_index: usize,
    /// Zero-based sentence index within the paragraph
    pub sentence_index: usize,
}

impl SentenceKey {
    pub fn new(paragraph_index: usize, sentence_index: usize) -> Self {
        Self {
            paragraph_index,
            sentence_index,
        }
    }
}

impl fmt::Display for SentenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}:S{}", self.paragraph_index, self.sentence_index)
    }
}

/// Walking direction through the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// A half-open millisecond range `[start_ms, end_ms)` with `start_ms < end_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    /// Build a window, refusing empty or inverted ranges
    pub fn new(start_ms: i64, end_ms: i64) -> Result<Self, EngineError> {
        if start_ms >= end_ms {
            return Err(EngineError::InvalidTimeWindow(format!(
                "start {}ms is not before end {}ms",
                start_ms, end_ms
            )));
        }
        Ok(Self { start_ms, end_ms })
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    pub fn contains(&self, time_ms: i64) -> bool {
        time_ms >= self.start_ms && time_ms < self.end_ms
    }
}

/// One sentence of the article with its audio ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    /// Positional identity
    pub key: SentenceKey,
    /// Persistent identifier, resolved lazily and cached once known
    pub database_id: Option<i64>,
    /// Source-language text
    pub text: String,
    /// Opaque translation string
    pub translation: String,
    /// Start within the full-track source
    pub full_start_ms: i64,
    /// End within the full-track source
    pub full_end_ms: i64,
    /// Part holding this sentence, when the article has part audio
    pub part_index: Option<usize>,
    /// Start within the part source
    pub part_start_ms: Option<i64>,
    /// End within the part source
    pub part_end_ms: Option<i64>,
}

impl Sentence {
    /// Range within the full-track source
    pub fn full_window(&self) -> Result<TimeWindow, EngineError> {
        TimeWindow::new(self.full_start_ms, self.full_end_ms)
    }

    /// Range within this sentence's part source
    pub fn part_window(&self) -> Result<TimeWindow, EngineError> {
        match (self.part_start_ms, self.part_end_ms) {
            (Some(start), Some(end)) => TimeWindow::new(start, end),
            _ => Err(EngineError::InvalidTimeWindow(format!(
                "sentence {} has no part timing",
                self.key
            ))),
        }
    }

    /// Range for the requested source kind
    pub fn window(&self, from_part: bool) -> Result<TimeWindow, EngineError> {
        if from_part {
            self.part_window()
        } else {
            self.full_window()
        }
    }

    /// Short preview used in log lines and selection displays
    pub fn preview(&self, words: usize) -> String {
        let mut preview: Vec<&str> = self.text.split_whitespace().take(words + 1).collect();
        if preview.len() > words {
            preview.truncate(words);
            format!("{}...", preview.join(" "))
        } else {
            preview.join(" ")
        }
    }
}

/// One sentence as delivered by the article annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedSentence {
    pub paragraph_index: usize,
    pub sentence_index: usize,
    #[serde(default)]
    pub sentence_db_id: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub translation: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    #[serde(default)]
    pub audio_part_index: Option<usize>,
    #[serde(default)]
    pub start_time_in_part_ms: Option<i64>,
    #[serde(default)]
    pub end_time_in_part_ms: Option<i64>,
}

impl From<AnnotatedSentence> for Sentence {
    fn from(annotated: AnnotatedSentence) -> Self {
        Self {
            key: SentenceKey::new(annotated.paragraph_index, annotated.sentence_index),
            database_id: annotated.sentence_db_id,
            text: annotated.text,
            translation: annotated.translation,
            full_start_ms: annotated.start_time_ms,
            full_end_ms: annotated.end_time_ms,
            part_index: annotated.audio_part_index,
            part_start_ms: annotated.start_time_in_part_ms,
            part_end_ms: annotated.end_time_in_part_ms,
        }
    }
}

/// Article-level annotations the engine is initialised from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleAnnotations {
    pub article_id: i64,
    #[serde(default)]
    pub has_timestamps: bool,
    #[serde(default)]
    pub num_audio_parts: usize,
    /// `;`-delimited manifest of part digests
    #[serde(default)]
    pub audio_part_checksums: Option<String>,
    #[serde(default)]
    pub initial_location: Option<crate::reading_location::ReadingLocation>,
    #[serde(default)]
    pub sentences: Vec<AnnotatedSentence>,
}

/// Ordered sentence registry with adjacency queries
#[derive(Debug, Clone, Default)]
pub struct SentenceIndex {
    sentences: Vec<Sentence>,
    positions: HashMap<SentenceKey, usize>,
}

impl SentenceIndex {
    /// Build the index from sentences already in document order
    pub fn from_sentences(sentences: Vec<Sentence>) -> Result<Self, EngineError> {
        let mut positions = HashMap::with_capacity(sentences.len());
        for (position, sentence) in sentences.iter().enumerate() {
            if positions.insert(sentence.key, position).is_some() {
                return Err(EngineError::InvalidSelection(format!(
                    "sentence {} appears twice in the annotations",
                    sentence.key
                )));
            }
        }
        debug!("Indexed {} sentences", sentences.len());
        Ok(Self {
            sentences,
            positions,
        })
    }

    /// Build the index from the article annotations
    pub fn from_annotations(annotations: &ArticleAnnotations) -> Result<Self, EngineError> {
        let sentences = annotations
            .sentences
            .iter()
            .cloned()
            .map(Sentence::from)
            .collect();
        Self::from_sentences(sentences)
    }

    /// All sentences in document order
    pub fn all(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn get(&self, key: SentenceKey) -> Option<&Sentence> {
        self.positions.get(&key).map(|&i| &self.sentences[i])
    }

    pub fn get_mut(&mut self, key: SentenceKey) -> Option<&mut Sentence> {
        match self.positions.get(&key) {
            Some(&i) => Some(&mut self.sentences[i]),
            None => None,
        }
    }

    /// Lookup that treats a missing key as the programming error it is
    pub fn require(&self, key: SentenceKey) -> Result<&Sentence, EngineError> {
        self.get(key).ok_or(EngineError::UnknownSentence(key))
    }

    /// Mutable variant of [`SentenceIndex::require`]
    pub fn require_mut(&mut self, key: SentenceKey) -> Result<&mut Sentence, EngineError> {
        self.get_mut(key).ok_or(EngineError::UnknownSentence(key))
    }

    /// Document-order position of a sentence
    pub fn position_of(&self, key: SentenceKey) -> Result<usize, EngineError> {
        self.positions
            .get(&key)
            .copied()
            .ok_or(EngineError::UnknownSentence(key))
    }

    /// Neighbour in the given direction, `None` at either boundary.
    ///
    /// This never wraps around; callers iterating a run rely on hitting `None`.
    pub fn adjacent(&self, key: SentenceKey, direction: Direction) -> Option<&Sentence> {
        let position = match self.positions.get(&key) {
            Some(&position) => position,
            None => {
                error!("adjacent() called with unknown sentence {}", key);
                return None;
            }
        };
        match direction {
            Direction::Previous => position.checked_sub(1).map(|i| &self.sentences[i]),
            Direction::Next => self.sentences.get(position + 1),
        }
    }

    /// Navigation neighbour that wraps around at the ends.
    ///
    /// With no current sentence, `Next` starts at the first sentence and
    /// `Previous` at the last one.
    pub fn cyclic_neighbor(&self, current: Option<SentenceKey>, direction: Direction) -> Option<&Sentence> {
        let count = self.sentences.len();
        if count == 0 {
            return None;
        }
        let position = current.and_then(|key| self.positions.get(&key).copied());
        let target = match (position, direction) {
            (None, Direction::Next) => 0,
            (None, Direction::Previous) => count - 1,
            (Some(p), Direction::Next) => (p + 1) % count,
            (Some(p), Direction::Previous) => (p + count - 1) % count,
        };
        self.sentences.get(target)
    }

    /// Sentence with a known database id
    pub fn find_by_database_id(&self, database_id: i64) -> Option<&Sentence> {
        self.sentences
            .iter()
            .find(|s| s.database_id == Some(database_id))
    }

    /// Key of the sentence with a known database id
    pub fn key_for_database_id(&self, database_id: i64) -> Option<SentenceKey> {
        self.find_by_database_id(database_id).map(|s| s.key)
    }

    /// Largest full-track end time across the article
    pub fn max_end_ms(&self) -> i64 {
        self.sentences
            .iter()
            .map(|s| s.full_end_ms)
            .max()
            .unwrap_or(0)
    }

    /// Whether `a` comes strictly before `b` in the document
    pub fn precedes(&self, a: SentenceKey, b: SentenceKey) -> Result<bool, EngineError> {
        Ok(self.position_of(a)? < self.position_of(b)?)
    }
}
