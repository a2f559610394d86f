use log::debug;

use crate::errors::EngineError;
use crate::sentence_index::{SentenceIndex, SentenceKey};

/// Beginning and ending sentence chosen for a batch operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionRange {
    beginning: Option<SentenceKey>,
    ending: Option<SentenceKey>,
}

impl SelectionRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beginning(&self) -> Option<SentenceKey> {
        self.beginning
    }

    pub fn ending(&self) -> Option<SentenceKey> {
        self.ending
    }

    /// Choosing the ending sentence as beginning clears the ending
    pub fn set_beginning(&mut self, key: SentenceKey) {
        if self.ending == Some(key) {
            self.ending = None;
        }
        debug!("Selection beginning: {}", key);
        self.beginning = Some(key);
    }

    /// Choosing the beginning sentence as ending clears the beginning
    pub fn set_ending(&mut self, key: SentenceKey) {
        if self.beginning == Some(key) {
            self.beginning = None;
        }
        debug!("Selection ending: {}", key);
        self.ending = Some(key);
    }

    pub fn clear_beginning(&mut self) {
        self.beginning = None;
    }

    pub fn clear_ending(&mut self) {
        self.ending = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_complete(&self) -> bool {
        self.beginning.is_some() && self.ending.is_some()
    }

    /// Both ends set, and the beginning strictly before the ending
    pub fn validate(&self, index: &SentenceIndex) -> Result<(SentenceKey, SentenceKey), EngineError> {
        let (beginning, ending) = match (self.beginning, self.ending) {
            (Some(b), Some(e)) => (b, e),
            _ => {
                return Err(EngineError::InvalidSelection(
                    "select both a beginning and an ending sentence".to_string(),
                ))
            }
        };
        if !index.precedes(beginning, ending)? {
            return Err(EngineError::InvalidSelection(format!(
                "beginning {} must come before ending {}",
                beginning, ending
            )));
        }
        Ok((beginning, ending))
    }
}
