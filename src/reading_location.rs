/*!
 * Reading location persistence.
 *
 * The tracker counts navigation activations and saves the active sentence every
 * `threshold` of them. Manual saves and the restore button save right away.
 * A failed save is logged and never surfaces to the reader.
 *
 * Only manual saves are awaited. Every other save runs as a spawned task and
 * reports back through a channel that the owner drains with `poll_saves`.
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::ArticleApi;
use crate::sentence_index::SentenceKey;

/// Default number of navigation activations between automatic saves
pub const DEFAULT_AUTOSAVE_THRESHOLD: u32 = 5;

/// Persisted reading position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingLocation {
    pub paragraph_index: usize,
    pub sentence_index_in_paragraph: usize,
}

impl From<SentenceKey> for ReadingLocation {
    fn from(key: SentenceKey) -> Self {
        Self {
            paragraph_index: key.paragraph_index,
            sentence_index_in_paragraph: key.sentence_index,
        }
    }
}

impl From<ReadingLocation> for SentenceKey {
    fn from(location: ReadingLocation) -> Self {
        SentenceKey::new(location.paragraph_index, location.sentence_index_in_paragraph)
    }
}

/// What caused a sentence to become active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    InitialPageLoad,
    InitialRestore,
    RestoreButton,
    PointerNewSentence,
    PointerSameSentence,
    ControllerNext,
    ControllerPrevious,
    ManualSave,
}

impl ActivationSource {
    /// Activations that count toward the autosave threshold
    pub fn is_navigation(self) -> bool {
        matches!(
            self,
            Self::PointerNewSentence | Self::ControllerNext | Self::ControllerPrevious
        )
    }

    /// Activations that bring the sentence into view with visible feedback.
    /// Pointer selections are already on screen and start-up activations are silent.
    pub fn should_scroll(self) -> bool {
        !matches!(
            self,
            Self::PointerNewSentence
                | Self::PointerSameSentence
                | Self::InitialPageLoad
                | Self::InitialRestore
        )
    }

    /// Activations that persist the location without waiting for the threshold
    pub fn saves_immediately(self) -> bool {
        matches!(self, Self::ManualSave | Self::RestoreButton)
    }

    /// Controller navigation, which may auto-play the new sentence
    pub fn is_controller(self) -> bool {
        matches!(self, Self::ControllerNext | Self::ControllerPrevious)
    }
}

/// Outcome of a background save
#[derive(Debug)]
struct SaveReport {
    location: ReadingLocation,
    /// Completion time of a save the server accepted
    saved_at: Option<DateTime<Utc>>,
}

/// Counts navigation and persists the reading location
#[derive(Debug)]
pub struct ReadingLocationTracker {
    /// Location of the active sentence
    current: Option<ReadingLocation>,
    /// Saves happen after this many navigation activations
    threshold: u32,
    /// Navigation activations since the last save
    counter: u32,
    /// Location delivered with the article, used by "restore"
    initial: Option<ReadingLocation>,
    /// When the last successful save completed
    last_saved_at: Option<DateTime<Utc>>,
    /// Last location the server accepted
    last_saved: Option<ReadingLocation>,
    reports_tx: mpsc::UnboundedSender<SaveReport>,
    reports_rx: mpsc::UnboundedReceiver<SaveReport>,
    /// Background saves whose report has not been drained yet
    in_flight: usize,
}

impl ReadingLocationTracker {
    pub fn new(threshold: u32, initial: Option<ReadingLocation>) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            current: None,
            threshold: threshold.max(1),
            counter: 0,
            initial,
            last_saved_at: None,
            last_saved: None,
            reports_tx,
            reports_rx,
            in_flight: 0,
        }
    }

    pub fn current(&self) -> Option<ReadingLocation> {
        self.current
    }

    /// Record the newly active sentence
    pub fn set_current(&mut self, key: SentenceKey) {
        self.current = Some(ReadingLocation::from(key));
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn last_saved(&self) -> Option<ReadingLocation> {
        self.last_saved
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    /// Count one activation; returns true when the threshold is reached and the
    /// counter has been reset. Non-navigation sources are ignored.
    pub fn note_navigation(&mut self, source: ActivationSource) -> bool {
        if !source.is_navigation() {
            return false;
        }
        self.counter += 1;
        if self.counter >= self.threshold {
            debug!("Navigation threshold of {} reached", self.threshold);
            self.counter = 0;
            true
        } else {
            false
        }
    }

    /// Persist a location and wait for the answer; failures are logged and swallowed
    pub async fn save(&mut self, api: &dyn ArticleApi, key: SentenceKey, source: ActivationSource) -> bool {
        let location = ReadingLocation::from(key);
        let saved_at = persist(api, location, source).await;
        self.record(location, saved_at)
    }

    /// Start a save without waiting for it.
    ///
    /// Returns false when there is no runtime to run it on. The outcome is
    /// applied by a later [`poll_saves`](Self::poll_saves) or
    /// [`wait_for_saves`](Self::wait_for_saves).
    pub fn save_in_background(&mut self, api: Arc<dyn ArticleApi>, key: SentenceKey, source: ActivationSource) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot save reading location {}: {}", key, e);
                return false;
            }
        };
        let location = ReadingLocation::from(key);
        let reports = self.reports_tx.clone();
        runtime.spawn(async move {
            let saved_at = persist(api.as_ref(), location, source).await;
            let _ = reports.send(SaveReport { location, saved_at });
        });
        self.in_flight += 1;
        true
    }

    /// Apply the background saves that have finished; returns how many were applied
    pub fn poll_saves(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(report) = self.reports_rx.try_recv() {
            self.apply_report(report);
            applied += 1;
        }
        applied
    }

    /// Wait until every background save has reported
    pub async fn wait_for_saves(&mut self) {
        while self.in_flight > 0 {
            match self.reports_rx.recv().await {
                Some(report) => self.apply_report(report),
                None => break,
            }
        }
    }

    /// Background saves still waiting for the server
    pub fn pending_saves(&self) -> usize {
        self.in_flight
    }

    fn apply_report(&mut self, report: SaveReport) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.record(report.location, report.saved_at);
    }

    fn record(&mut self, location: ReadingLocation, saved_at: Option<DateTime<Utc>>) -> bool {
        match saved_at {
            Some(at) => {
                self.last_saved = Some(location);
                self.last_saved_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Location the article was opened with
    pub fn initial_location(&self) -> Option<SentenceKey> {
        self.initial.map(SentenceKey::from)
    }
}

/// One save request; returns the completion time when the server accepted it
async fn persist(api: &dyn ArticleApi, location: ReadingLocation, source: ActivationSource) -> Option<DateTime<Utc>> {
    let key = SentenceKey::from(location);
    match api.save_location(location).await {
        Ok(()) => {
            info!("Saved reading location {} ({:?})", key, source);
            Some(Utc::now())
        }
        Err(e) => {
            error!("Failed to save reading location {}: {}", key, e);
            None
        }
    }
}
