/*!
 * Reader session: the one owner of all engine state.
 *
 * Pointer input, controller input and the command line all go through
 * [`ReaderSession::set_active_sentence`], which keeps highlight, playback and
 * reading location in step. Operations that change timing validate locally,
 * commit to the server, and only then patch the index.
 */

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::api::{ArticleApi, TimestampUpdate};
use crate::app_config::{Config, OutputKind};
use crate::audio::checksum::ChecksumManifest;
use crate::audio::playback::{NullOutput, PlaybackId, PlaybackStarted, TimerOutput};
use crate::audio::{AudioDecoder, AudioOutput, AudioSourceManager, DecodedAudio, PlaybackScheduler};
use crate::controller::{ControllerAction, ControllerDevice, ControllerInputAdapter, ControllerState};
use crate::editing::batch;
use crate::editing::waveform::{ClickOutcome, DisplayedWaveform, EditContext, RenderSurface, WaveformClick, WaveformEditor};
use crate::editing::{Boundary, SelectionRange};
use crate::errors::EngineError;
use crate::reading_location::{ActivationSource, ReadingLocationTracker};
use crate::sentence_index::{ArticleAnnotations, Direction, Sentence, SentenceIndex, SentenceKey, TimeWindow};

/// What an activation did besides moving the highlight
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationOutcome {
    pub key: SentenceKey,
    /// Whether the UI should scroll the sentence into view
    pub scroll: bool,
    /// Whether this activation saved the location. A manual save reports the
    /// server's answer; other saves run in the background and report true once started.
    pub saved: bool,
    /// Clip started by controller auto-play
    pub playback: Option<PlaybackId>,
}

/// Session-level result of a waveform click
#[derive(Debug, Clone, PartialEq)]
pub enum ClickResult {
    /// Preview started from the clicked time, unless the seek was ignored
    Seek { time_ms: i64, playback: Option<PlaybackId> },
    /// A boundary was committed to the server and applied locally
    Committed {
        key: SentenceKey,
        boundary: Boundary,
        window: TimeWindow,
    },
}

/// Build the audio output selected in the configuration
pub fn output_for(kind: OutputKind) -> Result<Box<dyn AudioOutput>, EngineError> {
    match kind {
        OutputKind::Null => Ok(Box::new(NullOutput::new())),
        OutputKind::Timer => Ok(Box::new(TimerOutput::new())),
        OutputKind::Device => open_device(),
    }
}

#[cfg(feature = "device")]
fn open_device() -> Result<Box<dyn AudioOutput>, EngineError> {
    Ok(Box::new(crate::audio::DeviceOutput::open()?))
}

#[cfg(not(feature = "device"))]
fn open_device() -> Result<Box<dyn AudioOutput>, EngineError> {
    Err(EngineError::Output(
        "sound device output needs syncread built with the `device` feature".to_string(),
    ))
}

/// State of one reader working on one article
#[derive(Debug)]
pub struct ReaderSession {
    config: Config,
    api: Arc<dyn ArticleApi>,
    index: SentenceIndex,
    sources: AudioSourceManager,
    playback: PlaybackScheduler,
    waveform: WaveformEditor,
    surface: Box<dyn RenderSurface>,
    selection: SelectionRange,
    location: ReadingLocationTracker,
    controller: ControllerInputAdapter,
    highlighted: Option<SentenceKey>,
    translation_visible: bool,
    has_timestamps: bool,
    pending_completion: Option<(PlaybackId, oneshot::Receiver<()>)>,
}

impl ReaderSession {
    pub fn new(
        config: Config,
        annotations: &ArticleAnnotations,
        api: Arc<dyn ArticleApi>,
        decoder: Arc<dyn AudioDecoder>,
        output: Box<dyn AudioOutput>,
        surface: Box<dyn RenderSurface>,
    ) -> Result<Self, EngineError> {
        let index = SentenceIndex::from_annotations(annotations)?;
        let manifest = ChecksumManifest::parse(annotations.audio_part_checksums.as_deref());
        info!(
            "Session for article {}: {} sentences, {} audio parts",
            annotations.article_id,
            index.len(),
            annotations.num_audio_parts
        );

        Ok(Self {
            sources: AudioSourceManager::new(decoder, manifest, annotations.num_audio_parts),
            playback: PlaybackScheduler::new(output),
            waveform: WaveformEditor::new(config.waveform.clone()),
            location: ReadingLocationTracker::new(config.reading.autosave_threshold, annotations.initial_location),
            controller: ControllerInputAdapter::new(&config.controller),
            selection: SelectionRange::new(),
            highlighted: None,
            translation_visible: false,
            has_timestamps: annotations.has_timestamps,
            pending_completion: None,
            config,
            api,
            index,
            surface,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &SentenceIndex {
        &self.index
    }

    pub fn highlighted(&self) -> Option<SentenceKey> {
        self.highlighted
    }

    pub fn highlighted_sentence(&self) -> Option<&Sentence> {
        self.highlighted.and_then(|key| self.index.get(key))
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn sources(&self) -> &AudioSourceManager {
        &self.sources
    }

    pub fn selection(&self) -> &SelectionRange {
        &self.selection
    }

    pub fn location(&self) -> &ReadingLocationTracker {
        &self.location
    }

    pub fn displayed_waveform(&self) -> Option<&DisplayedWaveform> {
        self.waveform.displayed()
    }

    pub fn surface(&self) -> &dyn RenderSurface {
        self.surface.as_ref()
    }

    pub fn translation_visible(&self) -> bool {
        self.translation_visible
    }

    pub fn controller_state(&self) -> ControllerState {
        self.controller.state()
    }

    /* ---------------------------------------------------------------- */
    /* Activation                                                       */
    /* ---------------------------------------------------------------- */

    /// Make `key` the active sentence.
    ///
    /// Playback of any other sentence stops. Navigation that moves the highlight
    /// counts toward the autosave threshold; manual and restore sources save right
    /// away. Only a manual save is awaited. Controller navigation auto-plays the new
    /// sentence when the loaded audio covers it.
    pub async fn set_active_sentence(
        &mut self,
        key: SentenceKey,
        source: ActivationSource,
    ) -> Result<ActivationOutcome, EngineError> {
        self.index.require(key).inspect_err(|e| log::error!("{}", e))?;

        if self.playback.currently_playing().is_some_and(|playing| playing != key) {
            self.stop_playback();
        }
        let moved = self.highlighted != Some(key);
        if moved {
            debug!("Activating {} ({:?})", key, source);
        }
        self.highlighted = Some(key);
        self.location.set_current(key);
        self.location.poll_saves();

        let saved = if source == ActivationSource::ManualSave {
            self.location.save(self.api.as_ref(), key, source).await
        } else if source.saves_immediately() || (moved && self.location.note_navigation(source)) {
            self.location.save_in_background(Arc::clone(&self.api), key, source)
        } else {
            false
        };

        let playback = if source.is_controller() {
            self.auto_play(key)
        } else {
            None
        };

        Ok(ActivationOutcome {
            key,
            scroll: source.should_scroll(),
            saved,
            playback,
        })
    }

    /// Controller auto-play; anything that prevents playing is skipped quietly
    fn auto_play(&mut self, key: SentenceKey) -> Option<PlaybackId> {
        if !self.has_timestamps {
            return None;
        }
        let sentence = self.index.get(key)?;
        let started = self
            .sources
            .request_for(sentence)
            .and_then(|request| self.playback.play(sentence, self.sources.current(), request));
        match started {
            Ok(started) => started.map(|s| self.track(s)),
            Err(e) => {
                debug!("Not auto-playing {}: {}", key, e);
                None
            }
        }
    }

    /// Move to the next or previous sentence, wrapping at either end
    pub async fn navigate(&mut self, direction: Direction) -> Result<Option<ActivationOutcome>, EngineError> {
        let Some(target) = self.index.cyclic_neighbor(self.highlighted, direction).map(|s| s.key) else {
            return Ok(None);
        };
        let source = match direction {
            Direction::Next => ActivationSource::ControllerNext,
            Direction::Previous => ActivationSource::ControllerPrevious,
        };
        self.set_active_sentence(target, source).await.map(Some)
    }

    /// A click or tap on a sentence
    pub async fn pointer_select(&mut self, key: SentenceKey) -> Result<ActivationOutcome, EngineError> {
        let source = if self.highlighted == Some(key) {
            ActivationSource::PointerSameSentence
        } else {
            ActivationSource::PointerNewSentence
        };
        self.set_active_sentence(key, source).await
    }

    /* ---------------------------------------------------------------- */
    /* Playback                                                         */
    /* ---------------------------------------------------------------- */

    fn track(&mut self, started: PlaybackStarted) -> PlaybackId {
        let id = started.id;
        self.pending_completion = Some((id, started.completion));
        id
    }

    /// Play the highlighted sentence, or stop it if it is the one playing
    pub fn toggle_play_pause(&mut self) -> Result<Option<PlaybackId>, EngineError> {
        let Some(key) = self.highlighted else {
            return Err(EngineError::EditNotPermitted("no sentence is selected".to_string()));
        };
        if self.playback.currently_playing() == Some(key) {
            self.stop_playback();
            return Ok(None);
        }
        self.play_sentence(key)
    }

    /// Play one sentence from the loaded source
    pub fn play_sentence(&mut self, key: SentenceKey) -> Result<Option<PlaybackId>, EngineError> {
        if !self.has_timestamps {
            return Err(EngineError::EditNotPermitted("this article has no timestamps".to_string()));
        }
        let sentence = self.index.require(key)?;
        let request = self.sources.request_for(sentence)?;
        let started = self.playback.play(sentence, self.sources.current(), request)?;
        Ok(started.map(|s| self.track(s)))
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
        self.pending_completion = None;
    }

    /// Apply a completion that has already arrived, without waiting
    pub fn poll_playback_completion(&mut self) -> bool {
        let Some((id, receiver)) = self.pending_completion.as_mut() else {
            return false;
        };
        let id = *id;
        match receiver.try_recv() {
            Ok(()) => {
                self.pending_completion = None;
                self.playback.complete(id)
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.pending_completion = None;
                false
            }
        }
    }

    /// Wait for the current clip to end on its own.
    ///
    /// Returns false when nothing was playing or the clip was stopped.
    pub async fn wait_playback_finished(&mut self) -> bool {
        let Some((id, receiver)) = self.pending_completion.take() else {
            return false;
        };
        match receiver.await {
            Ok(()) => self.playback.complete(id),
            Err(_) => false,
        }
    }

    pub fn toggle_translation(&mut self) -> bool {
        self.translation_visible = !self.translation_visible;
        self.translation_visible
    }

    /* ---------------------------------------------------------------- */
    /* Audio sources                                                    */
    /* ---------------------------------------------------------------- */

    /// Switch to full-track mode; the waveform and any playback go away
    pub fn activate_full(&mut self) {
        self.waveform.close(self.surface.as_mut());
        self.pending_completion = None;
        self.sources.activate_full(&mut self.playback);
    }

    /// Switch to one audio part
    pub fn activate_part(&mut self, part_index: usize) -> Result<(), EngineError> {
        self.waveform.close(self.surface.as_mut());
        self.pending_completion = None;
        self.sources.activate_part(part_index, &mut self.playback)
    }

    /// Load the full track from bytes
    pub async fn load_full_audio(&mut self, bytes: Bytes) -> Result<Arc<DecodedAudio>, EngineError> {
        self.activate_full();
        self.sources.load_from_bytes(bytes, &mut self.playback).await
    }

    /// Load a user-supplied part file, checked against the article's manifest
    pub async fn load_local_part(&mut self, part_index: usize, bytes: Bytes) -> Result<Arc<DecodedAudio>, EngineError> {
        self.waveform.close(self.surface.as_mut());
        self.pending_completion = None;
        self.sources.load_local_part(bytes, part_index, &mut self.playback).await
    }

    /// Download a part from the server and load it
    pub async fn fetch_part(&mut self, part_index: usize) -> Result<Arc<DecodedAudio>, EngineError> {
        self.waveform.close(self.surface.as_mut());
        self.pending_completion = None;
        self.sources.fetch_part(part_index, self.api.as_ref(), &mut self.playback).await
    }

    /* ---------------------------------------------------------------- */
    /* Waveform                                                         */
    /* ---------------------------------------------------------------- */

    /// Show the highlighted sentence's waveform, or hide it if it is already shown
    pub fn toggle_waveform(&mut self) -> Result<bool, EngineError> {
        let Some(key) = self.highlighted else {
            return Err(EngineError::EditNotPermitted("no sentence is selected".to_string()));
        };
        if self.waveform.displayed().is_some_and(|d| d.sentence == key) {
            self.close_waveform();
            return Ok(false);
        }
        self.show_waveform(key)?;
        Ok(true)
    }

    /// Render a sentence's waveform from the loaded source
    pub fn show_waveform(&mut self, key: SentenceKey) -> Result<&DisplayedWaveform, EngineError> {
        let (source, buffer) = match (self.sources.current_source_kind(), self.sources.current()) {
            (Some(source), Some(buffer)) => (source, buffer),
            _ => return Err(EngineError::BufferNotLoaded),
        };
        let sentence = self.index.require(key)?;
        self.waveform.render(sentence, source, buffer, self.surface.as_mut())
    }

    pub fn close_waveform(&mut self) {
        self.waveform.close(self.surface.as_mut());
    }

    fn edit_context(&mut self) -> (&mut WaveformEditor, EditContext<'_>) {
        let buffer = self.sources.current_source_kind().zip(self.sources.current());
        (
            &mut self.waveform,
            EditContext {
                index: &mut self.index,
                playback: &mut self.playback,
                buffer,
                api: self.api.as_ref(),
                surface: self.surface.as_mut(),
                highlighted: self.highlighted,
            },
        )
    }

    /// A click on the displayed waveform
    pub async fn waveform_click(&mut self, click: WaveformClick) -> Result<ClickResult, EngineError> {
        let (editor, ctx) = self.edit_context();
        let outcome = editor.handle_click(click, ctx).await?;
        match outcome {
            ClickOutcome::Seek { time_ms, playback } => Ok(ClickResult::Seek {
                time_ms,
                playback: playback.map(|started| self.track(started)),
            }),
            ClickOutcome::Committed { key, boundary, window } => Ok(ClickResult::Committed { key, boundary, window }),
        }
    }

    /// Snap the highlighted sentence's start to the previous sentence's end
    pub async fn align_start_to_previous(&mut self) -> Result<TimeWindow, EngineError> {
        let key = self.require_highlighted()?;
        let (editor, ctx) = self.edit_context();
        editor.align_start_to_previous(key, ctx).await
    }

    /// Snap the highlighted sentence's end to the next sentence's start
    pub async fn align_end_to_next(&mut self) -> Result<TimeWindow, EngineError> {
        let key = self.require_highlighted()?;
        let (editor, ctx) = self.edit_context();
        editor.align_end_to_next(key, ctx).await
    }

    fn require_highlighted(&self) -> Result<SentenceKey, EngineError> {
        self.highlighted
            .ok_or_else(|| EngineError::EditNotPermitted("no sentence is selected".to_string()))
    }

    /* ---------------------------------------------------------------- */
    /* Batch operations                                                 */
    /* ---------------------------------------------------------------- */

    pub fn mark_beginning(&mut self) -> Result<SentenceKey, EngineError> {
        let key = self.require_highlighted()?;
        self.selection.set_beginning(key);
        Ok(key)
    }

    pub fn mark_ending(&mut self) -> Result<SentenceKey, EngineError> {
        let key = self.require_highlighted()?;
        self.selection.set_ending(key);
        Ok(key)
    }

    pub fn clear_beginning(&mut self) {
        self.selection.clear_beginning();
    }

    pub fn clear_ending(&mut self) {
        self.selection.clear_ending();
    }

    /// Spread the ending sentence's window over the selected run
    pub async fn distribute_selection(&mut self) -> Result<Vec<TimestampUpdate>, EngineError> {
        let (beginning, ending) = self.selection.validate(&self.index)?;
        let updates = batch::distribute(&mut self.index, beginning, ending, self.api.as_ref()).await?;
        self.refresh_waveform_after_edit();
        Ok(updates)
    }

    /// Run the server-side aligner over the selected run
    pub async fn align_selection(&mut self) -> Result<Vec<TimestampUpdate>, EngineError> {
        let (beginning, ending) = self.selection.validate(&self.index)?;
        let updates = batch::execute_alignment_task(&mut self.index, beginning, ending, self.api.as_ref()).await?;
        self.refresh_waveform_after_edit();
        Ok(updates)
    }

    fn refresh_waveform_after_edit(&mut self) {
        let Some(key) = self.waveform.displayed().map(|d| d.sentence) else {
            return;
        };
        if let Err(e) = self.show_waveform(key) {
            debug!("Waveform of {} not refreshed: {}", key, e);
        }
    }

    /* ---------------------------------------------------------------- */
    /* Reading location                                                 */
    /* ---------------------------------------------------------------- */

    /// Apply background location saves that have finished
    pub fn poll_location_saves(&mut self) -> usize {
        self.location.poll_saves()
    }

    /// Wait for every background location save to report
    pub async fn wait_location_saves(&mut self) {
        self.location.wait_for_saves().await;
    }

    /// Save the highlighted sentence now
    pub async fn save_location_now(&mut self) -> Result<bool, EngineError> {
        let key = self.require_highlighted()?;
        Ok(self.set_active_sentence(key, ActivationSource::ManualSave).await?.saved)
    }

    /// Activate the location the article was opened with, without scroll feedback
    pub async fn restore_initial_location(&mut self) -> Result<Option<ActivationOutcome>, EngineError> {
        self.restore(ActivationSource::InitialRestore).await
    }

    /// "Go back" button: jump to the location the article was opened with and save it
    pub async fn restore_button(&mut self) -> Result<Option<ActivationOutcome>, EngineError> {
        self.restore(ActivationSource::RestoreButton).await
    }

    async fn restore(&mut self, source: ActivationSource) -> Result<Option<ActivationOutcome>, EngineError> {
        let Some(key) = self.location.initial_location() else {
            return Ok(None);
        };
        if self.index.get(key).is_none() {
            warn!("Saved location {} is not part of this article", key);
            return Ok(None);
        }
        self.set_active_sentence(key, source).await.map(Some)
    }

    /* ---------------------------------------------------------------- */
    /* Controller                                                       */
    /* ---------------------------------------------------------------- */

    pub fn connect_controller(&mut self, device: Box<dyn ControllerDevice>) -> Result<(), EngineError> {
        self.controller.connect(device)
    }

    pub fn disconnect_controller(&mut self) {
        self.controller.disconnect();
    }

    /// Apply one controller action through the same primitives as pointer input
    pub async fn apply_controller_action(&mut self, action: ControllerAction) -> Result<(), EngineError> {
        match action {
            ControllerAction::Next => {
                self.navigate(Direction::Next).await?;
            }
            ControllerAction::Previous => {
                self.navigate(Direction::Previous).await?;
            }
            ControllerAction::PlayPause => {
                self.toggle_play_pause()?;
            }
            ControllerAction::ToggleTranslation => {
                self.toggle_translation();
            }
        }
        Ok(())
    }

    /// Poll the controller on a fixed interval until it disconnects.
    ///
    /// Action failures are logged; they do not stop polling.
    pub async fn run_controller(&mut self) {
        let period = Duration::from_millis(self.config.controller.poll_interval_ms);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.controller.state() == ControllerState::Connected {
            let now = ticker.tick().await;
            self.poll_playback_completion();
            self.poll_location_saves();
            for action in self.controller.poll(now) {
                if let Err(e) = self.apply_controller_action(action).await {
                    warn!("Controller action {:?} failed: {}", action, e);
                }
            }
        }
        info!("Controller polling stopped");
    }
}
