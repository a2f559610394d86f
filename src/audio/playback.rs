/*!
 * Bounded sub-range playback with at most one live clip.
 *
 * The scheduler owns the only `PlaybackHandle`. Starting a clip always stops the
 * previous one first. Completion is reported through a oneshot receiver and is
 * only honoured when it belongs to the handle that is still current, so a late
 * completion of a superseded clip cannot clear a newer one.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::audio::DecodedAudio;
use crate::errors::EngineError;
use crate::sentence_index::{Sentence, SentenceKey};

/// Identity of one started clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Absolute offsets into the current buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackWindow {
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl PlaybackWindow {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }
}

/// The live clip
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackHandle {
    pub id: PlaybackId,
    pub sentence: SentenceKey,
    pub window: PlaybackWindow,
}

/// Parameters of one `play` call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackRequest {
    /// Use the part-relative window instead of the full-track one
    pub from_part: bool,
    /// Seek position replacing the window start
    pub desired_start_ms: Option<i64>,
}

impl PlaybackRequest {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn part() -> Self {
        Self {
            from_part: true,
            desired_start_ms: None,
        }
    }

    pub fn seek(from_part: bool, start_ms: i64) -> Self {
        Self {
            from_part,
            desired_start_ms: Some(start_ms),
        }
    }
}

/// A clip that has just started
#[derive(Debug)]
pub struct PlaybackStarted {
    pub id: PlaybackId,
    pub window: PlaybackWindow,
    /// Resolves when the clip reaches its natural end; closed if it is stopped
    pub completion: oneshot::Receiver<()>,
}

/// Something that can play a window of a decoded buffer
pub trait AudioOutput: Send + fmt::Debug {
    /// Begin playing; the returned receiver fires on natural completion
    fn start(
        &mut self,
        id: PlaybackId,
        buffer: Arc<DecodedAudio>,
        window: PlaybackWindow,
    ) -> Result<oneshot::Receiver<()>, EngineError>;

    /// Stop a clip; unknown ids are ignored
    fn stop(&mut self, id: PlaybackId);
}

/// Keeps at most one clip live on top of an [`AudioOutput`]
#[derive(Debug)]
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    next_id: u64,
    current: Option<PlaybackHandle>,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            next_id: 1,
            current: None,
        }
    }

    /// Play a sentence's window, or from a seek position inside it.
    ///
    /// Returns `Ok(None)` when the seek position is not before the window end;
    /// that case is only logged.
    pub fn play(
        &mut self,
        sentence: &Sentence,
        buffer: Option<&Arc<DecodedAudio>>,
        request: PlaybackRequest,
    ) -> Result<Option<PlaybackStarted>, EngineError> {
        let buffer = buffer.ok_or(EngineError::BufferNotLoaded)?;
        self.stop();

        let window = sentence.window(request.from_part)?;
        let start_ms = match request.desired_start_ms {
            Some(seek) if seek < window.end_ms => seek,
            Some(seek) => {
                warn!(
                    "Ignoring seek to {}ms: not before end {}ms of {}",
                    seek, window.end_ms, sentence.key
                );
                return Ok(None);
            }
            None => window.start_ms,
        };

        let clamped = clamp_to_buffer(start_ms, window.end_ms, buffer.duration_ms())?;
        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        let completion = self.output.start(id, Arc::clone(buffer), clamped)?;
        debug!(
            "Playing {} from {:.0}ms for {:.0}ms ({})",
            sentence.key, clamped.start_ms, clamped.duration_ms, id
        );
        self.current = Some(PlaybackHandle {
            id,
            sentence: sentence.key,
            window: clamped,
        });
        Ok(Some(PlaybackStarted {
            id,
            window: clamped,
            completion,
        }))
    }

    /// Natural end of a clip. Returns false, changing nothing, when `id` has
    /// already been superseded or stopped.
    pub fn complete(&mut self, id: PlaybackId) -> bool {
        match &self.current {
            Some(handle) if handle.id == id => {
                debug!("Playback {} of {} finished", id, handle.sentence);
                self.current = None;
                true
            }
            _ => {
                debug!("Ignoring stale completion of {}", id);
                false
            }
        }
    }

    /// Tear down the current clip, if any
    pub fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            debug!("Stopping playback {} of {}", handle.id, handle.sentence);
            self.output.stop(handle.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Sentence carrying the "playing" mark
    pub fn currently_playing(&self) -> Option<SentenceKey> {
        self.current.as_ref().map(|h| h.sentence)
    }

    pub fn current_handle(&self) -> Option<&PlaybackHandle> {
        self.current.as_ref()
    }
}

/// Fit `[start_ms, end_ms)` into a buffer of `buffer_ms`
fn clamp_to_buffer(start_ms: i64, end_ms: i64, buffer_ms: f64) -> Result<PlaybackWindow, EngineError> {
    let start = start_ms as f64;
    if start < 0.0 || start >= buffer_ms {
        return Err(EngineError::InvalidTimeWindow(format!(
            "start {}ms is outside the buffer (0..{:.0}ms)",
            start_ms, buffer_ms
        )));
    }
    let mut duration = (end_ms - start_ms) as f64;
    if start + duration > buffer_ms {
        duration = buffer_ms - start;
    }
    if duration <= 0.0 {
        return Err(EngineError::InvalidTimeWindow(format!(
            "window {}..{}ms is empty",
            start_ms, end_ms
        )));
    }
    Ok(PlaybackWindow {
        start_ms: start,
        duration_ms: duration,
    })
}

#[derive(Debug, Default)]
struct NullOutputState {
    started: Vec<(PlaybackId, PlaybackWindow)>,
    stopped: Vec<PlaybackId>,
    pending: HashMap<PlaybackId, oneshot::Sender<()>>,
}

/// Silent output that records clips and finishes them on request
#[derive(Debug, Clone, Default)]
pub struct NullOutput {
    state: Arc<Mutex<NullOutputState>>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every clip started so far, in order
    pub fn started(&self) -> Vec<(PlaybackId, PlaybackWindow)> {
        self.state.lock().started.clone()
    }

    pub fn stopped(&self) -> Vec<PlaybackId> {
        self.state.lock().stopped.clone()
    }

    /// Clips started and neither stopped nor finished
    pub fn live_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Signal natural completion of a clip
    pub fn finish(&self, id: PlaybackId) -> bool {
        match self.state.lock().pending.remove(&id) {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }

    pub fn finish_all(&self) {
        let senders: Vec<_> = self.state.lock().pending.drain().collect();
        for (_, sender) in senders {
            let _ = sender.send(());
        }
    }
}

impl AudioOutput for NullOutput {
    fn start(
        &mut self,
        id: PlaybackId,
        _buffer: Arc<DecodedAudio>,
        window: PlaybackWindow,
    ) -> Result<oneshot::Receiver<()>, EngineError> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.state.lock();
        state.started.push((id, window));
        state.pending.insert(id, sender);
        Ok(receiver)
    }

    fn stop(&mut self, id: PlaybackId) {
        let mut state = self.state.lock();
        state.stopped.push(id);
        state.pending.remove(&id);
    }
}

/// Output that plays nothing but completes each clip after its real duration
#[derive(Debug, Default)]
pub struct TimerOutput {
    tasks: HashMap<PlaybackId, JoinHandle<()>>,
}

impl TimerOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for TimerOutput {
    fn start(
        &mut self,
        id: PlaybackId,
        _buffer: Arc<DecodedAudio>,
        window: PlaybackWindow,
    ) -> Result<oneshot::Receiver<()>, EngineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Output(format!("no async runtime: {}", e)))?;
        self.tasks.retain(|_, task| !task.is_finished());

        let (sender, receiver) = oneshot::channel();
        let duration = Duration::from_secs_f64(window.duration_ms / 1000.0);
        let task = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(());
        });
        self.tasks.insert(id, task);
        Ok(receiver)
    }

    fn stop(&mut self, id: PlaybackId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TimerOutput {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
