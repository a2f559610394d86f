/*!
 * Playback through the default sound device.
 *
 * rodio's `OutputStream` has to stay on the thread that opened it, so a small
 * thread owns the stream for the lifetime of the output and hands back its
 * `OutputStreamHandle`. Each clip gets its own `Sink`; a watcher thread waits for
 * the sink to drain and reports natural completion unless the clip was stopped.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use log::{debug, info};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;

use crate::audio::DecodedAudio;
use crate::audio::playback::{AudioOutput, PlaybackId, PlaybackWindow};
use crate::errors::EngineError;

/// One clip queued on the device
struct Clip {
    sink: Sink,
    stopped: AtomicBool,
}

/// Output backed by the system's default audio device
pub struct DeviceOutput {
    handle: OutputStreamHandle,
    clips: HashMap<PlaybackId, Arc<Clip>>,
    /// Dropping this lets the stream thread close the device
    _shutdown: mpsc::Sender<()>,
}

impl fmt::Debug for DeviceOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceOutput")
            .field("live", &self.clips.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DeviceOutput {
    /// Open the default output device
    pub fn open() -> Result<Self, EngineError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("syncread-audio".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((_stream, handle)) => {
                    if ready_tx.send(Ok(handle)).is_ok() {
                        // Blocks until the output is dropped
                        let _ = shutdown_rx.recv();
                    }
                    debug!("Audio device closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("no usable sound device: {}", e)));
                }
            })
            .map_err(|e| EngineError::Output(format!("failed to start the audio thread: {}", e)))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| EngineError::Output("audio thread exited while opening the device".to_string()))?
            .map_err(EngineError::Output)?;
        info!("Opened the default sound device");

        Ok(Self {
            handle,
            clips: HashMap::new(),
            _shutdown: shutdown_tx,
        })
    }
}

impl AudioOutput for DeviceOutput {
    fn start(
        &mut self,
        id: PlaybackId,
        buffer: Arc<DecodedAudio>,
        window: PlaybackWindow,
    ) -> Result<oneshot::Receiver<()>, EngineError> {
        self.clips.retain(|_, clip| !clip.sink.empty());

        let samples = buffer.interleaved_window(window.start_ms, window.duration_ms);
        if samples.is_empty() {
            return Err(EngineError::Output(format!("clip {} has no samples", id)));
        }
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| EngineError::Output(format!("cannot play clip {}: {}", id, e)))?;
        sink.append(SamplesBuffer::new(
            buffer.channel_count() as u16,
            buffer.sample_rate(),
            samples,
        ));

        let clip = Arc::new(Clip {
            sink,
            stopped: AtomicBool::new(false),
        });
        let (sender, receiver) = oneshot::channel();
        let watched = Arc::clone(&clip);
        thread::Builder::new()
            .name(format!("syncread-clip-{}", id))
            .spawn(move || {
                watched.sink.sleep_until_end();
                if !watched.stopped.load(Ordering::Acquire) {
                    let _ = sender.send(());
                }
            })
            .map_err(|e| EngineError::Output(format!("failed to watch clip {}: {}", id, e)))?;

        self.clips.insert(id, clip);
        Ok(receiver)
    }

    fn stop(&mut self, id: PlaybackId) {
        match self.clips.remove(&id) {
            Some(clip) => {
                clip.stopped.store(true, Ordering::Release);
                clip.sink.stop();
            }
            None => debug!("Clip {} already ended", id),
        }
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        for (_, clip) in self.clips.drain() {
            clip.stopped.store(true, Ordering::Release);
            clip.sink.stop();
        }
    }
}
