/*!
 * Audio sources and playback.
 *
 * - `decoder`: bytes to PCM
 * - `checksum`: part digest manifest and verification
 * - `source`: which source is active and which buffer is loaded
 * - `playback`: single-clip scheduling against an output
 * - `device`: sound-card output, behind the `device` feature
 */

use crate::errors::EngineError;

pub mod checksum;
pub mod decoder;
#[cfg(feature = "device")]
pub mod device;
pub mod playback;
pub mod source;

pub use decoder::{AudioDecoder, SymphoniaDecoder};
#[cfg(feature = "device")]
pub use device::DeviceOutput;
pub use playback::{AudioOutput, NullOutput, PlaybackScheduler, TimerOutput};
pub use source::{AudioSource, AudioSourceManager};

/// Decoded PCM, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedAudio {
    /// All channels must have the same length
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, EngineError> {
        if channels.is_empty() {
            return Err(EngineError::Decode("audio has no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(EngineError::Decode("sample rate must be positive".to_string()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(EngineError::Decode("channels differ in length".to_string()));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Single-channel buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, EngineError> {
        Self::new(vec![samples], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// First channel, the one waveforms are drawn from
    pub fn primary_channel(&self) -> &[f32] {
        &self.channels[0]
    }

    /// Total length in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Frames of `[start_ms, start_ms + duration_ms)` with channels interleaved,
    /// cut short at the end of the buffer
    pub fn interleaved_window(&self, start_ms: f64, duration_ms: f64) -> Vec<f32> {
        let to_frame = |ms: f64| {
            ((ms.max(0.0) / 1000.0 * self.sample_rate as f64).round() as usize).min(self.frames())
        };
        let from = to_frame(start_ms);
        let to = to_frame(start_ms + duration_ms).max(from);

        let mut samples = Vec::with_capacity((to - from) * self.channels.len());
        for frame in from..to {
            samples.extend(self.channels.iter().map(|channel| channel[frame]));
        }
        samples
    }
}
