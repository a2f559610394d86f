use std::io::Cursor;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::DecodedAudio;
use crate::errors::EngineError;

/// Turns encoded audio bytes into PCM samples
pub trait AudioDecoder: Send + Sync + std::fmt::Debug {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, EngineError>;
}

/// Decoder backed by symphonia's probe, supporting MP3 and WAV
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, EngineError> {
        if bytes.is_empty() {
            return Err(EngineError::Decode("no audio data".to_string()));
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| EngineError::Decode(format!("unrecognised format: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::Decode("no audio track".to_string()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::Decode(format!("unsupported codec: {}", e)))?;

        let mut channels: Vec<Vec<f32>> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let channel_count = spec.channels.count();
            if channel_count == 0 {
                continue;
            }
            if channels.is_empty() {
                channels = vec![Vec::new(); channel_count];
            }
            if sample_rate == 0 {
                sample_rate = spec.rate;
            }

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            for frame in buffer.samples().chunks(channel_count) {
                for (channel, sample) in channels.iter_mut().zip(frame) {
                    channel.push(*sample);
                }
            }
        }

        if channels.is_empty() || channels[0].is_empty() {
            return Err(EngineError::Decode("stream contains no samples".to_string()));
        }
        if sample_rate == 0 {
            return Err(EngineError::Decode("unknown sample rate".to_string()));
        }

        debug!(
            "Decoded {} frames x {} channels at {} Hz",
            channels[0].len(),
            channels.len(),
            sample_rate
        );
        DecodedAudio::new(channels, sample_rate)
    }
}
