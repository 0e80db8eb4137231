//! Opus codec adapter
//!
//! One encoder and one decoder context per (sample rate, channels, bitrate)
//! configuration. Batch calls split interleaved PCM16 into whole frames and
//! abort on the first codec failure.
//!
//! Not safe for concurrent use; hosts must serialize access per adapter.

use bytes::Bytes;
use opus::{Application, Bitrate, Channels, Decoder, Encoder};

use crate::error::CodecError;
use crate::protocol::Packet;

/// Ceiling for a single encoded frame; Opus never exceeds ~1275 bytes but
/// the encode call needs head room in its output slice.
const MAX_ENCODED_FRAME: usize = 4000;

/// Largest payload one decode call can yield, in milliseconds of audio.
const MAX_DECODE_MS: usize = 120;

/// Stateful wrapper around one Opus encoder/decoder pair.
pub struct OpusAdapter {
    encoder: Encoder,
    decoder: Decoder,
    sample_rate: u32,
    channels: u8,
    bitrate: u32,
    /// Encoding scratch (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Decoding scratch, sized for the longest possible frame
    decode_buffer: Vec<i16>,
    frames_encoded: u64,
    bytes_produced: u64,
    frames_decoded: u64,
    samples_produced: u64,
}

impl OpusAdapter {
    /// Create an adapter, failing if the codec rejects the configuration.
    pub fn new(sample_rate: u32, channels: u8, bitrate: u32) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::UnsupportedConfig(format!(
                    "unsupported channel count: {channels}"
                )))
            }
        };

        let mut encoder = Encoder::new(sample_rate, opus_channels, Application::Audio)
            .map_err(|e| CodecError::UnsupportedConfig(e.to_string()))?;
        encoder
            .set_bitrate(Bitrate::Bits(bitrate as i32))
            .map_err(|e| CodecError::UnsupportedConfig(format!("failed to set bitrate: {e}")))?;
        encoder
            .set_vbr(true)
            .map_err(|e| CodecError::UnsupportedConfig(format!("failed to set VBR: {e}")))?;

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::UnsupportedConfig(e.to_string()))?;

        let decode_samples = (sample_rate as usize * MAX_DECODE_MS / 1000) * channels as usize;

        Ok(Self {
            encoder,
            decoder,
            sample_rate,
            channels,
            bitrate,
            encode_buffer: vec![0u8; MAX_ENCODED_FRAME],
            decode_buffer: vec![0i16; decode_samples],
            frames_encoded: 0,
            bytes_produced: 0,
            frames_decoded: 0,
            samples_produced: 0,
        })
    }

    /// Encode interleaved PCM16 into one packet per whole frame.
    ///
    /// Trailing samples that do not fill a complete frame are dropped; they
    /// are not buffered across calls. Any frame the encoder rejects aborts
    /// the whole call.
    pub fn encode_pcm16(
        &mut self,
        pcm: &[i16],
        frame_size_per_channel: usize,
    ) -> Result<Vec<Packet>, CodecError> {
        if frame_size_per_channel == 0 {
            return Err(CodecError::EncodingFailed(
                "frame size must be positive".into(),
            ));
        }

        let samples_per_frame = frame_size_per_channel * self.channels as usize;
        let mut packets = Vec::with_capacity(pcm.len() / samples_per_frame);

        for frame in pcm.chunks_exact(samples_per_frame) {
            let written = self
                .encoder
                .encode(frame, &mut self.encode_buffer)
                .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

            self.frames_encoded += 1;
            self.bytes_produced += written as u64;
            packets.push(Bytes::copy_from_slice(&self.encode_buffer[..written]));
        }

        Ok(packets)
    }

    /// Decode packets back into interleaved PCM16, in order. A decode
    /// failure on any packet aborts the whole call.
    pub fn decode_packets(&mut self, packets: &[Packet]) -> Result<Vec<i16>, CodecError> {
        let mut pcm = Vec::new();

        for packet in packets {
            let samples_per_channel = self
                .decoder
                .decode(packet, &mut self.decode_buffer, false)
                .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

            let total = samples_per_channel * self.channels as usize;
            self.frames_decoded += 1;
            self.samples_produced += total as u64;
            pcm.extend_from_slice(&self.decode_buffer[..total]);
        }

        Ok(pcm)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Get statistics
    pub fn stats(&self) -> CodecStats {
        CodecStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            frames_decoded: self.frames_decoded,
            samples_produced: self.samples_produced,
            average_packet_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Adapter statistics
#[derive(Debug, Clone)]
pub struct CodecStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub frames_decoded: u64,
    pub samples_produced: u64,
    pub average_packet_size: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 960; // 20 ms at 48 kHz

    fn sine_pcm(samples: usize) -> Vec<i16> {
        (0..samples)
            .map(|i| {
                let t = i as f32 / 48_000.0;
                ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 12_000.0) as i16
            })
            .collect()
    }

    #[test]
    fn adapter_creation() {
        let adapter = OpusAdapter::new(48_000, 1, 32_000);
        assert!(adapter.is_ok());

        let adapter = adapter.unwrap();
        assert_eq!(adapter.sample_rate(), 48_000);
        assert_eq!(adapter.channels(), 1);
    }

    #[test]
    fn rejects_bad_channel_count() {
        assert!(matches!(
            OpusAdapter::new(48_000, 3, 32_000),
            Err(CodecError::UnsupportedConfig(_))
        ));
    }

    #[test]
    fn encode_produces_one_packet_per_frame() {
        let mut adapter = OpusAdapter::new(48_000, 1, 32_000).unwrap();
        let pcm = sine_pcm(FRAME * 4);
        let packets = adapter.encode_pcm16(&pcm, FRAME).unwrap();
        assert_eq!(packets.len(), 4);
        assert!(packets.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn trailing_samples_are_dropped() {
        let mut adapter = OpusAdapter::new(48_000, 1, 32_000).unwrap();
        let pcm = sine_pcm(FRAME * 3 + 250);
        let packets = adapter.encode_pcm16(&pcm, FRAME).unwrap();
        assert_eq!(packets.len(), 3);
    }

    #[test]
    fn short_input_yields_no_packets() {
        let mut adapter = OpusAdapter::new(48_000, 1, 32_000).unwrap();
        let pcm = sine_pcm(FRAME - 1);
        assert!(adapter.encode_pcm16(&pcm, FRAME).unwrap().is_empty());
    }

    #[test]
    fn roundtrip_preserves_sample_count() {
        let mut adapter = OpusAdapter::new(48_000, 2, 64_000).unwrap();
        let pcm = sine_pcm(FRAME * 2 * 5); // 5 stereo frames
        let packets = adapter.encode_pcm16(&pcm, FRAME).unwrap();
        assert_eq!(packets.len(), 5);

        let decoded = adapter.decode_packets(&packets).unwrap();
        assert_eq!(decoded.len(), pcm.len());
    }

    #[test]
    fn stats_accumulate() {
        let mut adapter = OpusAdapter::new(48_000, 1, 32_000).unwrap();
        let pcm = sine_pcm(FRAME * 2);
        adapter.encode_pcm16(&pcm, FRAME).unwrap();

        let stats = adapter.stats();
        assert_eq!(stats.frames_encoded, 2);
        assert!(stats.average_packet_size > 0.0);
    }
}
