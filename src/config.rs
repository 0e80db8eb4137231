//! Stream configuration
//!
//! Encoding and pacing parameters with TOML loading. Frame durations are
//! clamped to the set the codec accepts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::StreamHeader;

/// Frame durations (ms) the codec accepts for integer-millisecond frames.
pub const SUPPORTED_FRAME_MS: [u32; 5] = [5, 10, 20, 40, 60];

/// Parameters for one stream: codec settings plus the per-tick send cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count, 1 or 2.
    pub channels: u8,
    /// Target encoder bitrate in bits per second.
    pub bitrate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
    /// Maximum chunks sent per scheduling tick to avoid network spam.
    pub max_chunks_per_tick: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            bitrate: 32_000,
            frame_ms: 20,
            max_chunks_per_tick: 32,
        }
    }
}

impl StreamConfig {
    /// Samples per frame for a single channel.
    pub fn frame_size_per_channel(&self) -> usize {
        frame_size_from_ms(self.sample_rate, self.frame_ms)
    }

    /// Samples per frame across all channels (interleaved).
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size_per_channel() * self.channels as usize
    }

    /// Stream header describing this configuration. `num_packets` starts
    /// unknown; the sender fills it in when the packet list is final.
    pub fn header(&self) -> StreamHeader {
        StreamHeader {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bitrate: self.bitrate,
            frame_ms: self.frame_ms,
            num_packets: 0,
        }
    }

    /// Check the parameters a codec adapter would reject.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".into()));
        }
        if !(self.channels == 1 || self.channels == 2) {
            return Err(Error::Config(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        if self.max_chunks_per_tick == 0 {
            return Err(Error::Config("max_chunks_per_tick must be positive".into()));
        }
        Ok(())
    }

    /// Clamp the frame duration to the nearest supported value, then validate.
    pub fn normalized(mut self) -> Result<Self> {
        let clamped = clamp_frame_ms(self.frame_ms);
        if clamped != self.frame_ms {
            tracing::warn!(
                requested = self.frame_ms,
                clamped,
                "frame duration clamped to supported value"
            );
            self.frame_ms = clamped;
        }
        self.validate()?;
        Ok(self)
    }

    /// Parse a TOML document into a config.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.normalized()
    }

    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Samples per channel for the given duration at the given rate.
pub fn frame_size_from_ms(sample_rate: u32, frame_ms: u32) -> usize {
    (sample_rate as usize / 1000) * frame_ms as usize
}

/// Nearest member of [`SUPPORTED_FRAME_MS`]; ties resolve to the smaller value.
pub fn clamp_frame_ms(frame_ms: u32) -> u32 {
    SUPPORTED_FRAME_MS
        .iter()
        .copied()
        .min_by_key(|&candidate| (candidate.abs_diff(frame_ms), candidate))
        .unwrap_or(20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_size_per_channel(), 960);
        assert_eq!(config.samples_per_frame(), 960);
    }

    #[test]
    fn clamps_to_supported_set() {
        assert_eq!(clamp_frame_ms(20), 20);
        assert_eq!(clamp_frame_ms(2), 5);
        assert_eq!(clamp_frame_ms(15), 10); // tie resolves down
        assert_eq!(clamp_frame_ms(100), 60);
        assert_eq!(clamp_frame_ms(0), 5);
    }

    #[test]
    fn rejects_bad_channel_count() {
        let config = StreamConfig {
            channels: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_toml() {
        let config = StreamConfig::from_toml_str(
            r#"
            sample_rate = 24000
            channels = 2
            bitrate = 64000
            frame_ms = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.frame_ms, 40);
        // omitted field falls back to the default
        assert_eq!(config.max_chunks_per_tick, 32);
    }

    #[test]
    fn toml_frame_ms_is_clamped() {
        let config = StreamConfig::from_toml_str("frame_ms = 25").unwrap();
        assert_eq!(config.frame_ms, 20);
    }
}
