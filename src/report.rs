//! Read-only transfer snapshots
//!
//! Derived views of transfer state for debugging and observability: nothing
//! here affects protocol state. `Display` renders the human-readable report
//! text.

use std::fmt;

use crate::protocol::{SessionId, StreamHeader};
use crate::transfer::{IncomingTransfer, OutgoingTransfer};

/// Per-chunk line in a report.
#[derive(Debug, Clone, Copy)]
pub struct ChunkReport {
    pub index: u32,
    pub size_bytes: usize,
    pub sent: bool,
    pub received: bool,
}

/// Snapshot of a sender-side transfer.
#[derive(Debug, Clone)]
pub struct OutgoingReport {
    pub session: SessionId,
    pub header: StreamHeader,
    pub total_chunks: usize,
    pub sent_chunks: usize,
    pub pending_chunks: usize,
    pub next_index: usize,
    pub header_sent: bool,
    pub end_sent: bool,
    pub complete: bool,
    pub total_bytes: usize,
    pub estimated_duration_secs: f64,
    pub estimated_bitrate_kbps: f64,
    pub pending_indices: Vec<u32>,
    pub chunks: Vec<ChunkReport>,
}

impl OutgoingReport {
    pub(crate) fn from_transfer(transfer: &OutgoingTransfer) -> Self {
        let total_chunks = transfer.total_chunks();
        let sent_chunks = transfer.sent_chunks().min(total_chunks);

        let mut chunks = Vec::with_capacity(total_chunks);
        let mut pending_indices = Vec::new();
        let mut total_bytes = 0usize;

        for (i, chunk) in transfer.chunks().iter().enumerate() {
            let sent = i < sent_chunks;
            let size_bytes = chunk.packet.len();
            total_bytes += size_bytes;
            if !sent {
                pending_indices.push(chunk.index);
            }
            chunks.push(ChunkReport {
                index: chunk.index,
                size_bytes,
                sent,
                received: false,
            });
        }

        let header = *transfer.header();
        let estimated_duration_secs = if header.frame_ms > 0 {
            (total_chunks as f64 * header.frame_ms as f64) / 1000.0
        } else {
            0.0
        };
        let estimated_bitrate_kbps = if estimated_duration_secs > 0.0 {
            (total_bytes as f64 * 8.0 / estimated_duration_secs) / 1000.0
        } else {
            0.0
        };
        let complete = if total_chunks > 0 {
            sent_chunks >= total_chunks && transfer.end_sent()
        } else {
            transfer.end_sent()
        };

        Self {
            session: transfer.session(),
            header,
            total_chunks,
            sent_chunks,
            pending_chunks: total_chunks.saturating_sub(sent_chunks),
            next_index: transfer.next_index().min(total_chunks),
            header_sent: transfer.header_sent(),
            end_sent: transfer.end_sent(),
            complete,
            total_bytes,
            estimated_duration_secs,
            estimated_bitrate_kbps,
            pending_indices,
            chunks,
        }
    }
}

impl fmt::Display for OutgoingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Audio Replicator - Outgoing ===")?;
        writeln!(f, "Session: {}", self.session)?;
        writeln!(f, "{}", self.header)?;
        writeln!(
            f,
            "Chunks: total={}  sent={}  pending={}  next={}",
            self.total_chunks, self.sent_chunks, self.pending_chunks, self.next_index
        )?;
        writeln!(
            f,
            "Buffer: {} bytes  Dur~{:.3} s  Bitrate~{:.2} kbps",
            self.total_bytes, self.estimated_duration_secs, self.estimated_bitrate_kbps
        )?;
        writeln!(
            f,
            "HeaderSent={}  EndSent={}  Completed={}",
            self.header_sent, self.end_sent, self.complete
        )?;
        if !self.pending_indices.is_empty() {
            writeln!(f, "Pending indices: {}", join_indices(&self.pending_indices))?;
        }
        writeln!(f, "--- Chunk Details ---")?;
        for chunk in &self.chunks {
            writeln!(
                f,
                "[{}] size={} B  sent={}",
                chunk.index,
                chunk.size_bytes,
                if chunk.sent { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }
}

/// Snapshot of a receiver-side transfer.
#[derive(Debug, Clone)]
pub struct IncomingReport {
    pub session: SessionId,
    pub header: StreamHeader,
    pub started: bool,
    pub ended: bool,
    pub ready_to_assemble: bool,
    /// Raw chunk-arrival events, duplicates included.
    pub received_events: u32,
    pub unique_chunks: u32,
    pub expected_chunks: u32,
    pub missing_chunks: u32,
    pub total_bytes: usize,
    pub estimated_duration_secs: f64,
    pub estimated_bitrate_kbps: f64,
    pub missing_indices: Vec<u32>,
    pub chunks: Vec<ChunkReport>,
}

impl IncomingReport {
    pub(crate) fn from_transfer(session: SessionId, transfer: &IncomingTransfer) -> Self {
        let header = *transfer.header();
        let expected_chunks = transfer.expected();
        let display_count = if expected_chunks > 0 {
            expected_chunks as usize
        } else {
            transfer.packets().len()
        };

        let mut chunks = Vec::with_capacity(display_count);
        let mut total_bytes = 0usize;
        let mut unique_chunks = 0u32;

        for index in 0..display_count {
            let size_bytes = transfer.packets().get(index).map_or(0, |p| p.len());
            let received = size_bytes > 0;
            if received {
                unique_chunks += 1;
                total_bytes += size_bytes;
            }
            chunks.push(ChunkReport {
                index: index as u32,
                size_bytes,
                sent: false,
                received,
            });
        }

        let missing_chunks = if expected_chunks > 0 {
            expected_chunks.saturating_sub(unique_chunks)
        } else {
            0
        };
        let estimated_duration_secs = if header.frame_ms > 0 {
            (unique_chunks as f64 * header.frame_ms as f64) / 1000.0
        } else {
            0.0
        };
        let estimated_bitrate_kbps = if estimated_duration_secs > 0.0 {
            (total_bytes as f64 * 8.0 / estimated_duration_secs) / 1000.0
        } else {
            0.0
        };

        Self {
            session,
            header,
            started: transfer.started(),
            ended: transfer.ended(),
            ready_to_assemble: transfer.ready_to_assemble(),
            received_events: transfer.received_events(),
            unique_chunks,
            expected_chunks,
            missing_chunks,
            total_bytes,
            estimated_duration_secs,
            estimated_bitrate_kbps,
            missing_indices: transfer.missing_indices(),
            chunks,
        }
    }
}

impl fmt::Display for IncomingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Audio Replicator - Incoming ===")?;
        writeln!(f, "Session: {}", self.session)?;
        writeln!(f, "{}", self.header)?;
        writeln!(
            f,
            "State: Started={}  Ended={}  Ready={}",
            self.started, self.ended, self.ready_to_assemble
        )?;
        writeln!(
            f,
            "Chunks: received-msgs={}  unique={}  expected={}  missing={}",
            self.received_events, self.unique_chunks, self.expected_chunks, self.missing_chunks
        )?;
        writeln!(
            f,
            "Buffer: {} bytes  Dur~{:.3} s  Bitrate~{:.2} kbps",
            self.total_bytes, self.estimated_duration_secs, self.estimated_bitrate_kbps
        )?;
        if !self.missing_indices.is_empty() {
            writeln!(f, "Missing indices: {}", join_indices(&self.missing_indices))?;
        }
        writeln!(f, "--- Chunk Details ---")?;
        for chunk in &self.chunks {
            writeln!(
                f,
                "[{}] size={} B  received={}",
                chunk.index,
                chunk.size_bytes,
                if chunk.received { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }
}

/// Summary of a local encode (or transcode) pass: alignment, compression,
/// and packetization sanity numbers.
#[derive(Debug, Clone)]
pub struct EncodeSummary {
    pub sample_rate: u32,
    pub channels: u8,
    pub frame_ms: u32,
    pub bitrate: u32,
    /// Interleaved PCM16 samples fed to the encoder.
    pub pcm_samples: usize,
    /// Interleaved samples after a decode pass, when one ran.
    pub decoded_samples: Option<usize>,
    /// Packed buffer size in bytes.
    pub buffer_bytes: usize,
    pub packet_count: usize,
}

impl EncodeSummary {
    fn denominator(&self) -> f64 {
        self.sample_rate as f64 * self.channels.max(1) as f64
    }

    /// Input duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.pcm_samples as f64 / self.denominator()
    }

    /// Samples that did not align with a full frame and were dropped.
    pub fn tail_samples(&self) -> usize {
        let per_frame =
            (self.sample_rate as usize / 1000) * self.frame_ms as usize * self.channels as usize;
        if per_frame > 0 {
            self.pcm_samples % per_frame
        } else {
            0
        }
    }

    /// Encoded size over raw PCM16 size; below 1 is a win.
    pub fn compression_ratio(&self) -> f64 {
        let pcm_bytes = self.pcm_samples as f64 * 2.0;
        if pcm_bytes > 0.0 {
            self.buffer_bytes as f64 / pcm_bytes
        } else {
            0.0
        }
    }

    /// Average bitrate implied by the packed buffer, in kbps.
    pub fn effective_bitrate_kbps(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0.0 {
            (self.buffer_bytes as f64 * 8.0 / duration) / 1000.0
        } else {
            0.0
        }
    }

    /// Packet count the frame duration predicts for the input length.
    pub fn expected_packet_count(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0.0 && self.frame_ms > 0 {
            duration * (1000.0 / self.frame_ms as f64)
        } else {
            0.0
        }
    }
}

impl fmt::Display for EncodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = self.duration_secs();
        writeln!(f, "=== Audio Replicator - Local Encode ===")?;
        writeln!(
            f,
            "SR={} Hz  Ch={}  Frame={} ms  Target Bitrate~{} bps",
            self.sample_rate, self.channels, self.frame_ms, self.bitrate
        )?;
        writeln!(
            f,
            "PCM: Samples={}  Bytes={}  Dur~{:.3} s",
            self.pcm_samples,
            self.pcm_samples * 2,
            duration
        )?;
        if let Some(decoded) = self.decoded_samples {
            let out_duration = decoded as f64 / self.denominator();
            writeln!(
                f,
                "Decoded: Samples={}  Dur~{:.3} s  Delta~{:.3} s",
                decoded,
                out_duration,
                out_duration - duration
            )?;
        }
        writeln!(
            f,
            "Tail (non-aligned to frame): {} samp  ~{:.2} ms",
            self.tail_samples(),
            self.tail_samples() as f64 * 1000.0 / self.denominator()
        )?;
        writeln!(f, "--- Compression ---")?;
        writeln!(
            f,
            "Opus buffer: {} bytes  Packets: {}  AvgPkt~{:.1} B",
            self.buffer_bytes,
            self.packet_count,
            if self.packet_count > 0 {
                self.buffer_bytes as f64 / self.packet_count as f64
            } else {
                0.0
            }
        )?;
        writeln!(
            f,
            "Ratio (buf/pcm)~{:.3}  Saved~{:.1} %",
            self.compression_ratio(),
            (1.0 - self.compression_ratio()) * 100.0
        )?;
        writeln!(
            f,
            "Eff. bitrate~{:.1} kbps  Pkts/sec~{:.2}  Expected~{:.1}",
            self.effective_bitrate_kbps(),
            if duration > 0.0 {
                self.packet_count as f64 / duration
            } else {
                0.0
            },
            self.expected_packet_count()
        )?;
        Ok(())
    }
}

fn join_indices(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
