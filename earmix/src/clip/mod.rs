//! Decoded PCM clips and the repository interface that serves them.

mod repository;

pub use repository::{ClipCache, ClipRepository};

use crate::error::{EarMixError, Result};
use std::time::Duration;

/// Bytes per sample of every clip and every output buffer (signed 16-bit)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Channel layout of a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipChannels {
    Mono,
    Stereo,
}

impl ClipChannels {
    pub fn from_count(count: u16) -> Result<Self> {
        match count {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            n => Err(EarMixError::AudioFormat(format!(
                "Unsupported clip channel count {} (expected 1 or 2)",
                n
            ))),
        }
    }

    pub fn count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Immutable decoded PCM sample data.
///
/// # Data Format
/// Raw **interleaved** signed 16-bit little-endian PCM:
/// - Mono: `[M0, M1, M2, ...]`
/// - Stereo: `[L0, R0, L1, R1, ...]`
///
/// Clips are shared through `Arc` by every instance playing them and are
/// expected to outlive those instances. A trailing partial frame is ignored.
#[derive(Debug)]
pub struct AudioClip {
    data: Vec<u8>,
    channels: ClipChannels,
    total_frames: usize,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, channels: ClipChannels) -> Self {
        let total_frames = data.len() / (channels.count() * BYTES_PER_SAMPLE);
        Self {
            data,
            channels,
            total_frames,
        }
    }

    /// Wrap raw PCM bytes tagged with a numeric channel count
    pub fn from_bytes(data: Vec<u8>, channel_count: u16) -> Result<Self> {
        Ok(Self::new(data, ClipChannels::from_count(channel_count)?))
    }

    /// Build a clip from interleaved samples
    pub fn from_samples(samples: &[i16], channels: ClipChannels) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, channels)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn channels(&self) -> ClipChannels {
        self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.count()
    }

    /// Length of the PCM data in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_frames == 0
    }

    /// Bytes per interleaved frame (`channels * 2`)
    pub fn frame_bytes(&self) -> usize {
        self.channels.count() * BYTES_PER_SAMPLE
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_frames as f64 / sample_rate as f64)
    }

    /// Sample of `channel` in `frame`, or silence when out of range
    pub fn sample(&self, frame: usize, channel: usize) -> i16 {
        if frame >= self.total_frames || channel >= self.channels.count() {
            return 0;
        }
        let offset = frame * self.frame_bytes() + channel * BYTES_PER_SAMPLE;
        i16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_samples_round_trip() {
        let clip = AudioClip::from_samples(&[100, -100, 50, -50], ClipChannels::Mono);
        assert_eq!(clip.len(), 8);
        assert_eq!(clip.total_frames(), 4);
        assert_eq!(clip.frame_bytes(), 2);
        assert_eq!(clip.sample(1, 0), -100);
        assert_eq!(clip.sample(3, 0), -50);
    }

    #[test]
    fn test_stereo_layout() {
        let clip = AudioClip::from_samples(&[1, 2, 3, 4, 5, 6], ClipChannels::Stereo);
        assert_eq!(clip.total_frames(), 3);
        assert_eq!(clip.sample(0, 0), 1);
        assert_eq!(clip.sample(0, 1), 2);
        assert_eq!(clip.sample(2, 1), 6);
    }

    #[test]
    fn test_out_of_range_reads_are_silent() {
        let clip = AudioClip::from_samples(&[7, 8], ClipChannels::Mono);
        assert_eq!(clip.sample(2, 0), 0);
        assert_eq!(clip.sample(0, 1), 0);
    }

    #[test]
    fn test_partial_trailing_frame_is_ignored() {
        let clip = AudioClip::from_bytes(vec![1, 0, 2, 0, 3], 2).unwrap();
        assert_eq!(clip.total_frames(), 1);
        assert!(!clip.is_empty());
    }

    #[test]
    fn test_rejects_unsupported_channel_count() {
        assert!(AudioClip::from_bytes(vec![0; 12], 6).is_err());
    }

    #[test]
    fn test_duration() {
        let clip = AudioClip::new(vec![0; 44100 * 2], ClipChannels::Mono);
        assert_eq!(clip.duration(44100), Duration::from_secs(1));
    }
}
