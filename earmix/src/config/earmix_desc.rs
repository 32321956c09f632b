use super::{Acoustics, EarDesc};
use crate::error::{EarMixError, Result};
use std::time::Duration;

/// Configuration descriptor for an EarMix engine
#[derive(Debug, Clone)]
pub struct EarMixDesc {
    /// Output sample rate handed to the sink with every buffer
    pub sample_rate: u32,
    /// Samples per ear channel produced by one mix pass
    pub buffer_frames: usize,
    /// Target cadence of the mixer loop
    pub pause: Duration,
    /// Pending buffers per channel at which mixing is deferred
    pub max_queued_buffers: usize,
    /// One entry per output channel, in sink channel order
    pub ears: Vec<EarDesc>,
    /// Initial acoustic model
    pub acoustics: Acoustics,
    /// Prefix for the mixer thread name; a sequence number is appended
    pub thread_name: String,
}

impl Default for EarMixDesc {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_frames: 441,
            pause: Duration::from_millis(10),
            max_queued_buffers: 2,
            ears: EarDesc::stereo(),
            acoustics: Acoustics::default(),
            thread_name: "earmix-mixer".to_string(),
        }
    }
}

impl EarMixDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn buffer_frames(mut self, frames: usize) -> Self {
        self.buffer_frames = frames;
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn max_queued_buffers(mut self, count: usize) -> Self {
        self.max_queued_buffers = count;
        self
    }

    pub fn ears(mut self, ears: Vec<EarDesc>) -> Self {
        self.ears = ears;
        self
    }

    pub fn acoustics(mut self, acoustics: Acoustics) -> Self {
        self.acoustics = acoustics;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Size in bytes of one channel buffer (16-bit mono)
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames * 2
    }

    /// Check the descriptor for values the mixer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EarMixError::Configuration(
                "sample_rate must be non-zero".into(),
            ));
        }
        if self.buffer_frames == 0 {
            return Err(EarMixError::Configuration(
                "buffer_frames must be non-zero".into(),
            ));
        }
        if self.max_queued_buffers == 0 {
            return Err(EarMixError::Configuration(
                "max_queued_buffers must be at least 1".into(),
            ));
        }
        if self.ears.is_empty() {
            return Err(EarMixError::Configuration(
                "at least one ear channel is required".into(),
            ));
        }
        for ear in &self.ears {
            if !(0.0..=1.0).contains(&ear.directional_minimum) {
                return Err(EarMixError::Configuration(format!(
                    "ear '{}' directional_minimum {} is outside [0, 1]",
                    ear.name, ear.directional_minimum
                )));
            }
        }

        let acoustics = &self.acoustics;
        if acoustics.speed_of_sound <= 0.0 {
            return Err(EarMixError::Configuration(
                "speed_of_sound must be positive".into(),
            ));
        }
        if acoustics.linear_falloff_distance <= 0.0 {
            return Err(EarMixError::Configuration(
                "linear_falloff_distance must be positive".into(),
            ));
        }
        if acoustics.head_width < 0.0 {
            return Err(EarMixError::Configuration(
                "head_width cannot be negative".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        let desc = EarMixDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.ears.len(), 2);
        assert_eq!(desc.buffer_bytes(), 882);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EarMixDesc::new().buffer_frames(0).validate().is_err());
        assert!(EarMixDesc::new().max_queued_buffers(0).validate().is_err());
        assert!(EarMixDesc::new().ears(Vec::new()).validate().is_err());
        assert!(
            EarMixDesc::new()
                .ears(vec![EarDesc::left().directional_minimum(1.5)])
                .validate()
                .is_err()
        );

        let acoustics = Acoustics {
            speed_of_sound: 0.0,
            ..Default::default()
        };
        assert!(EarMixDesc::new().acoustics(acoustics).validate().is_err());
    }
}
