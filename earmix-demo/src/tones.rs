//! Synthetic clips so the demo runs without asset files.

use earmix::{AudioClip, ClipCache, ClipChannels};
use std::f32::consts::TAU;

pub const TONE_NAMES: [&str; 4] = ["sine-220", "sine-440", "chirp", "clicks"];

/// Fill `cache` with every tone in [`TONE_NAMES`]
pub fn register_tones(cache: &ClipCache, sample_rate: u32) {
    cache.insert("sine-220", sine(220.0, 2.0, sample_rate));
    cache.insert("sine-440", sine(440.0, 2.0, sample_rate));
    cache.insert("chirp", chirp(200.0, 2000.0, 1.5, sample_rate));
    cache.insert("clicks", clicks(8, 1.0, sample_rate));
}

/// Mono sine at `frequency` Hz with short fades at both ends
pub fn sine(frequency: f32, seconds: f32, sample_rate: u32) -> AudioClip {
    let frames = (seconds * sample_rate as f32) as usize;
    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let value = (t * frequency * TAU).sin() * fade(i, frames, sample_rate);
            (value * 12000.0) as i16
        })
        .collect();
    AudioClip::from_samples(&samples, ClipChannels::Mono)
}

/// Linear frequency sweep; easy to localize
pub fn chirp(from: f32, to: f32, seconds: f32, sample_rate: u32) -> AudioClip {
    let frames = (seconds * sample_rate as f32) as usize;
    let mut phase = 0.0f32;
    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let progress = i as f32 / frames as f32;
            phase = (phase + (from + (to - from) * progress) / sample_rate as f32).fract();
            let value = (phase * TAU).sin() * fade(i, frames, sample_rate);
            (value * 12000.0) as i16
        })
        .collect();
    AudioClip::from_samples(&samples, ClipChannels::Mono)
}

/// `count` evenly spaced clicks; the interaural delay is easiest to hear on these
pub fn clicks(count: usize, seconds: f32, sample_rate: u32) -> AudioClip {
    let frames = (seconds * sample_rate as f32) as usize;
    let spacing = (frames / count.max(1)).max(1);
    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let offset = i % spacing;
            if offset < 64 {
                (16000.0 * (1.0 - offset as f32 / 64.0)) as i16
            } else {
                0
            }
        })
        .collect();
    AudioClip::from_samples(&samples, ClipChannels::Mono)
}

/// 10 ms linear fade in and out
fn fade(index: usize, frames: usize, sample_rate: u32) -> f32 {
    let ramp = (sample_rate as usize / 100).max(1);
    let from_start = index as f32 / ramp as f32;
    let from_end = (frames - index) as f32 / ramp as f32;
    from_start.min(from_end).min(1.0)
}
