//! # EarMix
//!
//! A real-time software mixer that fakes binaural 3D audio without HRTFs.
//!
//! Every output channel is an "ear": a virtual microphone half a head width
//! from the listener, facing sideways. Each playing sound is mixed into every
//! ear with its own level (angle and distance falloff) and its own delay
//! (time of flight at the speed of sound). Those interaural level and time
//! differences are what place the sound.
//!
//! ## Quick Start
//!
//! ```no_run
//! use earmix::*;
//! use std::sync::Arc;
//!
//! let desc = EarMixDesc::default();
//! let mut engine = EarMixEngine::new(desc.clone())?;
//!
//! // The cpal stream is opened on the mixer thread
//! engine.init_with(move || CpalSink::open(&desc))?;
//!
//! // One second of a 440 Hz tone
//! let samples: Vec<i16> = (0..44100)
//!     .map(|i| ((i as f32 * 440.0 * std::f32::consts::TAU / 44100.0).sin() * 8000.0) as i16)
//!     .collect();
//! let clip = Arc::new(AudioClip::from_samples(&samples, ClipChannels::Mono));
//!
//! // Play it two meters to the listener's left
//! let tone = engine.create_instance(clip, InstanceParams::spatial(Vec3::new(-2.0, 0.0, 0.0)));
//! engine.add(&tone);
//!
//! // Once per game tick
//! engine.frame_update(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, false, 1.0 / 60.0);
//!
//! for event in engine.poll_events() {
//!     if let EarMixEvent::InstanceCompleted { instance_id } = event {
//!         println!("{} finished", instance_id);
//!     }
//! }
//! # Ok::<(), EarMixError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`EarMixEngine`]**: caller-side handle; owns the mixer thread
//! - **[`AudioClip`]** / **[`ClipRepository`]**: decoded PCM and where it comes from
//! - **[`AudioInstance`]**: one playback of a clip, controllable from any thread
//! - **[`EarChannel`](spatial::EarChannel)**: per-ear gain, delay and mixing
//! - **[`AudioSink`]**: queued-buffer output; [`CpalSink`] for speakers, [`MemorySink`] for tests
//! - **[`EarMixEvent`]**: lifecycle, error and timing notifications
//!
//! ## Threading
//!
//! 1. **Caller thread**: adds instances, calls `frame_update`, turns knobs
//! 2. **Mixer thread**: drains finished buffers, mixes, meters, submits, sleeps
//! 3. **Device callback** (cpal only): pops ring buffers into the hardware
//!
//! The first two share one short-lived lock. Instance state and cursor are
//! atomics, so pausing or stopping a sound never waits on the mixer.

pub mod clip;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ids;
pub mod math;
pub mod mixer;
pub mod playback;
pub mod sink;
pub mod spatial;

pub use clip::{AudioClip, ClipCache, ClipChannels, ClipRepository};
pub use config::{Acoustics, EarDesc, EarMixDesc};
pub use engine::EarMixEngine;
pub use error::{EarMixError, Result};
pub use events::{EarMixEvent, MixTimingEvent};
pub use ids::{IdSequence, InstanceId};
pub use math::{ListenerPose, Quat, Vec3};
pub use mixer::AddOutcome;
pub use playback::{AudioInstance, InstanceParams, PlayState};
pub use sink::{AudioSink, CpalSink, MemorySink, MemorySinkProbe};
