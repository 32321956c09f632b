//! Mixing core shared by the engine handle and the mixer thread.
//!
//! [`MixState`] is everything the caller thread and the mixer thread both
//! touch. It sits behind one lock in [`MixerShared`]; the mixer holds that
//! lock for one mix pass and never across a sink call.

mod pool;
mod runner;

pub use pool::{BufferPool, MixBlock};
pub(crate) use runner::{LoopSettings, spawn_mixer};

use crate::config::{Acoustics, EarMixDesc};
use crate::events::EarMixEvent;
use crate::ids::InstanceId;
use crate::math::ListenerPose;
use crate::playback::{AudioInstance, PlayState};
use crate::spatial::{EarChannel, ListenerState};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Result of handing an instance to [`MixState::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Newly enlisted, or re-armed after a stop that had not been processed yet
    Started,
    /// Was paused and still enlisted; continues from its cursor
    Resumed,
    /// Already playing; nothing changed
    AlreadyPlaying,
}

/// What one mix pass did, reused across passes to avoid allocation
#[derive(Debug, Default)]
pub struct MixReport {
    pub mixed: usize,
    pub completed: Vec<InstanceId>,
    pub stopped: Vec<InstanceId>,
}

impl MixReport {
    fn clear(&mut self) {
        self.mixed = 0;
        self.completed.clear();
        self.stopped.clear();
    }
}

#[derive(Debug)]
pub struct MixState {
    pub(crate) listener: ListenerState,
    pub(crate) acoustics: Acoustics,
    pub(crate) ears: Vec<EarChannel>,
    sample_rate: u32,
    playing: Vec<AudioInstance>,
    dead: Vec<usize>,
}

impl MixState {
    pub fn new(desc: &EarMixDesc) -> Self {
        let ears = desc
            .ears
            .iter()
            .enumerate()
            .map(|(index, ear)| EarChannel::new(index, ear))
            .collect();

        let mut state = Self {
            listener: ListenerState::default(),
            acoustics: desc.acoustics,
            ears,
            sample_rate: desc.sample_rate,
            playing: Vec::new(),
            dead: Vec::new(),
        };
        state.refresh_ears();
        state
    }

    pub fn playing_count(&self) -> usize {
        self.playing.len()
    }

    pub fn ears(&self) -> &[EarChannel] {
        &self.ears
    }

    /// Start, resume or ignore an instance depending on its state
    pub fn add(&mut self, instance: &AudioInstance) -> AddOutcome {
        match instance.state() {
            PlayState::Playing => AddOutcome::AlreadyPlaying,
            PlayState::Paused if instance.is_enlisted() => {
                instance.set_state(PlayState::Playing);
                AddOutcome::Resumed
            }
            _ => {
                instance.set_state(PlayState::Playing);
                if !instance.is_enlisted() {
                    instance.set_enlisted(true);
                    self.playing.push(instance.clone());
                }
                AddOutcome::Started
            }
        }
    }

    /// Move the listener and recompute ear geometry. Returns true on teleport.
    pub fn update_listener(&mut self, pose: ListenerPose, did_teleport: bool, dt: f32) -> bool {
        let teleported = self.listener.update(
            pose,
            did_teleport,
            dt,
            self.acoustics.teleport_velocity_threshold,
        );
        self.refresh_ears();
        teleported
    }

    pub fn refresh_ears(&mut self) {
        let pose = self.listener.pose;
        let head_width = self.acoustics.head_width;
        for ear in &mut self.ears {
            ear.update_pose(&pose, head_width);
        }
    }

    /// Mix every playing instance into `block`, then retire finished and
    /// stopped instances.
    pub fn mix_pass(&mut self, block: &mut MixBlock, report: &mut MixReport) {
        report.clear();
        self.dead.clear();

        for (index, instance) in self.playing.iter().enumerate() {
            match instance.state() {
                PlayState::Playing => {
                    report.mixed += 1;
                    if self.add_clip_to_all_channels(instance, block) {
                        log::debug!("{} finished", instance.id());
                        report.completed.push(instance.id());
                        self.dead.push(index);
                    }
                }
                PlayState::Done => self.dead.push(index),
                PlayState::Stop => {
                    instance.set_cursor(0);
                    log::debug!("{} stopped", instance.id());
                    report.stopped.push(instance.id());
                    self.dead.push(index);
                }
                PlayState::Paused | PlayState::Waiting => {}
            }
        }

        for &index in self.dead.iter().rev() {
            let instance = self.playing.remove(index);
            instance.set_enlisted(false);
        }
        self.dead.clear();
    }

    /// Mix one instance into every ear channel and advance its cursor.
    ///
    /// Returns true when a non-looping instance has run out of clip; it is
    /// then `Done` with its cursor rewound to zero.
    fn add_clip_to_all_channels(&self, instance: &AudioInstance, block: &mut MixBlock) -> bool {
        let params = instance.params();
        let clip = instance.clip();
        let cursor = instance.cursor();

        let mut cursor_after: Option<usize> = None;
        let mut max_offset = i64::MIN;
        for ear in &self.ears {
            let mix = ear.add_clip_to_buffer(
                clip,
                cursor,
                &params,
                &self.acoustics,
                self.sample_rate,
                block.channel_mut(ear.index()),
            );
            cursor_after = Some(cursor_after.map_or(mix.cursor_after, |c| c.max(mix.cursor_after)));
            max_offset = max_offset.max(mix.time_offset);
        }

        let Some(cursor_after) = cursor_after else {
            return false;
        };

        if !params.looping {
            let frame_after = (cursor_after / clip.frame_bytes()) as i64;
            // A stop or pause that raced this pass is handled on the next one
            if frame_after + max_offset >= clip.total_frames() as i64 && instance.finish() {
                instance.set_cursor(0);
                return true;
            }
        }

        instance.set_cursor(cursor_after);
        false
    }
}

/// State shared between [`EarMixEngine`](crate::EarMixEngine) and its mixer thread
#[derive(Debug)]
pub(crate) struct MixerShared {
    pub state: Mutex<MixState>,
    pub running: AtomicBool,
    level: AtomicU32,
    events: Sender<EarMixEvent>,
}

impl MixerShared {
    pub fn new(desc: &EarMixDesc, events: Sender<EarMixEvent>) -> Self {
        Self {
            state: Mutex::new(MixState::new(desc)),
            running: AtomicBool::new(false),
            level: AtomicU32::new(0f32.to_bits()),
            events,
        }
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn publish_level(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue an event for the host; dropped when nobody is draining the queue
    pub fn emit(&self, event: EarMixEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            log::trace!("Event queue full, dropping {:?}", event);
        }
    }
}
