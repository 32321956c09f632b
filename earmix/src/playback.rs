//! Playback state for individual sounds.
//!
//! - [`PlayState`]: lifecycle of one playback
//! - [`InstanceParams`]: host-adjustable gain, pitch, loop flag and position
//! - [`AudioInstance`]: shared handle to one live playback of a clip
//!
//! Instances are handed to [`EarMixEngine::add`](crate::EarMixEngine::add) to
//! start playing. The host keeps a clone of the handle to pause, stop or move
//! the sound while the mixer thread advances it.

use crate::clip::AudioClip;
use crate::ids::InstanceId;
use crate::math::Vec3;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Lifecycle of an [`AudioInstance`].
///
/// `Waiting → Playing` on add, `Playing → Done` when a non-looping clip is
/// exhausted, `Playing → Stop` on request, `Playing ⇄ Paused` on toggle.
/// `Done` and `Stop` both retire the instance on the next mix pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayState {
    Waiting = 0,
    Playing = 1,
    Done = 2,
    Stop = 3,
    Paused = 4,
}

impl PlayState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Done,
            3 => Self::Stop,
            4 => Self::Paused,
            _ => Self::Waiting,
        }
    }

    /// True for states that remove the instance from the mixer
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Stop)
    }
}

/// Per-instance mixing parameters, snapshotted once per mix pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceParams {
    /// Linear gain before the squared loudness curve
    pub gain: f32,
    /// Playback rate; 1.0 plays the clip at its native speed
    pub pitch: f32,
    /// Wrap around at the end of the clip instead of finishing
    pub looping: bool,
    /// World position of the emitter
    pub position: Vec3,
    /// Spatialize against `position`; otherwise every ear gets unity volume
    pub use_position: bool,
}

impl Default for InstanceParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            looping: false,
            position: Vec3::ZERO,
            use_position: false,
        }
    }
}

impl InstanceParams {
    /// Non-positional playback at the given gain
    pub fn flat(gain: f32) -> Self {
        Self {
            gain,
            ..Default::default()
        }
    }

    /// Positional playback at full gain
    pub fn spatial(position: Vec3) -> Self {
        Self {
            position,
            use_position: true,
            ..Default::default()
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }
}

#[derive(Debug)]
struct InstanceShared {
    id: InstanceId,
    clip: Arc<AudioClip>,
    state: AtomicU8,
    /// Byte offset into the clip data; always frame aligned
    cursor: AtomicUsize,
    /// Present in the mixer's playing list; only changed under the mixer lock
    enlisted: AtomicBool,
    params: Mutex<InstanceParams>,
}

/// Shared handle to one playback of a clip.
///
/// Cloning the handle does not create a new playback; all clones observe and
/// control the same instance.
#[derive(Debug, Clone)]
pub struct AudioInstance {
    inner: Arc<InstanceShared>,
}

impl AudioInstance {
    pub fn new(id: InstanceId, clip: Arc<AudioClip>, params: InstanceParams) -> Self {
        Self {
            inner: Arc::new(InstanceShared {
                id,
                clip,
                state: AtomicU8::new(PlayState::Waiting as u8),
                cursor: AtomicUsize::new(0),
                enlisted: AtomicBool::new(false),
                params: Mutex::new(params),
            }),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    pub fn clip(&self) -> &Arc<AudioClip> {
        &self.inner.clip
    }

    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Current read position in bytes
    pub fn cursor(&self) -> usize {
        self.inner.cursor.load(Ordering::Acquire)
    }

    pub fn params(&self) -> InstanceParams {
        *self.inner.params.lock()
    }

    /// Pause a playing instance; it keeps its cursor and its mixer slot
    pub fn pause(&self) -> bool {
        let paused = self.transition(PlayState::Playing, PlayState::Paused);
        if paused {
            log::debug!("{} paused at byte {}", self.id(), self.cursor());
        }
        paused
    }

    /// Resume a paused instance
    pub fn resume(&self) -> bool {
        let resumed = self.transition(PlayState::Paused, PlayState::Playing);
        if resumed {
            log::debug!("{} resumed at byte {}", self.id(), self.cursor());
        }
        resumed
    }

    /// Request removal on the next mix pass. Has no effect once `Done`.
    pub fn stop(&self) {
        let result = self
            .inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match PlayState::from_u8(raw) {
                    PlayState::Done | PlayState::Stop => None,
                    _ => Some(PlayState::Stop as u8),
                }
            });
        if result.is_ok() {
            log::debug!("{} stop requested", self.id());
        }
    }

    pub fn set_gain(&self, gain: f32) {
        self.inner.params.lock().gain = gain;
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.inner.params.lock().pitch = pitch;
    }

    pub fn set_looping(&self, looping: bool) {
        self.inner.params.lock().looping = looping;
    }

    /// Move the emitter; `None` switches the instance to non-positional playback
    pub fn set_position(&self, position: Option<Vec3>) {
        let mut params = self.inner.params.lock();
        match position {
            Some(position) => {
                params.position = position;
                params.use_position = true;
            }
            None => params.use_position = false,
        }
    }

    pub(crate) fn set_state(&self, state: PlayState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Mark a playing instance `Done`. Fails when a concurrent stop or pause
    /// got there first, so that request is not lost.
    pub(crate) fn finish(&self) -> bool {
        self.transition(PlayState::Playing, PlayState::Done)
    }

    pub(crate) fn set_cursor(&self, cursor: usize) {
        self.inner.cursor.store(cursor, Ordering::Release);
    }

    pub(crate) fn is_enlisted(&self) -> bool {
        self.inner.enlisted.load(Ordering::Acquire)
    }

    pub(crate) fn set_enlisted(&self, enlisted: bool) {
        self.inner.enlisted.store(enlisted, Ordering::Release);
    }

    fn transition(&self, from: PlayState, to: PlayState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipChannels;

    fn instance() -> AudioInstance {
        let clip = Arc::new(AudioClip::from_samples(&[1, 2, 3], ClipChannels::Mono));
        AudioInstance::new(InstanceId(7), clip, InstanceParams::default())
    }

    #[test]
    fn test_new_instance_is_waiting() {
        let instance = instance();
        assert_eq!(instance.state(), PlayState::Waiting);
        assert_eq!(instance.cursor(), 0);
        assert!(!instance.is_enlisted());
    }

    #[test]
    fn test_pause_and_resume_only_from_matching_state() {
        let instance = instance();
        assert!(!instance.pause());

        instance.set_state(PlayState::Playing);
        assert!(instance.pause());
        assert_eq!(instance.state(), PlayState::Paused);
        assert!(!instance.pause());

        assert!(instance.resume());
        assert_eq!(instance.state(), PlayState::Playing);
    }

    #[test]
    fn test_stop_does_not_override_done() {
        let instance = instance();
        instance.set_state(PlayState::Done);
        instance.stop();
        assert_eq!(instance.state(), PlayState::Done);

        let other = self::instance();
        other.set_state(PlayState::Paused);
        other.stop();
        assert_eq!(other.state(), PlayState::Stop);
        assert!(other.state().is_terminal());
    }

    #[test]
    fn test_finish_yields_to_stop() {
        let instance = instance();
        instance.set_state(PlayState::Playing);
        instance.stop();
        assert!(!instance.finish());
        assert_eq!(instance.state(), PlayState::Stop);

        let other = self::instance();
        other.set_state(PlayState::Playing);
        assert!(other.finish());
        assert_eq!(other.state(), PlayState::Done);
    }

    #[test]
    fn test_clones_share_state() {
        let instance = instance();
        let handle = instance.clone();
        handle.set_gain(0.25);
        handle.set_position(Some(Vec3::X));

        let params = instance.params();
        assert_eq!(params.gain, 0.25);
        assert!(params.use_position);

        instance.set_position(None);
        assert!(!handle.params().use_position);
        assert_eq!(handle.params().position, Vec3::X);
    }
}
