use crate::clip::{AudioClip, ClipRepository};
use crate::config::{Acoustics, EarMixDesc};
use crate::error::{EarMixError, Result};
use crate::events::EarMixEvent;
use crate::ids::{IdSequence, InstanceId};
use crate::math::{ListenerPose, Vec3};
use crate::mixer::{AddOutcome, LoopSettings, MixerShared, spawn_mixer};
use crate::playback::{AudioInstance, InstanceParams};
use crate::sink::AudioSink;
use crate::spatial::ListenerState;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

/// Events buffered for the host before new ones are dropped
const EVENT_CAPACITY: usize = 1024;

/// Handle to a binaural mixer.
///
/// The engine lives on the caller's thread. [`init`](Self::init) starts a
/// dedicated mixer thread that owns the sink and renders one buffer per ear
/// every `pause`. Everything else (adding instances, moving the listener,
/// turning knobs) is a short locked update that the next mix pass picks up.
pub struct EarMixEngine {
    desc: EarMixDesc,
    shared: Arc<MixerShared>,
    instance_ids: IdSequence,
    thread_ids: Arc<IdSequence>,
    events: Receiver<EarMixEvent>,
    mixer: Option<JoinHandle<()>>,
}

impl EarMixEngine {
    pub fn new(desc: EarMixDesc) -> Result<Self> {
        Self::with_thread_ids(desc, Arc::new(IdSequence::new()))
    }

    /// Like [`new`](Self::new), numbering mixer threads from a shared sequence
    pub fn with_thread_ids(desc: EarMixDesc, thread_ids: Arc<IdSequence>) -> Result<Self> {
        desc.validate()?;

        let (sender, events) = crossbeam_channel::bounded(EVENT_CAPACITY);
        let shared = Arc::new(MixerShared::new(&desc, sender));

        log::info!(
            "EarMix engine created: {} Hz, {} ear(s), {} frames per buffer",
            desc.sample_rate,
            desc.ears.len(),
            desc.buffer_frames
        );

        Ok(Self {
            desc,
            shared,
            instance_ids: IdSequence::new(),
            thread_ids,
            events,
            mixer: None,
        })
    }

    pub fn desc(&self) -> &EarMixDesc {
        &self.desc
    }

    /// Create a playback of `clip`. It is silent until passed to [`add`](Self::add).
    pub fn create_instance(&self, clip: Arc<AudioClip>, params: InstanceParams) -> AudioInstance {
        AudioInstance::new(InstanceId(self.instance_ids.next()), clip, params)
    }

    /// Look up `name` in `clips` and create a playback of it
    pub fn instance_of<R>(&self, clips: &R, name: &str, params: InstanceParams) -> Option<AudioInstance>
    where
        R: ClipRepository + ?Sized,
    {
        let clip = clips.get_clip(name);
        if clip.is_none() {
            log::warn!("No clip named '{}'", name);
        }
        clip.map(|clip| self.create_instance(clip, params))
    }

    /// Start playing `instance`.
    ///
    /// Adding an instance that is already playing does nothing; adding a
    /// paused one resumes it. Works whether or not the mixer is running.
    pub fn add(&self, instance: &AudioInstance) -> AddOutcome {
        let outcome = self.shared.state.lock().add(instance);
        match outcome {
            AddOutcome::Started => {
                log::debug!("{} started", instance.id());
                self.shared.emit(EarMixEvent::InstanceStarted {
                    instance_id: instance.id(),
                });
            }
            AddOutcome::Resumed => log::debug!("{} resumed", instance.id()),
            AddOutcome::AlreadyPlaying => {}
        }
        outcome
    }

    /// Feed the listener pose for this tick. Returns true if the move was
    /// handled as a teleport.
    pub fn frame_update(
        &self,
        position: Vec3,
        forward: Vec3,
        up: Vec3,
        did_teleport: bool,
        elapsed_seconds: f32,
    ) -> bool {
        let pose = ListenerPose::new(position, forward, up);
        let teleported = self
            .shared
            .state
            .lock()
            .update_listener(pose, did_teleport, elapsed_seconds);
        if teleported && !did_teleport {
            log::debug!("Listener move to {:?} treated as a teleport", position);
        }
        teleported
    }

    /// Start the mixer thread on a sink that can be moved across threads
    pub fn init<S>(&mut self, sink: S) -> Result<()>
    where
        S: AudioSink + Send + 'static,
    {
        self.init_with(move || Ok(sink))
    }

    /// Start the mixer thread, building the sink on that thread.
    ///
    /// Fails if the mixer is already running. A mixer that died on its own is
    /// reaped first, so `init_with` is also how a host recovers from an
    /// [`EarMixEvent::EngineError`].
    pub fn init_with<S, F>(&mut self, factory: F) -> Result<()>
    where
        S: AudioSink + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        if self.shared.is_running() {
            return Err(EarMixError::Engine("mixer is already running".into()));
        }
        self.reap();

        let name = format!("{}-{}", self.desc.thread_name, self.thread_ids.next());
        self.shared.running.store(true, Ordering::Release);
        let handle = spawn_mixer(
            name.clone(),
            LoopSettings::from_desc(&self.desc),
            self.shared.clone(),
            factory,
        )?;
        self.mixer = Some(handle);

        log::info!("Spawned mixer thread '{}'", name);
        Ok(())
    }

    /// Stop the mixer and wait for its thread to release the sink
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.reap();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Average absolute sample value of the last mixed block, in 16-bit units
    pub fn current_level(&self) -> f32 {
        self.shared.level()
    }

    /// Drain pending events without blocking
    pub fn poll_events(&self) -> Vec<EarMixEvent> {
        self.events.try_iter().collect()
    }

    /// Receiver for hosts that prefer to select on events
    pub fn events(&self) -> &Receiver<EarMixEvent> {
        &self.events
    }

    pub fn playing_count(&self) -> usize {
        self.shared.state.lock().playing_count()
    }

    pub fn acoustics(&self) -> Acoustics {
        self.shared.state.lock().acoustics
    }

    pub fn listener(&self) -> ListenerState {
        self.shared.state.lock().listener
    }

    pub fn listener_velocity(&self) -> Vec3 {
        self.shared.state.lock().listener.velocity
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.shared.state.lock().acoustics.master_volume = volume;
    }

    pub fn set_head_width(&self, width: f32) -> Result<()> {
        if width.is_nan() || width < 0.0 {
            return Err(EarMixError::Configuration(format!(
                "head width {} must be non-negative",
                width
            )));
        }
        let mut state = self.shared.state.lock();
        state.acoustics.head_width = width;
        state.refresh_ears();
        Ok(())
    }

    pub fn set_speed_of_sound(&self, speed: f32) -> Result<()> {
        if speed.is_nan() || speed <= 0.0 {
            return Err(EarMixError::Configuration(format!(
                "speed of sound {} must be positive",
                speed
            )));
        }
        self.shared.state.lock().acoustics.speed_of_sound = speed;
        Ok(())
    }

    pub fn set_linear_falloff_distance(&self, distance: f32) -> Result<()> {
        if distance.is_nan() || distance <= 0.0 {
            return Err(EarMixError::Configuration(format!(
                "linear falloff distance {} must be positive",
                distance
            )));
        }
        self.shared.state.lock().acoustics.linear_falloff_distance = distance;
        Ok(())
    }

    pub fn set_teleport_velocity_threshold(&self, speed: f32) {
        self.shared.state.lock().acoustics.teleport_velocity_threshold = speed;
    }

    pub fn set_channel_volume(&self, channel: usize, volume: f32) -> Result<()> {
        let mut state = self.shared.state.lock();
        let ear = state
            .ears
            .get_mut(channel)
            .ok_or_else(|| EarMixError::Configuration(format!("no ear channel {}", channel)))?;
        ear.set_volume_multiplier(volume);
        Ok(())
    }

    pub fn set_directional_minimum(&self, channel: usize, minimum: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&minimum) {
            return Err(EarMixError::Configuration(format!(
                "directional minimum {} is outside [0, 1]",
                minimum
            )));
        }
        let mut state = self.shared.state.lock();
        let ear = state
            .ears
            .get_mut(channel)
            .ok_or_else(|| EarMixError::Configuration(format!("no ear channel {}", channel)))?;
        ear.set_directional_minimum(minimum);
        Ok(())
    }

    fn reap(&mut self) {
        if let Some(handle) = self.mixer.take() {
            if handle.join().is_err() {
                log::error!("Mixer thread panicked outside its loop");
            }
        }
    }
}

impl Drop for EarMixEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipCache, ClipChannels};
    use crate::playback::PlayState;

    fn engine() -> EarMixEngine {
        EarMixEngine::new(EarMixDesc::new().buffer_frames(4)).unwrap()
    }

    #[test]
    fn test_invalid_desc_is_rejected() {
        assert!(EarMixEngine::new(EarMixDesc::new().sample_rate(0)).is_err());
    }

    #[test]
    fn test_add_without_mixer_waits_in_list() {
        let engine = engine();
        let clip = Arc::new(AudioClip::from_samples(&[1, 2], ClipChannels::Mono));
        let first = engine.create_instance(clip.clone(), InstanceParams::default());
        let second = engine.create_instance(clip, InstanceParams::default());
        assert_ne!(first.id(), second.id());

        assert_eq!(engine.add(&first), AddOutcome::Started);
        assert_eq!(engine.add(&first), AddOutcome::AlreadyPlaying);
        assert_eq!(first.state(), PlayState::Playing);
        assert_eq!(engine.playing_count(), 1);
        assert!(!engine.is_running());

        let events = engine.poll_events();
        assert_eq!(
            events,
            vec![EarMixEvent::InstanceStarted {
                instance_id: first.id()
            }]
        );
    }

    #[test]
    fn test_instance_from_repository() {
        let engine = engine();
        let cache = ClipCache::new();
        cache.insert("chime", AudioClip::from_samples(&[5; 8], ClipChannels::Mono));

        assert!(engine.instance_of(&cache, "missing", InstanceParams::default()).is_none());
        let chime = engine
            .instance_of(&cache, "chime", InstanceParams::default())
            .unwrap();
        assert_eq!(chime.clip().total_frames(), 8);
    }

    #[test]
    fn test_fast_move_is_a_teleport() {
        let engine = engine();
        engine.set_teleport_velocity_threshold(100.0);

        // 10 units in 10 ms is 1000 units per second
        let teleported =
            engine.frame_update(Vec3::new(10.0, 0.0, 0.0), Vec3::NEG_Z, Vec3::Y, false, 0.01);
        assert!(teleported);
        assert_eq!(engine.listener_velocity(), Vec3::ZERO);
        assert_eq!(engine.listener().previous_position, Vec3::new(10.0, 0.0, 0.0));

        let teleported =
            engine.frame_update(Vec3::new(10.5, 0.0, 0.0), Vec3::NEG_Z, Vec3::Y, false, 0.01);
        assert!(!teleported);
        assert!((engine.listener_velocity() - Vec3::new(50.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_knobs_validate_input() {
        let engine = engine();
        assert!(engine.set_speed_of_sound(0.0).is_err());
        assert!(engine.set_linear_falloff_distance(-1.0).is_err());
        assert!(engine.set_head_width(f32::NAN).is_err());
        assert!(engine.set_channel_volume(5, 1.0).is_err());
        assert!(engine.set_directional_minimum(0, 2.0).is_err());

        engine.set_master_volume(0.5);
        engine.set_speed_of_sound(300.0).unwrap();
        engine.set_directional_minimum(1, 0.1).unwrap();
        let acoustics = engine.acoustics();
        assert_eq!(acoustics.master_volume, 0.5);
        assert_eq!(acoustics.speed_of_sound, 300.0);
    }

    #[test]
    fn test_head_width_moves_ears() {
        let engine = engine();
        engine.set_head_width(1.0).unwrap();
        let state = engine.shared.state.lock();
        assert!((state.ears()[0].ear_position() - Vec3::new(-0.5, 0.0, 0.0)).length() < 1e-5);
        assert!((state.ears()[1].ear_position() - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
    }
}
