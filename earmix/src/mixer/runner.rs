use super::{BufferPool, MixReport, MixerShared};
use crate::config::EarMixDesc;
use crate::error::{EarMixError, Result};
use crate::events::{EarMixEvent, MixTimingEvent};
use crate::sink::{AudioSink, BufferId, ChannelLayout, SourceHandle};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Mixer thread parameters copied out of the descriptor
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopSettings {
    pub sample_rate: u32,
    pub buffer_bytes: usize,
    pub pause: Duration,
    pub max_queued_buffers: usize,
    pub channel_count: usize,
}

impl LoopSettings {
    pub fn from_desc(desc: &EarMixDesc) -> Self {
        Self {
            sample_rate: desc.sample_rate,
            buffer_bytes: desc.buffer_bytes(),
            pause: desc.pause,
            max_queued_buffers: desc.max_queued_buffers,
            channel_count: desc.ears.len(),
        }
    }
}

/// Whether an iteration produced audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Iteration {
    Mixed,
    /// A channel still had a full queue; nothing was mixed
    Deferred,
}

/// Owns the sink and everything only the mixer thread touches
pub(crate) struct MixerLoop<S: AudioSink> {
    sink: S,
    sources: Vec<SourceHandle>,
    recycled: Vec<VecDeque<BufferId>>,
    pool: BufferPool,
    report: MixReport,
    settings: LoopSettings,
    shared: Arc<MixerShared>,
}

impl<S: AudioSink> MixerLoop<S> {
    pub fn new(mut sink: S, settings: LoopSettings, shared: Arc<MixerShared>) -> Result<Self> {
        let sources = (0..settings.channel_count)
            .map(|channel| sink.create_source(channel))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sink,
            sources,
            recycled: vec![VecDeque::new(); settings.channel_count],
            pool: BufferPool::new(
                settings.max_queued_buffers + 1,
                settings.channel_count,
                settings.buffer_bytes,
            ),
            report: MixReport::default(),
            settings,
            shared,
        })
    }

    /// One drain, mix, meter and submit cycle
    pub fn iterate(&mut self) -> Result<Iteration> {
        let started = Instant::now();

        if !self.drain() {
            return Ok(Iteration::Deferred);
        }

        let block = self.pool.take();

        let mix_started = Instant::now();
        self.shared.state.lock().mix_pass(block, &mut self.report);
        let mixing_time = mix_started.elapsed();

        self.shared.publish_level(block.average_level());

        let submit_started = Instant::now();
        for (channel, &source) in self.sources.iter().enumerate() {
            let buffer = match self.recycled[channel].pop_front() {
                Some(buffer) => buffer,
                None => self.sink.create_buffer()?,
            };
            self.sink.enqueue(
                source,
                buffer,
                block.channel(channel),
                self.settings.sample_rate,
                ChannelLayout::Mono16,
            )?;
        }
        // Only start once every ear has its buffer
        for (channel, &source) in self.sources.iter().enumerate() {
            if !self.sink.is_playing(source) {
                log::debug!("Starting playback on channel {}", channel);
                self.sink.play(source)?;
            }
        }
        let submit_time = submit_started.elapsed();

        for &instance_id in &self.report.completed {
            self.shared
                .emit(EarMixEvent::InstanceCompleted { instance_id });
        }
        for &instance_id in &self.report.stopped {
            self.shared.emit(EarMixEvent::InstanceStopped { instance_id });
        }
        self.shared.emit(EarMixEvent::MixTiming(MixTimingEvent {
            total_time_us: started.elapsed().as_micros() as u64,
            mixing_time_us: mixing_time.as_micros() as u64,
            submit_time_us: submit_time.as_micros() as u64,
            mixed_instances: self.report.mixed,
        }));

        Ok(Iteration::Mixed)
    }

    /// Reclaim finished buffers. Returns false when any channel is still full.
    fn drain(&mut self) -> bool {
        let mut ready = true;
        for (channel, &source) in self.sources.iter().enumerate() {
            let finished = self.sink.finished_buffer_count(source);
            for _ in 0..finished {
                match self.sink.dequeue(source) {
                    Some(buffer) => self.recycled[channel].push_back(buffer),
                    None => break,
                }
            }

            let underruns = self.sink.take_underruns(source);
            if underruns > 0 {
                log::warn!("Channel {} underran {} time(s)", channel, underruns);
                self.shared.emit(EarMixEvent::BufferUnderrun {
                    channel,
                    count: underruns,
                });
            }

            if self.sink.queued_buffer_count(source) >= self.settings.max_queued_buffers {
                ready = false;
            }
        }
        ready
    }

    /// Run until the shared run flag clears or an iteration fails, then tear down
    pub fn run(mut self) {
        log::info!(
            "Mixer running: {} channel(s), {} bytes per buffer, {:?} cadence",
            self.settings.channel_count,
            self.settings.buffer_bytes,
            self.settings.pause
        );
        self.shared.emit(EarMixEvent::EngineStarted);

        while self.shared.is_running() {
            let started = Instant::now();

            match panic::catch_unwind(AssertUnwindSafe(|| self.iterate())) {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.fail(e.to_string());
                    break;
                }
                Err(payload) => {
                    self.fail(format!("mixer panicked: {}", panic_message(payload.as_ref())));
                    break;
                }
            }

            if let Some(rest) = self.settings.pause.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        self.teardown();
    }

    fn fail(&self, error: String) {
        log::error!("Mixer loop exiting: {}", error);
        self.shared.emit(EarMixEvent::EngineError { error });
    }

    fn teardown(&mut self) {
        for &source in &self.sources {
            self.sink.stop(source);
        }
        self.sink.destroy_context();

        self.shared.running.store(false, Ordering::Release);
        self.shared.publish_level(0.0);
        self.shared.emit(EarMixEvent::EngineStopped);
        log::info!("Mixer stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Start the mixer thread. The sink is built on that thread by `factory`.
pub(crate) fn spawn_mixer<S, F>(
    name: String,
    settings: LoopSettings,
    shared: Arc<MixerShared>,
    factory: F,
) -> Result<JoinHandle<()>>
where
    S: AudioSink + 'static,
    F: FnOnce() -> Result<S> + Send + 'static,
{
    let thread_shared = shared.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let shared = thread_shared;
            let built = panic::catch_unwind(AssertUnwindSafe(factory))
                .unwrap_or_else(|payload| {
                    Err(EarMixError::Sink(format!(
                        "sink factory panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
                .and_then(|sink| MixerLoop::new(sink, settings, shared.clone()));

            match built {
                Ok(mixer) => mixer.run(),
                Err(e) => {
                    log::error!("Mixer failed to start: {}", e);
                    shared.emit(EarMixEvent::EngineError {
                        error: e.to_string(),
                    });
                    shared.running.store(false, Ordering::Release);
                }
            }
        })
        .map_err(|e| {
            shared.running.store(false, Ordering::Release);
            EarMixError::Engine(format!("Failed to spawn mixer thread '{}': {}", name, e))
        })
}
