use super::{AudioSink, BufferId, ChannelLayout, SourceHandle, pcm_samples};
use crate::config::EarMixDesc;
use crate::error::{EarMixError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// State shared between the producer side and the device callback.
///
/// All ears start, stop and advance together, so one flag and one counter
/// cover the whole stream.
#[derive(Debug, Default)]
struct StreamShared {
    playing: AtomicBool,
    /// Frames the device has consumed from every ear's ring
    played: AtomicU64,
    underruns: AtomicUsize,
}

struct EarOutput {
    producer: HeapProd<i16>,
    /// Queued buffers with the `pushed` mark at which each one has fully played
    pending: VecDeque<(BufferId, u64)>,
    pushed: u64,
    scratch: Vec<i16>,
}

impl EarOutput {
    fn new(producer: HeapProd<i16>, buffer_frames: usize) -> Self {
        Self {
            producer,
            pending: VecDeque::new(),
            pushed: 0,
            scratch: Vec::with_capacity(buffer_frames),
        }
    }

    /// Queue a whole buffer or nothing
    fn push(&mut self, channel: usize, buffer: BufferId, pcm: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.extend(pcm_samples(pcm));

        // A partial push would shift this ear against the others
        let vacant = self.producer.vacant_len();
        if vacant < self.scratch.len() {
            return Err(EarMixError::RingBuffer(format!(
                "channel {} overflow: {} samples queued, {} vacant",
                channel,
                self.scratch.len(),
                vacant
            )));
        }

        let pushed = self.producer.push_slice(&self.scratch);
        self.pushed += pushed as u64;
        self.pending.push_back((buffer, self.pushed));
        Ok(())
    }
}

/// Consumer side of every ear, owned by the device callback
struct StreamTap {
    consumers: Vec<HeapCons<i16>>,
    /// One block of samples per ear; the callback never grows these
    scratch: Vec<Vec<i16>>,
    shared: Arc<StreamShared>,
}

impl StreamTap {
    fn new(consumers: Vec<HeapCons<i16>>, chunk_frames: usize, shared: Arc<StreamShared>) -> Self {
        let chunk_frames = chunk_frames.max(1);
        Self {
            scratch: vec![vec![0; chunk_frames]; consumers.len()],
            consumers,
            shared,
        }
    }

    fn chunk_frames(&self) -> usize {
        self.scratch.first().map_or(1, Vec::len)
    }

    /// Fill one device period, popping the same number of frames from every
    /// ear so the channels never drift apart
    fn render<T>(&mut self, data: &mut [T], output_channels: usize)
    where
        T: SizedSample + FromSample<i16>,
    {
        if self.consumers.is_empty() || output_channels == 0 {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let playing = self.shared.playing.load(Ordering::Acquire);
        let last_ear = self.consumers.len() - 1;
        let mut starved = false;

        for block in data.chunks_mut(self.chunk_frames() * output_channels) {
            let frames = block.len() / output_channels;

            let popped = if playing {
                let available = self
                    .consumers
                    .iter()
                    .map(|consumer| consumer.occupied_len())
                    .min()
                    .unwrap_or(0)
                    .min(frames);
                for (consumer, scratch) in self.consumers.iter_mut().zip(&mut self.scratch) {
                    consumer.pop_slice(&mut scratch[..available]);
                }
                self.shared
                    .played
                    .fetch_add(available as u64, Ordering::Release);
                starved |= available < frames;
                available
            } else {
                0
            };

            for scratch in &mut self.scratch {
                scratch[popped..frames].fill(0);
            }

            for (frame_index, frame) in block.chunks_exact_mut(output_channels).enumerate() {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = T::from_sample(self.scratch[channel.min(last_ear)][frame_index]);
                }
            }
            let partial = block.len() % output_channels;
            if partial > 0 {
                let len = block.len();
                block[len - partial..].fill(T::EQUILIBRIUM);
            }
        }

        if starved {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Sink playing through the default cpal output device.
///
/// Each ear channel feeds its own ring buffer. The device callback pops the
/// same number of frames from every ring and interleaves them, so a buffer
/// that reached only some ears waits for the rest. Buffers count as finished
/// once the callback has consumed all of their samples. A buffer that does
/// not fit its ring is rejected with [`EarMixError::RingBuffer`].
///
/// `cpal::Stream` is not `Send`, so a `CpalSink` has to be opened on the
/// mixer thread, e.g. `engine.init_with(move || CpalSink::open(&desc))`.
pub struct CpalSink {
    stream: Option<cpal::Stream>,
    ears: Vec<EarOutput>,
    shared: Arc<StreamShared>,
    next_buffer: u64,
    sample_rate: u32,
    device_name: String,
}

impl CpalSink {
    pub fn open(desc: &EarMixDesc) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            EarMixError::AudioDevice("No default output device available".into())
        })?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let default_config = device.default_output_config().map_err(|e| {
            EarMixError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let output_channels = default_config.channels().max(1);
        if (output_channels as usize) < desc.ears.len() {
            log::warn!(
                "Device '{}' has {} channel(s) for {} ears; extra ears are not heard",
                device_name,
                output_channels,
                desc.ears.len()
            );
        }

        let config = cpal::StreamConfig {
            channels: output_channels,
            sample_rate: cpal::SampleRate(desc.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = desc.buffer_frames * (desc.max_queued_buffers + 2);
        let shared = Arc::new(StreamShared::default());
        let mut ears = Vec::with_capacity(desc.ears.len());
        let mut consumers = Vec::with_capacity(desc.ears.len());
        for _ in &desc.ears {
            let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
            ears.push(EarOutput::new(producer, desc.buffer_frames));
            consumers.push(consumer);
        }
        let tap = StreamTap::new(consumers, desc.buffer_frames, shared.clone());

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, tap, output_channels as usize)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, tap, output_channels as usize)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, tap, output_channels as usize)?
            }
            other => {
                return Err(EarMixError::AudioFormat(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            EarMixError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        log::info!(
            "Opened '{}' at {} Hz, {} output channel(s), ring capacity {} samples per ear",
            device_name,
            desc.sample_rate,
            output_channels,
            capacity
        );

        Ok(Self {
            stream: Some(stream),
            ears,
            shared,
            next_buffer: 1,
            sample_rate: desc.sample_rate,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut tap: StreamTap,
        output_channels: usize,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<i16>,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    tap.render(data, output_channels);
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| EarMixError::AudioDevice(format!("Failed to build stream: {}", e)))
    }

    fn ear(&mut self, source: SourceHandle) -> Result<&mut EarOutput> {
        self.ears
            .get_mut(source.0)
            .ok_or_else(|| EarMixError::Sink(format!("unknown source {:?}", source)))
    }
}

impl AudioSink for CpalSink {
    fn create_source(&mut self, channel: usize) -> Result<SourceHandle> {
        let source = SourceHandle(channel);
        self.ear(source)?;
        Ok(source)
    }

    fn create_buffer(&mut self) -> Result<BufferId> {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        Ok(id)
    }

    fn enqueue(
        &mut self,
        source: SourceHandle,
        buffer: BufferId,
        pcm: &[u8],
        sample_rate: u32,
        layout: ChannelLayout,
    ) -> Result<()> {
        if sample_rate != self.sample_rate {
            return Err(EarMixError::AudioFormat(format!(
                "buffer at {} Hz on a {} Hz stream",
                sample_rate, self.sample_rate
            )));
        }
        debug_assert_eq!(layout, ChannelLayout::Mono16);

        self.ear(source)?.push(source.0, buffer, pcm)
    }

    fn finished_buffer_count(&mut self, source: SourceHandle) -> usize {
        let Some(ear) = self.ears.get(source.0) else {
            return 0;
        };
        let played = self.shared.played.load(Ordering::Acquire);
        ear.pending
            .iter()
            .take_while(|(_, end)| *end <= played)
            .count()
    }

    fn queued_buffer_count(&mut self, source: SourceHandle) -> usize {
        self.ears.get(source.0).map_or(0, |ear| ear.pending.len())
    }

    fn dequeue(&mut self, source: SourceHandle) -> Option<BufferId> {
        let played = self.shared.played.load(Ordering::Acquire);
        let ear = self.ears.get_mut(source.0)?;
        match ear.pending.front() {
            Some(&(buffer, end)) if end <= played => {
                ear.pending.pop_front();
                Some(buffer)
            }
            _ => None,
        }
    }

    fn is_playing(&self, source: SourceHandle) -> bool {
        source.0 < self.ears.len() && self.shared.playing.load(Ordering::Acquire)
    }

    /// Starts every ear at once; the mixer calls this after enqueueing all of them
    fn play(&mut self, source: SourceHandle) -> Result<()> {
        self.ear(source)?;
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self, source: SourceHandle) {
        if source.0 < self.ears.len() {
            self.shared.playing.store(false, Ordering::Release);
        }
    }

    fn destroy_context(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause stream on '{}': {}", self.device_name, e);
            }
            drop(stream);
            log::info!("Closed '{}'", self.device_name);
        }
        for ear in &mut self.ears {
            ear.pending.clear();
        }
    }

    /// Ears underrun together, so the whole count is reported on channel 0
    fn take_underruns(&mut self, source: SourceHandle) -> usize {
        if source.0 != 0 {
            return 0;
        }
        self.shared.underruns.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_tap(capacity: usize, chunk_frames: usize) -> (Vec<HeapProd<i16>>, StreamTap) {
        let shared = Arc::new(StreamShared::default());
        let (producers, consumers): (Vec<_>, Vec<_>) = (0..2)
            .map(|_| HeapRb::<i16>::new(capacity).split())
            .unzip();
        (producers, StreamTap::new(consumers, chunk_frames, shared))
    }

    #[test]
    fn test_overflowing_buffer_is_rejected_whole() {
        let (producer, consumer) = HeapRb::<i16>::new(4).split();
        let mut ear = EarOutput::new(producer, 3);
        let pcm: Vec<u8> = [1i16, 2, 3].iter().flat_map(|s| s.to_le_bytes()).collect();

        ear.push(0, BufferId(1), &pcm).unwrap();
        let err = ear.push(0, BufferId(2), &pcm).unwrap_err();
        assert!(matches!(err, EarMixError::RingBuffer(_)));
        assert_eq!(consumer.occupied_len(), 3);
        assert_eq!(ear.pending, VecDeque::from([(BufferId(1), 3)]));
    }

    #[test]
    fn test_silent_until_playing() {
        let (mut producers, mut tap) = stereo_tap(16, 4);
        producers[0].push_slice(&[1, 2]);
        producers[1].push_slice(&[3, 4]);

        let mut data = [9i16; 4];
        tap.render(&mut data, 2);
        assert_eq!(data, [0; 4]);
        assert_eq!(tap.shared.played.load(Ordering::Acquire), 0);
        assert_eq!(tap.shared.underruns.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_ears_advance_in_lockstep() {
        let (mut producers, mut tap) = stereo_tap(16, 4);
        tap.shared.playing.store(true, Ordering::Release);

        // Left ear queued, right ear not yet
        producers[0].push_slice(&[1, 2]);
        let mut data = [9i16; 4];
        tap.render(&mut data, 2);
        assert_eq!(data, [0; 4]);
        assert_eq!(tap.consumers[0].occupied_len(), 2);
        assert_eq!(tap.shared.underruns.load(Ordering::Relaxed), 1);

        producers[1].push_slice(&[10, 20]);
        tap.render(&mut data, 2);
        assert_eq!(data, [1, 10, 2, 20]);
        assert_eq!(tap.shared.played.load(Ordering::Acquire), 2);
        assert_eq!(tap.shared.underruns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_long_period_is_rendered_in_chunks() {
        let (mut producers, mut tap) = stereo_tap(16, 2);
        tap.shared.playing.store(true, Ordering::Release);
        producers[0].push_slice(&[1, 2, 3, 4, 5]);
        producers[1].push_slice(&[-1, -2, -3, -4, -5]);

        let mut data = [0i16; 10];
        tap.render(&mut data, 2);
        assert_eq!(data, [1, -1, 2, -2, 3, -3, 4, -4, 5, -5]);
        assert!(tap.scratch.iter().all(|scratch| scratch.len() == 2));
        assert_eq!(tap.shared.underruns.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_extra_device_channels_repeat_last_ear() {
        let (mut producers, mut tap) = stereo_tap(8, 4);
        tap.shared.playing.store(true, Ordering::Release);
        producers[0].push_slice(&[7]);
        producers[1].push_slice(&[8]);

        let mut data = [0f32; 4];
        tap.render(&mut data, 4);
        assert_eq!(data[0], f32::from_sample(7i16));
        assert_eq!(data[1], f32::from_sample(8i16));
        assert_eq!(data[3], f32::from_sample(8i16));
    }
}
