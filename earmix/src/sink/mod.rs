//! Hardware output abstraction.
//!
//! The mixer talks to audio hardware through [`AudioSink`], modeled on a
//! queued-buffer API: each ear channel gets one source, and mixed PCM is
//! handed over in fixed-size buffers that the hardware plays in order and
//! reports back as finished.
//!
//! - [`CpalSink`]: plays through the default cpal output device
//! - [`MemorySink`]: headless sink that records what it was given

mod cpal_sink;
mod memory;

pub use cpal_sink::CpalSink;
pub use memory::{MemorySink, MemorySinkProbe};

use crate::error::Result;

/// Handle to one playback source owned by a sink
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub usize);

/// Identifier of a sink-side buffer; recycled once the sink is done with it
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Sample layout of the PCM handed to [`AudioSink::enqueue`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    /// One channel of signed 16-bit little-endian samples
    Mono16,
}

pub trait AudioSink {
    /// Create the playback source for ear channel `channel`
    fn create_source(&mut self, channel: usize) -> Result<SourceHandle>;

    /// Allocate a fresh buffer ID
    fn create_buffer(&mut self) -> Result<BufferId>;

    /// Queue `pcm` on `source` under `buffer`. The sink copies the data.
    fn enqueue(
        &mut self,
        source: SourceHandle,
        buffer: BufferId,
        pcm: &[u8],
        sample_rate: u32,
        layout: ChannelLayout,
    ) -> Result<()>;

    /// Buffers on `source` that finished playing and can be dequeued
    fn finished_buffer_count(&mut self, source: SourceHandle) -> usize;

    /// Buffers on `source` that are queued and not yet dequeued
    fn queued_buffer_count(&mut self, source: SourceHandle) -> usize;

    /// Take back the oldest finished buffer on `source`
    fn dequeue(&mut self, source: SourceHandle) -> Option<BufferId>;

    fn is_playing(&self, source: SourceHandle) -> bool;

    fn play(&mut self, source: SourceHandle) -> Result<()>;

    fn stop(&mut self, source: SourceHandle);

    /// Release the device. No other call is made afterwards.
    fn destroy_context(&mut self);

    /// Underruns observed on `source` since the last call
    fn take_underruns(&mut self, _source: SourceHandle) -> usize {
        0
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn create_source(&mut self, channel: usize) -> Result<SourceHandle> {
        (**self).create_source(channel)
    }

    fn create_buffer(&mut self) -> Result<BufferId> {
        (**self).create_buffer()
    }

    fn enqueue(
        &mut self,
        source: SourceHandle,
        buffer: BufferId,
        pcm: &[u8],
        sample_rate: u32,
        layout: ChannelLayout,
    ) -> Result<()> {
        (**self).enqueue(source, buffer, pcm, sample_rate, layout)
    }

    fn finished_buffer_count(&mut self, source: SourceHandle) -> usize {
        (**self).finished_buffer_count(source)
    }

    fn queued_buffer_count(&mut self, source: SourceHandle) -> usize {
        (**self).queued_buffer_count(source)
    }

    fn dequeue(&mut self, source: SourceHandle) -> Option<BufferId> {
        (**self).dequeue(source)
    }

    fn is_playing(&self, source: SourceHandle) -> bool {
        (**self).is_playing(source)
    }

    fn play(&mut self, source: SourceHandle) -> Result<()> {
        (**self).play(source)
    }

    fn stop(&mut self, source: SourceHandle) {
        (**self).stop(source)
    }

    fn destroy_context(&mut self) {
        (**self).destroy_context()
    }

    fn take_underruns(&mut self, source: SourceHandle) -> usize {
        (**self).take_underruns(source)
    }
}

/// Decode 16-bit little-endian PCM into samples
pub(crate) fn pcm_samples(pcm: &[u8]) -> impl Iterator<Item = i16> + '_ {
    pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]))
}
