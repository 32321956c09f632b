use super::{AudioSink, BufferId, ChannelLayout, SourceHandle, pcm_samples};
use crate::error::{EarMixError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

const DEFAULT_HISTORY: usize = 256;

#[derive(Debug, Default)]
struct SourceRecord {
    playing: bool,
    queued: VecDeque<BufferId>,
    /// Leading entries of `queued` that have finished playing
    finished: usize,
    history: VecDeque<Vec<i16>>,
    submitted: usize,
    sample_rate: u32,
}

#[derive(Debug)]
struct SinkRecord {
    sources: Vec<SourceRecord>,
    next_buffer: u64,
    draining: bool,
    history_limit: usize,
    fail_next_enqueue: Option<String>,
    fail_enqueue_on: Option<(usize, String)>,
    panic_next_enqueue: bool,
    destroyed: bool,
}

impl SinkRecord {
    fn source(&mut self, source: SourceHandle) -> Option<&mut SourceRecord> {
        self.sources.get_mut(source.0)
    }
}

/// Headless sink that keeps the PCM it receives.
///
/// By default buffers stay queued until the test marks them finished through
/// a [`MemorySinkProbe`]. A draining sink finishes every queued buffer as
/// soon as the mixer asks, so the mixer runs at its own cadence.
#[derive(Debug)]
pub struct MemorySink {
    record: Arc<Mutex<SinkRecord>>,
}

/// Observer and controller for a [`MemorySink`] that has moved to the mixer thread
#[derive(Debug, Clone)]
pub struct MemorySinkProbe {
    record: Arc<Mutex<SinkRecord>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(SinkRecord {
                sources: Vec::new(),
                next_buffer: 1,
                draining: false,
                history_limit: DEFAULT_HISTORY,
                fail_next_enqueue: None,
                fail_enqueue_on: None,
                panic_next_enqueue: false,
                destroyed: false,
            })),
        }
    }

    /// A sink whose buffers finish as soon as they are polled
    pub fn draining() -> Self {
        let sink = Self::new();
        sink.record.lock().draining = true;
        sink
    }

    /// Keep at most `limit` recorded buffers per source
    pub fn with_history_limit(self, limit: usize) -> Self {
        self.record.lock().history_limit = limit;
        self
    }

    pub fn probe(&self) -> MemorySinkProbe {
        MemorySinkProbe {
            record: self.record.clone(),
        }
    }
}

impl AudioSink for MemorySink {
    fn create_source(&mut self, channel: usize) -> Result<SourceHandle> {
        let mut record = self.record.lock();
        if record.destroyed {
            return Err(EarMixError::Sink("context destroyed".into()));
        }
        while record.sources.len() <= channel {
            record.sources.push(SourceRecord::default());
        }
        Ok(SourceHandle(channel))
    }

    fn create_buffer(&mut self) -> Result<BufferId> {
        let mut record = self.record.lock();
        let id = BufferId(record.next_buffer);
        record.next_buffer += 1;
        Ok(id)
    }

    fn enqueue(
        &mut self,
        source: SourceHandle,
        buffer: BufferId,
        pcm: &[u8],
        sample_rate: u32,
        _layout: ChannelLayout,
    ) -> Result<()> {
        let mut record = self.record.lock();
        if let Some(message) = record.fail_next_enqueue.take() {
            return Err(EarMixError::Sink(message));
        }
        if record
            .fail_enqueue_on
            .as_ref()
            .is_some_and(|(channel, _)| *channel == source.0)
        {
            if let Some((_, message)) = record.fail_enqueue_on.take() {
                return Err(EarMixError::Sink(message));
            }
        }
        if record.panic_next_enqueue {
            record.panic_next_enqueue = false;
            drop(record);
            panic!("memory sink asked to panic on enqueue");
        }

        let limit = record.history_limit;
        let entry = record
            .source(source)
            .ok_or_else(|| EarMixError::Sink(format!("unknown source {:?}", source)))?;

        entry.queued.push_back(buffer);
        entry.submitted += 1;
        entry.sample_rate = sample_rate;
        entry.history.push_back(pcm_samples(pcm).collect());
        while entry.history.len() > limit {
            entry.history.pop_front();
        }
        Ok(())
    }

    fn finished_buffer_count(&mut self, source: SourceHandle) -> usize {
        let mut record = self.record.lock();
        let draining = record.draining;
        match record.source(source) {
            Some(entry) => {
                if draining {
                    entry.finished = entry.queued.len();
                }
                entry.finished
            }
            None => 0,
        }
    }

    fn queued_buffer_count(&mut self, source: SourceHandle) -> usize {
        self.record
            .lock()
            .source(source)
            .map_or(0, |entry| entry.queued.len())
    }

    fn dequeue(&mut self, source: SourceHandle) -> Option<BufferId> {
        let mut record = self.record.lock();
        let entry = record.source(source)?;
        if entry.finished == 0 {
            return None;
        }
        entry.finished -= 1;
        entry.queued.pop_front()
    }

    fn is_playing(&self, source: SourceHandle) -> bool {
        self.record
            .lock()
            .sources
            .get(source.0)
            .is_some_and(|entry| entry.playing)
    }

    fn play(&mut self, source: SourceHandle) -> Result<()> {
        let mut record = self.record.lock();
        let entry = record
            .source(source)
            .ok_or_else(|| EarMixError::Sink(format!("unknown source {:?}", source)))?;
        entry.playing = true;
        Ok(())
    }

    fn stop(&mut self, source: SourceHandle) {
        if let Some(entry) = self.record.lock().source(source) {
            entry.playing = false;
        }
    }

    fn destroy_context(&mut self) {
        let mut record = self.record.lock();
        for entry in &mut record.sources {
            entry.queued.clear();
            entry.finished = 0;
            entry.playing = false;
        }
        record.destroyed = true;
    }
}

impl MemorySinkProbe {
    pub fn source_count(&self) -> usize {
        self.record.lock().sources.len()
    }

    /// Total buffers ever enqueued on `channel`
    pub fn submitted(&self, channel: usize) -> usize {
        self.record
            .lock()
            .sources
            .get(channel)
            .map_or(0, |entry| entry.submitted)
    }

    /// Recorded buffers for `channel`, oldest first
    pub fn buffers(&self, channel: usize) -> Vec<Vec<i16>> {
        self.record
            .lock()
            .sources
            .get(channel)
            .map(|entry| entry.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_buffer(&self, channel: usize) -> Option<Vec<i16>> {
        self.record
            .lock()
            .sources
            .get(channel)
            .and_then(|entry| entry.history.back().cloned())
    }

    /// Sample rate of the most recent buffer on `channel`
    pub fn sample_rate(&self, channel: usize) -> Option<u32> {
        self.record
            .lock()
            .sources
            .get(channel)
            .filter(|entry| entry.submitted > 0)
            .map(|entry| entry.sample_rate)
    }

    pub fn queued(&self, channel: usize) -> usize {
        self.record
            .lock()
            .sources
            .get(channel)
            .map_or(0, |entry| entry.queued.len())
    }

    pub fn is_playing(&self, channel: usize) -> bool {
        self.record
            .lock()
            .sources
            .get(channel)
            .is_some_and(|entry| entry.playing)
    }

    /// Mark up to `count` more queued buffers on `channel` as played
    pub fn finish(&self, channel: usize, count: usize) {
        if let Some(entry) = self.record.lock().sources.get_mut(channel) {
            entry.finished = (entry.finished + count).min(entry.queued.len());
        }
    }

    pub fn finish_all(&self) {
        for entry in &mut self.record.lock().sources {
            entry.finished = entry.queued.len();
        }
    }

    pub fn set_draining(&self, draining: bool) {
        self.record.lock().draining = draining;
    }

    /// Make the next enqueue return a sink error
    pub fn fail_next_enqueue(&self, message: impl Into<String>) {
        self.record.lock().fail_next_enqueue = Some(message.into());
    }

    /// Make the next enqueue on `channel` return a sink error
    pub fn fail_enqueue_on(&self, channel: usize, message: impl Into<String>) {
        self.record.lock().fail_enqueue_on = Some((channel, message.into()));
    }

    /// Make the next enqueue panic
    pub fn panic_next_enqueue(&self) {
        self.record.lock().panic_next_enqueue = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.record.lock().destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_buffers_wait_until_finished() {
        let mut sink = MemorySink::new();
        let probe = sink.probe();
        let source = sink.create_source(0).unwrap();
        let first = sink.create_buffer().unwrap();
        let second = sink.create_buffer().unwrap();
        assert_ne!(first, second);

        sink.enqueue(source, first, &pcm(&[1, 2]), 44100, ChannelLayout::Mono16)
            .unwrap();
        sink.enqueue(source, second, &pcm(&[3, 4]), 44100, ChannelLayout::Mono16)
            .unwrap();

        assert_eq!(sink.queued_buffer_count(source), 2);
        assert_eq!(sink.finished_buffer_count(source), 0);
        assert_eq!(sink.dequeue(source), None);

        probe.finish(0, 1);
        assert_eq!(sink.finished_buffer_count(source), 1);
        assert_eq!(sink.dequeue(source), Some(first));
        assert_eq!(sink.queued_buffer_count(source), 1);

        assert_eq!(probe.buffers(0), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(probe.sample_rate(0), Some(44100));
    }

    #[test]
    fn test_draining_sink_finishes_on_poll() {
        let mut sink = MemorySink::draining().with_history_limit(1);
        let probe = sink.probe();
        let source = sink.create_source(1).unwrap();
        assert_eq!(probe.source_count(), 2);

        for value in 0..3 {
            let buffer = sink.create_buffer().unwrap();
            sink.enqueue(source, buffer, &pcm(&[value]), 8000, ChannelLayout::Mono16)
                .unwrap();
        }
        assert_eq!(sink.finished_buffer_count(source), 3);
        while sink.dequeue(source).is_some() {}
        assert_eq!(sink.queued_buffer_count(source), 0);

        assert_eq!(probe.submitted(1), 3);
        assert_eq!(probe.buffers(1), vec![vec![2]]);
    }

    #[test]
    fn test_injected_failure_and_teardown() {
        let mut sink = MemorySink::new();
        let probe = sink.probe();
        let source = sink.create_source(0).unwrap();
        let buffer = sink.create_buffer().unwrap();

        probe.fail_next_enqueue("device lost");
        let err = sink
            .enqueue(source, buffer, &pcm(&[0]), 44100, ChannelLayout::Mono16)
            .unwrap_err();
        assert!(err.to_string().contains("device lost"));

        sink.play(source).unwrap();
        assert!(sink.is_playing(source));
        sink.stop(source);
        assert!(!probe.is_playing(0));

        sink.destroy_context();
        assert!(probe.is_destroyed());
        assert!(sink.create_source(0).is_err());
    }
}
