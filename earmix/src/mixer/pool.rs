/// One mix pass worth of output: a 16-bit mono PCM buffer per ear channel
#[derive(Debug, Clone)]
pub struct MixBlock {
    channels: Vec<Vec<u8>>,
}

impl MixBlock {
    pub fn new(channel_count: usize, buffer_bytes: usize) -> Self {
        Self {
            channels: vec![vec![0; buffer_bytes]; channel_count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[u8] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[u8]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0);
        }
    }

    /// Average absolute sample value over every channel
    pub fn average_level(&self) -> f32 {
        let mut sum = 0u64;
        let mut count = 0u64;
        for channel in &self.channels {
            for bytes in channel.chunks_exact(2) {
                sum += i16::from_le_bytes([bytes[0], bytes[1]]).unsigned_abs() as u64;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            (sum as f64 / count as f64) as f32
        }
    }
}

/// Preallocated mix blocks handed out round-robin
#[derive(Debug)]
pub struct BufferPool {
    blocks: Vec<MixBlock>,
    next: usize,
}

impl BufferPool {
    pub fn new(size: usize, channel_count: usize, buffer_bytes: usize) -> Self {
        Self {
            blocks: vec![MixBlock::new(channel_count, buffer_bytes); size.max(1)],
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Next block in the cycle, zero-filled
    pub fn take(&mut self) -> &mut MixBlock {
        let index = self.next;
        self.next = (self.next + 1) % self.blocks.len();
        let block = &mut self.blocks[index];
        block.clear();
        block
    }
}
