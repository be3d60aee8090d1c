use crate::error::SinkError;
use crate::feed::queue::FeedShared;
use crate::stats::FeedStats;
use monosink_ports::audio::AudioDeviceHandle;
use monosink_ports::source::FrameSource;
use monosink_ports::types::Sample;
use std::mem;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// A chunk of this many samples was enqueued.
    Submitted(usize),
    /// The driver queue is above the high-water mark; try again later.
    Deferred,
    /// The source has nothing left to submit.
    Exhausted,
}

/// Push strategy: two equally sized buffers, alternated each cycle, so the
/// buffer being refilled is never the one just submitted.
pub struct PushFeed {
    shared: Arc<FeedShared>,
    stats: Arc<FeedStats>,
    buffers: [Vec<Sample>; 2],
    lens: [usize; 2],
    front: usize,
    primed: bool,
    source_exhausted: bool,
    high_water_bytes: usize,
    sample_rate_hz: u32,
    bytes: Vec<u8>,
}

impl PushFeed {
    pub fn new(stats: Arc<FeedStats>) -> Self {
        Self {
            shared: Arc::new(FeedShared::new()),
            stats,
            buffers: [Vec::new(), Vec::new()],
            lens: [0, 0],
            front: 0,
            primed: false,
            source_exhausted: false,
            high_water_bytes: 0,
            sample_rate_hz: 0,
            bytes: Vec::new(),
        }
    }

    /// Size both buffers once the granted spec is known. The source is told
    /// `sample_rate_hz` before its first chunk is drawn.
    pub fn configure(
        &mut self,
        chunk_samples: usize,
        high_water_bytes: usize,
        sample_rate_hz: u32,
    ) {
        let chunk_samples = chunk_samples.max(1);
        self.buffers = [vec![0; chunk_samples], vec![0; chunk_samples]];
        self.lens = [0, 0];
        self.front = 0;
        self.primed = false;
        self.source_exhausted = false;
        self.high_water_bytes = high_water_bytes;
        self.sample_rate_hz = sample_rate_hz;
        self.bytes = Vec::with_capacity(chunk_samples * mem::size_of::<Sample>());
    }

    pub fn chunk_samples(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn high_water_bytes(&self) -> usize {
        self.high_water_bytes
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// One poll/submit cycle. Never sleeps; the caller decides how long to
    /// wait after [`PumpOutcome::Deferred`].
    pub fn cycle(
        &mut self,
        device: &mut dyn AudioDeviceHandle,
        source: &mut dyn FrameSource,
    ) -> Result<PumpOutcome, SinkError> {
        if self.shared.is_closed() {
            return Err(SinkError::FeedClosed);
        }
        if !self.primed {
            source.set_sample_rate(self.sample_rate_hz);
            self.refill(self.front, source);
            self.primed = true;
        }

        let len = self.lens[self.front];
        if len == 0 {
            return Ok(PumpOutcome::Exhausted);
        }

        let queued = device.queued_bytes()?;
        if queued > self.high_water_bytes {
            self.stats.record_deferral();
            trace!(queued, high_water = self.high_water_bytes, "deferring submission");
            return Ok(PumpOutcome::Deferred);
        }

        self.bytes.clear();
        for sample in &self.buffers[self.front][..len] {
            self.bytes.extend_from_slice(&sample.to_ne_bytes());
        }
        device.enqueue(&self.bytes)?;
        self.stats.record_submission(len);

        self.front ^= 1;
        if self.source_exhausted {
            self.lens[self.front] = 0;
        } else {
            self.refill(self.front, source);
        }

        Ok(PumpOutcome::Submitted(len))
    }

    fn refill(&mut self, index: usize, source: &mut dyn FrameSource) {
        let buffer = &mut self.buffers[index];
        let written = source.fill(buffer).min(buffer.len());
        if written < buffer.len() {
            self.source_exhausted = true;
        }
        self.lens[index] = written;
    }
}
