use crate::config::SinkConfig;
use crate::error::{SinkError, SpecDrift};
use crate::feed::{PullFeed, PumpOutcome, PushFeed, SampleProducer};
use crate::latency::buffer_frames_for_latency;
use crate::negotiator::{DeviceNegotiator, NegotiatedSpec};
use crate::state::{SinkState, StateCell};
use crate::stats::{FeedStats, FeedStatsSnapshot};
use monosink_ports::audio::{AudioDeviceHandle, AudioOutputPort, Delivery};
use monosink_ports::source::FrameSource;
use monosink_ports::types::{AudioSpec, FeedStrategy, Sample};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const MIN_PRODUCER_BACKOFF: Duration = Duration::from_micros(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayEnd {
    SourceExhausted,
    DurationElapsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayReport {
    pub samples: u64,
    pub end: PlayEnd,
}

enum Feed {
    Pull(PullFeed),
    Push(PushFeed),
}

impl Feed {
    fn close(&self) {
        match self {
            Self::Pull(feed) => feed.close(),
            Self::Push(feed) => feed.close(),
        }
    }

    fn release(&mut self) -> bool {
        match self {
            Self::Pull(feed) => feed.release_context(),
            Self::Push(_) => false,
        }
    }
}

/// A mono 16-bit output stream: owns the device, the negotiated spec and
/// the frame feed.
pub struct Sink {
    config: SinkConfig,
    state: Arc<StateCell>,
    stats: Arc<FeedStats>,
    spec: NegotiatedSpec,
    drift: Vec<SpecDrift>,
    device: Option<Box<dyn AudioDeviceHandle>>,
    feed: Feed,
    started: bool,
}

impl Sink {
    /// Size the buffer from the latency budget, open the device and set up
    /// the configured feed. Any failure releases what was acquired.
    pub fn open(port: &dyn AudioOutputPort, config: SinkConfig) -> Result<Self, SinkError> {
        config.validate()?;
        let buffer_frames = buffer_frames_for_latency(config.sample_rate_hz, config.max_latency)?;
        let desired = AudioSpec::mono_s16(config.sample_rate_hz, buffer_frames);

        let state = Arc::new(StateCell::new(SinkState::Opening));
        let stats = Arc::new(FeedStats::new());
        let feed = match config.feed {
            FeedStrategy::Pull => Feed::Pull(PullFeed::new(Arc::clone(&state), Arc::clone(&stats))),
            FeedStrategy::Push => Feed::Push(PushFeed::new(Arc::clone(&stats))),
        };

        let mut sink = Self {
            config,
            state,
            stats,
            spec: NegotiatedSpec::from_granted(desired),
            drift: Vec::new(),
            device: None,
            feed,
            started: false,
        };

        if let Err(err) = sink.negotiate(port, desired) {
            sink.close();
            return Err(err);
        }
        Ok(sink)
    }

    fn negotiate(&mut self, port: &dyn AudioOutputPort, desired: AudioSpec) -> Result<(), SinkError> {
        let delivery = match &self.feed {
            Feed::Pull(feed) => Delivery::Callback(feed.render_callback().ok_or(SinkError::FeedClosed)?),
            Feed::Push(_) => Delivery::Queue,
        };

        let negotiation = DeviceNegotiator::new(port).open(&self.config.device, desired, delivery)?;
        self.device = Some(negotiation.device);
        self.spec = negotiation.spec;
        self.drift = negotiation.drift;

        let buffer_samples = self.spec.buffer_samples();
        match &mut self.feed {
            Feed::Pull(feed) => {
                let backoff = (self.spec.buffer_latency() / 4).max(MIN_PRODUCER_BACKOFF);
                feed.attach_queue(buffer_samples * self.config.queue_depth_buffers, backoff);
            }
            Feed::Push(feed) => {
                feed.configure(
                    buffer_samples,
                    self.spec.buffer_bytes * self.config.high_water_buffers,
                    self.spec.sample_rate_hz,
                );
            }
        }

        self.state.set(SinkState::Open);
        info!(
            feed = %self.config.feed,
            sample_rate = self.spec.sample_rate_hz,
            buffer_num_frames = self.spec.buffer_frames,
            latency = ?self.spec.buffer_latency(),
            "sink open"
        );
        Ok(())
    }

    /// Unpause the device.
    pub fn start(&mut self) -> Result<(), SinkError> {
        let device = self.open_device("start")?;
        device.set_paused(false)?;
        self.started = true;
        Ok(())
    }

    /// Pause the device. The sink stays open and can be started again.
    pub fn stop(&mut self) -> Result<(), SinkError> {
        let device = self.open_device("stop")?;
        device.set_paused(true)?;
        self.started = false;
        Ok(())
    }

    /// Idempotent. Marks the feed closed, stops and releases the device,
    /// then frees the callback context, in that order.
    pub fn close(&mut self) {
        if self.state.get() == SinkState::Closed && self.device.is_none() {
            return;
        }
        self.state.set(SinkState::Closing);

        self.feed.close();
        if let Some(mut device) = self.device.take() {
            if let Err(err) = device.set_paused(true) {
                debug!(error = %err, "pause before close failed");
            }
            device.close();
        }
        self.feed.release();

        self.started = false;
        self.state.set(SinkState::Closed);
        debug!("sink closed");
    }

    /// Pull strategy: enqueue samples, blocking while the queue is full.
    pub fn write(&mut self, samples: &[Sample]) -> Result<(), SinkError> {
        self.ensure_writable()?;
        self.pull_feed()?.producer_mut()?.push_blocking(samples)
    }

    /// Pull strategy: like [`write`](Self::write) but gives up after
    /// `timeout`, returning how many samples were queued.
    pub fn write_timeout(
        &mut self,
        samples: &[Sample],
        timeout: Duration,
    ) -> Result<usize, SinkError> {
        self.ensure_writable()?;
        self.pull_feed()?.producer_mut()?.push_timeout(samples, timeout)
    }

    /// Pull strategy: hand the producer end to another thread.
    pub fn take_producer(&mut self) -> Result<SampleProducer, SinkError> {
        self.ensure_writable()?;
        self.pull_feed()?.take_producer()
    }

    /// Push strategy: run one poll/submit cycle. The first cycle tells
    /// `source` the granted sample rate.
    pub fn pump_once(&mut self, source: &mut dyn FrameSource) -> Result<PumpOutcome, SinkError> {
        self.ensure_writable()?;
        let device = self.device.as_deref_mut().ok_or(SinkError::FeedClosed)?;
        match &mut self.feed {
            Feed::Push(feed) => feed.cycle(device, source),
            Feed::Pull(_) => Err(SinkError::WrongStrategy("push")),
        }
    }

    /// Drive `source` into the device until it is exhausted or `duration`
    /// has elapsed.
    pub fn play(
        &mut self,
        source: &mut dyn FrameSource,
        duration: Option<Duration>,
    ) -> Result<PlayReport, SinkError> {
        self.ensure_writable()?;
        source.set_sample_rate(self.spec.sample_rate_hz);
        let deadline = duration.map(|duration| Instant::now() + duration);
        let elapsed = |deadline: Option<Instant>| deadline.map_or(false, |d| Instant::now() >= d);

        let mut samples = 0u64;
        match &mut self.feed {
            Feed::Pull(feed) => {
                let producer = feed.producer_mut()?;
                let mut chunk = vec![0; self.spec.buffer_samples().max(1)];
                loop {
                    if elapsed(deadline) {
                        return Ok(PlayReport { samples, end: PlayEnd::DurationElapsed });
                    }
                    let count = source.fill(&mut chunk).min(chunk.len());
                    let queued = producer.push_until(&chunk[..count], deadline)?;
                    samples += queued as u64;
                    if queued < count {
                        return Ok(PlayReport { samples, end: PlayEnd::DurationElapsed });
                    }
                    if count < chunk.len() {
                        return Ok(PlayReport { samples, end: PlayEnd::SourceExhausted });
                    }
                }
            }
            Feed::Push(feed) => {
                let device = self.device.as_deref_mut().ok_or(SinkError::FeedClosed)?;
                let poll_interval = self.config.poll_interval();
                loop {
                    if elapsed(deadline) {
                        return Ok(PlayReport { samples, end: PlayEnd::DurationElapsed });
                    }
                    match feed.cycle(device, source)? {
                        PumpOutcome::Submitted(count) => samples += count as u64,
                        PumpOutcome::Deferred => thread::sleep(poll_interval),
                        PumpOutcome::Exhausted => {
                            return Ok(PlayReport { samples, end: PlayEnd::SourceExhausted });
                        }
                    }
                }
            }
        }
    }

    /// Wait for queued samples to reach the hardware. Returns false on timeout.
    pub fn drain(&self, timeout: Duration) -> bool {
        if !self.state.is_open() {
            return false;
        }
        match &self.feed {
            Feed::Pull(feed) => feed
                .producer()
                .map_or(true, |producer| producer.wait_drained(timeout)),
            Feed::Push(_) => {
                let Some(device) = self.device.as_deref() else {
                    return false;
                };
                let deadline = Instant::now() + timeout;
                loop {
                    match device.queued_bytes() {
                        Ok(0) => return true,
                        Ok(_) if Instant::now() < deadline => thread::sleep(self.config.poll_interval()),
                        _ => return false,
                    }
                }
            }
        }
    }

    pub fn spec(&self) -> &NegotiatedSpec {
        &self.spec
    }

    pub fn drift(&self) -> &[SpecDrift] {
        &self.drift
    }

    pub fn state(&self) -> SinkState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn strategy(&self) -> FeedStrategy {
        self.config.feed
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        self.stats.snapshot()
    }

    /// Bytes waiting in the driver queue (push) or samples waiting in the
    /// feed queue expressed as bytes (pull).
    pub fn queued_bytes(&self) -> Result<usize, SinkError> {
        match &self.feed {
            Feed::Pull(feed) => Ok(feed
                .producer()
                .map_or(0, |producer| producer.queued() * std::mem::size_of::<Sample>())),
            Feed::Push(_) => {
                let device = self.device.as_deref().ok_or(SinkError::FeedClosed)?;
                Ok(device.queued_bytes()?)
            }
        }
    }

    fn open_device(
        &mut self,
        op: &'static str,
    ) -> Result<&mut (dyn AudioDeviceHandle + 'static), SinkError> {
        let state = self.state.get();
        if state != SinkState::Open {
            return Err(SinkError::InvalidState { op, state });
        }
        self.device
            .as_deref_mut()
            .ok_or(SinkError::InvalidState { op, state })
    }

    fn ensure_writable(&self) -> Result<(), SinkError> {
        match self.state.get() {
            SinkState::Open => Ok(()),
            SinkState::Closing | SinkState::Closed => Err(SinkError::FeedClosed),
            state => Err(SinkError::InvalidState { op: "write", state }),
        }
    }

    fn pull_feed(&mut self) -> Result<&mut PullFeed, SinkError> {
        match &mut self.feed {
            Feed::Pull(feed) => Ok(feed),
            Feed::Push(_) => Err(SinkError::WrongStrategy("pull")),
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.close();
    }
}
