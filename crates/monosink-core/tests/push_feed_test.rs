use monosink_core::{FeedStats, PumpOutcome, PushFeed, SinkError};
use monosink_ports::audio::{AudioDeviceHandle, AudioError};
use monosink_ports::source::{FrameSource, SampleSequence};
use monosink_ports::types::AudioSpec;
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Queue device whose reported depth the test controls.
struct ScriptedDevice {
    queued: usize,
    submitted: Vec<i16>,
    chunks: Vec<usize>,
}

impl ScriptedDevice {
    fn new() -> Self {
        Self {
            queued: 0,
            submitted: Vec::new(),
            chunks: Vec::new(),
        }
    }
}

impl AudioDeviceHandle for ScriptedDevice {
    fn granted_spec(&self) -> AudioSpec {
        AudioSpec::mono_s16(48_000, 4)
    }

    fn set_paused(&mut self, _paused: bool) -> Result<(), AudioError> {
        Ok(())
    }

    fn queued_bytes(&self) -> Result<usize, AudioError> {
        Ok(self.queued)
    }

    fn enqueue(&mut self, bytes: &[u8]) -> Result<(), AudioError> {
        self.queued += bytes.len();
        self.chunks.push(bytes.len() / 2);
        self.submitted.extend(
            bytes
                .chunks_exact(2)
                .map(|pair| i16::from_ne_bytes([pair[0], pair[1]])),
        );
        Ok(())
    }

    fn close(self: Box<Self>) {}
}

fn feed(chunk_samples: usize, high_water_bytes: usize) -> (PushFeed, Arc<FeedStats>) {
    let stats = Arc::new(FeedStats::new());
    let mut feed = PushFeed::new(Arc::clone(&stats));
    feed.configure(chunk_samples, high_water_bytes, 48_000);
    (feed, stats)
}

#[test]
fn chunks_are_submitted_in_order() {
    let (mut feed, stats) = feed(4, 1024);
    let mut device = ScriptedDevice::new();
    let mut source = SampleSequence::new((0..10).collect());

    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(2));
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Exhausted);
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Exhausted);

    assert_eq!(device.submitted, (0..10).collect::<Vec<i16>>());
    assert_eq!(device.chunks, vec![4, 4, 2]);
    assert_eq!(stats.snapshot().chunks_submitted, 3);
    assert_eq!(stats.snapshot().samples_delivered, 10);
}

#[test]
fn source_ending_on_a_chunk_boundary() {
    let (mut feed, _) = feed(4, 1024);
    let mut device = ScriptedDevice::new();
    let mut source = SampleSequence::new((0..8).collect());

    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Exhausted);
    assert_eq!(device.chunks, vec![4, 4]);
}

#[test]
fn submission_waits_above_high_water_mark() {
    let (mut feed, stats) = feed(4, 16);
    let mut device = ScriptedDevice::new();
    let mut source = SampleSequence::new((0..12).collect());

    device.queued = 17;
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Deferred);
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Deferred);
    assert!(device.submitted.is_empty());
    assert_eq!(stats.snapshot().deferrals, 2);

    // At the mark is not above it.
    device.queued = 16;
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    assert_eq!(device.queued, 24);
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Deferred);

    device.queued = 0;
    assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    assert_eq!(device.submitted, (0..8).collect::<Vec<i16>>());
}

#[test]
fn closed_feed_refuses_cycles() {
    let (mut feed, _) = feed(4, 16);
    let mut device = ScriptedDevice::new();
    let mut source = SampleSequence::new(vec![1; 8]);

    feed.close();
    assert!(feed.is_closed());
    assert_eq!(feed.cycle(&mut device, &mut source), Err(SinkError::FeedClosed));
    assert!(device.submitted.is_empty());
}

#[test]
fn configure_sizes_the_buffers() {
    let (feed, _) = feed(256, 2048);
    assert_eq!(feed.chunk_samples(), 256);
    assert_eq!(feed.high_water_bytes(), 2048);
    assert_eq!(feed.sample_rate_hz(), 48_000);
}

/// Records the rate it was told and every fill size.
struct RateRecorder {
    rates: Vec<u32>,
    fills: usize,
}

impl FrameSource for RateRecorder {
    fn set_sample_rate(&mut self, sample_rate_hz: u32) {
        assert_eq!(self.fills, 0, "rate must arrive before the first fill");
        self.rates.push(sample_rate_hz);
    }

    fn fill(&mut self, out: &mut [i16]) -> usize {
        self.fills += 1;
        out.fill(1);
        out.len()
    }
}

#[test]
fn source_learns_the_granted_rate_before_the_first_chunk() {
    let stats = Arc::new(FeedStats::new());
    let mut feed = PushFeed::new(stats);
    feed.configure(4, 1024, 44_100);
    let mut device = ScriptedDevice::new();
    let mut source = RateRecorder {
        rates: Vec::new(),
        fills: 0,
    };

    for _ in 0..3 {
        assert_eq!(feed.cycle(&mut device, &mut source).unwrap(), PumpOutcome::Submitted(4));
    }
    assert_eq!(source.rates, vec![44_100]);
}
