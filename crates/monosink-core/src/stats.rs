use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the producer side and the real-time path.
/// Relaxed ordering: values are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub struct FeedStats {
    callbacks: AtomicU64,
    underruns: AtomicU64,
    samples_delivered: AtomicU64,
    chunks_submitted: AtomicU64,
    deferrals: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedStatsSnapshot {
    pub callbacks: u64,
    /// Callbacks that had to substitute silence for missing samples.
    pub underruns: u64,
    pub samples_delivered: u64,
    pub chunks_submitted: u64,
    /// Push cycles skipped because the driver queue was above the high-water mark.
    pub deferrals: u64,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_callback(&self, delivered: usize, underrun: bool) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.samples_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if underrun {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_submission(&self, samples: usize) {
        self.chunks_submitted.fetch_add(1, Ordering::Relaxed);
        self.samples_delivered
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_deferral(&self) {
        self.deferrals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            chunks_submitted: self.chunks_submitted.load(Ordering::Relaxed),
            deferrals: self.deferrals.load(Ordering::Relaxed),
        }
    }
}
