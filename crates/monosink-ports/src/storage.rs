use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

pub const DEFAULT_QUEUE_DEPTH_BUFFERS: usize = 2;
pub const DEFAULT_HIGH_WATER_BUFFERS: usize = 4;

fn default_queue_depth_buffers() -> usize {
    DEFAULT_QUEUE_DEPTH_BUFFERS
}

fn default_high_water_buffers() -> usize {
    DEFAULT_HIGH_WATER_BUFFERS
}

/// Persisted sink settings. Missing or zero values mean "use the default".
///
/// The latency budget is stored in whole milliseconds when it has no
/// finer part, otherwise in microseconds. `max_latency_us` wins when both
/// are present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub device: Option<String>,
    pub sample_rate_hz: Option<u32>,
    pub max_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_us: Option<u64>,
    pub feed: FeedStrategy,
    #[serde(default = "default_queue_depth_buffers")]
    pub queue_depth_buffers: usize,
    #[serde(default = "default_high_water_buffers")]
    pub high_water_buffers: usize,
}

impl SinkSettings {
    /// Replace every zero or blank value with its "missing" form.
    pub fn sanitized(mut self) -> Self {
        self.device = self.device.filter(|name| !name.trim().is_empty());
        self.sample_rate_hz = self.sample_rate_hz.filter(|rate| *rate > 0);
        self.max_latency_ms = self.max_latency_ms.filter(|ms| *ms > 0);
        self.max_latency_us = self.max_latency_us.filter(|us| *us > 0);
        if self.queue_depth_buffers == 0 {
            self.queue_depth_buffers = DEFAULT_QUEUE_DEPTH_BUFFERS;
        }
        if self.high_water_buffers == 0 {
            self.high_water_buffers = DEFAULT_HIGH_WATER_BUFFERS;
        }
        self
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate_hz: None,
            max_latency_ms: None,
            max_latency_us: None,
            feed: FeedStrategy::Pull,
            queue_depth_buffers: DEFAULT_QUEUE_DEPTH_BUFFERS,
            high_water_buffers: DEFAULT_HIGH_WATER_BUFFERS,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SinkSettings, StorageError>;
    fn save_settings(&self, s: &SinkSettings) -> Result<(), StorageError>;
}
