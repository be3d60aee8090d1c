use crate::error::SinkError;
use monosink_ports::storage::{
    SinkSettings, DEFAULT_HIGH_WATER_BUFFERS, DEFAULT_QUEUE_DEPTH_BUFFERS,
};
use monosink_ports::types::{DeviceSelector, FeedStrategy};
use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 48_000;
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub device: DeviceSelector,
    pub sample_rate_hz: u32,
    pub max_latency: Duration,
    pub feed: FeedStrategy,
    /// Pull queue capacity, in device buffers.
    pub queue_depth_buffers: usize,
    /// Push high-water mark, in device buffers.
    pub high_water_buffers: usize,
    /// Push poll interval is `max_latency / poll_divisor`.
    pub poll_divisor: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            device: DeviceSelector::Default,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            max_latency: DEFAULT_MAX_LATENCY,
            feed: FeedStrategy::Pull,
            queue_depth_buffers: DEFAULT_QUEUE_DEPTH_BUFFERS,
            high_water_buffers: DEFAULT_HIGH_WATER_BUFFERS,
            poll_divisor: 10,
        }
    }
}

impl SinkConfig {
    pub fn with_feed(mut self, feed: FeedStrategy) -> Self {
        self.feed = feed;
        self
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.sample_rate_hz == 0 {
            return Err(SinkError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.max_latency.is_zero() {
            return Err(SinkError::InvalidConfig(
                "max latency must be positive".to_string(),
            ));
        }
        if self.queue_depth_buffers == 0 {
            return Err(SinkError::InvalidConfig(
                "queue depth must be at least one buffer".to_string(),
            ));
        }
        if self.high_water_buffers == 0 {
            return Err(SinkError::InvalidConfig(
                "high-water mark must be at least one buffer".to_string(),
            ));
        }
        if self.poll_divisor == 0 {
            return Err(SinkError::InvalidConfig(
                "poll divisor must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        self.max_latency / self.poll_divisor.max(1)
    }
}

impl From<&SinkSettings> for SinkConfig {
    fn from(settings: &SinkSettings) -> Self {
        let settings = settings.clone().sanitized();
        let max_latency = match (settings.max_latency_us, settings.max_latency_ms) {
            (Some(us), _) => Duration::from_micros(us),
            (None, Some(ms)) => Duration::from_millis(ms),
            (None, None) => DEFAULT_MAX_LATENCY,
        };
        Self {
            device: DeviceSelector::from(settings.device),
            sample_rate_hz: settings.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ),
            max_latency,
            feed: settings.feed,
            queue_depth_buffers: settings.queue_depth_buffers,
            high_water_buffers: settings.high_water_buffers,
            poll_divisor: SinkConfig::default().poll_divisor,
        }
    }
}

/// Fails rather than store a budget that would read back as "missing".
/// Sub-microsecond remainders are dropped, which only tightens the budget.
impl TryFrom<&SinkConfig> for SinkSettings {
    type Error = SinkError;

    fn try_from(config: &SinkConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        let micros = u64::try_from(config.max_latency.as_micros()).map_err(|_| {
            SinkError::InvalidConfig(format!("max latency {:?} is too large", config.max_latency))
        })?;
        if micros == 0 {
            return Err(SinkError::InvalidConfig(format!(
                "max latency {:?} is below the 1 us settings resolution",
                config.max_latency
            )));
        }
        let (max_latency_ms, max_latency_us) = if micros % 1_000 == 0 {
            (Some(micros / 1_000), None)
        } else {
            (None, Some(micros))
        };

        Ok(Self {
            device: config.device.name().map(str::to_string),
            sample_rate_hz: Some(config.sample_rate_hz),
            max_latency_ms,
            max_latency_us,
            feed: config.feed,
            queue_depth_buffers: config.queue_depth_buffers,
            high_water_buffers: config.high_water_buffers,
        })
    }
}
