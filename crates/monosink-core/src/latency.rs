use crate::error::SinkError;
use std::time::Duration;

/// Largest power-of-two buffer depth, in frames, whose duration at
/// `sample_rate_hz` does not exceed `max_latency`.
pub fn buffer_frames_for_latency(
    sample_rate_hz: u32,
    max_latency: Duration,
) -> Result<u32, SinkError> {
    if sample_rate_hz == 0 {
        return Err(SinkError::InvalidConfig(
            "sample rate must be positive".to_string(),
        ));
    }
    if max_latency.is_zero() {
        return Err(SinkError::InvalidConfig(
            "max latency must be positive".to_string(),
        ));
    }

    let max_frames = sample_rate_hz as u128 * max_latency.as_nanos() / 1_000_000_000;
    if max_frames < 1 {
        return Err(SinkError::InvalidConfig(format!(
            "{:?} at {} Hz is less than one frame",
            max_latency, sample_rate_hz
        )));
    }

    // Drivers take the depth as a u32; anything beyond that is clamped.
    let max_frames = max_frames.min(u32::MAX as u128) as u32;
    Ok(1 << (u32::BITS - 1 - max_frames.leading_zeros()))
}

/// Playback duration of `frames` at `sample_rate_hz`.
pub fn frames_to_duration(frames: u32, sample_rate_hz: u32) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(frames as u64 * 1_000_000_000 / sample_rate_hz as u64)
}
