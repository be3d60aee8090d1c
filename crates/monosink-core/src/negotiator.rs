use crate::error::{SinkError, SpecDrift};
use crate::latency::frames_to_duration;
use monosink_ports::audio::{AudioDeviceHandle, AudioOutputPort, Delivery};
use monosink_ports::types::{AudioSpec, DeviceSelector, SampleFormat};
use std::time::Duration;
use tracing::{info, warn};

/// The parameters actually in force for an open device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiatedSpec {
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub sample_format: SampleFormat,
    pub buffer_frames: u32,
    pub buffer_bytes: usize,
}

impl NegotiatedSpec {
    pub fn from_granted(granted: AudioSpec) -> Self {
        Self {
            sample_rate_hz: granted.sample_rate_hz,
            channel_count: granted.channels,
            sample_format: granted.format,
            buffer_frames: granted.buffer_frames,
            buffer_bytes: granted.buffer_bytes(),
        }
    }

    /// Duration of one device buffer at the granted rate.
    pub fn buffer_latency(&self) -> Duration {
        frames_to_duration(self.buffer_frames, self.sample_rate_hz)
    }

    pub fn buffer_samples(&self) -> usize {
        self.buffer_frames as usize * self.channel_count as usize
    }
}

pub struct Negotiation {
    pub device: Box<dyn AudioDeviceHandle>,
    pub spec: NegotiatedSpec,
    pub drift: Vec<SpecDrift>,
}

/// Compare a grant against the request. Format and channel mismatches are
/// fatal; rate and buffer mismatches are reported as drift.
pub fn check_grant(desired: &AudioSpec, granted: &AudioSpec) -> Result<Vec<SpecDrift>, SinkError> {
    if granted.format != desired.format {
        return Err(SinkError::UnsupportedFormat {
            requested: desired.format,
            granted: granted.format,
        });
    }
    if granted.channels != 1 {
        return Err(SinkError::UnsupportedChannelLayout {
            channels: granted.channels,
        });
    }
    if granted.buffer_frames == 0 || granted.sample_rate_hz == 0 {
        return Err(SinkError::InvalidConfig(format!(
            "driver granted an empty stream ({} Hz, {} frames)",
            granted.sample_rate_hz, granted.buffer_frames
        )));
    }

    let mut drift = Vec::new();
    if granted.sample_rate_hz != desired.sample_rate_hz {
        drift.push(SpecDrift::SampleRate {
            requested: desired.sample_rate_hz,
            granted: granted.sample_rate_hz,
        });
    }
    if granted.buffer_frames != desired.buffer_frames {
        drift.push(SpecDrift::BufferFrames {
            requested: desired.buffer_frames,
            granted: granted.buffer_frames,
        });
    }
    Ok(drift)
}

pub struct DeviceNegotiator<'a> {
    port: &'a dyn AudioOutputPort,
}

impl<'a> DeviceNegotiator<'a> {
    pub fn new(port: &'a dyn AudioOutputPort) -> Self {
        Self { port }
    }

    pub fn open(
        &self,
        selector: &DeviceSelector,
        desired: AudioSpec,
        delivery: Delivery,
    ) -> Result<Negotiation, SinkError> {
        let device = self
            .port
            .open_output(selector, desired, delivery)
            .map_err(SinkError::DeviceOpenFailure)?;
        let granted = device.granted_spec();

        info!(
            device = %selector,
            sample_rate = granted.sample_rate_hz,
            audio_format = %granted.format,
            num_channels = granted.channels,
            buffer_num_frames = granted.buffer_frames,
            buffer_size_bytes = granted.buffer_bytes(),
            "opened audio device"
        );

        let drift = match check_grant(&desired, &granted) {
            Ok(drift) => drift,
            Err(err) => {
                device.close();
                return Err(err);
            }
        };
        for item in &drift {
            warn!(device = %selector, "{}", item);
        }

        Ok(Negotiation {
            device,
            spec: NegotiatedSpec::from_granted(granted),
            drift,
        })
    }
}
