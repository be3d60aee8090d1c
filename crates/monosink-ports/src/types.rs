use serde::{Deserialize, Serialize};
use std::{convert::Infallible, fmt, str::FromStr};

pub type Sample = i16; // signed 16-bit, native byte order

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

/// Which output device to open. `Default` lets the driver pick.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceSelector {
    #[default]
    Default,
    Named(String),
}

impl DeviceSelector {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            Ok(Self::Default)
        } else {
            Ok(Self::Named(s.to_string()))
        }
    }
}

impl From<Option<String>> for DeviceSelector {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) => name.parse().unwrap_or_default(),
            None => Self::Default,
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Named(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Signed 16-bit, native byte order.
    S16,
    /// Signed 16-bit, opposite of native byte order.
    S16Swapped,
    U16,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16 | Self::S16Swapped | Self::U16 => 2,
            Self::F32 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::S16 => "s16",
            Self::S16Swapped => "s16-swapped",
            Self::U16 => "u16",
            Self::F32 => "f32",
        };
        write!(f, "{}", name)
    }
}

/// Audio parameters as requested from, or granted by, a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate_hz: u32,
    pub format: SampleFormat,
    pub channels: u16,
    pub buffer_frames: u32,
}

impl AudioSpec {
    pub fn mono_s16(sample_rate_hz: u32, buffer_frames: u32) -> Self {
        Self {
            sample_rate_hz,
            format: SampleFormat::S16,
            channels: 1,
            buffer_frames,
        }
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames as usize * self.format.bytes_per_sample() * self.channels as usize
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioOutputDevice {
    pub id: DeviceId,
    pub name: String,
    pub is_default: bool,
    pub default_sample_rate_hz: Option<u32>,
    pub max_channels: Option<u16>,
}

/// How frames reach the hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStrategy {
    /// The driver calls back for samples on its own thread.
    #[default]
    Pull,
    /// The application submits chunks into a driver-managed queue.
    Push,
}

impl FromStr for FeedStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pull" | "callback" => Ok(Self::Pull),
            "push" | "queue" => Ok(Self::Push),
            other => Err(format!("unknown feed strategy: {other}")),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull => write!(f, "pull"),
            Self::Push => write!(f, "push"),
        }
    }
}
