use crate::state::SinkState;
use monosink_ports::audio::AudioError;
use monosink_ports::types::SampleFormat;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("device open failed: {0}")]
    DeviceOpenFailure(AudioError),
    #[error("unsupported sample format: requested {requested}, granted {granted}")]
    UnsupportedFormat {
        requested: SampleFormat,
        granted: SampleFormat,
    },
    #[error("unsupported channel layout: {channels} channels granted, mono required")]
    UnsupportedChannelLayout { channels: u16 },
    #[error("cannot {op} while sink is {state:?}")]
    InvalidState { op: &'static str, state: SinkState },
    #[error("frame feed is closed")]
    FeedClosed,
    #[error("operation requires the {0} feed strategy")]
    WrongStrategy(&'static str),
    #[error("device error: {0}")]
    Device(#[from] AudioError),
}

/// Granted parameters differ from the requested ones. Not fatal: all
/// downstream sizing follows the granted values.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecDrift {
    #[error("sample rate drift: requested {requested} Hz, granted {granted} Hz")]
    SampleRate { requested: u32, granted: u32 },
    #[error("buffer size drift: requested {requested} frames, granted {granted} frames")]
    BufferFrames { requested: u32, granted: u32 },
}

/// The real-time callback was handed a context that is not a live sink
/// context. There is no caller to report this to, so the callback aborts.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("callback context integrity violation: tag {found:#018x}")]
pub struct IntegrityViolation {
    pub found: u64,
}
