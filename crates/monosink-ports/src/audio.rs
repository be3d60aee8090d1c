use crate::types::*;
use std::ffi::{c_int, c_void};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("queue overflow: {queued} bytes queued, {requested} more requested")]
    QueueOverflow { queued: usize, requested: usize },
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Native render callback: fill `len` bytes at `stream` with native-endian
/// samples. Runs on the driver's real-time thread.
pub type RenderFn = unsafe extern "C" fn(userdata: *mut c_void, stream: *mut u8, len: c_int);

/// A render function plus the opaque context pointer the driver hands back
/// on every invocation. The pointee must stay at a fixed address until the
/// device handle has been closed.
#[derive(Clone, Copy, Debug)]
pub struct RenderCallback {
    pub func: RenderFn,
    pub userdata: *mut c_void,
}

// The pointer is only dereferenced by `func`, which owns the synchronization
// contract for the pointee.
unsafe impl Send for RenderCallback {}
unsafe impl Sync for RenderCallback {}

impl RenderCallback {
    /// # Safety
    /// `stream` must be valid for `len` writable bytes and `userdata` must
    /// satisfy the contract of `func`.
    pub unsafe fn invoke(&self, stream: *mut u8, len: usize) {
        let len = len.min(c_int::MAX as usize) as c_int;
        (self.func)(self.userdata, stream, len)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Delivery {
    /// Pull: the driver invokes the callback whenever it needs samples.
    Callback(RenderCallback),
    /// Push: the application enqueues bytes into a driver-managed queue.
    Queue,
}

impl Delivery {
    pub fn is_queue(&self) -> bool {
        matches!(self, Self::Queue)
    }
}

/// An open output device. Devices start paused.
pub trait AudioDeviceHandle: Send {
    fn granted_spec(&self) -> AudioSpec;

    fn set_paused(&mut self, paused: bool) -> Result<(), AudioError>;

    /// Bytes currently waiting in the driver queue (queue delivery only).
    fn queued_bytes(&self) -> Result<usize, AudioError>;

    /// Append native-endian sample bytes to the driver queue (queue delivery only).
    fn enqueue(&mut self, bytes: &[u8]) -> Result<(), AudioError>;

    /// Stops the device and releases it. Once this returns the driver never
    /// invokes the render callback again.
    fn close(self: Box<Self>);
}

pub trait AudioOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError>;

    fn open_output(
        &self,
        selector: &DeviceSelector,
        desired: AudioSpec,
        delivery: Delivery,
    ) -> Result<Box<dyn AudioDeviceHandle>, AudioError>;
}
