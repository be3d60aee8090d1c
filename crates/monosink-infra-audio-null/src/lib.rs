use monosink_ports::audio::{AudioDeviceHandle, AudioError, AudioOutputPort, Delivery};
use monosink_ports::types::{
    AudioOutputDevice, AudioSpec, DeviceId, DeviceSelector, Sample, SampleFormat,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

pub const NULL_DEVICE_NAME: &str = "null";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockMode {
    /// A clock thread services the device once per buffer period.
    Realtime,
    /// Nothing happens until [`NullAudioOutputPort::tick`] is called.
    Manual,
}

/// Forces the granted spec to differ from the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrantOverride {
    pub sample_rate_hz: Option<u32>,
    pub format: Option<SampleFormat>,
    pub channels: Option<u16>,
    pub buffer_frames: Option<u32>,
}

impl GrantOverride {
    fn apply(&self, desired: AudioSpec) -> AudioSpec {
        AudioSpec {
            sample_rate_hz: self.sample_rate_hz.unwrap_or(desired.sample_rate_hz),
            format: self.format.unwrap_or(desired.format),
            channels: self.channels.unwrap_or(desired.channels),
            buffer_frames: self.buffer_frames.unwrap_or(desired.buffer_frames),
        }
    }
}

struct PortShared {
    clock: ClockMode,
    grant: Mutex<GrantOverride>,
    open_error: Mutex<Option<AudioError>>,
    queue_capacity_buffers: AtomicUsize,
    played: Mutex<Vec<Sample>>,
    silence_frames: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    current: Mutex<Option<Arc<NullDevice>>>,
}

/// Headless output driver. Records every sample it "plays".
#[derive(Clone)]
pub struct NullAudioOutputPort {
    shared: Arc<PortShared>,
}

impl NullAudioOutputPort {
    pub fn new(clock: ClockMode) -> Self {
        Self {
            shared: Arc::new(PortShared {
                clock,
                grant: Mutex::new(GrantOverride::default()),
                open_error: Mutex::new(None),
                queue_capacity_buffers: AtomicUsize::new(64),
                played: Mutex::new(Vec::new()),
                silence_frames: AtomicU64::new(0),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                current: Mutex::new(None),
            }),
        }
    }

    pub fn realtime() -> Self {
        Self::new(ClockMode::Realtime)
    }

    pub fn manual() -> Self {
        Self::new(ClockMode::Manual)
    }

    pub fn with_grant(self, grant: GrantOverride) -> Self {
        *self.shared.grant.lock() = grant;
        self
    }

    pub fn with_queue_capacity_buffers(self, buffers: usize) -> Self {
        self.shared
            .queue_capacity_buffers
            .store(buffers.max(1), Ordering::Relaxed);
        self
    }

    /// Every subsequent open fails with `err`.
    pub fn fail_open(self, err: AudioError) -> Self {
        *self.shared.open_error.lock() = Some(err);
        self
    }

    /// Service the open device for `frames` frames, as the hardware clock
    /// would. Returns the number of frames serviced.
    pub fn tick(&self, frames: usize) -> usize {
        let device = self.shared.current.lock().clone();
        match device {
            Some(device) => device.service(frames, &self.shared),
            None => 0,
        }
    }

    pub fn played(&self) -> Vec<Sample> {
        self.shared.played.lock().clone()
    }

    pub fn take_played(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.shared.played.lock())
    }

    /// Frames the queue could not supply and were played as silence.
    pub fn silence_frames(&self) -> u64 {
        self.shared.silence_frames.load(Ordering::Relaxed)
    }

    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn is_device_open(&self) -> bool {
        self.shared.current.lock().is_some()
    }

    pub fn is_paused(&self) -> Option<bool> {
        self.shared
            .current
            .lock()
            .as_ref()
            .map(|device| device.paused.load(Ordering::SeqCst))
    }

    pub fn queued_samples(&self) -> usize {
        self.shared
            .current
            .lock()
            .as_ref()
            .map_or(0, |device| device.queue.lock().len())
    }
}

impl Default for NullAudioOutputPort {
    fn default() -> Self {
        Self::realtime()
    }
}

struct NullDevice {
    spec: AudioSpec,
    delivery: Delivery,
    paused: AtomicBool,
    closed: AtomicBool,
    queue: Mutex<VecDeque<Sample>>,
    queue_capacity: usize,
    // Held while the callback runs so close waits for it.
    service: Mutex<()>,
}

impl NullDevice {
    fn service(&self, frames: usize, port: &PortShared) -> usize {
        let _guard = self.service.lock();
        if self.closed.load(Ordering::SeqCst) || self.paused.load(Ordering::SeqCst) {
            return 0;
        }

        let samples = frames * self.spec.channels.max(1) as usize;
        match self.delivery {
            Delivery::Callback(callback) => {
                let mut stream = vec![0u8; samples * std::mem::size_of::<Sample>()];
                unsafe { callback.invoke(stream.as_mut_ptr(), stream.len()) };
                let mut played = port.played.lock();
                played.extend(
                    stream
                        .chunks_exact(2)
                        .map(|pair| Sample::from_ne_bytes([pair[0], pair[1]])),
                );
            }
            Delivery::Queue => {
                let mut queue = self.queue.lock();
                let available = samples.min(queue.len());
                port.played.lock().extend(queue.drain(..available));
                let missing = (samples - available) as u64;
                port.silence_frames.fetch_add(missing, Ordering::Relaxed);
            }
        }
        frames
    }
}

pub struct NullDeviceHandle {
    device: Arc<NullDevice>,
    port: Arc<PortShared>,
    clock_thread: Option<thread::JoinHandle<()>>,
}

impl AudioDeviceHandle for NullDeviceHandle {
    fn granted_spec(&self) -> AudioSpec {
        self.device.spec
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), AudioError> {
        self.device.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }

    fn queued_bytes(&self) -> Result<usize, AudioError> {
        if !self.device.delivery.is_queue() {
            return Err(AudioError::NotSupported(
                "queued_bytes on a callback device".to_string(),
            ));
        }
        Ok(self.device.queue.lock().len() * std::mem::size_of::<Sample>())
    }

    fn enqueue(&mut self, bytes: &[u8]) -> Result<(), AudioError> {
        if !self.device.delivery.is_queue() {
            return Err(AudioError::NotSupported(
                "enqueue on a callback device".to_string(),
            ));
        }
        let mut queue = self.device.queue.lock();
        let incoming = bytes.len() / std::mem::size_of::<Sample>();
        if queue.len() + incoming > self.device.queue_capacity {
            return Err(AudioError::QueueOverflow {
                queued: queue.len() * std::mem::size_of::<Sample>(),
                requested: bytes.len(),
            });
        }
        queue.extend(
            bytes
                .chunks_exact(2)
                .map(|pair| Sample::from_ne_bytes([pair[0], pair[1]])),
        );
        Ok(())
    }

    fn close(mut self: Box<Self>) {
        {
            let _guard = self.device.service.lock();
            self.device.closed.store(true, Ordering::SeqCst);
        }
        if let Some(handle) = self.clock_thread.take() {
            let _ = handle.join();
        }

        let mut current = self.port.current.lock();
        if current
            .as_ref()
            .is_some_and(|device| Arc::ptr_eq(device, &self.device))
        {
            *current = None;
        }
        drop(current);

        self.port.closed.fetch_add(1, Ordering::SeqCst);
        debug!("null device closed");
    }
}

impl AudioOutputPort for NullAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        Ok(vec![AudioOutputDevice {
            id: DeviceId(NULL_DEVICE_NAME.to_string()),
            name: NULL_DEVICE_NAME.to_string(),
            is_default: true,
            default_sample_rate_hz: None,
            max_channels: None,
        }])
    }

    fn open_output(
        &self,
        selector: &DeviceSelector,
        desired: AudioSpec,
        delivery: Delivery,
    ) -> Result<Box<dyn AudioDeviceHandle>, AudioError> {
        if let Some(err) = self.shared.open_error.lock().clone() {
            return Err(err);
        }
        if let DeviceSelector::Named(name) = selector {
            if name != NULL_DEVICE_NAME {
                return Err(AudioError::DeviceNotFound(name.clone()));
            }
        }
        if self.shared.current.lock().is_some() {
            return Err(AudioError::DeviceUnavailable(
                "null device already open".to_string(),
            ));
        }

        let spec = self.shared.grant.lock().apply(desired);
        let queue_capacity = spec.buffer_frames as usize
            * spec.channels.max(1) as usize
            * self.shared.queue_capacity_buffers.load(Ordering::Relaxed);
        let device = Arc::new(NullDevice {
            spec,
            delivery,
            paused: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::with_capacity(queue_capacity)),
            queue_capacity,
            service: Mutex::new(()),
        });
        *self.shared.current.lock() = Some(Arc::clone(&device));
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        let clock_thread = match self.shared.clock {
            ClockMode::Manual => None,
            ClockMode::Realtime => Some(spawn_clock(Arc::clone(&device), Arc::clone(&self.shared))),
        };

        debug!(sample_rate = spec.sample_rate_hz, buffer_num_frames = spec.buffer_frames, "null device opened");
        Ok(Box::new(NullDeviceHandle {
            device,
            port: Arc::clone(&self.shared),
            clock_thread,
        }))
    }
}

fn spawn_clock(device: Arc<NullDevice>, port: Arc<PortShared>) -> thread::JoinHandle<()> {
    let frames = device.spec.buffer_frames.max(1) as usize;
    let period = Duration::from_nanos(
        frames as u64 * 1_000_000_000 / device.spec.sample_rate_hz.max(1) as u64,
    );
    thread::spawn(move || {
        while !device.closed.load(Ordering::SeqCst) {
            thread::sleep(period);
            device.service(frames, &port);
        }
    })
}
