use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, SampleRate, SizedSample, StreamConfig, SupportedBufferSize,
    SupportedStreamConfigRange,
};
use monosink_ports::audio::{AudioDeviceHandle, AudioError, AudioOutputPort, Delivery, RenderCallback};
use monosink_ports::types::{AudioOutputDevice, AudioSpec, DeviceId, DeviceSelector, Sample};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, warn};

/// Minimum driver queue size, in samples.
const MIN_QUEUE_SAMPLES: usize = 4096;
const QUEUE_BUFFERS: usize = 16;

pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

struct SelectedStreamConfig {
    config: StreamConfig,
    sample_format: cpal::SampleFormat,
}

enum Command {
    SetPaused(bool, mpsc::Sender<Result<(), AudioError>>),
    Stop,
}

type Ready = Result<(AudioSpec, Option<Producer<Sample>>), AudioError>;

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let mut list = Vec::new();
        for (index, device) in devices.enumerate() {
            let name = device_name(&device);
            let id = DeviceId(format!("cpal:{}:{}:{}", host_id, index, name));
            list.push((id, device));
        }

        Ok(list)
    }

    fn find_device(host: &cpal::Host, selector: &DeviceSelector) -> Result<cpal::Device, AudioError> {
        match selector {
            DeviceSelector::Default => host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default output".to_string())),
            DeviceSelector::Named(name) => Self::list_devices_from_host(host)?
                .into_iter()
                .find(|(id, device)| &id.0 == name || &device_name(device) == name)
                .map(|(_, device)| device)
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone())),
        }
    }

    /// Pick a stream config and report what the caller will see. Channel
    /// and format conversion happen inside the adapter, so the granted spec
    /// always keeps the requested layout.
    fn select_stream_config(
        device: &cpal::Device,
        desired: AudioSpec,
    ) -> Result<(SelectedStreamConfig, AudioSpec), AudioError> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?
            .collect();

        let chosen = match select_supported_config(&supported, desired.sample_rate_hz) {
            Some(chosen) => chosen,
            None => device
                .default_output_config()
                .map_err(|e| AudioError::UnsupportedConfig(e.to_string()))?,
        };

        let buffer_frames = match chosen.buffer_size() {
            SupportedBufferSize::Range { min, max } => desired.buffer_frames.clamp(*min, *max),
            SupportedBufferSize::Unknown => desired.buffer_frames,
        };

        let sample_format = chosen.sample_format();
        let mut config = chosen.config();
        config.buffer_size = BufferSize::Fixed(buffer_frames);

        let granted = AudioSpec {
            sample_rate_hz: config.sample_rate.0,
            buffer_frames,
            ..desired
        };

        Ok((
            SelectedStreamConfig {
                config,
                sample_format,
            },
            granted,
        ))
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalAudioDeviceHandle {
    spec: AudioSpec,
    paused: Arc<AtomicBool>,
    queue: Option<Producer<Sample>>,
    command_tx: mpsc::Sender<Command>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioDeviceHandle for CpalAudioDeviceHandle {
    fn granted_spec(&self) -> AudioSpec {
        self.spec
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), AudioError> {
        self.paused.store(paused, Ordering::SeqCst);
        let (reply_tx, reply_rx) = mpsc::channel();
        self.command_tx
            .send(Command::SetPaused(paused, reply_tx))
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        reply_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))?
    }

    fn queued_bytes(&self) -> Result<usize, AudioError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| AudioError::NotSupported("queued_bytes on a callback device".to_string()))?;
        let queued = queue.buffer().capacity() - queue.slots();
        Ok(queued * std::mem::size_of::<Sample>())
    }

    fn enqueue(&mut self, bytes: &[u8]) -> Result<(), AudioError> {
        let queue = self
            .queue
            .as_mut()
            .ok_or_else(|| AudioError::NotSupported("enqueue on a callback device".to_string()))?;
        let incoming = bytes.len() / std::mem::size_of::<Sample>();
        if incoming > queue.slots() {
            let queued = queue.buffer().capacity() - queue.slots();
            return Err(AudioError::QueueOverflow {
                queued: queued * std::mem::size_of::<Sample>(),
                requested: bytes.len(),
            });
        }
        let chunk = queue
            .write_chunk_uninit(incoming)
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        chunk.fill_from_iter(
            bytes
                .chunks_exact(2)
                .map(|pair| Sample::from_ne_bytes([pair[0], pair[1]])),
        );
        Ok(())
    }

    fn close(mut self: Box<Self>) {
        self.paused.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(Command::Stop);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
        debug!("cpal device closed");
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        let default_name = self.host.default_output_device().map(|d| device_name(&d));
        let mut results = Vec::new();

        for (id, device) in devices {
            let name = device_name(&device);
            let default_config = device.default_output_config().ok();

            results.push(AudioOutputDevice {
                id,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                default_sample_rate_hz: default_config.as_ref().map(|c| c.sample_rate().0),
                max_channels: default_config.as_ref().map(|c| c.channels()),
            });
        }

        Ok(results)
    }

    fn open_output(
        &self,
        selector: &DeviceSelector,
        desired: AudioSpec,
        delivery: Delivery,
    ) -> Result<Box<dyn AudioDeviceHandle>, AudioError> {
        let selector = selector.clone();
        let host_id = self.host.id();
        let paused = Arc::new(AtomicBool::new(true));
        let stream_paused = Arc::clone(&paused);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Ready>(1);
        let (command_tx, command_rx) = mpsc::channel();

        // cpal streams are not Send on every platform, so one thread owns
        // the stream for its whole life.
        let join_handle = thread::spawn(move || {
            let device = match open_host(host_id)
                .and_then(|host| Self::find_device(&host, &selector))
            {
                Ok(device) => device,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            let (stream_config, granted) = match Self::select_stream_config(&device, desired) {
                Ok(selected) => selected,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            let block_frames = granted.buffer_frames as usize;
            let (source, producer) = match delivery {
                Delivery::Callback(callback) => (StreamSource::Callback(callback), None),
                Delivery::Queue => {
                    let capacity =
                        (granted.buffer_frames as usize * QUEUE_BUFFERS).max(MIN_QUEUE_SAMPLES);
                    let (producer, consumer) = RingBuffer::new(capacity);
                    (StreamSource::Queue(consumer), Some(producer))
                }
            };

            let renderer = StreamRenderer::new(source, block_frames);
            let config = &stream_config.config;
            let stream = match stream_config.sample_format {
                cpal::SampleFormat::F32 => {
                    build_stream(&device, config, renderer, stream_paused, i16_to_f32)
                }
                cpal::SampleFormat::I16 => {
                    build_stream(&device, config, renderer, stream_paused, |s: Sample| s)
                }
                cpal::SampleFormat::U16 => {
                    build_stream(&device, config, renderer, stream_paused, i16_to_u16)
                }
                other => Err(AudioError::UnsupportedConfig(format!(
                    "device sample format {other:?}"
                ))),
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            // Some hosts start streams immediately; devices open paused.
            let _ = stream.pause();

            debug!(
                device_format = ?stream_config.sample_format,
                device_channels = stream_config.config.channels,
                sample_rate = granted.sample_rate_hz,
                buffer_num_frames = granted.buffer_frames,
                "cpal stream built"
            );
            let _ = ready_tx.send(Ok((granted, producer)));

            while let Ok(command) = command_rx.recv() {
                match command {
                    Command::SetPaused(pause, reply) => {
                        let result = if pause {
                            stream.pause().map_err(|e| e.to_string())
                        } else {
                            stream.play().map_err(|e| e.to_string())
                        };
                        let _ = reply.send(result.map_err(AudioError::Backend));
                    }
                    Command::Stop => break,
                }
            }
            drop(stream);
        });

        match ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))?
        {
            Ok((spec, queue)) => Ok(Box::new(CpalAudioDeviceHandle {
                spec,
                paused,
                queue,
                command_tx,
                join_handle: Some(join_handle),
            })),
            Err(err) => {
                let _ = join_handle.join();
                Err(err)
            }
        }
    }
}

enum StreamSource {
    Callback(RenderCallback),
    Queue(Consumer<Sample>),
}

impl StreamSource {
    /// Fill `mono` with the next samples, or silence. `bytes` holds
    /// exactly two bytes per sample in `mono`.
    fn render(&mut self, mono: &mut [Sample], bytes: &mut [u8]) {
        match self {
            Self::Callback(callback) => {
                unsafe { callback.invoke(bytes.as_mut_ptr(), bytes.len()) };
                for (sample, pair) in mono.iter_mut().zip(bytes.chunks_exact(2)) {
                    *sample = Sample::from_ne_bytes([pair[0], pair[1]]);
                }
            }
            Self::Queue(consumer) => {
                for sample in mono.iter_mut() {
                    *sample = consumer.pop().unwrap_or(0);
                }
            }
        }
    }
}

/// Scratch buffers sized once from the granted buffer; larger device
/// callbacks are rendered in blocks so the audio thread never allocates.
struct StreamRenderer {
    source: StreamSource,
    mono: Vec<Sample>,
    bytes: Vec<u8>,
}

impl StreamRenderer {
    fn new(source: StreamSource, block_frames: usize) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            source,
            mono: vec![0; block_frames],
            bytes: vec![0; block_frames * std::mem::size_of::<Sample>()],
        }
    }

    fn render<T: Copy>(
        &mut self,
        data: &mut [T],
        channels: usize,
        convert: fn(Sample) -> T,
        silence: T,
    ) {
        let block = self.mono.len() * channels;
        for out in data.chunks_mut(block) {
            let frames = out.len() / channels;
            let mono = &mut self.mono[..frames];
            self.source
                .render(mono, &mut self.bytes[..frames * std::mem::size_of::<Sample>()]);
            write_interleaved(out, channels, mono, convert, silence);
        }
    }
}

/// Resolve the host by id inside the stream thread.
fn open_host(id: cpal::HostId) -> Result<cpal::Host, AudioError> {
    cpal::host_from_id(id).map_err(|e| AudioError::Backend(e.to_string()))
}

fn build_stream<T: SizedSample + Send + 'static>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: StreamRenderer,
    paused: Arc<AtomicBool>,
    convert: fn(Sample) -> T,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels as usize;
    let silence = convert(0);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                if paused.load(Ordering::Relaxed) || channels == 0 {
                    data.fill(silence);
                    return;
                }
                renderer.render(data, channels, convert, silence);
            },
            |err| warn!(error = %err, "cpal stream error"),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

/// Prefer a native mono 16-bit config at the requested rate, then any
/// config covering the rate, ranked by how little conversion it needs.
fn select_supported_config(
    supported: &[SupportedStreamConfigRange],
    sample_rate_hz: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score: i32 = -1;

    for config_range in supported {
        let min = config_range.min_sample_rate().0;
        let max = config_range.max_sample_rate().0;
        if sample_rate_hz < min || sample_rate_hz > max {
            continue;
        }

        let format_score = match config_range.sample_format() {
            cpal::SampleFormat::I16 => 3,
            cpal::SampleFormat::F32 => 2,
            cpal::SampleFormat::U16 => 1,
            _ => continue,
        };
        let channel_score = match config_range.channels() {
            1 => 2,
            2 => 1,
            _ => 0,
        };
        let score = channel_score * 4 + format_score;

        if score > best_score {
            best = Some(config_range.clone().with_sample_rate(SampleRate(sample_rate_hz)));
            best_score = score;
        }
    }

    best
}

/// Copy mono samples into every channel of each frame.
fn write_interleaved<T: Copy>(
    data: &mut [T],
    channels: usize,
    mono: &[Sample],
    convert: fn(Sample) -> T,
    silence: T,
) {
    for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
        let value = mono.get(frame).copied().map_or(silence, convert);
        out.fill(value);
    }
}

fn i16_to_f32(value: Sample) -> f32 {
    value as f32 / -(i16::MIN as f32)
}

fn i16_to_u16(value: Sample) -> u16 {
    (value as i32 + 0x8000) as u16
}

fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mono_is_copied_to_every_channel() {
        let mut data = [0i16; 6];
        write_interleaved(&mut data, 2, &[1, -2, 3], |s| s, 0);
        assert_eq!(data, [1, 1, -2, -2, 3, 3]);
    }

    #[test]
    fn missing_frames_are_silent() {
        let mut data = [7u16; 4];
        write_interleaved(&mut data, 1, &[0, 1], i16_to_u16, 0x8000);
        assert_eq!(data, [0x8000, 0x8001, 0x8000, 0x8000]);
    }

    #[test]
    fn oversized_callbacks_render_in_blocks_without_growing() {
        let (mut producer, consumer) = RingBuffer::new(16);
        for sample in 1..=10 {
            producer.push(sample).unwrap();
        }
        let mut renderer = StreamRenderer::new(StreamSource::Queue(consumer), 4);
        let mono_capacity = renderer.mono.capacity();
        let bytes_capacity = renderer.bytes.capacity();

        let mut data = [9i16; 24];
        renderer.render(&mut data, 2, |s| s, 0);

        let expected: Vec<i16> = (1..=10).chain([0, 0]).flat_map(|s| [s, s]).collect();
        assert_eq!(data.to_vec(), expected);
        assert_eq!(renderer.mono.capacity(), mono_capacity);
        assert_eq!(renderer.bytes.capacity(), bytes_capacity);
    }

    #[test]
    fn stream_thread_reopens_the_chosen_host() {
        let id = cpal::default_host().id();
        assert_eq!(open_host(id).unwrap().id(), id);
    }

    #[test]
    fn sample_conversions_cover_full_range() {
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert_eq!(i16_to_f32(0), 0.0);
        assert_eq!(i16_to_u16(i16::MIN), 0);
        assert_eq!(i16_to_u16(i16::MAX), u16::MAX);
    }
}
