//! CPAL device transport.
//!
//! Frames move between the caller and the device callback through a lock-free
//! byte ring. Transfers block (sleeping between polls) until the ring has room
//! or data, unless the stream is non-blocking.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, SizedSample, Stream, StreamConfig as CpalStreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::format::{ChannelAreas, MmapRegion, MmapRegionMut};
use crate::transport::{
    ChannelInfo, ChannelMask, Direction, ParamsInfo, PollDescriptor, StreamInfo, StreamParams,
    StreamSetup, StreamState, StreamStatus, Transport,
};
use crate::{PcmError, SampleFormat};

/// Name that selects the host's default device.
const DEFAULT_DEVICE: &str = "default";

/// Configuration for a [`DeviceTransport`].
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Sample format. Only `S16Le` and `FloatLe` reach the device.
    pub format: SampleFormat,
    /// Number of channels.
    pub channels: u16,
    /// Rate in Hz.
    pub rate: u32,
    /// Ring capacity in frames.
    pub buffer_size: usize,
    /// How long a blocking transfer sleeps while waiting for the ring.
    pub poll_interval: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            format: SampleFormat::S16Le,
            channels: 2,
            rate: 48000,
            // 100ms at 48kHz
            buffer_size: 4800,
            poll_interval: Duration::from_millis(2),
        }
    }
}

impl DeviceConfig {
    /// Stream parameters matching this configuration.
    #[must_use]
    pub fn params(&self) -> StreamParams {
        StreamParams {
            format: self.format,
            channels: self.channels,
            rate: self.rate,
            buffer_size: self.buffer_size,
        }
    }
}

/// Sample types exchanged with the device callback.
trait WireSample: SizedSample + Send + 'static {
    const BYTES: usize;
    const SILENCE: Self;

    fn decode(bytes: &[u8]) -> Self;
    fn encode(self, out: &mut [u8]);
}

impl WireSample for i16 {
    const BYTES: usize = 2;
    const SILENCE: Self = 0;

    fn decode(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl WireSample for f32 {
    const BYTES: usize = 4;
    const SILENCE: Self = 0.0;

    fn decode(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

/// The caller's half of the byte ring.
enum RingHalf {
    Playback(HeapProd<u8>),
    Capture(HeapCons<u8>),
}

impl RingHalf {
    fn occupied_bytes(&self) -> usize {
        match self {
            Self::Playback(prod) => prod.occupied_len(),
            Self::Capture(cons) => cons.occupied_len(),
        }
    }

    fn vacant_bytes(&self) -> usize {
        match self {
            Self::Playback(prod) => prod.vacant_len(),
            Self::Capture(cons) => cons.vacant_len(),
        }
    }
}

/// A live device stream. Dropping it stops the device.
struct Running {
    stream: Stream,
    ring: RingHalf,
}

/// A transport on a real audio device.
///
/// Only interleaved transfers reach the device; planar buffers are
/// interleaved first. The mapped ring is not available and rewind never
/// takes frames back.
#[must_use]
pub struct DeviceTransport {
    name: String,
    device: Device,
    direction: Direction,
    config: DeviceConfig,
    state: StreamState,
    nonblocking: bool,
    setup: Option<StreamSetup>,
    running: Option<Running>,
    appl_ptr: u64,
    failed: Arc<AtomicBool>,
}

impl DeviceTransport {
    /// Opens the device called `name` (or the default device for
    /// `"default"`) and negotiates `config`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such device exists and `InvalidArgument` if
    /// the configuration is not supported.
    pub fn open(
        name: &str,
        direction: Direction,
        config: &DeviceConfig,
    ) -> Result<Self, PcmError> {
        let device = find_device(name, direction)?;
        let mut transport = Self {
            name: name.to_string(),
            device,
            direction,
            config: config.clone(),
            state: StreamState::Open,
            nonblocking: false,
            setup: None,
            running: None,
            appl_ptr: 0,
            failed: Arc::new(AtomicBool::new(false)),
        };
        transport.set_params(&config.params())?;
        tracing::debug!(device = %transport.device_name(), %direction, "device transport opened");
        Ok(transport)
    }

    /// Name the backend reports for the device.
    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".to_string())
    }

    fn bad_state(&self, op: &'static str) -> PcmError {
        PcmError::BadState {
            op,
            state: self.state,
        }
    }

    fn require_setup(&self, op: &'static str) -> Result<StreamSetup, PcmError> {
        self.setup.ok_or_else(|| self.bad_state(op))
    }

    fn check_failed(&mut self) -> Result<(), PcmError> {
        if self.failed.load(Ordering::SeqCst) {
            self.state = StreamState::Disconnected;
            return Err(PcmError::Disconnected);
        }
        Ok(())
    }

    fn build_stream(&self, setup: &StreamSetup) -> Result<Running, PcmError> {
        let bytes = setup
            .geometry
            .frames_to_bytes(setup.buffer_size)
            .ok_or_else(|| PcmError::frame_overflow(setup.buffer_size))?;
        let (prod, cons) = HeapRb::<u8>::new(bytes).split();
        let config = CpalStreamConfig {
            channels: setup.geometry.channels,
            sample_rate: SampleRate(setup.rate),
            buffer_size: BufferSize::Default,
        };

        let failed = Arc::clone(&self.failed);
        let on_error = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio stream error");
            failed.store(true, Ordering::SeqCst);
        };

        let (stream, ring) = match (self.direction, setup.geometry.format) {
            (Direction::Playback, SampleFormat::S16Le) => (
                build_output::<i16>(&self.device, &config, cons, on_error)?,
                RingHalf::Playback(prod),
            ),
            (Direction::Playback, SampleFormat::FloatLe) => (
                build_output::<f32>(&self.device, &config, cons, on_error)?,
                RingHalf::Playback(prod),
            ),
            (Direction::Capture, SampleFormat::S16Le) => (
                build_input::<i16>(&self.device, &config, prod, on_error)?,
                RingHalf::Capture(cons),
            ),
            (Direction::Capture, SampleFormat::FloatLe) => (
                build_input::<f32>(&self.device, &config, prod, on_error)?,
                RingHalf::Capture(cons),
            ),
            (_, format) => {
                return Err(PcmError::invalid_argument(format!(
                    "device does not accept {format}"
                )))
            }
        };
        Ok(Running { stream, ring })
    }

    fn ensure_started(&mut self, op: &'static str) -> Result<(), PcmError> {
        self.check_failed()?;
        match self.state {
            StreamState::Running => Ok(()),
            StreamState::Prepared => self.start(),
            StreamState::Xrun => Err(PcmError::Xrun),
            StreamState::Disconnected => Err(PcmError::Disconnected),
            _ => Err(self.bad_state(op)),
        }
    }

    /// Moves up to `frames` frames, waiting for ring space or data unless
    /// non-blocking. `transfer` gets the ring half and the whole frames that
    /// fit right now, and returns the frames it moved.
    fn transfer<F>(
        &mut self,
        op: &'static str,
        frames: usize,
        mut transfer: F,
    ) -> Result<usize, PcmError>
    where
        F: FnMut(&mut RingHalf, usize, usize) -> usize,
    {
        let setup = self.require_setup(op)?;
        self.ensure_started(op)?;
        let frame_bytes = setup.geometry.frame_bytes();

        let mut done = 0;
        while done < frames {
            self.check_failed()?;
            let running = self
                .running
                .as_mut()
                .ok_or(PcmError::BadState {
                    op,
                    state: self.state,
                })?;
            let ready = match self.direction {
                Direction::Playback => running.ring.vacant_bytes(),
                Direction::Capture => running.ring.occupied_bytes(),
            } / frame_bytes;

            let n = ready.min(frames - done);
            if n > 0 {
                done += transfer(&mut running.ring, done, n);
                continue;
            }
            if self.nonblocking {
                if done == 0 {
                    return Err(PcmError::WouldBlock);
                }
                break;
            }
            std::thread::sleep(self.config.poll_interval);
        }
        self.appl_ptr += done as u64;
        Ok(done)
    }
}

fn find_device(name: &str, direction: Direction) -> Result<Device, PcmError> {
    let host = cpal::default_host();
    if name == DEFAULT_DEVICE {
        let device = match direction {
            Direction::Playback => host.default_output_device(),
            Direction::Capture => host.default_input_device(),
        };
        return device.ok_or_else(|| PcmError::NotFound { name: name.into() });
    }

    let devices: Vec<Device> = match direction {
        Direction::Playback => host.output_devices().map_err(PcmError::backend)?.collect(),
        Direction::Capture => host.input_devices().map_err(PcmError::backend)?.collect(),
    };

    devices
        .into_iter()
        .find(|device| device.name().is_ok_and(|device_name| device_name == name))
        .ok_or_else(|| PcmError::NotFound { name: name.into() })
}

fn build_output<S: WireSample>(
    device: &Device,
    config: &CpalStreamConfig,
    mut cons: HeapCons<u8>,
    on_error: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, PcmError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
                let mut bytes = [0u8; 8];
                for sample in data.iter_mut() {
                    // Whole frames are pushed, so a sample is either fully
                    // present or missing (underrun plays silence).
                    *sample = if cons.pop_slice(&mut bytes[..S::BYTES]) == S::BYTES {
                        S::decode(&bytes[..S::BYTES])
                    } else {
                        S::SILENCE
                    };
                }
            },
            on_error,
            None,
        )
        .map_err(PcmError::backend)
}

fn build_input<S: WireSample>(
    device: &Device,
    config: &CpalStreamConfig,
    mut prod: HeapProd<u8>,
    on_error: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, PcmError> {
    let channels = usize::from(config.channels);
    device
        .build_input_stream(
            config,
            move |data: &[S], _: &cpal::InputCallbackInfo| {
                let mut frame = vec![0u8; channels * S::BYTES];
                for samples in data.chunks_exact(channels) {
                    // Drop whole frames when the reader falls behind.
                    if prod.vacant_len() < frame.len() {
                        break;
                    }
                    for (sample, out) in samples.iter().zip(frame.chunks_exact_mut(S::BYTES)) {
                        sample.encode(out);
                    }
                    let _ = prod.push_slice(&frame);
                }
            },
            on_error,
            None,
        )
        .map_err(PcmError::backend)
}

impl Transport for DeviceTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn info(&self) -> Result<StreamInfo, PcmError> {
        Ok(StreamInfo {
            name: self.name.clone(),
            direction: self.direction,
            mmap: false,
            rewindable: false,
        })
    }

    fn params_info(&self) -> Result<ParamsInfo, PcmError> {
        let ranges: Vec<_> = match self.direction {
            Direction::Playback => self
                .device
                .supported_output_configs()
                .map_err(PcmError::backend)?
                .collect(),
            Direction::Capture => self
                .device
                .supported_input_configs()
                .map_err(PcmError::backend)?
                .collect(),
        };

        let mut info = ParamsInfo {
            formats: vec![SampleFormat::S16Le, SampleFormat::FloatLe],
            min_channels: u16::MAX,
            max_channels: 0,
            min_rate: u32::MAX,
            max_rate: 0,
            min_buffer_size: 1,
            max_buffer_size: 1 << 20,
        };
        for range in &ranges {
            info.min_channels = info.min_channels.min(range.channels());
            info.max_channels = info.max_channels.max(range.channels());
            info.min_rate = info.min_rate.min(range.min_sample_rate().0);
            info.max_rate = info.max_rate.max(range.max_sample_rate().0);
        }
        if ranges.is_empty() {
            return Err(PcmError::Unsupported("device reports no configurations"));
        }
        Ok(info)
    }

    fn set_params(&mut self, params: &StreamParams) -> Result<(), PcmError> {
        match self.state {
            StreamState::Open | StreamState::Setup | StreamState::Prepared => {}
            _ => return Err(self.bad_state("set_params")),
        }
        if !matches!(params.format, SampleFormat::S16Le | SampleFormat::FloatLe) {
            return Err(PcmError::invalid_argument(format!(
                "device does not accept {}",
                params.format
            )));
        }
        if params.channels == 0 || params.buffer_size == 0 {
            return Err(PcmError::invalid_argument("empty frame or ring"));
        }
        self.running = None;
        self.setup = Some(StreamSetup::from(*params));
        self.state = StreamState::Setup;
        Ok(())
    }

    fn setup(&self) -> Result<StreamSetup, PcmError> {
        self.require_setup("setup")
    }

    fn channel_info(&self, _channel: u16) -> Result<ChannelInfo, PcmError> {
        Err(PcmError::Unsupported("mapped ring"))
    }

    fn status(&self) -> Result<StreamStatus, PcmError> {
        let frame_bytes = self.setup.map_or(1, |setup| setup.geometry.frame_bytes());
        let avail = self.running.as_ref().map_or(0, |running| match self.direction {
            Direction::Playback => running.ring.vacant_bytes(),
            Direction::Capture => running.ring.occupied_bytes(),
        }) / frame_bytes;
        Ok(StreamStatus {
            state: self.state,
            appl_ptr: self.appl_ptr,
            hw_ptr: self.appl_ptr.saturating_sub(self.delay()?.unsigned_abs()),
            avail,
            delay: self.delay()?,
        })
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn delay(&self) -> Result<i64, PcmError> {
        let frame_bytes = self.setup.map_or(1, |setup| setup.geometry.frame_bytes());
        let queued = self
            .running
            .as_ref()
            .map_or(0, |running| running.ring.occupied_bytes() / frame_bytes);
        Ok(i64::try_from(queued).unwrap_or(i64::MAX))
    }

    fn avail_update(&mut self) -> Result<usize, PcmError> {
        self.check_failed()?;
        Ok(self.status()?.avail)
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        let setup = match self.state {
            StreamState::Open | StreamState::Disconnected => return Err(self.bad_state("prepare")),
            _ => self.require_setup("prepare")?,
        };
        self.running = None;
        self.running = Some(self.build_stream(&setup)?);
        self.appl_ptr = 0;
        self.state = StreamState::Prepared;
        Ok(())
    }

    fn start(&mut self) -> Result<(), PcmError> {
        if self.state != StreamState::Prepared {
            return Err(self.bad_state("start"));
        }
        let running = self.running.as_ref().ok_or_else(|| self.bad_state("start"))?;
        running.stream.play().map_err(PcmError::backend)?;
        self.state = StreamState::Running;
        tracing::debug!(device = %self.name, "device stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PcmError> {
        self.running = None;
        if self.setup.is_some() {
            self.state = StreamState::Setup;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        if self.direction == Direction::Playback && self.state == StreamState::Running {
            self.state = StreamState::Draining;
            while self
                .running
                .as_ref()
                .is_some_and(|running| running.ring.occupied_bytes() > 0)
            {
                self.check_failed()?;
                std::thread::sleep(self.config.poll_interval);
            }
        }
        self.stop()
    }

    fn pause(&mut self, enable: bool) -> Result<(), PcmError> {
        let running = self.running.as_ref().ok_or_else(|| self.bad_state("pause"))?;
        match (enable, self.state) {
            (true, StreamState::Running) => {
                running.stream.pause().map_err(PcmError::backend)?;
                self.state = StreamState::Paused;
            }
            (false, StreamState::Paused) => {
                running.stream.play().map_err(PcmError::backend)?;
                self.state = StreamState::Running;
            }
            _ => return Err(self.bad_state("pause")),
        }
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), PcmError> {
        self.nonblocking = nonblocking;
        Ok(())
    }

    fn poll_descriptor(&self) -> Result<PollDescriptor, PcmError> {
        Err(PcmError::Unsupported("poll descriptor"))
    }

    fn channels_mask(&self, mask: &mut ChannelMask) -> Result<(), PcmError> {
        let channels = self.setup.map_or(self.config.channels, |s| s.geometry.channels);
        mask.intersect(ChannelMask::first(channels));
        Ok(())
    }

    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        if self.direction != Direction::Playback {
            return Err(self.bad_state("write"));
        }
        let geometry = self.require_setup("write")?.geometry;
        let frame_bytes = geometry.frame_bytes();
        let needed = geometry
            .frames_to_bytes(frames)
            .ok_or_else(|| PcmError::frame_overflow(frames))?;
        if buf.len() < needed {
            return Err(PcmError::invalid_argument("buffer shorter than frame count"));
        }
        self.transfer("write", frames, |ring, done, n| match ring {
            RingHalf::Playback(prod) => {
                let start = done * frame_bytes;
                prod.push_slice(&buf[start..start + n * frame_bytes]) / frame_bytes
            }
            RingHalf::Capture(_) => 0,
        })
    }

    fn write_planar(&mut self, bufs: &[&[u8]], frames: usize) -> Result<usize, PcmError> {
        let geometry = self.require_setup("write")?.geometry;
        let mut flat = Vec::new();
        ChannelAreas::planar(bufs, &geometry).copy_to_interleaved(0, frames, &geometry, &mut flat)?;
        self.write_interleaved(&flat, frames)
    }

    fn read_interleaved(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, PcmError> {
        if self.direction != Direction::Capture {
            return Err(self.bad_state("read"));
        }
        let geometry = self.require_setup("read")?.geometry;
        let frame_bytes = geometry.frame_bytes();
        let needed = geometry
            .frames_to_bytes(frames)
            .ok_or_else(|| PcmError::frame_overflow(frames))?;
        if buf.len() < needed {
            return Err(PcmError::invalid_argument("buffer shorter than frame count"));
        }
        self.transfer("read", frames, |ring, done, n| match ring {
            RingHalf::Capture(cons) => {
                let start = done * frame_bytes;
                cons.pop_slice(&mut buf[start..start + n * frame_bytes]) / frame_bytes
            }
            RingHalf::Playback(_) => 0,
        })
    }

    fn read_planar(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<usize, PcmError> {
        let geometry = self.require_setup("read")?.geometry;
        if bufs.len() != usize::from(geometry.channels) {
            return Err(PcmError::invalid_argument("one buffer per channel expected"));
        }
        let width = geometry.sample_bytes();
        let needed = frames
            .checked_mul(width)
            .ok_or_else(|| PcmError::frame_overflow(frames))?;
        if bufs.iter().any(|buf| buf.len() < needed) {
            return Err(PcmError::invalid_argument("channel buffer too short"));
        }
        let total = geometry
            .frames_to_bytes(frames)
            .ok_or_else(|| PcmError::frame_overflow(frames))?;
        let mut flat = vec![0u8; total];
        let n = self.read_interleaved(&mut flat, frames)?;

        let frame_bytes = geometry.frame_bytes();
        for (channel, buf) in bufs.iter_mut().enumerate() {
            for frame in 0..n {
                let at = frame * frame_bytes + channel * width;
                let dst = buf
                    .get_mut(frame * width..(frame + 1) * width)
                    .ok_or_else(|| PcmError::invalid_argument("channel buffer too short"))?;
                dst.copy_from_slice(&flat[at..at + width]);
            }
        }
        Ok(n)
    }

    fn appl_ptr(&self) -> u64 {
        self.appl_ptr
    }

    fn mmap_region(&self) -> Result<MmapRegion<'_>, PcmError> {
        Err(PcmError::Unsupported("mapped ring"))
    }

    fn mmap_region_mut(&mut self) -> Result<MmapRegionMut<'_>, PcmError> {
        Err(PcmError::Unsupported("mapped ring"))
    }

    fn mmap_commit(&mut self, _frames: usize) -> Result<usize, PcmError> {
        Err(PcmError::Unsupported("mapped ring"))
    }

    fn rewind(&mut self, _frames: usize) -> Result<usize, PcmError> {
        Ok(0)
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Device PCM (name={}, device={}, {})",
            self.name,
            self.device_name(),
            self.direction
        )?;
        writeln!(out, "  state       : {}", self.state)?;
        if let Some(setup) = &self.setup {
            write!(out, "{setup}")?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), PcmError> {
        tracing::debug!(device = %self.name, "closing device transport");
        Ok(())
    }
}

impl fmt::Debug for DeviceTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTransport")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("setup", &self.setup)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_default() {
        let config = DeviceConfig::default();
        assert_eq!(config.rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.params().format, SampleFormat::S16Le);
    }

    #[test]
    fn test_wire_sample_roundtrip() {
        let mut out = [0u8; 4];
        (-1234i16).encode(&mut out[..2]);
        assert_eq!(i16::decode(&out[..2]), -1234);
        0.5f32.encode(&mut out);
        assert!((f32::decode(&out) - 0.5).abs() < f32::EPSILON);
    }

    // Device tests require actual audio hardware and are skipped in CI
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_playback() {
        let mut pcm =
            DeviceTransport::open("default", Direction::Playback, &DeviceConfig::default())
                .unwrap();
        pcm.prepare().unwrap();
        let silence = vec![0u8; 4800 * 4];
        assert_eq!(pcm.write_interleaved(&silence, 4800).unwrap(), 4800);
        pcm.drain().unwrap();
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_unknown_device() {
        let config = DeviceConfig::default();
        let err = DeviceTransport::open("no such device", Direction::Capture, &config).unwrap_err();
        assert!(matches!(err, PcmError::NotFound { .. }));
    }
}
