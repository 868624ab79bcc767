//! In-process transport for testing without hardware.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use crate::format::{AreaLayout, ChannelAreas, MmapRegion, MmapRegionMut};
use crate::tee::RingCursor;
use crate::transport::{
    ChannelInfo, ChannelMask, Direction, ParamsInfo, PollDescriptor, StreamInfo, StreamParams,
    StreamSetup, StreamState, StreamStatus, Transport,
};
use crate::{PcmError, SampleFormat};

/// Highest channel count a memory transport accepts.
const MAX_CHANNELS: u16 = 32;

/// Largest ring a memory transport accepts, in frames.
const MAX_BUFFER_FRAMES: usize = 1 << 20;

/// How channels are laid out inside the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingLayout {
    /// All channels of a frame next to each other.
    #[default]
    Interleaved,
    /// Each channel in its own block of `buffer_size` samples.
    Planar,
}

/// Configuration for a [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryTransportConfig {
    /// Channel count.
    pub channels: u16,
    /// Sample format.
    pub format: SampleFormat,
    /// Rate in Hz.
    pub rate: u32,
    /// Ring capacity in frames.
    pub buffer_size: usize,
    /// Ring layout.
    pub layout: RingLayout,
}

impl Default for MemoryTransportConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            format: SampleFormat::S16Le,
            rate: 48000,
            buffer_size: 1024,
            layout: RingLayout::Interleaved,
        }
    }
}

impl MemoryTransportConfig {
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

/// A transport whose "hardware" is driven by the caller.
///
/// Playback frames sit in the ring until [`consume`](Self::consume) plays
/// them; capture frames appear when [`inject`](Self::inject) records them.
/// Transfers never block: a full (playback) or empty (capture) ring yields a
/// short transfer, or [`PcmError::WouldBlock`] in non-blocking mode.
///
/// # Example
///
/// ```
/// use pcm_tee::{Direction, MemoryTransport, MemoryTransportConfig, Transport};
///
/// let config = MemoryTransportConfig::default();
/// let mut pcm = MemoryTransport::from_config("mem", Direction::Capture, &config).unwrap();
/// pcm.prepare().unwrap();
///
/// pcm.inject(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
/// let mut buf = [0u8; 8];
/// assert_eq!(pcm.read_interleaved(&mut buf, 2).unwrap(), 2);
/// assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
/// ```
pub struct MemoryTransport {
    name: String,
    direction: Direction,
    state: StreamState,
    nonblocking: bool,
    layout: RingLayout,
    setup: Option<StreamSetup>,
    areas: Vec<AreaLayout>,
    ring: Vec<u8>,
    appl_ptr: u64,
    hw_ptr: u64,
    transfer_limit: Option<usize>,
    fail_next: Option<PcmError>,
    played: Vec<u8>,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Creates an unconfigured transport with an interleaved ring.
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            state: StreamState::Open,
            nonblocking: false,
            layout: RingLayout::Interleaved,
            setup: None,
            areas: Vec::new(),
            ring: Vec::new(),
            appl_ptr: 0,
            hw_ptr: 0,
            transfer_limit: None,
            fail_next: None,
            played: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a transport and negotiates `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is out of range.
    pub fn from_config(
        name: impl Into<String>,
        direction: Direction,
        config: &MemoryTransportConfig,
    ) -> Result<Self, PcmError> {
        let mut transport = Self::new(name, direction).with_layout(config.layout);
        transport.set_params(&config.params())?;
        Ok(transport)
    }

    /// Sets the ring layout used by the next parameter negotiation.
    #[must_use]
    pub fn with_layout(mut self, layout: RingLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Caps every transfer, commit and rewind at `frames` frames.
    pub fn set_transfer_limit(&mut self, frames: Option<usize>) {
        self.transfer_limit = frames;
    }

    /// Makes the next transfer, commit or rewind fail with `error`.
    pub fn fail_next(&mut self, error: PcmError) {
        self.fail_next = Some(error);
    }

    /// Flag that turns `true` once the transport is closed.
    pub fn close_probe(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    /// Returns `true` if non-blocking mode is on.
    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Bytes the simulated hardware has played so far.
    pub fn played(&self) -> &[u8] {
        &self.played
    }

    /// Plays up to `frames` pending playback frames.
    ///
    /// # Errors
    ///
    /// Returns `BadState` for capture streams or before parameters are set.
    pub fn consume(&mut self, frames: usize) -> Result<usize, PcmError> {
        let setup = self.require_setup("consume")?;
        if self.direction != Direction::Playback {
            return Err(self.bad_state("consume"));
        }
        let pending = self.frames_between(self.hw_ptr, self.appl_ptr);
        let n = frames.min(pending);
        let mut out = Vec::new();
        for span in RingCursor::at(self.hw_ptr, setup.buffer_size).split(n) {
            self.ring_areas()
                .copy_to_interleaved(span.offset, span.frames, &setup.geometry, &mut out)?;
            self.played.extend_from_slice(&out);
        }
        self.hw_ptr += n as u64;
        Ok(n)
    }

    /// Records interleaved frames from `data` into the ring.
    ///
    /// Frames that do not fit overrun the ring: they are dropped and the
    /// stream enters the xrun state.
    ///
    /// # Errors
    ///
    /// Returns `BadState` for playback streams or before parameters are set.
    pub fn inject(&mut self, data: &[u8]) -> Result<usize, PcmError> {
        let setup = self.require_setup("inject")?;
        if self.direction != Direction::Capture {
            return Err(self.bad_state("inject"));
        }
        let frames = setup.geometry.bytes_to_frames(data.len());
        let free = setup.buffer_size - self.frames_between(self.appl_ptr, self.hw_ptr);
        let n = frames.min(free);
        let bytes = Self::byte_len(&setup, n)?;
        self.scatter(self.hw_ptr, &data[..bytes])?;
        self.hw_ptr += n as u64;
        if n < frames {
            tracing::debug!(
                transport = %self.name,
                dropped = frames - n,
                "capture ring overrun"
            );
            self.state = StreamState::Xrun;
        }
        Ok(n)
    }

    fn frames_between(&self, from: u64, to: u64) -> usize {
        usize::try_from(to.saturating_sub(from)).unwrap_or(usize::MAX)
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

    fn ring_areas(&self) -> ChannelAreas<'_> {
        MmapRegion::new(&self.ring, &self.areas).areas()
    }

    fn avail(&self, setup: &StreamSetup) -> usize {
        match self.direction {
            Direction::Playback => {
                setup.buffer_size - self.frames_between(self.hw_ptr, self.appl_ptr)
            }
            Direction::Capture => self.frames_between(self.appl_ptr, self.hw_ptr),
        }
    }

    fn rewindable(&self, setup: &StreamSetup) -> usize {
        match self.direction {
            Direction::Playback => self.frames_between(self.hw_ptr, self.appl_ptr),
            Direction::Capture => {
                let oldest = self.hw_ptr.saturating_sub(setup.buffer_size as u64);
                self.frames_between(oldest, self.appl_ptr)
            }
        }
    }

    /// Checks state before a transfer and returns the frames it may move.
    fn begin_transfer(&mut self, op: &'static str, frames: usize) -> Result<usize, PcmError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        let setup = self.require_setup(op)?;
        match self.state {
            StreamState::Prepared | StreamState::Running => {}
            StreamState::Xrun => return Err(PcmError::Xrun),
            StreamState::Suspended => return Err(PcmError::Suspended),
            StreamState::Disconnected => return Err(PcmError::Disconnected),
            _ => return Err(self.bad_state(op)),
        }

        let limit = self.transfer_limit.unwrap_or(usize::MAX);
        let n = frames.min(self.avail(&setup)).min(limit);
        if n == 0 && frames > 0 && self.nonblocking {
            return Err(PcmError::WouldBlock);
        }
        if n > 0 {
            self.state = StreamState::Running;
        }
        Ok(n)
    }

    /// Writes interleaved frames into the ring at stream position `position`.
    fn scatter(&mut self, position: u64, src: &[u8]) -> Result<(), PcmError> {
        let setup = self.require_setup("write")?;
        let frames = setup.geometry.bytes_to_frames(src.len());
        let mut region = MmapRegionMut::new(&mut self.ring, &self.areas);
        let mut done = 0;
        for span in RingCursor::at(position, setup.buffer_size).split(frames) {
            let start = Self::byte_len(&setup, done)?;
            let end = Self::byte_len(&setup, done + span.frames)?;
            region.write_interleaved(span.offset, &src[start..end], &setup.geometry)?;
            done += span.frames;
        }
        Ok(())
    }

    /// Reads interleaved frames from the ring at stream position `position`.
    fn gather(&self, position: u64, frames: usize, dst: &mut Vec<u8>) -> Result<(), PcmError> {
        let setup = self.require_setup("read")?;
        let areas = self.ring_areas();
        let mut span_bytes = Vec::new();
        dst.clear();
        for span in RingCursor::at(position, setup.buffer_size).split(frames) {
            areas.copy_to_interleaved(span.offset, span.frames, &setup.geometry, &mut span_bytes)?;
            dst.extend_from_slice(&span_bytes);
        }
        Ok(())
    }

    fn byte_len(setup: &StreamSetup, frames: usize) -> Result<usize, PcmError> {
        setup
            .geometry
            .frames_to_bytes(frames)
            .ok_or_else(|| PcmError::frame_overflow(frames))
    }

    fn check_buffer(needed: usize, available: usize) -> Result<(), PcmError> {
        if available < needed {
            return Err(PcmError::invalid_argument(format!(
                "buffer holds {available} bytes, {needed} needed"
            )));
        }
        Ok(())
    }

    fn check_planar(&self, count: usize, setup: &StreamSetup) -> Result<(), PcmError> {
        let channels = usize::from(setup.geometry.channels);
        if count != channels {
            return Err(PcmError::invalid_argument(format!(
                "expected {channels} channel buffers, got {count}"
            )));
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
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
            mmap: true,
            rewindable: true,
        })
    }

    fn params_info(&self) -> Result<ParamsInfo, PcmError> {
        Ok(ParamsInfo {
            formats: vec![
                SampleFormat::S8,
                SampleFormat::U8,
                SampleFormat::S16Le,
                SampleFormat::S16Be,
                SampleFormat::U16Le,
                SampleFormat::U16Be,
                SampleFormat::S24Le,
                SampleFormat::S24_3Le,
                SampleFormat::S32Le,
                SampleFormat::S32Be,
                SampleFormat::FloatLe,
                SampleFormat::Float64Le,
                SampleFormat::MuLaw,
                SampleFormat::ALaw,
            ],
            min_channels: 1,
            max_channels: MAX_CHANNELS,
            min_rate: 4000,
            max_rate: 384_000,
            min_buffer_size: 1,
            max_buffer_size: MAX_BUFFER_FRAMES,
        })
    }

    fn set_params(&mut self, params: &StreamParams) -> Result<(), PcmError> {
        match self.state {
            StreamState::Open | StreamState::Setup | StreamState::Prepared => {}
            _ => return Err(self.bad_state("set_params")),
        }
        if !self.params_info()?.accepts(params) {
            return Err(PcmError::invalid_argument(format!(
                "unsupported parameters {params:?}"
            )));
        }

        let setup = StreamSetup::from(*params);
        let ring_bytes = Self::byte_len(&setup, setup.buffer_size)?;
        let channels = usize::from(setup.geometry.channels);
        self.areas = (0..channels)
            .map(|channel| match self.layout {
                RingLayout::Interleaved => AreaLayout::interleaved(channel, &setup.geometry),
                RingLayout::Planar => {
                    AreaLayout::planar(channel, setup.buffer_size, &setup.geometry)
                }
            })
            .collect();
        self.ring = vec![0; ring_bytes];
        self.appl_ptr = 0;
        self.hw_ptr = 0;
        self.setup = Some(setup);
        self.state = StreamState::Setup;
        tracing::debug!(transport = %self.name, geometry = %setup.geometry, "parameters set");
        Ok(())
    }

    fn setup(&self) -> Result<StreamSetup, PcmError> {
        self.require_setup("setup")
    }

    fn channel_info(&self, channel: u16) -> Result<ChannelInfo, PcmError> {
        self.require_setup("channel_info")?;
        let layout = self
            .areas
            .get(usize::from(channel))
            .ok_or_else(|| PcmError::invalid_argument(format!("no channel {channel}")))?;
        Ok(ChannelInfo {
            channel,
            first_bit: layout.first_bit,
            step_bits: layout.step_bits,
        })
    }

    fn status(&self) -> Result<StreamStatus, PcmError> {
        let avail = self.setup.as_ref().map_or(0, |setup| self.avail(setup));
        Ok(StreamStatus {
            state: self.state,
            appl_ptr: self.appl_ptr,
            hw_ptr: self.hw_ptr,
            avail,
            delay: self.delay()?,
        })
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn delay(&self) -> Result<i64, PcmError> {
        let frames = match self.direction {
            Direction::Playback => self.frames_between(self.hw_ptr, self.appl_ptr),
            Direction::Capture => self.frames_between(self.appl_ptr, self.hw_ptr),
        };
        Ok(i64::try_from(frames).unwrap_or(i64::MAX))
    }

    fn avail_update(&mut self) -> Result<usize, PcmError> {
        let setup = self.require_setup("avail_update")?;
        Ok(self.avail(&setup))
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        match self.state {
            StreamState::Open | StreamState::Disconnected => Err(self.bad_state("prepare")),
            _ => {
                self.appl_ptr = 0;
                self.hw_ptr = 0;
                self.state = StreamState::Prepared;
                Ok(())
            }
        }
    }

    fn start(&mut self) -> Result<(), PcmError> {
        if self.state != StreamState::Prepared {
            return Err(self.bad_state("start"));
        }
        self.state = StreamState::Running;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PcmError> {
        match self.state {
            StreamState::Open | StreamState::Disconnected => Err(self.bad_state("stop")),
            _ => {
                self.state = StreamState::Setup;
                Ok(())
            }
        }
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        match self.state {
            StreamState::Prepared | StreamState::Running | StreamState::Paused => {
                if self.direction == Direction::Playback {
                    let pending = self.frames_between(self.hw_ptr, self.appl_ptr);
                    self.state = StreamState::Draining;
                    self.consume(pending)?;
                }
                self.state = StreamState::Setup;
                Ok(())
            }
            _ => Err(self.bad_state("drain")),
        }
    }

    fn pause(&mut self, enable: bool) -> Result<(), PcmError> {
        match (enable, self.state) {
            (true, StreamState::Running) => self.state = StreamState::Paused,
            (false, StreamState::Paused) => self.state = StreamState::Running,
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
        let channels = self
            .setup
            .map_or(MAX_CHANNELS, |setup| setup.geometry.channels);
        mask.intersect(ChannelMask::first(channels));
        Ok(())
    }

    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        if self.direction != Direction::Playback {
            return Err(self.bad_state("write"));
        }
        let setup = self.require_setup("write")?;
        Self::check_buffer(Self::byte_len(&setup, frames)?, buf.len())?;
        let n = self.begin_transfer("write", frames)?;
        self.scatter(self.appl_ptr, &buf[..Self::byte_len(&setup, n)?])?;
        self.appl_ptr += n as u64;
        Ok(n)
    }

    fn write_planar(&mut self, bufs: &[&[u8]], frames: usize) -> Result<usize, PcmError> {
        if self.direction != Direction::Playback {
            return Err(self.bad_state("write"));
        }
        let setup = self.require_setup("write")?;
        self.check_planar(bufs.len(), &setup)?;
        let n = self.begin_transfer("write", frames)?;
        let mut flat = Vec::new();
        ChannelAreas::planar(bufs, &setup.geometry).copy_to_interleaved(
            0,
            n,
            &setup.geometry,
            &mut flat,
        )?;
        self.scatter(self.appl_ptr, &flat)?;
        self.appl_ptr += n as u64;
        Ok(n)
    }

    fn read_interleaved(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, PcmError> {
        if self.direction != Direction::Capture {
            return Err(self.bad_state("read"));
        }
        let setup = self.require_setup("read")?;
        Self::check_buffer(Self::byte_len(&setup, frames)?, buf.len())?;
        let n = self.begin_transfer("read", frames)?;
        let mut flat = Vec::new();
        self.gather(self.appl_ptr, n, &mut flat)?;
        buf[..flat.len()].copy_from_slice(&flat);
        self.appl_ptr += n as u64;
        Ok(n)
    }

    fn read_planar(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<usize, PcmError> {
        if self.direction != Direction::Capture {
            return Err(self.bad_state("read"));
        }
        let setup = self.require_setup("read")?;
        self.check_planar(bufs.len(), &setup)?;
        let width = setup.geometry.sample_bytes();
        let needed = frames
            .checked_mul(width)
            .ok_or_else(|| PcmError::frame_overflow(frames))?;
        for buf in bufs.iter() {
            Self::check_buffer(needed, buf.len())?;
        }
        let n = self.begin_transfer("read", frames)?;
        let mut flat = Vec::new();
        self.gather(self.appl_ptr, n, &mut flat)?;

        let frame_bytes = setup.geometry.frame_bytes();
        for (channel, buf) in bufs.iter_mut().enumerate() {
            for frame in 0..n {
                let at = frame * frame_bytes + channel * width;
                buf[frame * width..(frame + 1) * width].copy_from_slice(&flat[at..at + width]);
            }
        }
        self.appl_ptr += n as u64;
        Ok(n)
    }

    fn appl_ptr(&self) -> u64 {
        self.appl_ptr
    }

    fn mmap_region(&self) -> Result<MmapRegion<'_>, PcmError> {
        self.require_setup("mmap")?;
        Ok(MmapRegion::new(&self.ring, &self.areas))
    }

    fn mmap_region_mut(&mut self) -> Result<MmapRegionMut<'_>, PcmError> {
        self.require_setup("mmap")?;
        Ok(MmapRegionMut::new(&mut self.ring, &self.areas))
    }

    fn mmap_commit(&mut self, frames: usize) -> Result<usize, PcmError> {
        let n = self.begin_transfer("mmap_commit", frames)?;
        self.appl_ptr += n as u64;
        Ok(n)
    }

    fn rewind(&mut self, frames: usize) -> Result<usize, PcmError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        let setup = self.require_setup("rewind")?;
        match self.state {
            StreamState::Prepared | StreamState::Running | StreamState::Paused => {}
            StreamState::Xrun => return Err(PcmError::Xrun),
            _ => return Err(self.bad_state("rewind")),
        }
        let limit = self.transfer_limit.unwrap_or(usize::MAX);
        let n = frames.min(self.rewindable(&setup)).min(limit);
        self.appl_ptr -= n as u64;
        Ok(n)
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Memory PCM (name={}, {}, {:?} ring)",
            self.name, self.direction, self.layout
        )?;
        writeln!(out, "  state       : {}", self.state)?;
        if let Some(setup) = &self.setup {
            write!(out, "{setup}")?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), PcmError> {
        tracing::debug!(transport = %self.name, "closing memory transport");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("setup", &self.setup)
            .field("appl_ptr", &self.appl_ptr)
            .field("hw_ptr", &self.hw_ptr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playback(buffer_size: usize) -> MemoryTransport {
        let config = MemoryTransportConfig {
            buffer_size,
            ..Default::default()
        };
        let mut pcm = MemoryTransport::from_config("test", Direction::Playback, &config).unwrap();
        pcm.prepare().unwrap();
        pcm
    }

    fn capture(buffer_size: usize, layout: RingLayout) -> MemoryTransport {
        let config = MemoryTransportConfig {
            buffer_size,
            layout,
            ..Default::default()
        };
        let mut pcm = MemoryTransport::from_config("test", Direction::Capture, &config).unwrap();
        pcm.prepare().unwrap();
        pcm
    }

    fn frames(count: usize, seed: u8) -> Vec<u8> {
        (0..count * 4).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    #[test]
    fn test_transfer_before_setup_is_bad_state() {
        let mut pcm = MemoryTransport::new("raw", Direction::Playback);
        let err = pcm.write_interleaved(&[0; 4], 1).unwrap_err();
        assert!(matches!(
            err,
            PcmError::BadState {
                state: StreamState::Open,
                ..
            }
        ));
    }

    #[test]
    fn test_playback_write_and_consume() {
        let mut pcm = playback(8);
        let data = frames(5, 0);
        assert_eq!(pcm.write_interleaved(&data, 5).unwrap(), 5);
        assert_eq!(pcm.state(), StreamState::Running);
        assert_eq!(pcm.delay().unwrap(), 5);

        assert_eq!(pcm.consume(10).unwrap(), 5);
        assert_eq!(pcm.played(), &data[..]);
    }

    #[test]
    fn test_playback_full_ring_is_short_transfer() {
        let mut pcm = playback(4);
        let data = frames(6, 0);
        assert_eq!(pcm.write_interleaved(&data, 6).unwrap(), 4);
        assert_eq!(pcm.write_interleaved(&data, 6).unwrap(), 0);

        pcm.set_nonblocking(true).unwrap();
        assert!(matches!(
            pcm.write_interleaved(&data, 6),
            Err(PcmError::WouldBlock)
        ));
    }

    #[test]
    fn test_playback_wraps_ring() {
        let mut pcm = playback(4);
        let first = frames(3, 0);
        pcm.write_interleaved(&first, 3).unwrap();
        pcm.consume(3).unwrap();

        let second = frames(3, 100);
        assert_eq!(pcm.write_interleaved(&second, 3).unwrap(), 3);
        pcm.consume(3).unwrap();

        let mut expected = first.clone();
        expected.extend_from_slice(&second);
        assert_eq!(pcm.played(), &expected[..]);
    }

    #[test]
    fn test_capture_planar_ring_roundtrip() {
        let mut pcm = capture(4, RingLayout::Planar);
        let data = frames(3, 7);
        assert_eq!(pcm.inject(&data).unwrap(), 3);

        let mut left = [0u8; 6];
        let mut right = [0u8; 6];
        let n = pcm
            .read_planar(&mut [&mut left[..], &mut right[..]], 3)
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(left, [7, 8, 11, 12, 15, 16]);
        assert_eq!(right, [9, 10, 13, 14, 17, 18]);
    }

    #[test]
    fn test_capture_overrun_sets_xrun() {
        let mut pcm = capture(2, RingLayout::Interleaved);
        assert_eq!(pcm.inject(&frames(3, 0)).unwrap(), 2);
        assert_eq!(pcm.state(), StreamState::Xrun);

        let mut buf = [0u8; 4];
        assert!(matches!(
            pcm.read_interleaved(&mut buf, 1),
            Err(PcmError::Xrun)
        ));
    }

    #[test]
    fn test_rewind_limited_to_unplayed_frames() {
        let mut pcm = playback(8);
        pcm.write_interleaved(&frames(6, 0), 6).unwrap();
        pcm.consume(2).unwrap();
        assert_eq!(pcm.rewind(10).unwrap(), 4);
        assert_eq!(pcm.appl_ptr(), 2);
    }

    #[test]
    fn test_transfer_limit_and_fault_injection() {
        let mut pcm = playback(8);
        pcm.set_transfer_limit(Some(2));
        assert_eq!(pcm.write_interleaved(&frames(5, 0), 5).unwrap(), 2);

        pcm.fail_next(PcmError::Suspended);
        assert!(matches!(
            pcm.write_interleaved(&frames(1, 0), 1),
            Err(PcmError::Suspended)
        ));
        assert_eq!(pcm.appl_ptr(), 2);
    }

    #[test]
    fn test_mmap_commit_advances_appl_ptr() {
        let mut pcm = playback(8);
        let geometry = pcm.setup().unwrap().geometry;
        pcm.mmap_region_mut()
            .unwrap()
            .write_interleaved(0, &frames(2, 1), &geometry)
            .unwrap();
        assert_eq!(pcm.mmap_commit(2).unwrap(), 2);
        assert_eq!(pcm.appl_ptr(), 2);
        pcm.consume(2).unwrap();
        assert_eq!(pcm.played(), &frames(2, 1)[..]);
    }

    #[test]
    fn test_state_machine() {
        let mut pcm = playback(8);
        assert!(pcm.pause(true).is_err());
        pcm.start().unwrap();
        pcm.pause(true).unwrap();
        assert_eq!(pcm.state(), StreamState::Paused);
        pcm.pause(false).unwrap();
        pcm.drain().unwrap();
        assert_eq!(pcm.state(), StreamState::Setup);
    }

    #[test]
    fn test_close_probe() {
        let pcm = MemoryTransport::new("probe", Direction::Playback);
        let probe = pcm.close_probe();
        assert!(!probe.load(Ordering::SeqCst));
        Box::new(pcm).close().unwrap();
        assert!(probe.load(Ordering::SeqCst));
    }

    #[test]
    fn test_rejects_unsupported_params() {
        let mut pcm = MemoryTransport::new("bad", Direction::Playback);
        let mut params = MemoryTransportConfig::default().params();
        params.channels = 0;
        assert!(matches!(
            pcm.set_params(&params),
            Err(PcmError::InvalidArgument(_))
        ));
    }
}
