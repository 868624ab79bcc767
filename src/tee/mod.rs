//! The tee: a pass-through stream with a durable copy.
//!
//! [`TeeStream`] wraps any [`Transport`] and forwards every call to it. When
//! a data transfer makes progress, the exact bytes of the transferred frames
//! are written to a [`FileSink`] before the call returns. Non-interleaved
//! buffers and the mapped ring are flattened to interleaved bytes first, so the
//! sink always holds a plain interleaved stream.
//!
//! ```text
//!   application ──► TeeStream ──► slave transport ──► device
//!                      │
//!                      └──► FileSink (interleaved frames)
//! ```
//!
//! The durable copy takes precedence: if the slave moved frames but the sink
//! could not record them, the call returns the sink error.

mod cursor;
mod open;

pub use cursor::{RingCursor, RingSpan, RingSpans};
pub use open::{open_from_config, TransportOpener};

use std::fmt;

use crate::format::{ChannelAreas, MmapRegion, MmapRegionMut};
use crate::transport::{
    ChannelInfo, ChannelMask, Direction, ParamsInfo, PollDescriptor, StreamInfo, StreamParams,
    StreamSetup, StreamState, StreamStatus, Transport,
};
use crate::{AreaError, FileSink, FrameGeometry, PcmError, SinkError};

/// Counters kept by a [`TeeStream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeeStats {
    /// Frames written to the sink.
    pub frames_teed: u64,
    /// Bytes written to the sink.
    pub bytes_written: u64,
    /// Write calls issued to the sink.
    pub sink_writes: u64,
    /// Frames taken back by rewinds.
    pub frames_rewound: u64,
}

/// A stream that mirrors every transferred frame into a sink.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use pcm_tee::{
///     Direction, FileSink, MemoryTransport, MemoryTransportConfig, TeeStream, Transport,
/// };
///
/// let config = MemoryTransportConfig::default();
/// let slave = MemoryTransport::from_config("mem", Direction::Playback, &config).unwrap();
/// let sink = FileSink::from_writer("buffer", Cursor::new(Vec::new()));
///
/// let mut tee = TeeStream::new(slave, sink, false);
/// tee.prepare().unwrap();
/// assert_eq!(tee.write_interleaved(&[0u8; 16], 4).unwrap(), 4);
/// assert_eq!(tee.stats().bytes_written, 16);
///
/// // The caller keeps the slave.
/// let slave = tee.close().unwrap();
/// assert!(slave.is_some());
/// ```
#[derive(Debug)]
pub struct TeeStream<T> {
    slave: T,
    close_slave: bool,
    sink: FileSink,
    direction: Direction,
    scratch: Vec<u8>,
    stats: TeeStats,
}

impl<T: Transport> TeeStream<T> {
    /// Wraps `slave`, mirroring its transfers into `sink`.
    ///
    /// With `close_slave` set, closing the tee closes the slave too. Otherwise
    /// [`close`](Self::close) hands the slave back.
    pub fn new(slave: T, sink: FileSink, close_slave: bool) -> Self {
        let direction = slave.direction();
        tracing::debug!(
            slave = slave.name(),
            sink = %sink.label(),
            %direction,
            close_slave,
            "tee opened"
        );
        Self {
            slave,
            close_slave,
            sink,
            direction,
            scratch: Vec::new(),
            stats: TeeStats::default(),
        }
    }

    /// Counters since the tee was opened.
    pub fn stats(&self) -> TeeStats {
        self.stats
    }

    /// The sink holding the durable copy.
    pub fn sink(&self) -> &FileSink {
        &self.sink
    }

    /// The wrapped stream.
    pub fn slave(&self) -> &T {
        &self.slave
    }

    /// The wrapped stream, mutably. Transfers made through it bypass the sink.
    pub fn slave_mut(&mut self) -> &mut T {
        &mut self.slave
    }

    /// Closes the sink, then the slave if the tee owns it.
    ///
    /// Returns the slave when the tee was opened without `close_slave`.
    ///
    /// # Errors
    ///
    /// Returns the sink's close error, or the slave's if only that failed.
    pub fn close(self) -> Result<Option<T>, PcmError> {
        self.shutdown()
    }

    fn shutdown(self) -> Result<Option<T>, PcmError> {
        let Self {
            slave,
            close_slave,
            sink,
            stats,
            ..
        } = self;
        tracing::debug!(
            slave = slave.name(),
            frames = stats.frames_teed,
            bytes = stats.bytes_written,
            "closing tee"
        );

        let sink_result = sink.close();
        if !close_slave {
            sink_result?;
            return Ok(Some(slave));
        }

        let slave_result = T::close(Box::new(slave));
        if let Err(err) = &slave_result {
            tracing::warn!(error = %err, "slave close failed");
        }
        sink_result?;
        slave_result.map(|()| None)
    }

    fn geometry(&self) -> Result<FrameGeometry, PcmError> {
        Ok(self.slave.setup()?.geometry)
    }

    /// Tees the first `frames` frames of an interleaved buffer.
    fn tee_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<(), PcmError> {
        let geometry = self.geometry()?;
        let bytes = geometry
            .frames_to_bytes(frames)
            .ok_or_else(|| PcmError::frame_overflow(frames))?;
        let data = buf.get(..bytes).ok_or(AreaError::ShortBuffer {
            needed: bytes,
            available: buf.len(),
        })?;
        record(&mut self.sink, &mut self.stats, data, frames)?;
        Ok(())
    }

    /// Flattens `frames` frames of one buffer per channel and tees them.
    fn tee_planar(&mut self, bufs: &[&[u8]], frames: usize) -> Result<(), PcmError> {
        let geometry = self.geometry()?;
        ChannelAreas::planar(bufs, &geometry).copy_to_interleaved(
            0,
            frames,
            &geometry,
            &mut self.scratch,
        )?;
        record(&mut self.sink, &mut self.stats, &self.scratch, frames)?;
        Ok(())
    }
}

/// Writes `bytes` to the sink with one call and counts it.
fn record(
    sink: &mut FileSink,
    stats: &mut TeeStats,
    bytes: &[u8],
    frames: usize,
) -> Result<(), SinkError> {
    sink.write_frames(bytes)?;
    stats.frames_teed += frames as u64;
    stats.bytes_written += bytes.len() as u64;
    stats.sink_writes += 1;
    tracing::trace!(frames, bytes = bytes.len(), sink = %sink.label(), "frames teed");
    Ok(())
}

impl<T: Transport> Transport for TeeStream<T> {
    fn name(&self) -> &str {
        self.slave.name()
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn info(&self) -> Result<StreamInfo, PcmError> {
        self.slave.info()
    }

    fn params_info(&self) -> Result<ParamsInfo, PcmError> {
        self.slave.params_info()
    }

    fn set_params(&mut self, params: &StreamParams) -> Result<(), PcmError> {
        self.slave.set_params(params)
    }

    fn setup(&self) -> Result<StreamSetup, PcmError> {
        self.slave.setup()
    }

    fn channel_info(&self, channel: u16) -> Result<ChannelInfo, PcmError> {
        self.slave.channel_info(channel)
    }

    fn status(&self) -> Result<StreamStatus, PcmError> {
        self.slave.status()
    }

    fn state(&self) -> StreamState {
        self.slave.state()
    }

    fn delay(&self) -> Result<i64, PcmError> {
        self.slave.delay()
    }

    fn avail_update(&mut self) -> Result<usize, PcmError> {
        self.slave.avail_update()
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        self.slave.prepare()
    }

    fn start(&mut self) -> Result<(), PcmError> {
        self.slave.start()
    }

    fn stop(&mut self) -> Result<(), PcmError> {
        self.slave.stop()
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        self.slave.drain()
    }

    fn pause(&mut self, enable: bool) -> Result<(), PcmError> {
        self.slave.pause(enable)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), PcmError> {
        self.slave.set_nonblocking(nonblocking)
    }

    fn poll_descriptor(&self) -> Result<PollDescriptor, PcmError> {
        self.slave.poll_descriptor()
    }

    fn channels_mask(&self, mask: &mut ChannelMask) -> Result<(), PcmError> {
        self.slave.channels_mask(mask)
    }

    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        let n = self.slave.write_interleaved(buf, frames)?;
        if n > 0 {
            self.tee_interleaved(buf, n)?;
        }
        Ok(n)
    }

    fn write_planar(&mut self, bufs: &[&[u8]], frames: usize) -> Result<usize, PcmError> {
        let n = self.slave.write_planar(bufs, frames)?;
        if n > 0 {
            self.tee_planar(bufs, n)?;
        }
        Ok(n)
    }

    fn read_interleaved(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, PcmError> {
        let n = self.slave.read_interleaved(buf, frames)?;
        if n > 0 {
            self.tee_interleaved(buf, n)?;
        }
        Ok(n)
    }

    fn read_planar(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<usize, PcmError> {
        let n = self.slave.read_planar(bufs, frames)?;
        if n > 0 {
            let views: Vec<&[u8]> = bufs.iter().map(|buf| &buf[..]).collect();
            self.tee_planar(&views, n)?;
        }
        Ok(n)
    }

    fn appl_ptr(&self) -> u64 {
        self.slave.appl_ptr()
    }

    fn mmap_region(&self) -> Result<MmapRegion<'_>, PcmError> {
        self.slave.mmap_region()
    }

    fn mmap_region_mut(&mut self) -> Result<MmapRegionMut<'_>, PcmError> {
        self.slave.mmap_region_mut()
    }

    fn mmap_commit(&mut self, frames: usize) -> Result<usize, PcmError> {
        // The ring offset has to be taken before the commit moves it.
        let position = self.slave.appl_ptr();
        let n = self.slave.mmap_commit(frames)?;
        if n == 0 {
            return Ok(0);
        }

        let setup = self.slave.setup()?;
        let geometry = setup.geometry;
        if setup.buffer_size == 0 {
            return Err(PcmError::invalid_argument(
                "mapped ring has no capacity but frames were committed",
            ));
        }

        let areas = self.slave.mmap_region()?.areas();
        for span in RingCursor::at(position, setup.buffer_size).split(n) {
            tracing::trace!(offset = span.offset, frames = span.frames, "ring span");
            areas.copy_to_interleaved(span.offset, span.frames, &geometry, &mut self.scratch)?;
            record(&mut self.sink, &mut self.stats, &self.scratch, span.frames)?;
        }
        Ok(n)
    }

    fn rewind(&mut self, frames: usize) -> Result<usize, PcmError> {
        let n = self.slave.rewind(frames)?;
        if n == 0 {
            return Ok(0);
        }
        let bytes = self
            .geometry()?
            .frames_to_bytes(n)
            .ok_or_else(|| PcmError::frame_overflow(n))?;
        self.sink.seek_back(bytes as u64)?;
        self.stats.frames_rewound += n as u64;
        tracing::trace!(frames = n, bytes, "sink rewound");
        Ok(n)
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Tee PCM ({})", self.sink.label())?;
        if let Ok(setup) = self.slave.setup() {
            writeln!(out, "Its setup is:")?;
            write!(out, "{setup}")?;
        }
        write!(out, "Slave: ")?;
        self.slave.dump(out)
    }

    fn close(self: Box<Self>) -> Result<(), PcmError> {
        self.shutdown().map(drop)
    }
}
