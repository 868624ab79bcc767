//! The stream contract the tee forwards to.
//!
//! A [`Transport`] is any PCM stream: a real device, an in-memory stream, or
//! another [`TeeStream`](crate::TeeStream). The tee owns exactly one and
//! forwards every call to it.

#[cfg(feature = "cpal")]
mod device;
mod memory;
mod types;

#[cfg(feature = "cpal")]
pub use device::{DeviceConfig, DeviceTransport};
pub use memory::{MemoryTransport, MemoryTransportConfig, RingLayout};
pub use types::{
    ChannelInfo, ChannelMask, Direction, ParamsInfo, PollDescriptor, StreamInfo, StreamParams,
    StreamSetup, StreamState, StreamStatus,
};

use std::fmt;

use crate::format::{MmapRegion, MmapRegionMut};
use crate::PcmError;

/// A PCM stream.
///
/// Transfer methods return the number of frames actually moved, which may be
/// less than requested. A return of `Ok(0)` means no progress without an
/// error.
///
/// # Example
///
/// ```
/// use pcm_tee::{Direction, MemoryTransport, MemoryTransportConfig, Transport};
///
/// let mut pcm = MemoryTransport::new("default", Direction::Playback);
/// pcm.set_params(&MemoryTransportConfig::default().params()).unwrap();
/// pcm.prepare().unwrap();
///
/// let frames = pcm.write_interleaved(&[0u8; 64], 16).unwrap();
/// assert_eq!(frames, 16);
/// ```
pub trait Transport {
    /// Stream name, used in logs and dumps.
    fn name(&self) -> &str;

    /// Transfer direction.
    fn direction(&self) -> Direction;

    /// Static stream description.
    fn info(&self) -> Result<StreamInfo, PcmError>;

    /// Supported parameter ranges.
    fn params_info(&self) -> Result<ParamsInfo, PcmError>;

    /// Negotiates parameters.
    fn set_params(&mut self, params: &StreamParams) -> Result<(), PcmError>;

    /// Negotiated configuration.
    fn setup(&self) -> Result<StreamSetup, PcmError>;

    /// Where `channel`'s samples live in the mapped ring.
    fn channel_info(&self, channel: u16) -> Result<ChannelInfo, PcmError>;

    /// Current status snapshot.
    fn status(&self) -> Result<StreamStatus, PcmError>;

    /// Current state.
    fn state(&self) -> StreamState;

    /// Frames between the application and the hardware position.
    fn delay(&self) -> Result<i64, PcmError>;

    /// Refreshes and returns the frames available for transfer.
    fn avail_update(&mut self) -> Result<usize, PcmError>;

    /// Readies the stream for transfers.
    fn prepare(&mut self) -> Result<(), PcmError>;

    /// Starts transferring.
    fn start(&mut self) -> Result<(), PcmError>;

    /// Stops immediately, dropping pending frames.
    fn stop(&mut self) -> Result<(), PcmError>;

    /// Stops after pending frames have been played.
    fn drain(&mut self) -> Result<(), PcmError>;

    /// Pauses (`true`) or resumes (`false`).
    fn pause(&mut self, enable: bool) -> Result<(), PcmError>;

    /// Switches between blocking and non-blocking transfers.
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), PcmError>;

    /// Descriptor to poll for readiness.
    fn poll_descriptor(&self) -> Result<PollDescriptor, PcmError>;

    /// Clears the channels of `mask` the stream cannot provide.
    fn channels_mask(&self, mask: &mut ChannelMask) -> Result<(), PcmError>;

    /// Writes up to `frames` interleaved frames from `buf`.
    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError>;

    /// Writes up to `frames` frames from one buffer per channel.
    fn write_planar(&mut self, bufs: &[&[u8]], frames: usize) -> Result<usize, PcmError>;

    /// Reads up to `frames` interleaved frames into `buf`.
    fn read_interleaved(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, PcmError>;

    /// Reads up to `frames` frames into one buffer per channel.
    fn read_planar(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<usize, PcmError>;

    /// Application position in frames. Taken modulo the buffer size it
    /// indexes the mapped ring.
    fn appl_ptr(&self) -> u64;

    /// Read-only view of the mapped ring.
    fn mmap_region(&self) -> Result<MmapRegion<'_>, PcmError>;

    /// Writable view of the mapped ring.
    fn mmap_region_mut(&mut self) -> Result<MmapRegionMut<'_>, PcmError>;

    /// Commits up to `frames` frames of the mapped ring, advancing the
    /// application position. Returns the frames committed.
    fn mmap_commit(&mut self, frames: usize) -> Result<usize, PcmError>;

    /// Moves the application position back by up to `frames`. Returns the
    /// frames actually rewound.
    fn rewind(&mut self, frames: usize) -> Result<usize, PcmError>;

    /// Writes a human readable description.
    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Closes the stream.
    fn close(self: Box<Self>) -> Result<(), PcmError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn direction(&self) -> Direction {
        (**self).direction()
    }

    fn info(&self) -> Result<StreamInfo, PcmError> {
        (**self).info()
    }

    fn params_info(&self) -> Result<ParamsInfo, PcmError> {
        (**self).params_info()
    }

    fn set_params(&mut self, params: &StreamParams) -> Result<(), PcmError> {
        (**self).set_params(params)
    }

    fn setup(&self) -> Result<StreamSetup, PcmError> {
        (**self).setup()
    }

    fn channel_info(&self, channel: u16) -> Result<ChannelInfo, PcmError> {
        (**self).channel_info(channel)
    }

    fn status(&self) -> Result<StreamStatus, PcmError> {
        (**self).status()
    }

    fn state(&self) -> StreamState {
        (**self).state()
    }

    fn delay(&self) -> Result<i64, PcmError> {
        (**self).delay()
    }

    fn avail_update(&mut self) -> Result<usize, PcmError> {
        (**self).avail_update()
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        (**self).prepare()
    }

    fn start(&mut self) -> Result<(), PcmError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), PcmError> {
        (**self).stop()
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        (**self).drain()
    }

    fn pause(&mut self, enable: bool) -> Result<(), PcmError> {
        (**self).pause(enable)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), PcmError> {
        (**self).set_nonblocking(nonblocking)
    }

    fn poll_descriptor(&self) -> Result<PollDescriptor, PcmError> {
        (**self).poll_descriptor()
    }

    fn channels_mask(&self, mask: &mut ChannelMask) -> Result<(), PcmError> {
        (**self).channels_mask(mask)
    }

    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        (**self).write_interleaved(buf, frames)
    }

    fn write_planar(&mut self, bufs: &[&[u8]], frames: usize) -> Result<usize, PcmError> {
        (**self).write_planar(bufs, frames)
    }

    fn read_interleaved(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, PcmError> {
        (**self).read_interleaved(buf, frames)
    }

    fn read_planar(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<usize, PcmError> {
        (**self).read_planar(bufs, frames)
    }

    fn appl_ptr(&self) -> u64 {
        (**self).appl_ptr()
    }

    fn mmap_region(&self) -> Result<MmapRegion<'_>, PcmError> {
        (**self).mmap_region()
    }

    fn mmap_region_mut(&mut self) -> Result<MmapRegionMut<'_>, PcmError> {
        (**self).mmap_region_mut()
    }

    fn mmap_commit(&mut self, frames: usize) -> Result<usize, PcmError> {
        (**self).mmap_commit(frames)
    }

    fn rewind(&mut self, frames: usize) -> Result<usize, PcmError> {
        (**self).rewind(frames)
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        (**self).dump(out)
    }

    fn close(self: Box<Self>) -> Result<(), PcmError> {
        T::close(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_transport_forwards() {
        let mut pcm: Box<dyn Transport> =
            Box::new(MemoryTransport::new("boxed", Direction::Capture));
        assert_eq!(pcm.name(), "boxed");
        assert_eq!(pcm.direction(), Direction::Capture);
        assert_eq!(pcm.state(), StreamState::Open);

        pcm.set_params(&MemoryTransportConfig::default().params())
            .unwrap();
        assert_eq!(pcm.state(), StreamState::Setup);
        pcm.close().unwrap();
    }

    #[test]
    fn test_transport_is_object_safe() {
        fn assert_dyn(_: &dyn Transport) {}
        let pcm = MemoryTransport::new("dyn", Direction::Playback);
        assert_dyn(&pcm);
    }
}
