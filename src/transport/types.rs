//! Value types exchanged with a transport.

use std::fmt;

use crate::{FrameGeometry, SampleFormat};

/// Direction samples flow through a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The application writes frames that the device plays.
    Playback,
    /// The device records frames that the application reads.
    Capture,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playback => f.write_str("PLAYBACK"),
            Self::Capture => f.write_str("CAPTURE"),
        }
    }
}

/// Transport state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Opened, no parameters negotiated yet.
    Open,
    /// Parameters negotiated.
    Setup,
    /// Ready to start.
    Prepared,
    /// Transferring.
    Running,
    /// Stopped by an underrun or overrun.
    Xrun,
    /// Playing out the remaining frames before stopping.
    Draining,
    /// Paused.
    Paused,
    /// Suspended by the backend.
    Suspended,
    /// The device went away.
    Disconnected,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Setup => "SETUP",
            Self::Prepared => "PREPARED",
            Self::Running => "RUNNING",
            Self::Xrun => "XRUN",
            Self::Draining => "DRAINING",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// Static description of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream name.
    pub name: String,
    /// Transfer direction.
    pub direction: Direction,
    /// Whether the mapped ring buffer is available.
    pub mmap: bool,
    /// Whether frames can be taken back with rewind.
    pub rewindable: bool,
}

/// What a stream can be configured to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsInfo {
    /// Supported sample formats.
    pub formats: Vec<SampleFormat>,
    /// Minimum channel count.
    pub min_channels: u16,
    /// Maximum channel count.
    pub max_channels: u16,
    /// Minimum rate in Hz.
    pub min_rate: u32,
    /// Maximum rate in Hz.
    pub max_rate: u32,
    /// Minimum ring capacity in frames.
    pub min_buffer_size: usize,
    /// Maximum ring capacity in frames.
    pub max_buffer_size: usize,
}

impl ParamsInfo {
    /// Returns `true` if `params` is inside the advertised ranges.
    #[must_use]
    pub fn accepts(&self, params: &StreamParams) -> bool {
        self.formats.contains(&params.format)
            && (self.min_channels..=self.max_channels).contains(&params.channels)
            && (self.min_rate..=self.max_rate).contains(&params.rate)
            && (self.min_buffer_size..=self.max_buffer_size).contains(&params.buffer_size)
    }
}

/// Parameters requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Sample format.
    pub format: SampleFormat,
    /// Channel count.
    pub channels: u16,
    /// Rate in Hz.
    pub rate: u32,
    /// Ring capacity in frames.
    pub buffer_size: usize,
}

/// Configuration a stream settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSetup {
    /// Frame layout.
    pub geometry: FrameGeometry,
    /// Rate in Hz.
    pub rate: u32,
    /// Ring capacity in frames.
    pub buffer_size: usize,
}

impl From<StreamParams> for StreamSetup {
    fn from(params: StreamParams) -> Self {
        Self {
            geometry: FrameGeometry::new(params.channels, params.format),
            rate: params.rate,
            buffer_size: params.buffer_size,
        }
    }
}

impl fmt::Display for StreamSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  format      : {}", self.geometry.format)?;
        writeln!(f, "  channels    : {}", self.geometry.channels)?;
        writeln!(f, "  rate        : {}", self.rate)?;
        writeln!(f, "  frame bytes : {}", self.geometry.frame_bytes())?;
        writeln!(f, "  buffer size : {}", self.buffer_size)
    }
}

/// Per-channel description of where samples live in the mapped ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel index.
    pub channel: u16,
    /// Bit offset of the channel's first sample.
    pub first_bit: usize,
    /// Bit distance between consecutive samples.
    pub step_bits: usize,
}

/// Snapshot of a running stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatus {
    /// Current state.
    pub state: StreamState,
    /// Application position in frames.
    pub appl_ptr: u64,
    /// Hardware position in frames.
    pub hw_ptr: u64,
    /// Frames the application can transfer without blocking.
    pub avail: usize,
    /// Frames between the application and the hardware position.
    pub delay: i64,
}

/// File descriptor a caller can poll for readiness.
pub type PollDescriptor = i32;

/// Set of channels, one bit per channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMask(u64);

impl ChannelMask {
    /// Mask with channels `0..channels` set.
    #[must_use]
    pub fn first(channels: u16) -> Self {
        match channels {
            0 => Self(0),
            c if c >= 64 => Self(u64::MAX),
            c => Self((1u64 << c) - 1),
        }
    }

    /// Raw bits.
    #[must_use]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if `channel` is in the mask.
    #[must_use]
    pub fn contains(self, channel: u16) -> bool {
        channel < 64 && self.0 & (1 << channel) != 0
    }

    /// Keeps only channels present in both masks.
    pub fn intersect(&mut self, other: Self) {
        self.0 &= other.0;
    }
}

impl From<u64> for ChannelMask {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_mask_first() {
        let mask = ChannelMask::first(3);
        assert_eq!(mask.bits(), 0b111);
        assert!(mask.contains(2));
        assert!(!mask.contains(3));
        assert_eq!(ChannelMask::first(64).bits(), u64::MAX);
        assert_eq!(ChannelMask::first(0).bits(), 0);
    }

    #[test]
    fn test_channel_mask_intersect() {
        let mut mask = ChannelMask::from(0b1011);
        mask.intersect(ChannelMask::first(2));
        assert_eq!(mask.bits(), 0b11);
    }

    #[test]
    fn test_params_info_accepts() {
        let info = ParamsInfo {
            formats: vec![SampleFormat::S16Le],
            min_channels: 1,
            max_channels: 2,
            min_rate: 8000,
            max_rate: 48000,
            min_buffer_size: 16,
            max_buffer_size: 4096,
        };
        let mut params = StreamParams {
            format: SampleFormat::S16Le,
            channels: 2,
            rate: 44100,
            buffer_size: 1024,
        };
        assert!(info.accepts(&params));
        params.channels = 3;
        assert!(!info.accepts(&params));
    }

    #[test]
    fn test_setup_from_params() {
        let setup = StreamSetup::from(StreamParams {
            format: SampleFormat::S32Le,
            channels: 2,
            rate: 48000,
            buffer_size: 256,
        });
        assert_eq!(setup.geometry.frame_bytes(), 8);
        assert!(setup.to_string().contains("buffer size : 256"));
    }
}
