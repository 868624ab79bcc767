//! Error types for pcm-tee.
//!
//! Errors are split by where they originate:
//! - **Stream errors** ([`PcmError`]): returned by every [`Transport`](crate::Transport)
//!   operation. Errors raised by the underlying stream pass through unchanged.
//! - **Sink errors** ([`SinkError`]): the durable copy could not be kept in step
//!   with the live stream. These are fatal for the durability contract.
//! - **Area errors** ([`AreaError`]): a channel area description does not fit
//!   the memory it points into.
//! - **Configuration errors** ([`ConfigError`]): a declarative tree could not be
//!   turned into a tee.

use std::fmt;
use std::path::PathBuf;

use crate::transport::StreamState;

/// Errors returned by stream operations.
#[derive(Debug, thiserror::Error)]
pub enum PcmError {
    /// Buffer underrun (playback) or overrun (capture).
    #[error("xrun: stream needs to be prepared again")]
    Xrun,

    /// The stream was suspended by the backend.
    #[error("stream suspended")]
    Suspended,

    /// A non-blocking stream cannot make progress right now.
    #[error("operation would block")]
    WouldBlock,

    /// The operation is not allowed in the stream's current state.
    #[error("{op} not allowed in state {state}")]
    BadState {
        /// Operation that was attempted.
        op: &'static str,
        /// State the stream was in.
        state: StreamState,
    },

    /// An argument was rejected by the stream.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The stream does not implement the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The device behind the stream went away.
    #[error("device disconnected")]
    Disconnected,

    /// No stream with the given name exists.
    #[error("stream not found: {name}")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// Error reported by an audio backend.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// The durable copy failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A channel area description was inconsistent.
    #[error(transparent)]
    Area(#[from] AreaError),

    /// The declarative configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PcmError {
    /// Creates an invalid argument error with the given message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Invalid argument for a frame count whose byte size overflows.
    pub(crate) fn frame_overflow(frames: usize) -> Self {
        Self::InvalidArgument(format!("{frames} frames do not fit in a byte count"))
    }

    /// Creates a backend error with the given message.
    pub fn backend(msg: impl fmt::Display) -> Self {
        Self::Backend(msg.to_string())
    }

    /// Returns `true` if the durable copy is no longer in step with the stream.
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, Self::Sink(_))
    }
}

/// Identifies the destination a [`FileSink`](crate::FileSink) writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkLabel {
    /// A file this crate opened by path.
    Path(PathBuf),
    /// A descriptor supplied by the caller.
    Descriptor(i32),
    /// An arbitrary writer supplied by the caller.
    Writer(String),
}

impl fmt::Display for SinkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "file={}", path.display()),
            Self::Descriptor(fd) => write!(f, "fd={fd}"),
            Self::Writer(name) => write!(f, "writer={name}"),
        }
    }
}

/// Errors raised while keeping the durable copy.
///
/// None of these are retried: once a write or seek fails the sink no longer
/// mirrors the stream.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink could not be opened.
    #[error("cannot open sink {target}: {source}")]
    Open {
        /// Sink that failed.
        target: SinkLabel,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A write to the sink failed.
    #[error("write to sink {target} failed: {source}")]
    Write {
        /// Sink that failed.
        target: SinkLabel,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sink accepted fewer bytes than it was given.
    #[error("short write to sink {target}: {written} of {expected} bytes")]
    ShortWrite {
        /// Sink that failed.
        target: SinkLabel,
        /// Bytes handed to the sink.
        expected: usize,
        /// Bytes the sink accepted.
        written: usize,
    },

    /// Moving the sink's write position failed.
    #[error("seek on sink {target} failed: {source}")]
    Seek {
        /// Sink that failed.
        target: SinkLabel,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Closing the sink failed.
    #[error("closing sink {target} failed: {source}")]
    Close {
        /// Sink that failed.
        target: SinkLabel,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the area copy engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AreaError {
    /// The number of areas does not match the channel count.
    #[error("expected {expected} channel areas, got {actual}")]
    ChannelMismatch {
        /// Channels in the frame geometry.
        expected: usize,
        /// Areas supplied.
        actual: usize,
    },

    /// An area offset or stride is not a whole number of bytes.
    #[error("channel {channel} area is not byte aligned (first={first_bit}, step={step_bits})")]
    Unaligned {
        /// Offending channel.
        channel: usize,
        /// Bit offset of the first sample.
        first_bit: usize,
        /// Bit distance between samples.
        step_bits: usize,
    },

    /// A sample lies outside the memory of its area.
    #[error("channel {channel} frame {frame} is outside its {len} byte area")]
    OutOfBounds {
        /// Offending channel.
        channel: usize,
        /// Frame index that was read.
        frame: usize,
        /// Length of the area's memory.
        len: usize,
    },

    /// A buffer is too short for the requested number of frames.
    #[error("buffer holds {available} bytes, {needed} needed")]
    ShortBuffer {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// The frame count is too large to express in bytes.
    #[error("{frames} frames do not fit in a byte count")]
    FrameOverflow {
        /// Frames requested.
        frames: usize,
    },
}

/// Errors raised while reading a declarative tee configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A key that the tee does not understand.
    #[error("unknown field {key}")]
    UnknownKey {
        /// The rejected key.
        key: String,
    },

    /// A key holds a value of the wrong kind.
    #[error("invalid value for {key}: expected {expected}")]
    InvalidValue {
        /// Key whose value was rejected.
        key: String,
        /// What the key accepts.
        expected: &'static str,
    },

    /// `sname` is missing.
    #[error("sname is not defined")]
    MissingSlave,

    /// `file` is missing or holds no usable target.
    #[error("file is not defined")]
    MissingFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_error_display() {
        let err = PcmError::BadState {
            op: "write",
            state: StreamState::Open,
        };
        assert_eq!(err.to_string(), "write not allowed in state OPEN");
    }

    #[test]
    fn test_sink_failure_classification() {
        let err: PcmError = SinkError::ShortWrite {
            target: SinkLabel::Descriptor(7),
            expected: 16,
            written: 8,
        }
        .into();
        assert!(err.is_sink_failure());
        assert_eq!(err.to_string(), "short write to sink fd=7: 8 of 16 bytes");
        assert!(!PcmError::Xrun.is_sink_failure());
    }

    #[test]
    fn test_sink_error_keeps_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SinkError::Open {
            target: SinkLabel::Path("/tmp/capture.raw".into()),
            source: io_err,
        };
        assert!(err.to_string().contains("/tmp/capture.raw"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownKey {
            key: "rate".to_string(),
        };
        assert_eq!(err.to_string(), "unknown field rate");
        assert_eq!(ConfigError::MissingSlave.to_string(), "sname is not defined");
    }
}
