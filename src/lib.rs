//! # pcm-tee
//!
//! A pass-through PCM stream that keeps a durable copy of everything it
//! transfers.
//!
//! [`TeeStream`] wraps another stream (any [`Transport`]) and forwards every
//! call to it unchanged. Whenever a read, write or mapped-ring commit moves
//! frames, the exact bytes of those frames are appended to a [`FileSink`] as
//! plain interleaved data. Playback records what the application sent;
//! capture records what the application received.
//!
//! ## Quick Start
//!
//! ```
//! use pcm_tee::{
//!     Direction, FileSink, MemoryTransport, MemoryTransportConfig, SinkTarget, TeeStream,
//!     Transport,
//! };
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("playback.raw");
//!
//! let slave = MemoryTransport::from_config(
//!     "mem",
//!     Direction::Playback,
//!     &MemoryTransportConfig::default(),
//! )?;
//! let sink = FileSink::open(&SinkTarget::Path(path.clone()))?;
//! let mut tee = TeeStream::new(slave, sink, true);
//!
//! tee.prepare()?;
//! tee.write_interleaved(&[0x11; 32], 8)?;
//! tee.close()?;
//!
//! assert_eq!(std::fs::read(&path)?, vec![0x11; 32]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Layout
//!
//! - [`format`]: frame geometry and strided channel areas
//! - [`transport`]: the stream contract plus in-memory and device backends
//! - [`TeeStream`]: the tee itself, with [`open_from_config`] for declarative setup
//! - [`FileSink`]: the durable copy
//!
//! Everything is synchronous: each call finishes its sink write before it
//! returns.

// unsafe_code is denied in Cargo.toml; the descriptor sink opts out for one call
#![warn(missing_docs)]
// Frame counts move between usize, u64 and i64
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
mod error;
pub mod format;
mod sink;
mod tee;
pub mod transport;

pub use config::{ConfigNode, ConfigValue, TeeConfig};
pub use error::{AreaError, ConfigError, PcmError, SinkError, SinkLabel};
pub use format::{FrameGeometry, SampleFormat};
pub use sink::{FileSink, SinkTarget};
pub use tee::{
    open_from_config, RingCursor, RingSpan, RingSpans, TeeStats, TeeStream, TransportOpener,
};
#[cfg(feature = "cpal")]
pub use transport::{DeviceConfig, DeviceTransport};
pub use transport::{
    Direction, MemoryTransport, MemoryTransportConfig, RingLayout, StreamParams, StreamSetup,
    StreamState, Transport,
};
