//! The durable copy of a stream.
//!
//! A [`FileSink`] receives the exact bytes of every frame a tee transfers.
//! It can be opened from a [`SinkTarget`] (a path or a caller's descriptor)
//! or wrap any `Write + Seek` value.

mod file;

pub use file::{FileSink, SinkTarget};
