//! Frame geometry and channel area handling.
//!
//! This module provides the byte-level view of audio the tee needs:
//! - Sample formats and frame/byte conversion ([`FrameGeometry`])
//! - Strided per-channel areas and their copy into a flat interleaved buffer

mod area;
mod geometry;

pub use area::{AreaLayout, ChannelArea, ChannelAreas, MmapRegion, MmapRegionMut};
pub use geometry::{FrameGeometry, SampleFormat};
