//! Strided channel areas and the copy into a flat interleaved buffer.
//!
//! A channel area says where one channel's samples live: a byte slice, the
//! bit offset of the first sample and the bit distance between consecutive
//! frames. Interleaved buffers, one-buffer-per-channel layouts and mapped ring
//! buffers are all described the same way, so one copy routine serves every
//! transfer path.

use crate::{AreaError, FrameGeometry};

/// Position of one channel's samples inside a buffer, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaLayout {
    /// Bit offset of the channel's first sample.
    pub first_bit: usize,
    /// Bit distance between the channel's samples in consecutive frames.
    pub step_bits: usize,
}

impl AreaLayout {
    /// Layout of `channel` inside an interleaved buffer.
    #[must_use]
    pub fn interleaved(channel: usize, geometry: &FrameGeometry) -> Self {
        Self {
            first_bit: channel * geometry.bits_per_sample(),
            step_bits: geometry.bits_per_frame(),
        }
    }

    /// Layout of `channel` when every channel occupies its own block of
    /// `frames` samples, one block after the other.
    #[must_use]
    pub fn planar(channel: usize, frames: usize, geometry: &FrameGeometry) -> Self {
        Self {
            first_bit: channel * frames * geometry.bits_per_sample(),
            step_bits: geometry.bits_per_sample(),
        }
    }

    fn byte_offset(&self, channel: usize, frame: usize) -> Result<usize, AreaError> {
        if self.first_bit % 8 != 0 || self.step_bits % 8 != 0 {
            return Err(AreaError::Unaligned {
                channel,
                first_bit: self.first_bit,
                step_bits: self.step_bits,
            });
        }
        frame
            .checked_mul(self.step_bits / 8)
            .and_then(|at| at.checked_add(self.first_bit / 8))
            .ok_or(AreaError::FrameOverflow { frames: frame })
    }
}

/// Read-only view of one channel's samples.
#[derive(Debug, Clone, Copy)]
pub struct ChannelArea<'a> {
    data: &'a [u8],
    layout: AreaLayout,
}

impl<'a> ChannelArea<'a> {
    /// Creates an area over `data` with the given layout.
    #[must_use]
    pub fn new(data: &'a [u8], layout: AreaLayout) -> Self {
        Self { data, layout }
    }

    fn sample(&self, channel: usize, frame: usize, width: usize) -> Result<&'a [u8], AreaError> {
        let start = self.layout.byte_offset(channel, frame)?;
        start
            .checked_add(width)
            .and_then(|end| self.data.get(start..end))
            .ok_or(AreaError::OutOfBounds {
                channel,
                frame,
                len: self.data.len(),
            })
    }
}

/// One area per channel, in channel order.
#[derive(Debug, Clone, Default)]
pub struct ChannelAreas<'a> {
    areas: Vec<ChannelArea<'a>>,
}

impl<'a> ChannelAreas<'a> {
    /// Wraps explicit per-channel areas.
    #[must_use]
    pub fn new(areas: Vec<ChannelArea<'a>>) -> Self {
        Self { areas }
    }

    /// Areas of an interleaved buffer.
    #[must_use]
    pub fn interleaved(buf: &'a [u8], geometry: &FrameGeometry) -> Self {
        let areas = (0..usize::from(geometry.channels))
            .map(|channel| ChannelArea::new(buf, AreaLayout::interleaved(channel, geometry)))
            .collect();
        Self { areas }
    }

    /// Areas of one contiguous buffer per channel.
    #[must_use]
    pub fn planar(bufs: &[&'a [u8]], geometry: &FrameGeometry) -> Self {
        let step_bits = geometry.bits_per_sample();
        let areas = bufs
            .iter()
            .map(|buf| {
                ChannelArea::new(
                    buf,
                    AreaLayout {
                        first_bit: 0,
                        step_bits,
                    },
                )
            })
            .collect();
        Self { areas }
    }

    /// Returns the shared buffer when the areas describe plain interleaved data.
    fn as_interleaved(&self, geometry: &FrameGeometry) -> Option<&'a [u8]> {
        let first = self.areas.first()?;
        let all_interleaved = self.areas.iter().enumerate().all(|(channel, area)| {
            std::ptr::eq(area.data, first.data)
                && area.layout == AreaLayout::interleaved(channel, geometry)
        });
        all_interleaved.then_some(first.data)
    }

    /// Copies `frames` frames starting at frame `offset` into `dst` as a flat
    /// interleaved byte stream.
    ///
    /// `dst` is cleared and ends up holding exactly `frames` frames.
    pub fn copy_to_interleaved(
        &self,
        offset: usize,
        frames: usize,
        geometry: &FrameGeometry,
        dst: &mut Vec<u8>,
    ) -> Result<(), AreaError> {
        let channels = usize::from(geometry.channels);
        if self.areas.len() != channels {
            return Err(AreaError::ChannelMismatch {
                expected: channels,
                actual: self.areas.len(),
            });
        }

        let frame_bytes = geometry.frame_bytes();
        let total = geometry
            .frames_to_bytes(frames)
            .ok_or(AreaError::FrameOverflow { frames })?;
        dst.clear();

        if let Some(buf) = self.as_interleaved(geometry) {
            let end = offset
                .checked_add(frames)
                .and_then(|end| geometry.frames_to_bytes(end))
                .ok_or(AreaError::FrameOverflow {
                    frames: offset.saturating_add(frames),
                })?;
            let src = buf.get(end - total..end).ok_or(AreaError::ShortBuffer {
                needed: end,
                available: buf.len(),
            })?;
            dst.extend_from_slice(src);
            return Ok(());
        }

        let width = geometry.sample_bytes();
        dst.resize(total, 0);
        for (channel, area) in self.areas.iter().enumerate() {
            for frame in 0..frames {
                let sample = area.sample(channel, offset.saturating_add(frame), width)?;
                let at = frame * frame_bytes + channel * width;
                dst[at..at + width].copy_from_slice(sample);
            }
        }
        Ok(())
    }
}

/// Read-only view of a mapped ring buffer.
#[derive(Debug, Clone, Copy)]
pub struct MmapRegion<'a> {
    data: &'a [u8],
    layout: &'a [AreaLayout],
}

impl<'a> MmapRegion<'a> {
    /// Creates a view over `data` with one layout entry per channel.
    #[must_use]
    pub fn new(data: &'a [u8], layout: &'a [AreaLayout]) -> Self {
        Self { data, layout }
    }

    /// Per-channel areas over the ring.
    #[must_use]
    pub fn areas(&self) -> ChannelAreas<'a> {
        ChannelAreas::new(
            self.layout
                .iter()
                .map(|layout| ChannelArea::new(self.data, *layout))
                .collect(),
        )
    }
}

/// Writable view of a mapped ring buffer, used by applications to fill
/// playback frames before committing them.
#[derive(Debug)]
pub struct MmapRegionMut<'a> {
    data: &'a mut [u8],
    layout: &'a [AreaLayout],
}

impl<'a> MmapRegionMut<'a> {
    /// Creates a writable view over `data` with one layout entry per channel.
    pub fn new(data: &'a mut [u8], layout: &'a [AreaLayout]) -> Self {
        Self { data, layout }
    }

    /// Scatters interleaved frames from `src` into the ring starting at frame
    /// `offset`.
    pub fn write_interleaved(
        &mut self,
        offset: usize,
        src: &[u8],
        geometry: &FrameGeometry,
    ) -> Result<(), AreaError> {
        let channels = usize::from(geometry.channels);
        if self.layout.len() != channels {
            return Err(AreaError::ChannelMismatch {
                expected: channels,
                actual: self.layout.len(),
            });
        }

        let width = geometry.sample_bytes();
        let frame_bytes = geometry.frame_bytes();
        let frames = geometry.bytes_to_frames(src.len());
        let len = self.data.len();
        for (channel, layout) in self.layout.iter().enumerate() {
            for frame in 0..frames {
                let index = offset.saturating_add(frame);
                let start = layout.byte_offset(channel, index)?;
                let dst = start
                    .checked_add(width)
                    .and_then(|end| self.data.get_mut(start..end))
                    .ok_or(AreaError::OutOfBounds {
                        channel,
                        frame: index,
                        len,
                    })?;
                let at = frame * frame_bytes + channel * width;
                dst.copy_from_slice(&src[at..at + width]);
            }
        }
        Ok(())
    }

    /// Read-only view of the same ring.
    #[must_use]
    pub fn as_region(&self) -> MmapRegion<'_> {
        MmapRegion::new(self.data, self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleFormat;

    fn stereo16() -> FrameGeometry {
        FrameGeometry::new(2, SampleFormat::S16Le)
    }

    #[test]
    fn test_interleaved_copy_is_identity() {
        let geometry = stereo16();
        let buf: Vec<u8> = (0..16).collect();
        let areas = ChannelAreas::interleaved(&buf, &geometry);

        let mut out = Vec::new();
        areas.copy_to_interleaved(1, 2, &geometry, &mut out).unwrap();
        assert_eq!(out, vec![4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_planar_buffers_interleave() {
        let geometry = stereo16();
        let left = [0x10, 0x11, 0x12, 0x13];
        let right = [0x20, 0x21, 0x22, 0x23];
        let areas = ChannelAreas::planar(&[&left, &right], &geometry);

        let mut out = Vec::new();
        areas.copy_to_interleaved(0, 2, &geometry, &mut out).unwrap();
        assert_eq!(out, vec![0x10, 0x11, 0x20, 0x21, 0x12, 0x13, 0x22, 0x23]);
    }

    #[test]
    fn test_areas_in_one_buffer_at_arbitrary_offsets() {
        // Channel 1 sits before channel 0, with a gap, and uses a wider stride.
        let geometry = FrameGeometry::new(2, SampleFormat::U8);
        let mut buf = vec![0u8; 32];
        for frame in 0..4 {
            buf[20 + frame] = 0xA0 + frame as u8;
            buf[2 + frame * 3] = 0xB0 + frame as u8;
        }
        let areas = ChannelAreas::new(vec![
            ChannelArea::new(
                &buf,
                AreaLayout {
                    first_bit: 160,
                    step_bits: 8,
                },
            ),
            ChannelArea::new(
                &buf,
                AreaLayout {
                    first_bit: 16,
                    step_bits: 24,
                },
            ),
        ]);

        let mut out = Vec::new();
        areas.copy_to_interleaved(1, 3, &geometry, &mut out).unwrap();
        assert_eq!(out, vec![0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3]);
    }

    #[test]
    fn test_channel_mismatch() {
        let geometry = stereo16();
        let only = [0u8; 4];
        let areas = ChannelAreas::planar(&[&only], &geometry);
        let err = areas
            .copy_to_interleaved(0, 1, &geometry, &mut Vec::new())
            .unwrap_err();
        assert_eq!(
            err,
            AreaError::ChannelMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let geometry = stereo16();
        let left = [0u8; 4];
        let right = [0u8; 2];
        let areas = ChannelAreas::planar(&[&left, &right], &geometry);
        let err = areas
            .copy_to_interleaved(0, 2, &geometry, &mut Vec::new())
            .unwrap_err();
        assert_eq!(
            err,
            AreaError::OutOfBounds {
                channel: 1,
                frame: 1,
                len: 2
            }
        );
    }

    #[test]
    fn test_unaligned_area() {
        let geometry = FrameGeometry::new(1, SampleFormat::U8);
        let buf = [0u8; 8];
        let areas = ChannelAreas::new(vec![ChannelArea::new(
            &buf,
            AreaLayout {
                first_bit: 4,
                step_bits: 8,
            },
        )]);
        let err = areas
            .copy_to_interleaved(0, 1, &geometry, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, AreaError::Unaligned { channel: 0, .. }));
    }

    #[test]
    fn test_short_interleaved_buffer() {
        let geometry = stereo16();
        let buf = [0u8; 6];
        let areas = ChannelAreas::interleaved(&buf, &geometry);
        let err = areas
            .copy_to_interleaved(0, 2, &geometry, &mut Vec::new())
            .unwrap_err();
        assert_eq!(
            err,
            AreaError::ShortBuffer {
                needed: 8,
                available: 6
            }
        );
    }

    #[test]
    fn test_frame_count_overflow() {
        let geometry = stereo16();
        let buf = [0u8; 8];
        let err = ChannelAreas::interleaved(&buf, &geometry)
            .copy_to_interleaved(0, usize::MAX, &geometry, &mut Vec::new())
            .unwrap_err();
        assert_eq!(err, AreaError::FrameOverflow { frames: usize::MAX });
    }

    #[test]
    fn test_mmap_region_scatter_then_gather() {
        let geometry = stereo16();
        let frames = 4;
        let layout: Vec<AreaLayout> = (0..2)
            .map(|channel| AreaLayout::planar(channel, frames, &geometry))
            .collect();
        let mut ring = vec![0u8; geometry.frames_to_bytes(frames).unwrap()];
        let mut region = MmapRegionMut::new(&mut ring, &layout);

        let frames_in = [1u8, 2, 3, 4, 5, 6, 7, 8];
        region.write_interleaved(2, &frames_in, &geometry).unwrap();

        let mut out = Vec::new();
        region
            .as_region()
            .areas()
            .copy_to_interleaved(2, 2, &geometry, &mut out)
            .unwrap();
        assert_eq!(out, frames_in);
        // Planar: left samples at bytes 4..8, right samples at bytes 12..16.
        assert_eq!(&ring[4..8], &[1, 2, 5, 6]);
        assert_eq!(&ring[12..16], &[3, 4, 7, 8]);
    }
}
