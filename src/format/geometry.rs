//! Sample formats and frame/byte arithmetic.

use std::fmt;

use serde::Deserialize;

/// Sample encodings a stream can negotiate.
///
/// The tee never interprets samples; only the physical width of each format
/// matters when converting frame counts to byte counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 8 bit.
    S8,
    /// Unsigned 8 bit.
    U8,
    /// Signed 16 bit little endian.
    #[default]
    S16Le,
    /// Signed 16 bit big endian.
    S16Be,
    /// Unsigned 16 bit little endian.
    U16Le,
    /// Unsigned 16 bit big endian.
    U16Be,
    /// Signed 24 bit little endian in a 4 byte container.
    S24Le,
    /// Signed 24 bit little endian packed in 3 bytes.
    S24_3Le,
    /// Signed 32 bit little endian.
    S32Le,
    /// Signed 32 bit big endian.
    S32Be,
    /// 32 bit IEEE float little endian.
    FloatLe,
    /// 64 bit IEEE float little endian.
    Float64Le,
    /// 8 bit mu-law.
    MuLaw,
    /// 8 bit A-law.
    ALaw,
}

impl SampleFormat {
    /// Bits occupied by one sample in memory, padding included.
    #[must_use]
    pub fn physical_bits(self) -> usize {
        match self {
            Self::S8 | Self::U8 | Self::MuLaw | Self::ALaw => 8,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 16,
            Self::S24_3Le => 24,
            Self::S24Le | Self::S32Le | Self::S32Be | Self::FloatLe => 32,
            Self::Float64Le => 64,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::S8 => "S8",
            Self::U8 => "U8",
            Self::S16Le => "S16_LE",
            Self::S16Be => "S16_BE",
            Self::U16Le => "U16_LE",
            Self::U16Be => "U16_BE",
            Self::S24Le => "S24_LE",
            Self::S24_3Le => "S24_3LE",
            Self::S32Le => "S32_LE",
            Self::S32Be => "S32_BE",
            Self::FloatLe => "FLOAT_LE",
            Self::Float64Le => "FLOAT64_LE",
            Self::MuLaw => "MU_LAW",
            Self::ALaw => "A_LAW",
        };
        f.write_str(name)
    }
}

/// Layout of one frame: a sample slot across all channels.
///
/// Every transfer path uses this to turn frame counts into byte counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Negotiated sample format.
    pub format: SampleFormat,
}

impl FrameGeometry {
    /// Creates a geometry for `channels` channels of `format`.
    #[must_use]
    pub fn new(channels: u16, format: SampleFormat) -> Self {
        Self { channels, format }
    }

    /// Physical bits of one sample.
    #[must_use]
    pub fn bits_per_sample(&self) -> usize {
        self.format.physical_bits()
    }

    /// Physical bits of one frame.
    #[must_use]
    pub fn bits_per_frame(&self) -> usize {
        self.bits_per_sample() * usize::from(self.channels)
    }

    /// Bytes of one sample.
    #[must_use]
    pub fn sample_bytes(&self) -> usize {
        self.bits_per_sample() / 8
    }

    /// Bytes of one frame.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.bits_per_frame() / 8
    }

    /// Converts a frame count to a byte count, or `None` if it overflows.
    #[must_use]
    pub fn frames_to_bytes(&self, frames: usize) -> Option<usize> {
        frames.checked_mul(self.frame_bytes())
    }

    /// Converts a byte count to whole frames, dropping any partial frame.
    #[must_use]
    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        match self.frame_bytes() {
            0 => 0,
            frame_bytes => bytes / frame_bytes,
        }
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {} ({} bytes/frame)",
            self.channels,
            self.format,
            self.frame_bytes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_s16_frame_size() {
        let geometry = FrameGeometry::new(2, SampleFormat::S16Le);
        assert_eq!(geometry.bits_per_sample(), 16);
        assert_eq!(geometry.bits_per_frame(), 32);
        assert_eq!(geometry.frame_bytes(), 4);
        assert_eq!(geometry.frames_to_bytes(10), Some(40));
        assert_eq!(geometry.bytes_to_frames(41), 10);
    }

    #[test]
    fn test_packed_24_bit() {
        let geometry = FrameGeometry::new(6, SampleFormat::S24_3Le);
        assert_eq!(geometry.sample_bytes(), 3);
        assert_eq!(geometry.frame_bytes(), 18);
    }

    #[test]
    fn test_s24_uses_four_byte_container() {
        assert_eq!(SampleFormat::S24Le.physical_bits(), 32);
    }

    #[test]
    fn test_zero_channels() {
        let geometry = FrameGeometry::new(0, SampleFormat::S32Le);
        assert_eq!(geometry.frame_bytes(), 0);
        assert_eq!(geometry.bytes_to_frames(100), 0);
    }

    #[test]
    fn test_display() {
        let geometry = FrameGeometry::new(2, SampleFormat::FloatLe);
        assert_eq!(geometry.to_string(), "2 x FLOAT_LE (8 bytes/frame)");
    }

    #[test]
    fn test_frames_to_bytes_overflow() {
        let geometry = FrameGeometry::new(2, SampleFormat::S16Le);
        assert_eq!(geometry.frames_to_bytes(usize::MAX), None);
        assert_eq!(geometry.frames_to_bytes(usize::MAX / 4), Some(usize::MAX / 4 * 4));
        assert_eq!(FrameGeometry::new(0, SampleFormat::S8).frames_to_bytes(usize::MAX), Some(0));
    }
}
