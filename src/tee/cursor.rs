//! Ring buffer position tracking.

/// A contiguous run of frames inside the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSpan {
    /// First frame of the run, `< capacity`.
    pub offset: usize,
    /// Length of the run in frames.
    pub frames: usize,
}

/// Offset into a ring of `capacity` frames.
///
/// The offset always stays in `0..capacity` and wraps to 0 exactly when it
/// reaches the capacity.
///
/// # Example
///
/// ```
/// use pcm_tee::{RingCursor, RingSpan};
///
/// let mut cursor = RingCursor::at(95, 100);
/// let spans: Vec<_> = cursor.split(10).collect();
/// assert_eq!(
///     spans,
///     vec![
///         RingSpan { offset: 95, frames: 5 },
///         RingSpan { offset: 0, frames: 5 },
///     ]
/// );
/// cursor.advance(10);
/// assert_eq!(cursor.offset(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    capacity: usize,
    offset: usize,
}

impl RingCursor {
    /// Cursor at frame 0 of a ring of `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            offset: 0,
        }
    }

    /// Cursor for a monotonic stream position.
    #[must_use]
    pub fn at(position: u64, capacity: usize) -> Self {
        let offset = match capacity {
            0 => 0,
            // The remainder is below `capacity`, so it fits in usize.
            c => usize::try_from(position % c as u64).unwrap_or(0),
        };
        Self { capacity, offset }
    }

    /// Ring capacity in frames.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current offset in frames.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Splits `frames` frames starting at the current offset into contiguous
    /// runs, breaking at the end of the ring.
    ///
    /// Yields at most two runs when `frames <= capacity`. Yields nothing for
    /// an empty ring.
    #[must_use]
    pub fn split(&self, frames: usize) -> RingSpans {
        RingSpans {
            cursor: *self,
            remaining: frames,
        }
    }

    /// Moves the offset forward by `frames`, wrapping at the capacity.
    pub fn advance(&mut self, frames: usize) {
        if self.capacity == 0 {
            return;
        }
        self.offset = (self.offset + frames % self.capacity) % self.capacity;
    }
}

/// Iterator returned by [`RingCursor::split`].
#[derive(Debug, Clone)]
pub struct RingSpans {
    cursor: RingCursor,
    remaining: usize,
}

impl Iterator for RingSpans {
    type Item = RingSpan;

    fn next(&mut self) -> Option<RingSpan> {
        if self.remaining == 0 || self.cursor.capacity == 0 {
            return None;
        }
        let contiguous = self.cursor.capacity - self.cursor.offset;
        let frames = self.remaining.min(contiguous);
        let span = RingSpan {
            offset: self.cursor.offset,
            frames,
        };
        self.cursor.advance(frames);
        self.remaining -= frames;
        Some(span)
    }
}
