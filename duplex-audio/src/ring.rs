//! Index-based circular region over caller-owned storage.
//!
//! A [`RingRegion`] holds no data and no cursors. It describes a logical
//! window of `size` bytes at the front of a backing buffer of `capacity`
//! bytes, and provides the wrap arithmetic for positions inside that
//! window. Positions are plain `usize` offsets in `[0, size]`; both `0`
//! and `size` name the wrap point, and all operations normalise their
//! results into `[0, size)` except where a full-window distance is the
//! intended reading. Cursors live with the caller (as atomics, in the
//! streaming pipeline), which keeps the region itself trivially shareable
//! between cores.

/// Per-span callback outcome for [`RingRegion::apply_linear`].
///
/// The callback reports how many bytes of the span it consumed. Consuming
/// less than the span stops the walk.
pub type SpanFn<'a> = &'a mut dyn FnMut(&[u8]) -> usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingRegion {
    capacity: usize,
    size: usize,
}

impl RingRegion {
    /// Creates a region using the full backing capacity.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            size: capacity,
        }
    }

    /// Creates a region with a logical window smaller than the backing
    /// capacity.
    pub const fn with_size(capacity: usize, size: usize) -> Self {
        debug_assert!(size <= capacity);
        Self { capacity, size }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    /// Shrinks or grows the logical window. Any outstanding positions are
    /// invalidated; callers reset their cursors after a resize.
    pub fn resize(&mut self, size: usize) {
        debug_assert!(size <= self.capacity);
        self.size = size;
    }

    /// Bytes from `start` forward to `limit`, wrapping at most once.
    ///
    /// `start == limit` reads as empty, so a writer chasing a reader can
    /// never report the full window as occupied.
    pub fn distance(&self, limit: usize, start: usize) -> usize {
        debug_assert!(start <= self.size && limit <= self.size);
        if start > limit {
            (self.size - start) + limit
        } else {
            limit - start
        }
    }

    /// Bytes from `start` to the end of the window.
    pub fn distance_to_end(&self, start: usize) -> usize {
        debug_assert!(start <= self.size);
        self.size - start
    }

    /// Advances `start` by `count`, stopping at `limit`.
    ///
    /// The position wraps at most once; if `count` would carry it past
    /// `limit` the result is clamped to `limit` exactly.
    pub fn advance(&self, limit: usize, start: usize, count: usize) -> usize {
        debug_assert!(start <= self.size && limit <= self.size);
        let mut result = start + count;
        if start > limit {
            if result >= self.size {
                result -= self.size;
                if result > limit {
                    result = limit;
                }
            }
        } else if result > limit {
            result = limit;
        }
        result
    }

    /// Advances `start` by `count` with no limit, wrapping as many times
    /// as needed.
    pub fn advance_free(&self, start: usize, count: usize) -> usize {
        debug_assert!(start <= self.size);
        let mut result = start + count;
        while result >= self.size {
            result -= self.size;
        }
        result
    }

    /// Copies up to `dest.len()` bytes out of `storage` starting at
    /// `start`, clamped so the copy never crosses `limit`. Returns the
    /// advanced position and the byte count actually copied.
    pub fn copy_to(
        &self,
        storage: &[u8],
        limit: usize,
        start: usize,
        dest: &mut [u8],
    ) -> (usize, usize) {
        let count = dest.len().min(self.distance(limit, start));
        let pos = self.copy_to_free(storage, start, &mut dest[..count]);
        (pos, count)
    }

    /// Copies exactly `dest.len()` bytes out of `storage` starting at
    /// `start`, span by span, wrapping freely. Returns the advanced
    /// position.
    pub fn copy_to_free(&self, storage: &[u8], mut start: usize, dest: &mut [u8]) -> usize {
        debug_assert!(start <= self.size);
        debug_assert!(storage.len() >= self.size);

        let mut filled = 0;
        let mut count = dest.len();
        while count > 0 {
            let span = (self.size - start).min(count);
            dest[filled..filled + span].copy_from_slice(&storage[start..start + span]);
            filled += span;
            start += span;
            if start == self.size {
                start = 0;
            }
            count -= span;
        }
        start
    }

    /// Writes all of `src` into `storage` at `start`, span by span,
    /// wrapping freely. Returns the advanced position.
    pub fn copy_from(&self, storage: &mut [u8], mut start: usize, src: &[u8]) -> usize {
        debug_assert!(start <= self.size);
        debug_assert!(storage.len() >= self.size);

        let mut taken = 0;
        let mut count = src.len();
        while count > 0 {
            let span = (self.size - start).min(count);
            storage[start..start + span].copy_from_slice(&src[taken..taken + span]);
            taken += span;
            start += span;
            if start == self.size {
                start = 0;
            }
            count -= span;
        }
        start
    }

    /// Walks the occupied range `[start, limit)` as at most two contiguous
    /// spans, handing each to `fn`. The callback returns how many bytes it
    /// consumed; a short consumption ends the walk early. Returns the
    /// position advanced past everything consumed.
    pub fn apply_linear(&self, storage: &[u8], limit: usize, mut start: usize, f: SpanFn) -> usize {
        debug_assert!(start <= self.size && limit <= self.size);

        if start > limit {
            let count = f(&storage[start..self.size]);
            debug_assert!(count <= self.size - start);
            if start + count < self.size {
                return start + count;
            }
            start = 0;
        }
        let count = f(&storage[start..limit]);
        debug_assert!(count <= limit - start);
        self.advance(limit, start, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: usize) -> std::vec::Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    #[test]
    fn distance_wraps_once() {
        let r = RingRegion::new(10);
        assert_eq!(r.distance(7, 3), 4);
        assert_eq!(r.distance(3, 7), 6);
        assert_eq!(r.distance(5, 5), 0);
        assert_eq!(r.distance_to_end(7), 3);
    }

    #[test]
    fn resize_shrinks_window() {
        let mut r = RingRegion::new(10);
        r.resize(6);
        assert_eq!(r.size(), 6);
        assert_eq!(r.capacity(), 10);
        assert_eq!(r.distance(1, 5), 2);
    }

    #[test]
    fn advance_clamps_at_limit() {
        let r = RingRegion::new(10);
        // no wrap, clamped
        assert_eq!(r.advance(7, 3, 10), 7);
        // no wrap, within range
        assert_eq!(r.advance(7, 3, 2), 5);
        // wrapping, clamped after the wrap
        assert_eq!(r.advance(3, 7, 9), 3);
        // wrapping, within range
        assert_eq!(r.advance(3, 7, 4), 1);
        // exactly reaching the end maps to 0
        assert_eq!(r.advance(3, 7, 3), 0);
    }

    #[test]
    fn advancing_by_distance_reaches_limit() {
        let r = RingRegion::new(10);
        // unwrapped, wrapped, empty, and end-of-window cursor pairs
        for (limit, start) in [(7, 3), (3, 7), (5, 5), (0, 9), (9, 0)] {
            assert_eq!(r.advance(limit, start, r.distance(limit, start)), limit);
        }
    }

    #[test]
    fn advance_free_wraps_repeatedly() {
        let r = RingRegion::new(10);
        assert_eq!(r.advance_free(7, 4), 1);
        assert_eq!(r.advance_free(0, 30), 0);
        assert_eq!(r.advance_free(3, 27), 0);
    }

    #[test]
    fn copy_round_trip_with_wrap() {
        let r = RingRegion::new(8);
        let mut storage = [0u8; 8];
        let data = seq(6);

        // write 6 bytes starting at 5: spans [5..8) then [0..3)
        let pos = r.copy_from(&mut storage, 5, &data);
        assert_eq!(pos, 3);
        assert_eq!(&storage[5..], &[0, 1, 2]);
        assert_eq!(&storage[..3], &[3, 4, 5]);

        let mut out = [0u8; 6];
        let pos = r.copy_to_free(&storage, 5, &mut out);
        assert_eq!(pos, 3);
        assert_eq!(out, data[..]);
    }

    #[test]
    fn copy_to_clamps_to_occupied() {
        let r = RingRegion::new(8);
        let mut storage = [0u8; 8];
        r.copy_from(&mut storage, 0, &seq(8));

        // only 3 bytes between start=2 and limit=5
        let mut out = [0xffu8; 6];
        let (pos, copied) = r.copy_to(&storage, 5, 2, &mut out);
        assert_eq!(copied, 3);
        assert_eq!(pos, 5);
        assert_eq!(&out[..3], &[2, 3, 4]);
        assert_eq!(&out[3..], &[0xff; 3]);
    }

    #[test]
    fn apply_linear_two_spans() {
        let r = RingRegion::new(8);
        let mut storage = [0u8; 8];
        r.copy_from(&mut storage, 0, &seq(8));

        let mut seen = std::vec::Vec::new();
        let pos = r.apply_linear(&storage, 3, 6, &mut |span: &[u8]| {
            seen.push(span.to_vec());
            span.len()
        });
        assert_eq!(pos, 3);
        assert_eq!(seen, [seq(8)[6..].to_vec(), seq(8)[..3].to_vec()]);
    }

    #[test]
    fn apply_linear_stops_on_short_consume() {
        let r = RingRegion::new(8);
        let storage = [0u8; 8];

        // consume only 1 of the 2 bytes in the first span
        let pos = r.apply_linear(&storage, 3, 6, &mut |_span: &[u8]| 1);
        assert_eq!(pos, 7);

        // consume the first span fully, then nothing of the second
        let mut calls = 0;
        let pos = r.apply_linear(&storage, 3, 6, &mut |span: &[u8]| {
            calls += 1;
            if calls == 1 {
                span.len()
            } else {
                0
            }
        });
        assert_eq!(calls, 2);
        assert_eq!(pos, 0);
    }

    #[test]
    fn apply_linear_single_span() {
        let r = RingRegion::new(8);
        let storage = [0u8; 8];
        let pos = r.apply_linear(&storage, 6, 2, &mut |span: &[u8]| {
            assert_eq!(span.len(), 4);
            span.len()
        });
        assert_eq!(pos, 6);
    }
}
