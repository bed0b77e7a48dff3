//! # Decoded Output Stage
//!
//! Fixed-capacity PCM accumulator between the frame decoder and the caller.
//! Data always starts at index 0; consuming from the front compacts the
//! remainder with `copy_within`.

/// PCM accumulator with a fixed capacity.
#[derive(Debug)]
pub struct OutputAccumulator {
    buf: Box<[u8]>,
    filled: usize,
}

impl OutputAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn free_space(&self) -> usize {
        self.buf.len() - self.filled
    }

    /// Whether a decode producing up to `frame_bytes` fits.
    pub fn has_room_for(&self, frame_bytes: usize) -> bool {
        self.free_space() >= frame_bytes
    }

    /// Writable tail for the decoder.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Held bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Mark `n` bytes written into [`spare_mut`](Self::spare_mut) as held.
    ///
    /// Returns `false` and commits nothing if `n` exceeds the free space.
    pub fn commit(&mut self, n: usize) -> bool {
        if n > self.free_space() {
            return false;
        }
        self.filled += n;
        true
    }

    /// Copy up to `max` bytes from the front into `dst` and shift the
    /// remainder to the front. Returns the number of bytes copied.
    pub fn consume(&mut self, dst: &mut [u8], max: usize) -> usize {
        let n = max.min(dst.len()).min(self.filled);
        if n == 0 {
            return 0;
        }
        dst[..n].copy_from_slice(&self.buf[..n]);
        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
        n
    }

    /// Remove `len` bytes starting at `start`, closing the gap. Both are
    /// clamped to the held data. Returns the number of bytes removed.
    pub fn remove_range(&mut self, start: usize, len: usize) -> usize {
        let start = start.min(self.filled);
        let len = len.min(self.filled - start);
        if len == 0 {
            return 0;
        }
        self.buf.copy_within(start + len..self.filled, start);
        self.filled -= len;
        len
    }

    /// Drop up to `n` bytes from the end. Returns the number removed.
    pub fn truncate_tail(&mut self, n: usize) -> usize {
        let n = n.min(self.filled);
        self.filled -= n;
        n
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_with(capacity: usize, bytes: &[u8]) -> OutputAccumulator {
        let mut acc = OutputAccumulator::new(capacity);
        acc.spare_mut()[..bytes.len()].copy_from_slice(bytes);
        assert!(acc.commit(bytes.len()));
        acc
    }

    #[test]
    fn test_output_commit_respects_capacity() {
        let mut acc = OutputAccumulator::new(8);
        assert!(acc.has_room_for(8));
        assert!(acc.commit(6));
        assert!(!acc.has_room_for(4));
        assert!(!acc.commit(3));
        assert_eq!(acc.len(), 6);
        assert_eq!(acc.free_space(), 2);
    }

    #[test]
    fn test_output_consume_compacts() {
        let mut acc = filled_with(16, &[1, 2, 3, 4, 5, 6]);
        let mut dst = [0u8; 4];

        assert_eq!(acc.consume(&mut dst, 4), 4);
        assert_eq!(dst, [1, 2, 3, 4]);
        assert_eq!(acc.data(), &[5, 6]);

        // Partial: asks for more than held
        assert_eq!(acc.consume(&mut dst, 4), 2);
        assert_eq!(&dst[..2], &[5, 6]);
        assert!(acc.is_empty());
        assert_eq!(acc.consume(&mut dst, 4), 0);
    }

    #[test]
    fn test_output_consume_bounded_by_max() {
        let mut acc = filled_with(16, &[1, 2, 3, 4, 5, 6]);
        let mut dst = [0u8; 8];
        assert_eq!(acc.consume(&mut dst, 2), 2);
        assert_eq!(acc.data(), &[3, 4, 5, 6]);
    }

    #[test]
    fn test_output_remove_range() {
        let mut acc = filled_with(16, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(acc.remove_range(2, 3), 3);
        assert_eq!(acc.data(), &[1, 2, 6, 7, 8]);

        // Clamped at the end
        assert_eq!(acc.remove_range(3, 10), 2);
        assert_eq!(acc.data(), &[1, 2, 6]);
        assert_eq!(acc.remove_range(10, 1), 0);
    }

    #[test]
    fn test_output_truncate_tail_clamped() {
        let mut acc = filled_with(16, &[1, 2, 3]);
        assert_eq!(acc.truncate_tail(2), 2);
        assert_eq!(acc.data(), &[1]);
        assert_eq!(acc.truncate_tail(10), 1);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_output_clear() {
        let mut acc = filled_with(4, &[9, 9, 9, 9]);
        assert!(!acc.has_room_for(1));
        acc.clear();
        assert!(acc.has_room_for(4));
    }
}
