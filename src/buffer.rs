//! Single-producer/single-consumer fixed-capacity ring of mono samples (C6).

use std::sync::Mutex;

struct RingInner {
    data: Vec<f32>,
    pos: usize,
}

/// A fixed-capacity ring buffer of `capacity` mono samples. The writer holds
/// the lock only for the duration of the memcpy, so in the common case (a
/// capture block much shorter than the buffer) both write and snapshot are
/// effectively wait-free.
pub struct RollingBuffer {
    inner: Mutex<RingInner>,
    capacity: usize,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                data: vec![0.0; capacity],
                pos: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a block of `k` samples. If `k >= capacity`, the whole buffer is
    /// overwritten with the block's last `capacity` samples and the write
    /// position resets to 0. Otherwise samples are written at the current
    /// position, wrapping, and the position advances mod `capacity`.
    pub fn write(&self, block: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let k = block.len();

        if k >= self.capacity {
            let tail = &block[k - self.capacity..];
            inner.data.copy_from_slice(tail);
            inner.pos = 0;
            return;
        }

        let pos = inner.pos;
        let end = pos + k;
        if end <= self.capacity {
            inner.data[pos..end].copy_from_slice(block);
        } else {
            let first = self.capacity - pos;
            inner.data[pos..].copy_from_slice(&block[..first]);
            inner.data[..end - self.capacity].copy_from_slice(&block[first..]);
        }
        inner.pos = (pos + k) % self.capacity;
    }

    /// A linearized copy of the ring, oldest sample first, length `capacity`.
    pub fn ordered_snapshot(&self) -> Vec<f32> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&inner.data[inner.pos..]);
        out.extend_from_slice(&inner.data[..inner.pos]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_zero() {
        let buf = RollingBuffer::new(8);
        assert_eq!(buf.ordered_snapshot(), vec![0.0; 8]);
    }

    #[test]
    fn small_write_lands_at_tail() {
        let buf = RollingBuffer::new(8);
        buf.write(&[1.0, 2.0, 3.0]);
        let snap = buf.ordered_snapshot();
        assert_eq!(&snap[5..], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn wrapping_write_preserves_order() {
        let buf = RollingBuffer::new(4);
        buf.write(&[1.0, 2.0, 3.0]);
        buf.write(&[4.0, 5.0]);
        // buffer now holds, in write order: 1,2,3,4,5 but only last 4 fit: 2,3,4,5
        assert_eq!(buf.ordered_snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn oversized_write_overwrites_whole_buffer() {
        let buf = RollingBuffer::new(4);
        buf.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buf.ordered_snapshot(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn snapshot_tail_matches_last_write() {
        let buf = RollingBuffer::new(10);
        buf.write(&[1.0; 10]);
        let block = vec![9.0, 9.0, 9.0];
        buf.write(&block);
        let snap = buf.ordered_snapshot();
        assert_eq!(&snap[10 - block.len()..], block.as_slice());
    }
}
