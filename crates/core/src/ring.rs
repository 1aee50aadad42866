// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity circular byte buffer over raw container output.
//!
//! Callers wrap this in `tokio::sync::RwLock` for concurrent access — the
//! buffer itself serialises nothing. Writes larger than capacity keep only
//! the final `capacity` bytes.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    write_pos: usize,
    total_written: u64,
}

impl RingBuffer {
    /// Create a new ring buffer. `capacity` must be > 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self { buf: vec![0u8; capacity], capacity, write_pos: 0, total_written: 0 }
    }

    /// Append data into the circular buffer.
    pub fn write(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.capacity) {
            let start = self.write_pos;
            let end = start + chunk.len();

            if end <= self.capacity {
                self.buf[start..end].copy_from_slice(chunk);
            } else {
                let first = self.capacity - start;
                self.buf[start..self.capacity].copy_from_slice(&chunk[..first]);
                self.buf[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            }

            self.write_pos = end % self.capacity;
            self.total_written += chunk.len() as u64;
        }
    }

    /// The last `min(total_written, capacity)` bytes written, in input order.
    pub fn read_all(&self) -> Vec<u8> {
        self.last(self.len())
    }

    /// The last `min(n, len())` bytes written, in input order.
    pub fn last(&self, n: usize) -> Vec<u8> {
        let available = self.len();
        let n = n.min(available);
        if n == 0 {
            return Vec::new();
        }

        let start =
            if self.write_pos >= n { self.write_pos - n } else { self.capacity - (n - self.write_pos) };

        if start + n <= self.capacity {
            self.buf[start..start + n].to_vec()
        } else {
            let first = self.capacity - start;
            let mut out = Vec::with_capacity(n);
            out.extend_from_slice(&self.buf[start..self.capacity]);
            out.extend_from_slice(&self.buf[..n - first]);
            out
        }
    }

    /// Logical length: `min(total_written, capacity)`.
    pub fn len(&self) -> usize {
        self.total_written.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset to empty, preserving capacity.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.total_written = 0;
    }

    /// Total bytes ever written through this buffer.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
