//! Growable receive buffer for one connection.
//!
//! The backing storage is always fully initialised and zero-filled past
//! the filled region. One byte of headroom is kept free so the filled
//! bytes are always followed by a zero.

use std::collections::TryReserveError;

#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl ReceiveBuffer {
    /// Create a zeroed buffer; capacities below 2 are raised to 2 so a read
    /// always has room for at least one byte.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(2)],
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// True when no more bytes can be read without growing
    pub fn is_full(&self) -> bool {
        self.filled + 1 >= self.data.len()
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Writable region after the filled bytes, excluding the trailing zero
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let end = self.data.len() - 1;
        &mut self.data[self.filled..end]
    }

    /// Mark `n` bytes written into [`spare_mut`](Self::spare_mut) as filled
    pub fn advance(&mut self, n: usize) {
        assert!(
            self.filled + n < self.data.len(),
            "advance past the writable region"
        );
        self.filled += n;
    }

    /// Copy `bytes` in after the filled region, growing as needed
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), TryReserveError> {
        while self.spare_mut().len() < bytes.len() {
            self.grow()?;
        }
        let start = self.filled;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.filled += bytes.len();
        Ok(())
    }

    /// Double the capacity; new space is zeroed
    pub fn grow(&mut self) -> Result<(), TryReserveError> {
        let additional = self.data.len();
        self.data.try_reserve_exact(additional)?;
        self.data.resize(self.data.len() + additional, 0);
        Ok(())
    }

    /// Discard the first `n` buffered bytes, shifting the rest to the front
    /// and zeroing the vacated tail
    pub fn consume_prefix(&mut self, n: usize) {
        let n = n.min(self.filled);
        self.data.copy_within(n..self.filled, 0);
        let remaining = self.filled - n;
        self.data[remaining..self.filled].fill(0);
        self.filled = remaining;
    }
}
