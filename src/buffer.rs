//! Growable receive buffer.
//!
//! Accumulates the inbound byte stream of one connection across the reads of
//! a single drain cycle. Growth is amortized by at-least-doubling, and
//! [`RecvBuffer::clear`] keeps the capacity so a chatty connection stops
//! reallocating once its buffer has grown to its working size.

use crate::error::Error;

/// Default initial capacity for per-connection receive buffers.
pub const DEFAULT_RECV_BUFFER_CAPACITY: usize = 64;

/// Append-only byte accumulator with amortized-doubling growth.
///
/// All allocation is fallible: a failed grow leaves the buffer unchanged and
/// surfaces [`Error::Allocation`], which callers handle per-connection rather
/// than process-wide.
#[derive(Debug)]
pub struct RecvBuffer {
    data: Vec<u8>,
}

impl RecvBuffer {
    /// Creates an empty buffer with at least the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        Ok(Self { data })
    }

    /// Appends bytes to the end of the buffer, growing if necessary.
    ///
    /// Growth reserves at least `2 * (len + bytes.len() + 1)` total capacity,
    /// so repeated small appends reallocate O(log n) times. The extra byte of
    /// headroom is spare capacity only; no terminator is ever written.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let needed = self.data.len() + bytes.len() + 1;
        if needed > self.data.capacity() {
            let target = self.data.capacity().max(2 * needed);
            self.data.try_reserve_exact(target - self.data.len())?;
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Resets the length to zero. Capacity is retained.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The accumulated bytes since the last [`Self::clear`].
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Number of accumulated bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no bytes have been accumulated since the last clear.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current capacity of the backing storage.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}
