//! Fixed-capacity hand-off buffer between the driver and its consumer.
//!
//! A write replaces the whole valid prefix; it never appends. Reads are
//! positional: the caller owns the cursor and advances it by the returned
//! count until a read returns zero.
use std::{error::Error, fmt};

/// Capacity of the buffer bound to each device instance.
pub const TRANSFER_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Payload larger than the buffer. Nothing was written.
    CapacityExceeded { len: usize, capacity: usize },
    /// The destination could not take the bytes. Nothing was consumed.
    TransferFault { needed: usize, available: usize },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::CapacityExceeded { len, capacity } => write!(
                f,
                "write of {len} bytes exceeds buffer capacity of {capacity} bytes"
            ),
            TransferError::TransferFault { needed, available } => write!(
                f,
                "destination accepts {available} bytes but {needed} bytes are pending"
            ),
        }
    }
}

impl Error for TransferError {}

pub struct TransferBuffer {
    storage: Box<[u8]>,
    length: usize,
}

impl fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("capacity", &self.capacity())
            .field("length", &self.length)
            .finish()
    }
}

impl TransferBuffer {
    /// Allocates an empty buffer. Allocation failure aborts.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            length: 0,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The valid prefix.
    pub fn contents(&self) -> &[u8] {
        &self.storage[..self.length]
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, TransferError> {
        if bytes.len() > self.capacity() {
            return Err(TransferError::CapacityExceeded {
                len: bytes.len(),
                capacity: self.capacity(),
            });
        }
        self.storage[..bytes.len()].copy_from_slice(bytes);
        self.length = bytes.len();
        Ok(bytes.len())
    }

    /// Copies up to `requested_len` bytes starting at `cursor` into `into`.
    /// Returns 0 once `cursor` reaches the end of the valid prefix.
    pub fn read(
        &self,
        into: &mut [u8],
        requested_len: usize,
        cursor: usize,
    ) -> Result<usize, TransferError> {
        if cursor >= self.length {
            return Ok(0);
        }
        let count = requested_len.min(self.length - cursor);
        let Some(dest) = into.get_mut(..count) else {
            return Err(TransferError::TransferFault {
                needed: count,
                available: into.len(),
            });
        };
        dest.copy_from_slice(&self.storage[cursor..cursor + count]);
        Ok(count)
    }

    pub fn clear(&mut self) {
        self.length = 0;
    }
}
