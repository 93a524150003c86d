//! Character-device style access point published by a bound instance.
//!
//! A session mutably borrows the instance's buffer, so only one session can
//! exist at a time and reads never interleave with writes.
use super::transfer::{TransferBuffer, TransferError};

/// The published node: a name plus the buffer behind it.
#[derive(Debug)]
pub struct CharChannel {
    node: String,
    buffer: TransferBuffer,
}

impl CharChannel {
    pub fn new(node: impl Into<String>, capacity: usize) -> Self {
        Self {
            node: node.into(),
            buffer: TransferBuffer::new(capacity),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn buffer(&self) -> &TransferBuffer {
        &self.buffer
    }

    /// Starts a session with its cursor at the beginning of the data.
    pub fn open(&mut self) -> ChannelSession<'_> {
        tracing::trace!(node = %self.node, "channel opened");
        ChannelSession {
            node: &self.node,
            buffer: &mut self.buffer,
            cursor: 0,
        }
    }
}

pub struct ChannelSession<'a> {
    node: &'a str,
    buffer: &'a mut TransferBuffer,
    cursor: usize,
}

impl ChannelSession<'_> {
    pub fn node(&self) -> &str {
        self.node
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Reads into `out`, up to its length. Returns 0 at end of data.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, TransferError> {
        let max_len = out.len();
        self.read_limited(out, max_len)
    }

    /// Reads at most `max_len` bytes into `out`. A request that `out` cannot
    /// hold fails with `TransferFault` and leaves the cursor where it was.
    pub fn read_limited(&mut self, out: &mut [u8], max_len: usize) -> Result<usize, TransferError> {
        let count = self.buffer.read(out, max_len, self.cursor)?;
        self.cursor += count;
        tracing::trace!(node = self.node, count, cursor = self.cursor, "channel read");
        Ok(count)
    }

    /// Drains everything from the cursor to the end of data.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, TransferError> {
        let mut data = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let count = self.read(&mut chunk)?;
            if count == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&chunk[..count]);
        }
    }

    /// Replaces the buffer contents. The read cursor is not moved.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, TransferError> {
        match self.buffer.write(data) {
            Ok(count) => {
                tracing::trace!(node = self.node, count, "channel write");
                Ok(count)
            }
            Err(err) => {
                tracing::debug!(node = self.node, error = %err, "channel write rejected");
                Err(err)
            }
        }
    }
}
