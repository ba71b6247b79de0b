//! Receive-side buffering for a single stream.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Default cap on bytes a stream holds before its handler drains them.
pub const DEFAULT_MAX_INBOUND_BUFFER: usize = 1024 * 1024;

/// Appending would take the buffer past its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("inbound buffer full: {len} more bytes exceed limit {limit}")]
pub struct BufferOverflow {
    pub len: usize,
    pub limit: usize,
}

/// Bytes received for a stream, in arrival order, not yet read by its handler.
#[derive(Debug)]
pub struct InboundBuffer {
    buf: BytesMut,
    limit: usize,
}

impl Default for InboundBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_INBOUND_BUFFER)
    }
}

impl InboundBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drop all buffered bytes and apply a new limit.
    pub fn reset(&mut self, limit: usize) {
        self.buf.clear();
        self.limit = limit;
    }

    /// Append received bytes. Nothing is appended on overflow.
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferOverflow> {
        if self.buf.len() + data.len() > self.limit {
            return Err(BufferOverflow {
                len: data.len(),
                limit: self.limit,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Move up to `out.len()` bytes into `out`, returning the count moved.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());
        self.buf.copy_to_slice(&mut out[..n]);
        n
    }
}
