//! Error types for stream operations.

use std::io;

use thiserror::Error;

use crate::frame::error_code;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Failures surfaced by [`H2Stream`](crate::H2Stream) operations.
///
/// Backpressure and end-of-stream are not errors: writes report them as
/// `Ok(0)` and reads as [`ReadOutcome::EndOfStream`](crate::ReadOutcome).
#[derive(Debug, Error)]
pub enum StreamError {
    /// I/O attempted on a stream that is already disconnected.
    #[error("stream {stream_id} is disconnected")]
    Disconnected { stream_id: u32 },

    /// Inbound data did not fit into the stream's receive buffer.
    #[error("inbound buffer of stream {stream_id} cannot take {len} more bytes (limit {limit})")]
    InboundOverflow {
        stream_id: u32,
        len: usize,
        limit: usize,
    },

    /// The connection refused to buffer a frame for this stream.
    #[error("write on stream {stream_id} failed: {source}")]
    Write {
        stream_id: u32,
        #[source]
        source: io::Error,
    },

    /// A window update drove the outbound window out of range.
    #[error("flow control error on stream {stream_id}: window would be {window}")]
    FlowControl { stream_id: u32, window: i64 },

    /// A DATA payload larger than the negotiated maximum frame size.
    #[error("DATA payload of {len} bytes exceeds max frame size {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Rejected [`StreamSettings`](crate::StreamSettings).
    #[error("invalid stream settings: {0}")]
    InvalidSettings(String),
}

impl StreamError {
    /// HTTP/2 error code a connection would put in RST_STREAM or GOAWAY.
    pub fn error_code(&self) -> u32 {
        match self {
            StreamError::Disconnected { .. } => error_code::STREAM_CLOSED,
            StreamError::FlowControl { .. } => error_code::FLOW_CONTROL_ERROR,
            StreamError::FrameTooLarge { .. } => error_code::FRAME_SIZE_ERROR,
            StreamError::InvalidSettings(_) => error_code::PROTOCOL_ERROR,
            StreamError::InboundOverflow { .. } | StreamError::Write { .. } => {
                error_code::INTERNAL_ERROR
            }
        }
    }

    /// True for violations the peer is responsible for.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, StreamError::FlowControl { .. })
    }
}
