//! Per-stream configuration handed to [`H2Stream::open`](crate::H2Stream::open).

use crate::error::{Result, StreamError};
use crate::flow_control::DEFAULT_INITIAL_WINDOW_SIZE;
use crate::frame::{DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_PAYLOAD};
use crate::inbound::DEFAULT_MAX_INBOUND_BUFFER;

/// Window sizes and limits negotiated by the connection for its streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Peer's SETTINGS_INITIAL_WINDOW_SIZE: credit we may send against.
    pub initial_window_out: i32,
    /// Our own SETTINGS_INITIAL_WINDOW_SIZE: credit the peer may send against.
    pub initial_window_in: i32,
    /// Largest DATA payload we put in one frame.
    pub max_frame_size: u32,
    /// Cap on unread inbound bytes held per stream.
    pub max_inbound_buffer: usize,
    /// Whether windows apply at all. Control streams are exempt.
    pub flow_control: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            initial_window_out: DEFAULT_INITIAL_WINDOW_SIZE,
            initial_window_in: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_inbound_buffer: DEFAULT_MAX_INBOUND_BUFFER,
            flow_control: true,
        }
    }
}

impl StreamSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_window_out(mut self, size: i32) -> Self {
        self.initial_window_out = size;
        self
    }

    pub fn with_initial_window_in(mut self, size: i32) -> Self {
        self.initial_window_in = size;
        self
    }

    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_max_inbound_buffer(mut self, limit: usize) -> Self {
        self.max_inbound_buffer = limit;
        self
    }

    pub fn with_flow_control(mut self, enabled: bool) -> Self {
        self.flow_control = enabled;
        self
    }

    /// Check the values against the protocol's legal ranges.
    ///
    /// `max_frame_size` below the 16384 protocol floor is accepted so a
    /// connection may frame more conservatively than it must.
    pub fn validate(&self) -> Result<()> {
        if self.initial_window_out < 0 || self.initial_window_in < 0 {
            return Err(StreamError::InvalidSettings(format!(
                "initial windows must be non-negative (out {}, in {})",
                self.initial_window_out, self.initial_window_in
            )));
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_FRAME_PAYLOAD {
            return Err(StreamError::InvalidSettings(format!(
                "max frame size {} outside 1..={}",
                self.max_frame_size, MAX_FRAME_PAYLOAD
            )));
        }
        Ok(())
    }
}
