//! HTTP/2 flow-control windows (RFC 7540 Section 6.9).

use thiserror::Error;

/// Largest legal flow-control window (2^31 - 1).
pub const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

/// Default initial window size (RFC 7540 Section 6.9.2).
pub const DEFAULT_INITIAL_WINDOW_SIZE: i32 = 65_535;

/// A window update left the window out of its legal range.
///
/// The window keeps the out-of-range value; the caller decides how to
/// terminate the stream or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("flow control window out of range: {window}")]
pub struct FlowControlError {
    pub window: i64,
}

/// A signed byte-credit counter for one direction of a stream or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowWindow {
    /// Current credit. Negative after a SETTINGS shrink or an overflowing update.
    available: i64,
    /// Initial size the window was opened with.
    initial: i32,
}

impl Default for FlowWindow {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_WINDOW_SIZE)
    }
}

impl FlowWindow {
    pub fn new(initial: i32) -> Self {
        Self {
            available: initial as i64,
            initial,
        }
    }

    /// Current credit.
    pub fn available(&self) -> i64 {
        self.available
    }

    /// No credit left: nothing may be sent against this window.
    pub fn is_exhausted(&self) -> bool {
        self.available <= 0
    }

    /// Credit clamped to what a single send may use.
    pub fn sendable(&self) -> usize {
        usize::try_from(self.available).unwrap_or(0)
    }

    /// Debit `n` bytes. Never fails; the window may drop to zero or below and
    /// the caller checks [`is_exhausted`](Self::is_exhausted).
    pub fn consume(&mut self, n: usize) {
        self.available -= n as i64;
    }

    /// Apply a peer-advertised increment (or a negative adjustment).
    ///
    /// The delta is always applied exactly; a result below zero or above
    /// [`MAX_WINDOW_SIZE`] is reported, not clamped.
    pub fn adjust(&mut self, delta: i32) -> Result<i64, FlowControlError> {
        self.available += delta as i64;
        if self.available < 0 || self.available > MAX_WINDOW_SIZE {
            return Err(FlowControlError { window: self.available });
        }
        Ok(self.available)
    }

    /// Re-base the window on a new initial size (SETTINGS_INITIAL_WINDOW_SIZE).
    /// Going negative is legal here; exceeding [`MAX_WINDOW_SIZE`] is not.
    pub fn update_initial(&mut self, new_initial: i32) -> Result<i64, FlowControlError> {
        let delta = new_initial as i64 - self.initial as i64;
        self.available += delta;
        self.initial = new_initial;
        if self.available > MAX_WINDOW_SIZE {
            return Err(FlowControlError { window: self.available });
        }
        Ok(self.available)
    }
}
