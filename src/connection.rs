//! What a stream needs from the connection that owns it, plus a sans-I/O
//! connection that buffers framed output for a transport to drain.

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::flow_control::{FlowControlError, FlowWindow, DEFAULT_INITIAL_WINDOW_SIZE};
use crate::frame::{self, DEFAULT_MAX_FRAME_SIZE};
use crate::hpack::{H2Header, HpackEncoder};

/// Connection services a stream calls into.
///
/// The connection owns its streams and passes itself into every stream
/// operation that needs it, so a stream never holds a reference back.
pub trait Connection {
    /// Identifier used as the prefix of each stream's log id.
    fn log_id(&self) -> &str;

    /// The connection's output buffer is saturated; nothing more should be queued.
    fn is_out_buf_full(&self) -> bool;

    /// Connection-level output credit currently available for DATA.
    fn data_out_window(&self) -> i64;

    /// Buffer a framed payload for the wire, returning the bytes accepted.
    fn cache_writev(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Arrange for pending stream writes to be resumed when capacity frees up.
    fn continue_write(&mut self);

    /// Push buffered output towards the transport.
    fn flush(&mut self);

    /// Account `len` DATA payload bytes against the connection-level window.
    fn data_frame_sent(&mut self, len: usize);

    /// Queue the end-of-stream control frame for `stream_id`.
    fn send_fin_frame(&mut self, stream_id: u32);

    /// Put `stream_id` on the queue that orders pending responses.
    fn move_to_resp_queue(&mut self, stream_id: u32);

    /// Compress and queue response headers for `stream_id`.
    fn send_resp_headers(&mut self, stream_id: u32, headers: &[H2Header]) -> io::Result<usize>;

    /// Remote address of the underlying network link, if known.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Default output high-water mark for [`BufferedConnection`].
pub const DEFAULT_OUT_BUF_HIGH_WATER: usize = 64 * 1024;

/// A connection that frames into an in-memory buffer.
///
/// The transport drains [`take_output`](Self::take_output) and, when
/// [`take_write_pending`](Self::take_write_pending) reports interest, calls
/// `on_writable` on the streams that asked to continue writing.
#[derive(Debug)]
pub struct BufferedConnection {
    log_id: String,
    out: BytesMut,
    high_water: usize,
    window_out: FlowWindow,
    max_frame_size: usize,
    encoder: HpackEncoder,
    resp_queue: VecDeque<u32>,
    write_pending: bool,
    flushes: usize,
    data_bytes_sent: u64,
    closed: bool,
    peer: Option<SocketAddr>,
}

impl BufferedConnection {
    pub fn new(log_id: impl Into<String>) -> Self {
        Self {
            log_id: log_id.into(),
            out: BytesMut::new(),
            high_water: DEFAULT_OUT_BUF_HIGH_WATER,
            window_out: FlowWindow::new(DEFAULT_INITIAL_WINDOW_SIZE),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE as usize,
            encoder: HpackEncoder::new(),
            resp_queue: VecDeque::new(),
            write_pending: false,
            flushes: 0,
            data_bytes_sent: 0,
            closed: false,
            peer: None,
        }
    }

    pub fn with_high_water(mut self, high_water: usize) -> Self {
        self.high_water = high_water;
        self
    }

    pub fn with_window(mut self, initial: i32) -> Self {
        self.window_out = FlowWindow::new(initial);
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer = Some(addr);
        self
    }

    /// Everything framed so far; the buffer is left empty.
    pub fn take_output(&mut self) -> Bytes {
        self.out.split().freeze()
    }

    pub fn buffered(&self) -> usize {
        self.out.len()
    }

    /// Whether some stream asked to continue writing since the last call.
    pub fn take_write_pending(&mut self) -> bool {
        std::mem::take(&mut self.write_pending)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    pub fn data_bytes_sent(&self) -> u64 {
        self.data_bytes_sent
    }

    /// Connection-level WINDOW_UPDATE from the peer.
    pub fn adjust_window(&mut self, delta: i32) -> Result<i64, FlowControlError> {
        self.window_out.adjust(delta)
    }

    /// Streams with responses pending, oldest first.
    pub fn response_queue(&self) -> &VecDeque<u32> {
        &self.resp_queue
    }

    pub fn pop_response(&mut self) -> Option<u32> {
        self.resp_queue.pop_front()
    }

    /// Give inbound credit back to the peer.
    pub fn send_window_update(&mut self, stream_id: u32, increment: u32) {
        self.out.extend_from_slice(&frame::create_window_update(stream_id, increment));
    }

    pub fn send_rst_stream(&mut self, stream_id: u32, error_code: u32) {
        debug!(log_id = %self.log_id, stream_id, error_code, "queueing RST_STREAM");
        self.out.extend_from_slice(&frame::create_rst_stream(stream_id, error_code));
    }

    /// The transport went away: every further write fails.
    pub fn shutdown(&mut self) {
        self.closed = true;
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        Ok(())
    }
}

impl Connection for BufferedConnection {
    fn log_id(&self) -> &str {
        &self.log_id
    }

    fn is_out_buf_full(&self) -> bool {
        self.out.len() >= self.high_water
    }

    fn data_out_window(&self) -> i64 {
        self.window_out.available()
    }

    fn cache_writev(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.ensure_open()?;
        let mut written = 0;
        for buf in bufs {
            self.out.extend_from_slice(buf);
            written += buf.len();
        }
        trace!(log_id = %self.log_id, written, buffered = self.out.len(), "cached frame");
        Ok(written)
    }

    fn continue_write(&mut self) {
        self.write_pending = true;
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn data_frame_sent(&mut self, len: usize) {
        self.window_out.consume(len);
        self.data_bytes_sent += len as u64;
    }

    fn send_fin_frame(&mut self, stream_id: u32) {
        self.out.extend_from_slice(&frame::create_end_stream(stream_id));
    }

    fn move_to_resp_queue(&mut self, stream_id: u32) {
        if !self.resp_queue.contains(&stream_id) {
            self.resp_queue.push_back(stream_id);
        }
    }

    fn send_resp_headers(&mut self, stream_id: u32, headers: &[H2Header]) -> io::Result<usize> {
        self.ensure_open()?;
        let block = self.encoder.encode(headers);
        let frames = frame::create_header_frames(stream_id, &block, false, self.max_frame_size);
        self.out.extend_from_slice(&frames);
        Ok(frames.len())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}
