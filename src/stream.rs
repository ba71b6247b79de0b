//! A single HTTP/2 stream: lifecycle, inbound buffering, and outbound DATA
//! framing under stream- and connection-level flow control.
//!
//! The owning connection passes itself into every operation that needs it
//! and owns the stream's lifetime. A stream never emits bytes once it is
//! [`StreamState::Disconnected`].

use std::cell::OnceCell;
use std::fmt;
use std::io::IoSlice;
use std::net::SocketAddr;
use std::ops::{BitOr, BitOrAssign};
use std::time::Instant;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::{Result, StreamError};
use crate::flow_control::FlowWindow;
use crate::frame::{ctrl_flags, H2FrameHeader};
use crate::handler::StreamHandler;
use crate::hpack::H2Header;
use crate::inbound::InboundBuffer;
use crate::settings::StreamSettings;

/// Primary lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Open in both directions.
    Connected,
    /// Local FIN sent; buffered output may still be flushing.
    Shutdown,
    /// Terminal. Also the state of a stream that was never opened.
    #[default]
    Disconnected,
}

/// Independent condition bits carried alongside [`StreamState`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct StreamFlags(u8);

impl StreamFlags {
    pub const NONE: Self = Self(0);
    /// Handler wants read-ready notifications.
    pub const WANT_READ: Self = Self(1 << 0);
    /// Handler wants write-ready notifications.
    pub const WANT_WRITE: Self = Self(1 << 1);
    /// No output capacity until the next writable notification.
    pub const BUFFER_FULL: Self = Self(1 << 2);
    /// Peer sent END_STREAM.
    pub const PEER_SHUTDOWN: Self = Self(1 << 3);
    /// Nothing will be sent locally (unidirectional stream).
    pub const LOCAL_SHUTDOWN: Self = Self(1 << 4);
    /// The connection's output path failed or the stream was reset.
    pub const ABORT: Self = Self(1 << 5);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Map inbound control bits onto shutdown flags: FIN is peer shutdown,
    /// UNIDIRECTIONAL is local shutdown.
    pub const fn from_ctrl(ctrl: u8) -> Self {
        let mut bits = 0;
        if ctrl & ctrl_flags::FIN != 0 {
            bits |= Self::PEER_SHUTDOWN.0;
        }
        if ctrl & ctrl_flags::UNIDIRECTIONAL != 0 {
            bits |= Self::LOCAL_SHUTDOWN.0;
        }
        Self(bits)
    }
}

impl BitOr for StreamFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StreamFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StreamFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(StreamFlags, &str); 6] = [
            (StreamFlags::WANT_READ, "WANT_READ"),
            (StreamFlags::WANT_WRITE, "WANT_WRITE"),
            (StreamFlags::BUFFER_FULL, "BUFFER_FULL"),
            (StreamFlags::PEER_SHUTDOWN, "PEER_SHUTDOWN"),
            (StreamFlags::LOCAL_SHUTDOWN, "LOCAL_SHUTDOWN"),
            (StreamFlags::ABORT, "ABORT"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{}", name));
            }
        }
        set.finish()
    }
}

/// Result of [`H2Stream::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes copied out. Zero means nothing yet; more may arrive later.
    Data(usize),
    /// The peer finished sending and everything buffered has been read.
    EndOfStream,
}

#[derive(Debug, Clone, Copy)]
enum Notify {
    Connected,
    ReadReady,
    WriteReady,
    Close,
    Timer,
}

/// One request/response exchange multiplexed over a connection.
pub struct H2Stream {
    id: u32,
    state: StreamState,
    flags: StreamFlags,
    priority: u8,
    flow_control: bool,
    max_frame_size: usize,
    window_out: FlowWindow,
    window_in: FlowWindow,
    inbound: InboundBuffer,
    handler: Option<Box<dyn StreamHandler>>,
    log_id: OnceCell<String>,
    bytes_sent: u64,
    last_active: Instant,
}

impl fmt::Debug for H2Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("H2Stream")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("window_out", &self.window_out.available())
            .field("window_in", &self.window_in.available())
            .field("buffered_in", &self.inbound.len())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl Default for H2Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl H2Stream {
    /// An unopened stream slot, ready for [`open`](Self::open).
    pub fn new() -> Self {
        Self {
            id: 0,
            state: StreamState::Disconnected,
            flags: StreamFlags::NONE,
            priority: 0,
            flow_control: true,
            max_frame_size: crate::frame::DEFAULT_MAX_FRAME_SIZE as usize,
            window_out: FlowWindow::default(),
            window_in: FlowWindow::default(),
            inbound: InboundBuffer::default(),
            handler: None,
            log_id: OnceCell::new(),
            bytes_sent: 0,
            last_active: Instant::now(),
        }
    }

    /// (Re)initialize this slot as stream `id` and bind `handler` to it.
    ///
    /// `ctrl` carries the opening frame's control bits; `priority` is the
    /// weight from the opening frame, if any. Invalid `settings` leave the
    /// slot untouched and the handler unassigned.
    pub fn open(
        &mut self,
        id: u32,
        settings: &StreamSettings,
        ctrl: u8,
        priority: Option<u8>,
        mut handler: Box<dyn StreamHandler>,
    ) -> Result<()> {
        settings.validate()?;
        self.last_active = Instant::now();
        self.bytes_sent = 0;
        self.log_id = OnceCell::new();

        handler.on_assigned(id);
        self.handler = Some(handler);

        self.state = StreamState::Connected;
        self.flags = StreamFlags::from_ctrl(ctrl);

        self.inbound.reset(settings.max_inbound_buffer);
        self.id = id;
        self.flow_control = settings.flow_control;
        self.max_frame_size = settings.max_frame_size as usize;
        self.window_out = FlowWindow::new(settings.initial_window_out);
        self.window_in = FlowWindow::new(settings.initial_window_in);
        self.priority = priority.unwrap_or(0);

        debug!(stream_id = id, flags = ?self.flags, priority = self.priority, "stream opened");
        Ok(())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_flow_controlled(&self) -> bool {
        self.flow_control
    }

    pub fn window_out(&self) -> i64 {
        self.window_out.available()
    }

    pub fn window_in(&self) -> i64 {
        self.window_in.available()
    }

    /// Unread inbound bytes.
    pub fn buffered_in(&self) -> usize {
        self.inbound.len()
    }

    /// DATA payload bytes handed to the connection since open.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub fn is_want_read(&self) -> bool {
        self.flags.contains(StreamFlags::WANT_READ)
    }

    pub fn is_want_write(&self) -> bool {
        self.flags.contains(StreamFlags::WANT_WRITE)
    }

    pub fn is_aborted(&self) -> bool {
        self.flags.contains(StreamFlags::ABORT)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// `"<connection log id>-<stream id>"`, built on first use after open.
    pub fn log_id(&self, conn: &dyn Connection) -> &str {
        self.log_id
            .get_or_init(|| format!("{}-{}", conn.log_id(), self.id))
    }

    /// Remote address of the connection's network link.
    pub fn peer_addr(&self, conn: &dyn Connection) -> Option<SocketAddr> {
        conn.peer_addr()
    }

    /// Unbind the handler. The connection calls this before recycling or
    /// dropping a disconnected stream.
    pub fn detach_handler(&mut self) -> Option<Box<dyn StreamHandler>> {
        self.handler.take()
    }

    fn notify(&mut self, event: Notify, conn: &mut dyn Connection) {
        let Some(mut handler) = self.handler.take() else {
            return;
        };
        match event {
            Notify::Connected => handler.on_connected(self, conn),
            Notify::ReadReady => handler.on_read_ready(self, conn),
            Notify::WriteReady => handler.on_write_ready(self, conn),
            Notify::Close => handler.on_close(self, conn),
            Notify::Timer => handler.on_timer(self, conn),
        }
        // The handler may have detached itself or been replaced meanwhile.
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
    }

    /// Tell the handler the stream is usable, then replay any I/O interest
    /// it registered before being attached.
    pub fn notify_connected(&mut self, upgraded: bool, conn: &mut dyn Connection) {
        if !upgraded {
            self.notify(Notify::Connected, conn);
        }
        if self.is_want_read() {
            self.notify(Notify::ReadReady, conn);
        }
        if self.is_want_write() {
            self.notify(Notify::WriteReady, conn);
        }
    }

    pub fn on_timer(&mut self, conn: &mut dyn Connection) {
        self.notify(Notify::Timer, conn);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Send the local FIN. Only the first call on a connected stream emits it.
    pub fn send_fin(&mut self, conn: &mut dyn Connection) {
        if self.state != StreamState::Connected {
            return;
        }
        self.state = StreamState::Shutdown;
        debug!(log_id = %self.log_id(&*conn), "sending FIN");
        conn.send_fin_frame(self.id);
        conn.flush();
    }

    /// Close the stream: notify the handler, send FIN, and leave the
    /// connection to flush it. No-op unless connected.
    pub fn close(&mut self, conn: &mut dyn Connection) {
        if self.state != StreamState::Connected {
            return;
        }
        debug!(log_id = %self.log_id(&*conn), "closing");
        self.notify(Notify::Close, conn);
        self.send_fin(conn);
        self.flags.insert(StreamFlags::WANT_WRITE);
        self.state = StreamState::Disconnected;
        conn.continue_write();
    }

    /// Tear the stream down without a FIN, e.g. on RST_STREAM or a
    /// connection error. The handler hears `on_close` once.
    pub fn abort(&mut self, conn: &mut dyn Connection) {
        if self.state == StreamState::Disconnected {
            return;
        }
        debug!(log_id = %self.log_id(&*conn), state = ?self.state, "aborting");
        self.flags.insert(StreamFlags::ABORT);
        self.state = StreamState::Disconnected;
        self.notify(Notify::Close, conn);
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Queue payload bytes the connection demultiplexed to this stream.
    ///
    /// The inbound window is debited on receipt, not when the handler reads;
    /// the connection replenishes the peer's credit on its own schedule.
    pub fn append_data(&mut self, data: &[u8], ctrl: u8, conn: &mut dyn Connection) -> Result<usize> {
        if self.state == StreamState::Disconnected {
            return Err(StreamError::Disconnected { stream_id: self.id });
        }
        if let Err(overflow) = self.inbound.append(data) {
            warn!(log_id = %self.log_id(&*conn), len = overflow.len, limit = overflow.limit,
                "inbound buffer overflow");
            return Err(StreamError::InboundOverflow {
                stream_id: self.id,
                len: overflow.len,
                limit: overflow.limit,
            });
        }
        if self.flow_control {
            self.window_in.consume(data.len());
            if self.window_in.available() < 0 {
                warn!(log_id = %self.log_id(&*conn), window = self.window_in.available(),
                    "peer overran the inbound window");
            }
        }
        self.flags.insert(StreamFlags::from_ctrl(ctrl));
        trace!(log_id = %self.log_id(&*conn), len = data.len(), ctrl, "data received");

        if self.is_want_read() {
            self.notify(Notify::ReadReady, conn);
        }
        Ok(data.len())
    }

    /// Copy buffered inbound bytes into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if self.state == StreamState::Disconnected {
            return Err(StreamError::Disconnected { stream_id: self.id });
        }
        let n = self.inbound.drain_into(buf);
        if n == 0 {
            if self.inbound.is_empty() && self.flags.contains(StreamFlags::PEER_SHUTDOWN) {
                return Ok(ReadOutcome::EndOfStream);
            }
        } else {
            self.last_active = Instant::now();
        }
        Ok(ReadOutcome::Data(n))
    }

    /// Register read interest; fires read-ready at once if data is waiting.
    pub fn continue_read(&mut self, conn: &mut dyn Connection) {
        trace!(log_id = %self.log_id(&*conn), buffered = self.inbound.len(), "continue read");
        self.flags.insert(StreamFlags::WANT_READ);
        if !self.inbound.is_empty() {
            self.notify(Notify::ReadReady, conn);
        }
    }

    pub fn suspend_read(&mut self) {
        self.flags.remove(StreamFlags::WANT_READ);
    }

    /// Hand inbound credit back after the connection sent a WINDOW_UPDATE.
    ///
    /// A result past the maximum window is a flow-control error; an increment
    /// that is itself too large is rejected before touching the window.
    pub fn restore_window_in(&mut self, increment: u32) -> Result<i64> {
        let Ok(delta) = i32::try_from(increment) else {
            return Err(StreamError::FlowControl {
                stream_id: self.id,
                window: self.window_in.available() + i64::from(increment),
            });
        };
        self.window_in.adjust(delta).map_err(|e| StreamError::FlowControl {
            stream_id: self.id,
            window: e.window,
        })
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Register write interest and ask the connection to resume writing.
    pub fn continue_write(&mut self, conn: &mut dyn Connection) {
        trace!(log_id = %self.log_id(&*conn), "continue write");
        self.flags.insert(StreamFlags::WANT_WRITE);
        conn.continue_write();
    }

    pub fn suspend_write(&mut self) {
        self.flags.remove(StreamFlags::WANT_WRITE);
    }

    /// How many of `wanted` bytes may go out in one DATA frame right now.
    ///
    /// Returns 0 and arms write interest when the connection buffer is full
    /// or the stream window is spent.
    pub fn compute_sendable(&mut self, wanted: usize, conn: &mut dyn Connection) -> usize {
        if conn.is_out_buf_full() || (self.flow_control && self.window_out.is_exhausted()) {
            self.flags.insert(StreamFlags::BUFFER_FULL | StreamFlags::WANT_WRITE);
            conn.continue_write();
            return 0;
        }

        let mut allowed = wanted;
        if self.flow_control {
            allowed = allowed.min(self.window_out.sendable());
        }
        let conn_credit = usize::try_from(conn.data_out_window()).unwrap_or(0);
        if conn_credit == 0 && allowed > 0 {
            // Connection-level stall: wait for its WINDOW_UPDATE.
            self.flags.insert(StreamFlags::WANT_WRITE);
            conn.continue_write();
            return 0;
        }
        allowed.min(conn_credit).min(self.max_frame_size)
    }

    /// Send as much of `buf` as flow control allows, returning the count
    /// accepted. `Ok(0)` means wait for write-ready.
    pub fn write(&mut self, buf: &[u8], conn: &mut dyn Connection) -> Result<usize> {
        self.writev(&[IoSlice::new(buf)], conn)
    }

    /// Scatter-gather form of [`write`](Self::write). The accepted prefix of
    /// `bufs` goes out as one DATA frame.
    pub fn writev(&mut self, bufs: &[IoSlice<'_>], conn: &mut dyn Connection) -> Result<usize> {
        if self.state == StreamState::Disconnected {
            return Err(StreamError::Disconnected { stream_id: self.id });
        }
        if self.flags.contains(StreamFlags::BUFFER_FULL) {
            return Ok(0);
        }
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        let size = self.compute_sendable(total, conn);
        if size == 0 {
            return Ok(0);
        }
        if size < total {
            let trimmed = shrink_to(bufs, size);
            self.send_data(&trimmed, conn)
        } else {
            self.send_data(bufs, conn)
        }
    }

    /// Frame `bufs` as one DATA frame and hand it to the connection.
    ///
    /// The caller has already sized the payload; it must fit in one frame.
    pub fn send_data(&mut self, bufs: &[IoSlice<'_>], conn: &mut dyn Connection) -> Result<usize> {
        if self.state == StreamState::Disconnected {
            return Err(StreamError::Disconnected { stream_id: self.id });
        }
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        if total > self.max_frame_size {
            return Err(StreamError::FrameTooLarge {
                len: total,
                max: self.max_frame_size,
            });
        }

        let header = H2FrameHeader::data(total as u32, self.id).encode();
        let mut iov: SmallVec<[IoSlice<'_>; 8]> = SmallVec::with_capacity(bufs.len() + 1);
        iov.push(IoSlice::new(&header));
        iov.extend(bufs.iter().copied());

        let ret = conn.cache_writev(&iov);
        drop(iov);
        trace!(log_id = %self.log_id(&*conn), total, ok = ret.is_ok(), "DATA frame");
        if let Err(source) = ret {
            warn!(log_id = %self.log_id(&*conn), error = %source, "connection write failed");
            self.flags.insert(StreamFlags::ABORT);
            return Err(StreamError::Write {
                stream_id: self.id,
                source,
            });
        }

        self.last_active = Instant::now();
        self.bytes_sent += total as u64;
        conn.data_frame_sent(total);
        if self.flow_control {
            self.window_out.consume(total);
            if self.window_out.is_exhausted() {
                self.flags.insert(StreamFlags::BUFFER_FULL);
            }
        }
        Ok(total)
    }

    /// The connection has room again: clear backpressure and let the
    /// handler write.
    pub fn on_writable(&mut self, conn: &mut dyn Connection) {
        trace!(log_id = %self.log_id(&*conn), "writable");
        if conn.is_out_buf_full() {
            return;
        }
        if self.flow_control && self.window_out.is_exhausted() {
            return;
        }
        self.flags.remove(StreamFlags::BUFFER_FULL);

        if self.is_want_write() {
            self.notify(Notify::WriteReady, conn);
        }
        if self.is_want_write() {
            conn.continue_write();
        }
    }

    /// Apply a stream-level WINDOW_UPDATE.
    ///
    /// A result outside the legal window range is a flow-control error for
    /// the connection to act on; the window is left as computed.
    pub fn adjust_window_out(&mut self, delta: i32, conn: &mut dyn Connection) -> Result<()> {
        if !self.flow_control {
            return Ok(());
        }
        let adjusted = self.window_out.adjust(delta);
        debug!(log_id = %self.log_id(&*conn), delta, window = self.window_out.available(),
            "stream WINDOW_UPDATE");
        if let Err(e) = adjusted {
            return Err(StreamError::FlowControl {
                stream_id: self.id,
                window: e.window,
            });
        }
        self.resume_if_credited(conn);
        Ok(())
    }

    /// The peer changed SETTINGS_INITIAL_WINDOW_SIZE; shift the outbound
    /// window by the difference.
    pub fn update_initial_window_out(&mut self, new_initial: i32, conn: &mut dyn Connection) -> Result<()> {
        if !self.flow_control {
            return Ok(());
        }
        if let Err(e) = self.window_out.update_initial(new_initial) {
            return Err(StreamError::FlowControl {
                stream_id: self.id,
                window: e.window,
            });
        }
        if self.window_out.is_exhausted() {
            self.flags.insert(StreamFlags::BUFFER_FULL);
        } else {
            self.resume_if_credited(conn);
        }
        Ok(())
    }

    fn resume_if_credited(&mut self, conn: &mut dyn Connection) {
        if self.window_out.is_exhausted() {
            return;
        }
        if !conn.is_out_buf_full() {
            self.flags.remove(StreamFlags::BUFFER_FULL);
        }
        if self.is_want_write() {
            self.continue_write(conn);
        }
    }

    // ------------------------------------------------------------------
    // Headers
    // ------------------------------------------------------------------

    /// Queue the response headers; ordering and compression are the
    /// connection's.
    pub fn send_resp_headers(&mut self, headers: &[H2Header], conn: &mut dyn Connection) -> Result<usize> {
        if self.state == StreamState::Disconnected {
            return Err(StreamError::Disconnected { stream_id: self.id });
        }
        conn.move_to_resp_queue(self.id);
        conn.send_resp_headers(self.id, headers)
            .map_err(|source| StreamError::Write {
                stream_id: self.id,
                source,
            })
    }
}

/// The first `size` bytes of `bufs` as a new scatter list.
fn shrink_to<'b>(bufs: &'b [IoSlice<'_>], size: usize) -> SmallVec<[IoSlice<'b>; 8]> {
    let mut out = SmallVec::new();
    let mut left = size;
    for buf in bufs {
        if left == 0 {
            break;
        }
        let slice: &'b [u8] = buf;
        let take = left.min(slice.len());
        out.push(IoSlice::new(&slice[..take]));
        left -= take;
    }
    out
}
