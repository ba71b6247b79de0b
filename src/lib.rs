//! h2-stream-core: the per-stream half of a sans-I/O HTTP/2 engine
//!
//! An [`H2Stream`] is one request/response exchange multiplexed over a
//! connection. It buffers inbound DATA until its handler reads it, and frames
//! outbound bytes into DATA frames while honouring the stream window, the
//! connection window, the maximum frame size and output-buffer backpressure.
//!
//! # Features
//!
//! - **Sans-I/O Design**: the stream never touches a socket; the owning
//!   connection is passed into each call through the [`Connection`] trait
//! - **Flow Control**: signed windows with overflow detection and
//!   anticipatory backpressure once a window is spent
//! - **Partial Writes**: `write`/`writev` accept what fits and report it
//! - **Explicit Lifecycle**: Connected, Shutdown (FIN sent), Disconnected
//!
//! # Quick Start
//!
//! ```rust
//! use h2_stream_core::{
//!     BufferedConnection, Connection, H2Stream, ReadOutcome, StreamHandler, StreamSettings,
//! };
//!
//! struct Echo;
//!
//! impl StreamHandler for Echo {
//!     fn on_read_ready(&mut self, stream: &mut H2Stream, conn: &mut dyn Connection) {
//!         let mut buf = [0u8; 64];
//!         while let Ok(ReadOutcome::Data(n)) = stream.read(&mut buf) {
//!             if n == 0 {
//!                 break;
//!             }
//!             stream.write(&buf[..n], conn).unwrap();
//!         }
//!     }
//!
//!     fn on_write_ready(&mut self, _stream: &mut H2Stream, _conn: &mut dyn Connection) {}
//! }
//!
//! let mut conn = BufferedConnection::new("127.0.0.1:443#1");
//! let mut stream = H2Stream::new();
//! stream.open(1, &StreamSettings::default(), 0, None, Box::new(Echo)).unwrap();
//! stream.continue_read(&mut conn);
//!
//! stream.append_data(b"ping", 0, &mut conn).unwrap();
//! // 9-byte DATA header + echoed payload
//! assert_eq!(conn.take_output().len(), 9 + 4);
//! ```
//!
//! # Architecture
//!
//! - [`frame`]: 9-byte frame header codec and outbound frame builders
//! - [`flow_control`]: [`FlowWindow`] credit counters
//! - [`inbound`]: [`InboundBuffer`] for received bytes
//! - [`stream`]: [`H2Stream`], its state machine and flags
//! - [`connection`]: the [`Connection`] contract and [`BufferedConnection`]
//! - [`handler`]: the [`StreamHandler`] contract
//!
//! It does NOT provide frame parsing for the connection, settings
//! negotiation, priority scheduling or TLS.

pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frame;
pub mod handler;
pub mod hpack;
pub mod inbound;
pub mod settings;
pub mod stream;

pub use connection::{BufferedConnection, Connection, DEFAULT_OUT_BUF_HIGH_WATER};
pub use error::{Result, StreamError};
pub use flow_control::{FlowControlError, FlowWindow, DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
pub use frame::{
    ctrl_flags, error_code, flags, frame_type, H2FrameHeader, DEFAULT_MAX_FRAME_SIZE,
    FRAME_HEADER_LEN,
};
pub use handler::StreamHandler;
pub use hpack::{H2Header, HpackEncoder};
pub use inbound::{BufferOverflow, InboundBuffer};
pub use settings::StreamSettings;
pub use stream::{H2Stream, ReadOutcome, StreamFlags, StreamState};
