//! The application side of a stream.

use crate::connection::Connection;
use crate::stream::H2Stream;

/// Consumer/producer of a stream's bytes.
///
/// All callbacks are fire-and-forget notifications: the handler pulls data
/// with [`H2Stream::read`] and pushes data with [`H2Stream::write`] /
/// [`H2Stream::writev`] from inside them.
///
/// While a callback runs the handler is detached from the stream, so stream
/// operations it triggers from inside the callback (for example `close`) do
/// not re-enter it.
pub trait StreamHandler {
    /// The handler was bound to stream `stream_id` by [`H2Stream::open`].
    fn on_assigned(&mut self, _stream_id: u32) {}

    /// The logical connection for this stream is ready.
    fn on_connected(&mut self, _stream: &mut H2Stream, _conn: &mut dyn Connection) {}

    /// Inbound data (or end-of-stream) is available to [`H2Stream::read`].
    fn on_read_ready(&mut self, stream: &mut H2Stream, conn: &mut dyn Connection);

    /// Output capacity is available to [`H2Stream::write`].
    fn on_write_ready(&mut self, stream: &mut H2Stream, conn: &mut dyn Connection);

    /// The stream was closed or aborted.
    fn on_close(&mut self, _stream: &mut H2Stream, _conn: &mut dyn Connection) {}

    /// A timer tick delivered to this stream.
    fn on_timer(&mut self, _stream: &mut H2Stream, _conn: &mut dyn Connection) {}
}
