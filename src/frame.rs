//! HTTP/2 frame header codec and the outbound frame builders used by streams
//! and their connection.
//!
//! Every frame starts with the same fixed 9-byte header (RFC 7540 Section 4.1):
//! 24-bit payload length, 8-bit type, 8-bit flags and a 31-bit stream
//! identifier whose high bit is reserved.

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// Largest payload a 24-bit length field can describe.
pub const MAX_FRAME_PAYLOAD: u32 = (1 << 24) - 1;

/// SETTINGS_MAX_FRAME_SIZE default and lower bound (RFC 7540 Section 6.5.2).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[allow(dead_code)]
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
#[allow(dead_code)]
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Control bits the connection passes along with the frames it demultiplexes
/// to a stream.
pub mod ctrl_flags {
    /// Peer will send nothing more on this stream.
    pub const FIN: u8 = 0x1;
    /// Stream is unidirectional: nothing will be sent locally.
    pub const UNIDIRECTIONAL: u8 = 0x2;
}

/// HTTP/2 error codes (RFC 7540 Section 7)
#[allow(dead_code)]
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const SETTINGS_TIMEOUT: u32 = 0x4;
    pub const STREAM_CLOSED: u32 = 0x5;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
    pub const CONNECT_ERROR: u32 = 0xa;
    pub const ENHANCE_YOUR_CALM: u32 = 0xb;
    pub const INADEQUATE_SECURITY: u32 = 0xc;
    pub const HTTP_1_1_REQUIRED: u32 = 0xd;
}

/// An HTTP/2 frame header (9 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H2FrameHeader {
    pub length: u32, // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32, // 31 bits (high bit reserved)
}

impl H2FrameHeader {
    pub fn new(length: u32, frame_type: u8, flags: u8, stream_id: u32) -> Self {
        Self {
            length: length & MAX_FRAME_PAYLOAD,
            frame_type,
            flags,
            stream_id: stream_id & STREAM_ID_MASK,
        }
    }

    /// Header for a DATA frame carrying `length` payload bytes, no flags.
    pub fn data(length: u32, stream_id: u32) -> Self {
        Self::new(length, frame_type::DATA, 0, stream_id)
    }

    /// Serialize into the 9-byte wire form.
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let len = self.length.to_be_bytes();
        let id = (self.stream_id & STREAM_ID_MASK).to_be_bytes();
        [len[1], len[2], len[3], self.frame_type, self.flags, id[0], id[1], id[2], id[3]]
    }

    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & STREAM_ID_MASK;

        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    /// Check if END_STREAM flag is set
    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    /// Check if END_HEADERS flag is set
    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }
}

/// Empty DATA frame with END_STREAM: the local FIN of a stream.
pub fn create_end_stream(stream_id: u32) -> [u8; FRAME_HEADER_LEN] {
    H2FrameHeader::new(0, frame_type::DATA, flags::END_STREAM, stream_id).encode()
}

/// Create a RST_STREAM frame
pub fn create_rst_stream(stream_id: u32, error_code: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 4);
    frame.extend_from_slice(&H2FrameHeader::new(4, frame_type::RST_STREAM, 0, stream_id).encode());
    frame.extend_from_slice(&error_code.to_be_bytes());
    frame
}

/// Create a WINDOW_UPDATE frame to replenish flow control window
/// stream_id=0 updates connection-level window, otherwise stream-level
pub fn create_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 4);
    frame.extend_from_slice(&H2FrameHeader::new(4, frame_type::WINDOW_UPDATE, 0, stream_id).encode());
    frame.extend_from_slice(&(increment & STREAM_ID_MASK).to_be_bytes());
    frame
}

/// Frame an encoded header block as HEADERS followed by as many CONTINUATION
/// frames as `max_frame_size` requires. END_HEADERS goes on the last frame,
/// END_STREAM (if requested) on the HEADERS frame.
pub fn create_header_frames(
    stream_id: u32,
    header_block: &[u8],
    end_stream: bool,
    max_frame_size: usize,
) -> Vec<u8> {
    let max = max_frame_size.max(1);
    let chunk_count = header_block.len().div_ceil(max).max(1);
    let mut out = Vec::with_capacity(header_block.len() + chunk_count * FRAME_HEADER_LEN);

    let mut chunks = header_block.chunks(max).peekable();
    let mut first = true;
    loop {
        let chunk = chunks.next().unwrap_or(&[]);
        let last = chunks.peek().is_none();

        let (ty, mut flags_byte) = if first {
            (frame_type::HEADERS, if end_stream { flags::END_STREAM } else { 0 })
        } else {
            (frame_type::CONTINUATION, 0)
        };
        if last {
            flags_byte |= flags::END_HEADERS;
        }

        out.extend_from_slice(&H2FrameHeader::new(chunk.len() as u32, ty, flags_byte, stream_id).encode());
        out.extend_from_slice(chunk);
        first = false;
        if last {
            break;
        }
    }
    out
}
