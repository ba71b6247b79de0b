//! Tests for the send path: write, writev, send_data, on_writable

use std::io::IoSlice;

use h2_stream_core::{
    frame_type, BufferedConnection, Connection, H2FrameHeader, StreamError, StreamFlags,
    StreamSettings,
};

use crate::common::{count, events, open, open_with, Event, Recorder};

/// Split buffered output into (header, payload) pairs.
fn frames(out: &[u8]) -> Vec<(H2FrameHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    let mut rest = out;
    while let Some(header) = H2FrameHeader::parse(rest) {
        let end = header.total_size();
        frames.push((header, rest[9..end].to_vec()));
        rest = &rest[end..];
    }
    assert!(rest.is_empty(), "trailing partial frame");
    frames
}

#[test]
fn test_write_frames_one_data_frame() {
    let mut conn = BufferedConnection::new("c");
    let (mut stream, _) = open(3, &StreamSettings::default());

    assert_eq!(stream.write(b"hello", &mut conn).unwrap(), 5);

    let out = frames(&conn.take_output());
    assert_eq!(out.len(), 1);
    let (header, payload) = &out[0];
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(header.flags, 0);
    assert_eq!(header.stream_id, 3);
    assert_eq!(header.length, 5);
    assert_eq!(payload, b"hello");

    assert_eq!(stream.bytes_sent(), 5);
    assert_eq!(stream.window_out(), 65_535 - 5);
    assert_eq!(conn.data_out_window(), 65_535 - 5);
}

#[test]
fn test_window_and_frame_size_scenario() {
    let mut conn = BufferedConnection::new("c");
    let settings = StreamSettings::new()
        .with_initial_window_out(100)
        .with_max_frame_size(64);
    let (mut stream, _) = open(1, &settings);
    let payload = [7u8; 150];

    assert_eq!(stream.write(&payload, &mut conn).unwrap(), 64);
    assert_eq!(stream.window_out(), 36);
    assert!(!stream.flags().contains(StreamFlags::BUFFER_FULL));

    assert_eq!(stream.write(&payload[64..], &mut conn).unwrap(), 36);
    assert_eq!(stream.window_out(), 0);
    assert!(stream.flags().contains(StreamFlags::BUFFER_FULL));

    assert_eq!(stream.write(&payload[100..], &mut conn).unwrap(), 0);
    assert_eq!(stream.write(&payload[100..], &mut conn).unwrap(), 0);

    stream.adjust_window_out(50, &mut conn).unwrap();
    assert_eq!(stream.window_out(), 50);
    assert!(!stream.flags().contains(StreamFlags::BUFFER_FULL));
    assert_eq!(stream.write(&payload[100..], &mut conn).unwrap(), 50);

    let sizes: Vec<u32> = frames(&conn.take_output()).iter().map(|(h, _)| h.length).collect();
    assert_eq!(sizes, vec![64, 36, 50]);
}

#[test]
fn test_write_bounded_by_connection_credit() {
    let mut conn = BufferedConnection::new("c").with_window(10);
    let (mut stream, _) = open(1, &StreamSettings::default());

    assert_eq!(stream.write(&[1u8; 25], &mut conn).unwrap(), 10);
    assert_eq!(conn.data_out_window(), 0);

    // Connection credit gone: nothing more, and write interest is armed.
    assert_eq!(stream.write(&[1u8; 15], &mut conn).unwrap(), 0);
    assert!(stream.is_want_write());
    assert!(conn.take_write_pending());
    // The stream window is fine, so the stream itself is not backpressured.
    assert!(!stream.flags().contains(StreamFlags::BUFFER_FULL));

    conn.adjust_window(15).unwrap();
    assert_eq!(stream.write(&[1u8; 15], &mut conn).unwrap(), 15);
}

#[test]
fn test_full_output_buffer_is_backpressure() {
    let mut conn = BufferedConnection::new("c").with_high_water(20);
    let (mut stream, _) = open(1, &StreamSettings::default());

    assert_eq!(stream.write(&[0u8; 15], &mut conn).unwrap(), 15);
    assert_eq!(stream.write(b"more", &mut conn).unwrap(), 0);
    assert!(stream.flags().contains(StreamFlags::BUFFER_FULL | StreamFlags::WANT_WRITE));
    assert!(conn.take_write_pending());
}

#[test]
fn test_writev_trims_scatter_list() {
    let mut conn = BufferedConnection::new("c");
    let settings = StreamSettings::new().with_max_frame_size(8);
    let (mut stream, _) = open(1, &settings);

    let bufs = [IoSlice::new(b"abc"), IoSlice::new(b"defgh"), IoSlice::new(b"ijk")];
    assert_eq!(stream.writev(&bufs, &mut conn).unwrap(), 8);

    let out = frames(&conn.take_output());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].1, b"abcdefgh");
}

#[test]
fn test_writev_sends_whole_list_when_it_fits() {
    let mut conn = BufferedConnection::new("c");
    let (mut stream, _) = open(1, &StreamSettings::default());

    let bufs = [IoSlice::new(b"head:"), IoSlice::new(b"body")];
    assert_eq!(stream.writev(&bufs, &mut conn).unwrap(), 9);
    assert_eq!(frames(&conn.take_output())[0].1, b"head:body");
}

#[test]
fn test_empty_write_sends_nothing() {
    let mut conn = BufferedConnection::new("c");
    let (mut stream, _) = open(1, &StreamSettings::default());
    assert_eq!(stream.write(b"", &mut conn).unwrap(), 0);
    assert!(conn.take_output().is_empty());
}

#[test]
fn test_write_failure_aborts_stream() {
    let mut conn = BufferedConnection::new("c");
    let (mut stream, _) = open(1, &StreamSettings::default());
    conn.shutdown();

    let err = stream.write(b"doomed", &mut conn).unwrap_err();
    assert!(matches!(err, StreamError::Write { stream_id: 1, .. }));
    assert!(stream.is_aborted());
    assert_eq!(stream.window_out(), 65_535);
    assert_eq!(stream.bytes_sent(), 0);
}

#[test]
fn test_send_data_rejects_oversized_payload() {
    let mut conn = BufferedConnection::new("c");
    let settings = StreamSettings::new().with_max_frame_size(4);
    let (mut stream, _) = open(1, &settings);
    let err = stream.send_data(&[IoSlice::new(b"12345")], &mut conn).unwrap_err();
    assert!(matches!(err, StreamError::FrameTooLarge { len: 5, max: 4 }));
    assert!(conn.take_output().is_empty());
}

#[test]
fn test_send_data_refused_once_disconnected() {
    let mut conn = BufferedConnection::new("c");
    let (mut stream, _) = open(1, &StreamSettings::default());
    stream.close(&mut conn);
    conn.take_output();

    let err = stream.send_data(&[IoSlice::new(b"late")], &mut conn).unwrap_err();
    assert!(matches!(err, StreamError::Disconnected { stream_id: 1 }));
    assert!(conn.take_output().is_empty());
    assert_eq!(stream.bytes_sent(), 0);

    let (mut stream, _) = open(3, &StreamSettings::default());
    stream.abort(&mut conn);
    let err = stream.send_data(&[IoSlice::new(b"late")], &mut conn).unwrap_err();
    assert!(matches!(err, StreamError::Disconnected { stream_id: 3 }));
    assert!(conn.take_output().is_empty());
    assert_eq!(conn.data_bytes_sent(), 0);
}

#[test]
fn test_unflow_controlled_stream_ignores_window() {
    let mut conn = BufferedConnection::new("c");
    let settings = StreamSettings::new()
        .with_initial_window_out(0)
        .with_flow_control(false);
    let (mut stream, _) = open(1, &settings);

    assert_eq!(stream.write(b"control", &mut conn).unwrap(), 7);
    assert_eq!(stream.window_out(), 0);
    assert!(!stream.flags().contains(StreamFlags::BUFFER_FULL));
}

#[test]
fn test_on_writable_clears_backpressure_and_notifies() {
    let mut conn = BufferedConnection::new("c").with_high_water(10);
    let (mut stream, log) = open(1, &StreamSettings::default());

    assert_eq!(stream.write(&[0u8; 5], &mut conn).unwrap(), 5);
    assert_eq!(stream.write(b"x", &mut conn).unwrap(), 0);

    // Still full: nothing happens.
    stream.on_writable(&mut conn);
    assert!(events(&log).is_empty());

    conn.take_output();
    conn.take_write_pending();
    stream.on_writable(&mut conn);
    assert_eq!(events(&log), vec![Event::WriteReady]);
    assert!(!stream.flags().contains(StreamFlags::BUFFER_FULL));
    // Handler did not drop interest, so the continuation is re-armed.
    assert!(conn.take_write_pending());
}

#[test]
fn test_on_writable_noop_while_window_spent() {
    let mut conn = BufferedConnection::new("c");
    let settings = StreamSettings::new().with_initial_window_out(4);
    let (mut stream, log) = open(1, &settings);
    stream.continue_write(&mut conn);
    stream.write(b"1234", &mut conn).unwrap();

    stream.on_writable(&mut conn);
    assert!(events(&log).is_empty());
    assert!(stream.flags().contains(StreamFlags::BUFFER_FULL));
}

#[test]
fn test_handler_writes_until_done_then_suspends() {
    let mut conn = BufferedConnection::new("c");
    let body = vec![9u8; 40];
    let mut offset = 0;
    let (recorder, log) = Recorder::new();
    let recorder = recorder.on_write(move |stream, conn| {
        while offset < body.len() {
            let n = stream.write(&body[offset..], conn).unwrap();
            if n == 0 {
                return;
            }
            offset += n;
        }
        stream.suspend_write();
        stream.close(conn);
    });
    let settings = StreamSettings::new().with_max_frame_size(16);
    let (mut stream, log) = open_with(1, &settings, 0, recorder, log);

    stream.continue_write(&mut conn);
    stream.on_writable(&mut conn);

    assert_eq!(count(&log, Event::WriteReady), 1);
    let out = frames(&conn.take_output());
    let sizes: Vec<u32> = out.iter().map(|(h, _)| h.length).collect();
    assert_eq!(sizes, vec![16, 16, 8, 0]);
    assert!(out[3].0.is_end_stream());
}
