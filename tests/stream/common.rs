//! Shared fixtures: a handler that records what the stream told it.

use std::cell::RefCell;
use std::rc::Rc;

use h2_stream_core::{Connection, H2Stream, StreamHandler, StreamSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Assigned(u32),
    Connected,
    ReadReady,
    WriteReady,
    Close,
    Timer,
}

pub type Log = Rc<RefCell<Vec<Event>>>;
pub type Action = Box<dyn FnMut(&mut H2Stream, &mut dyn Connection)>;

#[derive(Default)]
pub struct Recorder {
    log: Log,
    on_read: Option<Action>,
    on_write: Option<Action>,
    on_close: Option<Action>,
}

impl Recorder {
    pub fn new() -> (Self, Log) {
        let recorder = Self::default();
        let log = recorder.log.clone();
        (recorder, log)
    }

    pub fn on_read(mut self, action: impl FnMut(&mut H2Stream, &mut dyn Connection) + 'static) -> Self {
        self.on_read = Some(Box::new(action));
        self
    }

    pub fn on_write(mut self, action: impl FnMut(&mut H2Stream, &mut dyn Connection) + 'static) -> Self {
        self.on_write = Some(Box::new(action));
        self
    }

    pub fn on_close(mut self, action: impl FnMut(&mut H2Stream, &mut dyn Connection) + 'static) -> Self {
        self.on_close = Some(Box::new(action));
        self
    }
}

impl StreamHandler for Recorder {
    fn on_assigned(&mut self, stream_id: u32) {
        self.log.borrow_mut().push(Event::Assigned(stream_id));
    }

    fn on_connected(&mut self, _stream: &mut H2Stream, _conn: &mut dyn Connection) {
        self.log.borrow_mut().push(Event::Connected);
    }

    fn on_read_ready(&mut self, stream: &mut H2Stream, conn: &mut dyn Connection) {
        self.log.borrow_mut().push(Event::ReadReady);
        if let Some(action) = self.on_read.as_mut() {
            action(stream, conn);
        }
    }

    fn on_write_ready(&mut self, stream: &mut H2Stream, conn: &mut dyn Connection) {
        self.log.borrow_mut().push(Event::WriteReady);
        if let Some(action) = self.on_write.as_mut() {
            action(stream, conn);
        }
    }

    fn on_close(&mut self, stream: &mut H2Stream, conn: &mut dyn Connection) {
        self.log.borrow_mut().push(Event::Close);
        if let Some(action) = self.on_close.as_mut() {
            action(stream, conn);
        }
    }

    fn on_timer(&mut self, _stream: &mut H2Stream, _conn: &mut dyn Connection) {
        self.log.borrow_mut().push(Event::Timer);
    }
}

/// Open stream `id` with a plain recorder.
pub fn open(id: u32, settings: &StreamSettings) -> (H2Stream, Log) {
    let (recorder, log) = Recorder::new();
    open_with(id, settings, 0, recorder, log)
}

pub fn open_with(id: u32, settings: &StreamSettings, ctrl: u8, recorder: Recorder, log: Log) -> (H2Stream, Log) {
    let mut stream = H2Stream::new();
    stream.open(id, settings, ctrl, None, Box::new(recorder)).unwrap();
    log.borrow_mut().clear();
    (stream, log)
}

pub fn events(log: &Log) -> Vec<Event> {
    log.borrow().clone()
}

pub fn count(log: &Log, event: Event) -> usize {
    log.borrow().iter().filter(|e| **e == event).count()
}
