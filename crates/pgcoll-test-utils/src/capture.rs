//! A `log` backend that keeps records in memory, per thread.
//!
//! Tests in one binary run on separate threads but share the one global
//! logger, so [`take_thread_events`] only returns what the calling thread
//! logged. [`install`] is idempotent; a binary that uses this module must
//! not install another logger.

use std::sync::{Mutex, Once, PoisonError};
use std::thread::{self, ThreadId};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// One captured log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub target: String,
    pub message: String,
}

struct Capture {
    events: Mutex<Vec<(ThreadId, Event)>>,
}

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let event = Event {
            level: record.level(),
            target: record.target().to_owned(),
            message: record.args().to_string(),
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((thread::current().id(), event));
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture {
    events: Mutex::new(Vec::new()),
};

static INSTALL: Once = Once::new();

/// Route every log record, down to `trace`, into memory.
pub fn install() {
    INSTALL.call_once(|| {
        if log::set_logger(&CAPTURE).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}

/// Remove and return the records logged so far by the calling thread.
pub fn take_thread_events() -> Vec<Event> {
    let me = thread::current().id();
    let mut events = CAPTURE
        .events
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let (mine, others): (Vec<_>, Vec<_>) = events.drain(..).partition(|(id, _)| *id == me);
    *events = others;
    mine.into_iter().map(|(_, e)| e).collect()
}
