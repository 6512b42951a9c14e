//! MessagePack event trace.
//!
//! A trace is a plain concatenation of MessagePack encoded [`SortEvent`]s. It lets an
//! out-of-process viewer replay a sort. For more information see https://msgpack.org/.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;

use crate::event::{EventSink, SortEvent};

/// Trace reading error.
#[derive(Debug)]
pub enum TraceError {
    /// Common I/O error.
    IO(io::Error),
    /// Event deserialization error.
    DeserializationError(rmp_serde::decode::Error),
}

impl Error for TraceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            TraceError::IO(err) => err,
            TraceError::DeserializationError(err) => err,
        })
    }
}

impl Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            TraceError::IO(err) => write!(f, "I/O operation failed: {}", err),
            TraceError::DeserializationError(err) => write!(f, "event deserialization error: {}", err),
        }
    }
}

/// Event sink appending every event to a MessagePack trace.
///
/// Tracing never fails a sort: after the first write error the error is logged
/// and the trace stops recording.
pub struct TraceWriter<W: Write + Send> {
    writer: Option<W>,
    events: u64,
}

impl<W: Write + Send> TraceWriter<W> {
    pub fn new(writer: W) -> Self {
        TraceWriter {
            writer: Some(writer),
            events: 0,
        }
    }

    /// Number of events recorded so far.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Checks whether the trace stopped recording after a write error.
    pub fn is_broken(&self) -> bool {
        self.writer.is_none()
    }

    /// Flushes the trace and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<Option<W>> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(self.writer.take())
    }
}

impl<W: Write + Send> EventSink for TraceWriter<W> {
    fn emit(&mut self, event: SortEvent) {
        if let Some(writer) = self.writer.as_mut() {
            match rmp_serde::encode::write(writer, &event) {
                Ok(()) => self.events += 1,
                Err(err) => {
                    log::error!("event trace disabled after {} events: {}", self.events, err);
                    self.writer = None;
                }
            }
        }
    }
}

/// Reads all events of a trace.
pub fn read_trace<R: Read>(mut reader: R) -> Result<Vec<SortEvent>, TraceError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(TraceError::IO)?;

    let len = buf.len() as u64;
    let mut cursor = io::Cursor::new(buf);
    let mut events = Vec::new();

    while cursor.position() < len {
        let event = rmp_serde::decode::from_read(&mut cursor).map_err(TraceError::DeserializationError)?;
        events.push(event);
    }

    return Ok(events);
}

#[cfg(test)]
mod test {
    use std::io;

    use super::{read_trace, TraceError, TraceWriter};
    use crate::event::{EventSink, SortEvent};

    struct FailingWriter;

    impl io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_trace_replay() {
        let events = vec![
            SortEvent::progress("Starting sort..."),
            SortEvent::RunCreated {
                run_id: 0,
                values: vec![-1.25, 3.0],
            },
            SortEvent::MergeStep { value: -1.25, run_id: 0 },
            SortEvent::MergeStep { value: 3.0, run_id: 0 },
            SortEvent::progress("Sort complete."),
        ];

        let mut trace = TraceWriter::new(Vec::new());
        for event in events.clone() {
            trace.emit(event);
        }
        assert_eq!(trace.events(), 5);

        let buf = trace.finish().unwrap().unwrap();
        let replayed = read_trace(io::Cursor::new(buf)).unwrap();
        assert_eq!(replayed, events);
    }

    #[test]
    fn test_empty_trace() {
        assert!(read_trace(io::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_trace() {
        let mut trace = TraceWriter::new(Vec::new());
        trace.emit(SortEvent::progress("Starting sort..."));
        let mut buf = trace.finish().unwrap().unwrap();
        buf.pop();

        assert!(matches!(
            read_trace(io::Cursor::new(buf)),
            Err(TraceError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_write_failure_disables_trace() {
        let mut trace = TraceWriter::new(FailingWriter);
        trace.emit(SortEvent::progress("lost"));
        trace.emit(SortEvent::progress("ignored"));

        assert!(trace.is_broken());
        assert_eq!(trace.events(), 0);
    }
}
