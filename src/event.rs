//! Sort observation events.
//!
//! The sorter pushes [`SortEvent`]s into an [`EventSink`] in the exact order the
//! underlying steps happen: run creation in run id order, merge steps in
//! extraction order. The sorter knows nothing about who consumes them.

use std::sync::mpsc;

use serde::{Deserialize, Serialize};

/// Event emitted by a running sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortEvent {
    /// Free-form human readable status.
    Progress { message: String },
    /// A run was persisted. Carries the full sorted contents of the run.
    RunCreated { run_id: usize, values: Vec<f64> },
    /// One record was written to the output.
    MergeStep { value: f64, run_id: usize },
}

impl SortEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        SortEvent::Progress {
            message: message.into(),
        }
    }
}

/// Sort events consumer.
pub trait EventSink: Send {
    fn emit(&mut self, event: SortEvent);
}

impl<F> EventSink for F
where
    F: FnMut(SortEvent) + Send,
{
    fn emit(&mut self, event: SortEvent) {
        self(event)
    }
}

// A disconnected receiver means the observer is gone, the sort itself carries on.
impl EventSink for crossbeam_channel::Sender<SortEvent> {
    fn emit(&mut self, event: SortEvent) {
        if self.send(event).is_err() {
            log::trace!("event receiver disconnected");
        }
    }
}

impl EventSink for mpsc::Sender<SortEvent> {
    fn emit(&mut self, event: SortEvent) {
        if self.send(event).is_err() {
            log::trace!("event receiver disconnected");
        }
    }
}

impl EventSink for Vec<SortEvent> {
    fn emit(&mut self, event: SortEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;

    use super::{EventSink, SortEvent};

    #[test]
    fn test_closure_sink() {
        let mut count = 0;
        {
            let mut sink = |_event: SortEvent| count += 1;
            sink.emit(SortEvent::progress("a"));
            sink.emit(SortEvent::progress("b"));
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_channel_sinks_preserve_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = tx;
        sink.emit(SortEvent::MergeStep { value: 1.0, run_id: 2 });
        sink.emit(SortEvent::MergeStep { value: 2.0, run_id: 0 });
        drop(sink);

        let received: Vec<SortEvent> = rx.iter().collect();
        assert_eq!(
            received,
            vec![
                SortEvent::MergeStep { value: 1.0, run_id: 2 },
                SortEvent::MergeStep { value: 2.0, run_id: 0 },
            ]
        );
    }

    #[test]
    fn test_disconnected_sink_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut sink = tx;
        sink.emit(SortEvent::progress("nobody listens"));

        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        let mut sink = tx;
        sink.emit(SortEvent::progress("nobody listens"));
    }
}
