//! `ext-sort-stepper` is an observable, steppable external sort of binary `f64` files.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts blocks of data that each fit in RAM, during the second pass it merges the sorted runs
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Fixed-width records:**
//!   input and output files are raw concatenations of 8-byte native-endian IEEE-754 doubles,
//!   without any header.
//! * **Observable:**
//!   every created run and every merge step is pushed as a [`SortEvent`] into an [`EventSink`]
//!   (a closure, a channel or a MessagePack trace).
//! * **Steppable:**
//!   a sort started by a [`SortController`] runs on a worker thread and its merge phase can be
//!   paused, resumed, single-stepped, throttled or cancelled.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use ext_sort_stepper::{data, SortConfig, SortController, SortEvent};
//!
//! fn main() {
//!     data::generate_data(Path::new("input.bin"), 1000).unwrap();
//!
//!     let (tx, rx) = crossbeam_channel::unbounded();
//!     let mut controller = SortController::new();
//!     let config = SortConfig::new(100).with_delay(Duration::from_millis(10));
//!     controller.start("input.bin", "output.bin", config, tx).unwrap();
//!
//!     for event in rx.iter() {
//!         if let SortEvent::MergeStep { value, run_id } = event {
//!             println!("{} from run {}", value, run_id);
//!         }
//!     }
//!
//!     let stats = controller.wait().unwrap();
//!     println!("{} records sorted using {} runs", stats.records, stats.runs);
//! }
//! ```

pub mod buffer;
pub mod control;
pub mod data;
pub mod event;
pub mod merger;
pub mod record;
pub mod run;
pub mod sort;
pub mod trace;

pub use buffer::BlockBuffer;
pub use control::{ExecutionState, SortStatus};
pub use event::{EventSink, SortEvent};
pub use merger::{BinaryHeapMerger, MergeItem};
pub use record::Record;
pub use run::{Run, RunReader, RunStore, RunWriter};
pub use sort::{ExternalSorter, SortConfig, SortController, SortError, SortStats};
pub use trace::{read_trace, TraceError, TraceWriter};
