//! External sorter.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log;

use crate::buffer::BlockBuffer;
use crate::control::{ExecutionState, SortStatus};
use crate::event::{EventSink, SortEvent};
use crate::merger::BinaryHeapMerger;
use crate::record;
use crate::run::{Run, RunStore};

/// Default number of records sorted in memory per run.
pub const DEFAULT_BLOCK_SIZE: usize = 10;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Block size is less than one record.
    InvalidBlockSize(usize),
    /// Input file opening or reading error.
    Input(io::Error),
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Run file creation or writing error.
    RunCreate(io::Error),
    /// Run file opening or reading error.
    RunRead(io::Error),
    /// Output file creation or writing error.
    Output(io::Error),
    /// A sort is already in progress on the controller.
    AlreadyRunning,
    /// No sort has been started on the controller.
    NotStarted,
    /// The sort was cancelled by the controller.
    Cancelled,
    /// Worker thread spawning error.
    Spawn(io::Error),
    /// Worker thread panicked.
    WorkerPanicked,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Input(err) => Some(err),
            SortError::TempDir(err) => Some(err),
            SortError::RunCreate(err) => Some(err),
            SortError::RunRead(err) => Some(err),
            SortError::Output(err) => Some(err),
            SortError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidBlockSize(size) => write!(f, "block size must be at least 1, got {}", size),
            SortError::Input(err) => write!(f, "input file error: {}", err),
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::RunCreate(err) => write!(f, "run file not created: {}", err),
            SortError::RunRead(err) => write!(f, "run file reading error: {}", err),
            SortError::Output(err) => write!(f, "output file error: {}", err),
            SortError::AlreadyRunning => write!(f, "sort is already running"),
            SortError::NotStarted => write!(f, "sort is not started"),
            SortError::Cancelled => write!(f, "sort cancelled"),
            SortError::Spawn(err) => write!(f, "worker thread not started: {}", err),
            SortError::WorkerPanicked => write!(f, "worker thread panicked"),
        }
    }
}

/// Sort statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortStats {
    /// Number of records written to the output.
    pub records: u64,
    /// Number of runs created during the first phase.
    pub runs: usize,
}

/// Sort configuration. Provides builder methods for a single sort invocation.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Maximum number of records sorted in memory per run.
    block_size: usize,
    /// Initial throttling delay applied to every merge step.
    delay: Duration,
    /// Whether the merge starts paused.
    paused: bool,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run and output files read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl SortConfig {
    /// Creates a configuration with the given block size and default parameters.
    pub fn new(block_size: usize) -> Self {
        SortConfig {
            block_size,
            ..SortConfig::default()
        }
    }

    /// Sets maximum number of records per run.
    pub fn with_block_size(mut self, block_size: usize) -> SortConfig {
        self.block_size = block_size;
        return self;
    }

    /// Sets initial per-step throttling delay.
    pub fn with_delay(mut self, delay: Duration) -> SortConfig {
        self.delay = delay;
        return self;
    }

    /// Starts the sort with the pause flag set.
    pub fn paused(mut self, paused: bool) -> SortConfig {
        self.paused = paused;
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> SortConfig {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets run and output files read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> SortConfig {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn validate(&self) -> Result<(), SortError> {
        if self.block_size < 1 {
            return Err(SortError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            delay: Duration::ZERO,
            paused: false,
            tmp_dir: None,
            rw_buf_size: None,
        }
    }
}

/// External sorter for files of fixed-width `f64` records.
///
/// Sorting is achieved in two phases. The first one splits the input into blocks of
/// at most `block_size` records, sorts every block in memory and saves it as a run.
/// The second one merges all runs at once into the output file, passing through the
/// execution state checkpoint before every output record.
pub struct ExternalSorter {
    config: SortConfig,
    state: Arc<ExecutionState>,
}

impl ExternalSorter {
    /// Creates a sorter with its own execution state.
    pub fn new(config: SortConfig) -> Self {
        let state = Arc::new(ExecutionState::new(config.delay, config.paused));
        ExternalSorter { config, state }
    }

    /// Creates a sorter driven by an externally owned execution state.
    pub fn with_state(config: SortConfig, state: Arc<ExecutionState>) -> Self {
        ExternalSorter { config, state }
    }

    /// Execution state of this sorter.
    pub fn state(&self) -> &Arc<ExecutionState> {
        &self.state
    }

    /// Sorts records of the input file into the output file.
    ///
    /// Runs on the calling thread and emits events into the sink. Run files are
    /// removed whatever the outcome. On failure the output file may be partial.
    ///
    /// # Arguments
    /// * `input` - File to be sorted
    /// * `output` - Result file, created or truncated
    /// * `sink` - Sort events consumer
    pub fn sort<S>(&self, input: &Path, output: &Path, sink: &mut S) -> Result<SortStats, SortError>
    where
        S: EventSink + ?Sized,
    {
        let result = self.sort_inner(input, output, sink);

        match &result {
            Ok(stats) => {
                log::info!("sort done ({} records, {} runs)", stats.records, stats.runs);
                sink.emit(SortEvent::progress("Sort complete."));
                self.state.finish(SortStatus::Completed);
            }
            Err(SortError::Cancelled) => {
                log::info!("sort cancelled");
                sink.emit(SortEvent::progress("Sort cancelled."));
                self.state.finish(SortStatus::Cancelled);
            }
            Err(err) => {
                log::error!("sort failed: {}", err);
                sink.emit(SortEvent::progress(format!("Sort failed: {}", err)));
                self.state.finish(SortStatus::Failed);
            }
        }

        return result;
    }

    fn sort_inner<S>(&self, input: &Path, output: &Path, sink: &mut S) -> Result<SortStats, SortError>
    where
        S: EventSink + ?Sized,
    {
        self.config.validate()?;
        let input_file = fs::File::open(input).map_err(SortError::Input)?;

        sink.emit(SortEvent::progress("Starting sort..."));
        log::info!(
            "sorting {} into {} (block size: {})",
            input.display(),
            output.display(),
            self.config.block_size
        );

        let store = RunStore::new(self.config.tmp_dir.as_deref(), self.config.rw_buf_size)
            .map_err(SortError::TempDir)?;

        let mut runs = Vec::new();
        let result = self.create_runs(input_file, &store, &mut runs, sink).and_then(|()| {
            sink.emit(SortEvent::progress(format!(
                "Created {} runs. Starting merge...",
                runs.len()
            )));
            self.merge_runs(&runs, output, sink)
        });

        for run in runs.iter_mut() {
            run.delete();
        }

        let records = result?;
        return Ok(SortStats {
            records,
            runs: runs.len(),
        });
    }

    fn create_runs<S>(
        &self,
        input: fs::File,
        store: &RunStore,
        runs: &mut Vec<Run>,
        sink: &mut S,
    ) -> Result<(), SortError>
    where
        S: EventSink + ?Sized,
    {
        let mut reader = match self.config.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, input),
            None => io::BufReader::new(input),
        };

        loop {
            self.state.check_cancelled()?;

            let mut buffer = BlockBuffer::new(self.config.block_size);
            while !buffer.is_full() {
                match record::read_record(&mut reader).map_err(SortError::Input)? {
                    Some(value) => buffer.push(value),
                    None => break,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let values = buffer.into_sorted();
            let run_id = runs.len();

            let mut writer = store.create_run(run_id).map_err(SortError::RunCreate)?;
            for value in &values {
                writer.push(*value).map_err(SortError::RunCreate)?;
            }
            runs.push(writer.finish().map_err(SortError::RunCreate)?);

            log::debug!("run {} created ({} records)", run_id, values.len());
            sink.emit(SortEvent::RunCreated { run_id, values });
        }

        log::debug!("run creation done ({} runs)", runs.len());

        return Ok(());
    }

    fn merge_runs<S>(&self, runs: &[Run], output: &Path, sink: &mut S) -> Result<u64, SortError>
    where
        S: EventSink + ?Sized,
    {
        self.state.check_cancelled()?;

        let readers = runs
            .iter()
            .map(Run::open)
            .collect::<io::Result<Vec<_>>>()
            .map_err(SortError::RunRead)?;
        let mut merger = BinaryHeapMerger::new(readers).map_err(SortError::RunRead)?;

        let output_file = fs::File::create(output).map_err(SortError::Output)?;
        let mut writer = match self.config.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, output_file),
            None => io::BufWriter::new(output_file),
        };

        log::info!("merging {} runs", runs.len());

        let mut records = 0;
        while !merger.is_empty() {
            self.state.checkpoint()?;

            let item = match merger.pop() {
                Some(item) => item,
                None => break,
            };
            record::write_record(&mut writer, item.value).map_err(SortError::Output)?;
            records += 1;

            log::trace!("merge step: {} from run {}", item.value, item.run_id);
            sink.emit(SortEvent::MergeStep {
                value: item.value,
                run_id: item.run_id,
            });

            merger.advance(item.run_id).map_err(SortError::RunRead)?;
        }

        writer.flush().map_err(SortError::Output)?;

        return Ok(records);
    }
}

struct Invocation {
    state: Arc<ExecutionState>,
    handle: Option<thread::JoinHandle<Result<SortStats, SortError>>>,
}

/// Runs sorts on a dedicated worker thread and drives their execution.
///
/// Every [`start`](SortController::start) creates a fresh execution state, so pause
/// and delay settings never leak from one sort into the next. Dropping the controller
/// cancels an unfinished sort and waits for its worker.
#[derive(Default)]
pub struct SortController {
    current: Option<Invocation>,
}

impl SortController {
    pub fn new() -> Self {
        SortController::default()
    }

    /// Starts sorting `input` into `output` on a worker thread.
    ///
    /// Configuration errors and an unreadable input are reported here, before any run
    /// is created. Starting while a sort is running or paused is rejected.
    pub fn start<S>(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        config: SortConfig,
        sink: S,
    ) -> Result<(), SortError>
    where
        S: EventSink + 'static,
    {
        if let Some(invocation) = &self.current {
            if !invocation.state.status().is_finished() {
                return Err(SortError::AlreadyRunning);
            }
        }

        config.validate()?;
        let input: PathBuf = input.as_ref().to_path_buf();
        let output: PathBuf = output.as_ref().to_path_buf();
        fs::File::open(&input).map_err(SortError::Input)?;

        let sorter = ExternalSorter::new(config);
        let state = sorter.state().clone();

        let handle = thread::Builder::new()
            .name("ext-sort-worker".to_string())
            .spawn(move || {
                let mut sink = sink;
                sorter.sort(&input, &output, &mut sink)
            })
            .map_err(SortError::Spawn)?;

        self.current = Some(Invocation {
            state,
            handle: Some(handle),
        });

        return Ok(());
    }

    /// Status of the last started sort.
    pub fn status(&self) -> SortStatus {
        match &self.current {
            Some(invocation) => invocation.state.status(),
            None => SortStatus::Idle,
        }
    }

    /// Execution state of the last started sort, to drive it from other threads.
    pub fn state(&self) -> Option<Arc<ExecutionState>> {
        self.current.as_ref().map(|invocation| invocation.state.clone())
    }

    pub fn set_delay(&self, delay: Duration) {
        self.with_state(|state| state.set_delay(delay));
    }

    pub fn set_paused(&self, paused: bool) {
        self.with_state(|state| state.set_paused(paused));
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    /// Releases a paused merge for exactly one output record.
    pub fn step(&self) {
        self.with_state(|state| state.step());
    }

    /// Cancels the running sort. Its runs are removed, the output may be partial.
    pub fn cancel(&self) {
        self.with_state(|state| state.cancel());
    }

    /// Waits for the last started sort to finish and returns its outcome.
    pub fn wait(&mut self) -> Result<SortStats, SortError> {
        let invocation = self.current.as_mut().ok_or(SortError::NotStarted)?;
        let handle = invocation.handle.take().ok_or(SortError::NotStarted)?;

        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                invocation.state.finish(SortStatus::Failed);
                Err(SortError::WorkerPanicked)
            }
        }
    }

    fn with_state(&self, f: impl FnOnce(&ExecutionState)) {
        match &self.current {
            Some(invocation) => f(&invocation.state),
            None => log::debug!("no sort started, control request ignored"),
        }
    }
}

impl Drop for SortController {
    fn drop(&mut self) {
        if let Some(invocation) = self.current.as_mut() {
            if let Some(handle) = invocation.handle.take() {
                invocation.state.cancel();
                if handle.join().is_err() {
                    log::error!("worker thread panicked");
                }
            }
        }
    }
}
