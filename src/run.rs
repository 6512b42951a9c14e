//! Run store. Creates sorted runs on the file system and reads them back.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use tempfile;

use crate::record;

/// Temporary storage for the runs of a single sort invocation.
/// Dropping the store removes its directory together with any remaining run.
pub struct RunStore {
    dir: tempfile::TempDir,
    buf_size: Option<usize>,
}

impl RunStore {
    /// Creates a new run store.
    ///
    /// # Arguments
    /// * `parent` - Directory to create the store in. If [`None`] the OS temporary directory is used.
    /// * `buf_size` - Run file read/write buffer size.
    pub fn new(parent: Option<&Path>, buf_size: Option<usize>) -> io::Result<Self> {
        let dir = match parent {
            Some(parent) => tempfile::tempdir_in(parent),
            None => tempfile::tempdir(),
        }?;

        log::info!("using {} as a temporary directory", dir.path().display());

        return Ok(RunStore { dir, buf_size });
    }

    /// Store directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Allocates a new run file tagged with the positional id.
    pub fn create_run(&self, id: usize) -> io::Result<RunWriter> {
        let tmp_file = tempfile::Builder::new()
            .prefix(&format!("run_{}_", id))
            .tempfile_in(self.dir.path())?;

        let file = tmp_file.as_file().try_clone()?;
        let writer = match self.buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        return Ok(RunWriter {
            id,
            len: 0,
            writer,
            path: tmp_file.into_temp_path(),
            buf_size: self.buf_size,
        });
    }
}

/// Writable run handle. Records are stored in the order they are pushed.
/// An unfinished writer removes its file on drop.
pub struct RunWriter {
    id: usize,
    len: u64,
    writer: io::BufWriter<fs::File>,
    path: tempfile::TempPath,
    buf_size: Option<usize>,
}

impl RunWriter {
    pub fn push(&mut self, value: f64) -> io::Result<()> {
        record::write_record(&mut self.writer, value)?;
        self.len += 1;
        Ok(())
    }

    /// Flushes the run file and turns the handle into a readable [`Run`].
    pub fn finish(mut self) -> io::Result<Run> {
        self.writer.flush()?;

        return Ok(Run {
            id: self.id,
            len: self.len,
            path: Some(self.path),
            buf_size: self.buf_size,
        });
    }
}

/// Finished run.
pub struct Run {
    id: usize,
    len: u64,
    path: Option<tempfile::TempPath>,
    buf_size: Option<usize>,
}

impl Run {
    /// Positional run id (creation order).
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of records in the run.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Run file path, [`None`] once the run is deleted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Opens the run for sequential reading.
    pub fn open(&self) -> io::Result<RunReader> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("run {} is deleted", self.id)))?;

        let file = fs::File::open(path)?;
        let reader = match self.buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(RunReader { id: self.id, reader });
    }

    /// Removes the run file. Repeated calls do nothing, failures are only logged.
    pub fn delete(&mut self) {
        if let Some(path) = self.path.take() {
            let display = path.display().to_string();
            match path.close() {
                Ok(()) => log::debug!("run {} deleted", self.id),
                Err(err) => log::warn!("run {} ({}) not deleted: {}", self.id, display, err),
            }
        }
    }
}

/// Sequential forward cursor over a run.
pub struct RunReader {
    id: usize,
    reader: io::BufReader<fs::File>,
}

impl RunReader {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Reads the next record, [`None`] at the end of the run.
    pub fn read_next(&mut self) -> io::Result<Option<f64>> {
        record::read_record(&mut self.reader)
    }
}

impl Iterator for RunReader {
    type Item = io::Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::RunStore;

    #[fixture]
    fn store() -> RunStore {
        RunStore::new(None, None).unwrap()
    }

    #[rstest]
    fn test_run_roundtrip(store: RunStore) {
        let saved = vec![-1.5, 0.0, 2.25, 1000.0];

        let mut writer = store.create_run(3).unwrap();
        for value in &saved {
            writer.push(*value).unwrap();
        }
        let run = writer.finish().unwrap();
        assert_eq!(run.id(), 3);
        assert_eq!(run.len(), 4);

        let restored: Result<Vec<f64>, _> = run.open().unwrap().collect();
        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_run_file_prefix(store: RunStore) {
        let run = store.create_run(7).unwrap().finish().unwrap();
        let name = run.path().unwrap().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_7_"), "{}", name);
        assert!(run.path().unwrap().starts_with(store.path()));
    }

    #[rstest]
    fn test_empty_run(store: RunStore) {
        let run = store.create_run(0).unwrap().finish().unwrap();
        assert!(run.is_empty());
        assert_eq!(run.open().unwrap().read_next().unwrap(), None);
    }

    #[rstest]
    fn test_delete_is_idempotent(store: RunStore) {
        let mut run = store.create_run(0).unwrap().finish().unwrap();
        let path = run.path().unwrap().to_path_buf();
        assert!(path.exists());

        run.delete();
        assert!(!path.exists());
        assert!(run.path().is_none());
        assert!(run.open().is_err());

        run.delete();
    }

    #[rstest]
    fn test_delete_failure_is_swallowed(store: RunStore) {
        let mut run = store.create_run(1).unwrap().finish().unwrap();
        std::fs::remove_file(run.path().unwrap()).unwrap();

        run.delete();
        assert!(run.path().is_none());
    }

    #[rstest]
    fn test_unfinished_writer_is_removed(store: RunStore) {
        let mut writer = store.create_run(2).unwrap();
        writer.push(1.0).unwrap();
        drop(writer);

        assert_eq!(std::fs::read_dir(store.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_store_in_parent() {
        let parent = tempfile::tempdir().unwrap();
        let store = RunStore::new(Some(parent.path()), Some(64)).unwrap();
        assert!(store.path().starts_with(parent.path()));

        let dir = store.path().to_path_buf();
        drop(store);
        assert!(!dir.exists());
    }
}
