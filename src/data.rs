//! Data files generation and loading.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use rand::Rng;

use crate::event::{EventSink, SortEvent};
use crate::record;

/// Lower bound of generated values.
pub const GENERATED_MIN: f64 = 0.0;
/// Upper bound (exclusive) of generated values.
pub const GENERATED_MAX: f64 = 1000.0;

/// Writes `count` random records uniformly distributed over [0, 1000) to the file.
pub fn generate_data(path: &Path, count: u64) -> io::Result<()> {
    generate_data_observed(path, count, &mut |_: SortEvent| {})
}

/// Same as [`generate_data`] but reports the completed generation to `sink` as a progress event.
pub fn generate_data_observed<S: EventSink + ?Sized>(path: &Path, count: u64, sink: &mut S) -> io::Result<()> {
    let file = fs::File::create(path)?;
    generate_data_with(io::BufWriter::new(file), count, &mut rand::thread_rng())?;

    log::info!("generated {} records in {}", count, path.display());
    sink.emit(SortEvent::progress(format!("Generated {} records in {}", count, path.display())));

    return Ok(());
}

/// Writes `count` random records produced by the given generator.
pub fn generate_data_with<W, R>(mut writer: W, count: u64, rng: &mut R) -> io::Result<()>
where
    W: Write,
    R: Rng,
{
    for _ in 0..count {
        record::write_record(&mut writer, rng.gen_range(GENERATED_MIN..GENERATED_MAX))?;
    }
    writer.flush()
}

/// Writes the values to the file in record format.
pub fn write_values(path: &Path, values: &[f64]) -> io::Result<()> {
    let mut writer = io::BufWriter::new(fs::File::create(path)?);
    for value in values {
        record::write_record(&mut writer, *value)?;
    }
    writer.flush()
}

/// Reads all records of the file.
pub fn read_values(path: &Path) -> io::Result<Vec<f64>> {
    read_preview(path, usize::MAX)
}

/// Reads at most `limit` first records of the file.
pub fn read_preview(path: &Path, limit: usize) -> io::Result<Vec<f64>> {
    let mut reader = io::BufReader::new(fs::File::open(path)?);
    record::read_block(&mut reader, limit)
}

/// Number of complete records stored in the file.
pub fn record_count(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len() / record::RECORD_SIZE as u64)
}

#[cfg(test)]
mod test {
    use rand::SeedableRng;
    use rstest::*;

    use super::{generate_data, generate_data_observed, generate_data_with, read_preview, read_values, record_count, write_values};
    use crate::event::SortEvent;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_generate_data(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.bin");
        generate_data(&path, 500).unwrap();

        assert_eq!(record_count(&path).unwrap(), 500);
        let values = read_values(&path).unwrap();
        assert_eq!(values.len(), 500);
        assert!(values.iter().all(|v| (0.0..1000.0).contains(v)));
    }

    #[rstest]
    fn test_generate_data_reports_progress(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.bin");
        let mut events: Vec<SortEvent> = Vec::new();
        generate_data_observed(&path, 20, &mut events).unwrap();

        assert_eq!(record_count(&path).unwrap(), 20);
        assert_eq!(
            events,
            vec![SortEvent::progress(format!("Generated 20 records in {}", path.display()))]
        );
    }

    #[test]
    fn test_generate_data_seeded() {
        let generate = |seed| {
            let mut data = Vec::new();
            generate_data_with(&mut data, 10, &mut rand::rngs::StdRng::seed_from_u64(seed)).unwrap();
            data
        };

        assert_eq!(generate(7).len(), 80);
        assert_eq!(generate(7), generate(7));
        assert_ne!(generate(7), generate(8));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(3, 3)]
    #[case(100, 5)]
    fn test_read_preview(tmp_dir: tempfile::TempDir, #[case] limit: usize, #[case] expected: usize) {
        let path = tmp_dir.path().join("data.bin");
        write_values(&path, &[5.0, 4.0, 3.0, 2.0, 1.0]).unwrap();

        let preview = read_preview(&path, limit).unwrap();
        assert_eq!(preview.len(), expected);
        assert_eq!(preview, [5.0, 4.0, 3.0, 2.0, 1.0][..expected].to_vec());
    }
}
