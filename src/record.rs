//! Fixed-width record codec.
//!
//! A record is a single IEEE-754 double stored as 8 bytes in native byte order.
//! Files produced on a machine with a different endianness are not portable.

use std::cmp::Ordering;
use std::io;
use std::io::prelude::*;

/// Size of one encoded record in bytes.
pub const RECORD_SIZE: usize = std::mem::size_of::<f64>();

/// Encodes a value into its on-disk representation.
pub fn encode(value: f64) -> [u8; RECORD_SIZE] {
    value.to_ne_bytes()
}

/// Decodes a value from its on-disk representation.
pub fn decode(bytes: [u8; RECORD_SIZE]) -> f64 {
    f64::from_ne_bytes(bytes)
}

/// Writes one record to the writer.
pub fn write_record<W: Write>(writer: &mut W, value: f64) -> io::Result<()> {
    writer.write_all(&encode(value))
}

/// Reads one record from the reader.
///
/// Returns `Ok(None)` on a clean end of input. A trailing partial record is
/// discarded and also reported as end of input.
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<Option<f64>> {
    let mut buf = [0u8; RECORD_SIZE];
    let mut filled = 0;

    while filled < RECORD_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    if filled == RECORD_SIZE {
        Ok(Some(decode(buf)))
    } else {
        if filled > 0 {
            log::warn!("ignoring {} trailing bytes of a partial record", filled);
        }
        Ok(None)
    }
}

/// Reads up to `max` records from the reader.
/// An empty result means the input is exhausted.
pub fn read_block<R: Read>(reader: &mut R, max: usize) -> io::Result<Vec<f64>> {
    let mut block = Vec::with_capacity(max.min(64 * 1024));
    while block.len() < max {
        match read_record(reader)? {
            Some(value) => block.push(value),
            None => break,
        }
    }

    return Ok(block);
}

/// Record ordering key.
///
/// Orders values using IEEE-754 `totalOrder`, which agrees with the usual numeric
/// order on all non-NaN values except that `-0.0` sorts before `0.0`. The position
/// of NaN values in the output is not part of the sort contract.
#[derive(Debug, Clone, Copy)]
pub struct Record(pub f64);

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::{decode, encode, read_block, read_record, write_record, Record, RECORD_SIZE};

    #[rstest]
    #[case(0.0)]
    #[case(-0.0)]
    #[case(1.5)]
    #[case(-123456.789)]
    #[case(f64::MAX)]
    #[case(f64::MIN_POSITIVE)]
    fn test_codec_bit_exact(#[case] value: f64) {
        assert_eq!(decode(encode(value)).to_bits(), value.to_bits());
    }

    #[test]
    fn test_native_byte_order() {
        assert_eq!(encode(2.5), 2.5f64.to_ne_bytes());
    }

    #[test]
    fn test_read_block_partial_tail() {
        let mut data = Vec::new();
        for value in [1.0, 2.0, 3.0] {
            write_record(&mut data, value).unwrap();
        }
        data.extend_from_slice(&[0xAB; 3]);

        let mut reader = io::Cursor::new(data);
        assert_eq!(read_block(&mut reader, 2).unwrap(), vec![1.0, 2.0]);
        assert_eq!(read_block(&mut reader, 2).unwrap(), vec![3.0]);
        assert!(read_block(&mut reader, 2).unwrap().is_empty());
    }

    #[test]
    fn test_read_record_eof() {
        let mut reader = io::Cursor::new(vec![0u8; RECORD_SIZE]);
        assert_eq!(read_record(&mut reader).unwrap(), Some(0.0));
        assert_eq!(read_record(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_record_ordering() {
        let mut values = vec![Record(3.0), Record(-1.0), Record(2.0), Record(-1.0)];
        values.sort();
        let values: Vec<f64> = values.into_iter().map(|r| r.0).collect();
        assert_eq!(values, vec![-1.0, -1.0, 2.0, 3.0]);
        assert!(Record(-0.0) < Record(0.0));
    }
}
