//! Binary heap merger.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;

use crate::record::Record;

/// A single merge output: the extracted value and the run it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeItem {
    pub value: f64,
    pub run_id: usize,
}

/// Binary heap merger implementation.
/// Merges multiple sorted runs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of records,
/// *n* is the number of runs.
///
/// Equal values are extracted in ascending run id order.
pub struct BinaryHeapMerger<E, C>
where
    E: Error,
    C: Iterator<Item = Result<f64, E>>,
{
    // binary heap is max-heap by default so we reverse it to convert it to min-heap,
    // the run id takes part in the key to break ties
    frontier: BinaryHeap<Reverse<(Record, usize)>>,
    runs: Vec<C>,
}

impl<E, C> BinaryHeapMerger<E, C>
where
    E: Error,
    C: Iterator<Item = Result<f64, E>>,
{
    /// Creates an instance of a binary heap merger using runs as inputs and reads the
    /// first record of every non-empty run. Run ids are the input positions.
    /// Run records should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `runs` - Runs to be merged in a single sorted one
    pub fn new<I>(runs: I) -> Result<Self, E>
    where
        I: IntoIterator<Item = C>,
    {
        let mut runs = Vec::from_iter(runs);
        let mut frontier = BinaryHeap::with_capacity(runs.len());

        for (run_id, run) in runs.iter_mut().enumerate() {
            if let Some(value) = run.next().transpose()? {
                frontier.push(Reverse((Record(value), run_id)));
            }
        }

        return Ok(BinaryHeapMerger { frontier, runs });
    }

    /// Returns `true` when every run has been fully consumed.
    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Number of runs that still have a pending candidate.
    pub fn open_runs(&self) -> usize {
        self.frontier.len()
    }

    /// Extracts the global minimum from the frontier.
    /// The source run must be refilled with [`advance`](Self::advance) before the next extraction.
    pub fn pop(&mut self) -> Option<MergeItem> {
        let Reverse((value, run_id)) = self.frontier.pop()?;
        Some(MergeItem {
            value: value.0,
            run_id,
        })
    }

    /// Reads the next record of run `run_id` into the frontier.
    /// An exhausted run is simply not reinserted.
    pub fn advance(&mut self, run_id: usize) -> Result<(), E> {
        if let Some(value) = self.runs[run_id].next().transpose()? {
            self.frontier.push(Reverse((Record(value), run_id)));
        }
        Ok(())
    }
}

impl<E, C> Iterator for BinaryHeapMerger<E, C>
where
    E: Error,
    C: Iterator<Item = Result<f64, E>>,
{
    type Item = Result<MergeItem, E>;

    /// Returns the next record from the runs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.pop()?;
        if let Err(err) = self.advance(item.run_id) {
            return Some(Err(err));
        }

        return Some(Ok(item));
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use std::io::{self, ErrorKind};

    use super::{BinaryHeapMerger, MergeItem};

    fn runs(values: Vec<Vec<f64>>) -> Vec<std::vec::IntoIter<io::Result<f64>>> {
        values
            .into_iter()
            .map(|run| run.into_iter().map(Ok).collect::<Vec<_>>().into_iter())
            .collect()
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(
        vec![
            vec![4.0, 5.0, 7.0],
            vec![1.0, 6.0],
            vec![3.0],
            vec![],
        ],
        vec![(1.0, 1), (3.0, 2), (4.0, 0), (5.0, 0), (6.0, 1), (7.0, 0)],
    )]
    #[case(
        vec![vec![3.0, 5.0], vec![1.0, 8.0], vec![2.0, 9.0]],
        vec![(1.0, 1), (2.0, 2), (3.0, 0), (5.0, 0), (8.0, 1), (9.0, 2)],
    )]
    fn test_merger(#[case] input: Vec<Vec<f64>>, #[case] expected: Vec<(f64, usize)>) {
        let merger = BinaryHeapMerger::new(runs(input)).unwrap();
        let actual: Result<Vec<MergeItem>, _> = merger.collect();
        let actual: Vec<(f64, usize)> = actual.unwrap().into_iter().map(|i| (i.value, i.run_id)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_merger_tie_break_by_run_id() {
        let input = vec![vec![2.0, 2.0, 4.0], vec![1.0, 2.0], vec![2.0, 3.0]];
        let merger = BinaryHeapMerger::new(runs(input)).unwrap();

        let order: Vec<usize> = merger.map(|item| item.unwrap().run_id).collect();
        assert_eq!(order, vec![1, 0, 0, 1, 2, 2, 0]);
    }

    #[test]
    fn test_merger_pop_and_advance() {
        let mut merger = BinaryHeapMerger::new(runs(vec![vec![1.0, 3.0], vec![2.0]])).unwrap();
        assert_eq!(merger.open_runs(), 2);

        let item = merger.pop().unwrap();
        assert_eq!(item, MergeItem { value: 1.0, run_id: 0 });
        assert_eq!(merger.open_runs(), 1);
        merger.advance(item.run_id).unwrap();
        assert_eq!(merger.open_runs(), 2);

        let item = merger.pop().unwrap();
        assert_eq!(item.run_id, 1);
        merger.advance(item.run_id).unwrap();
        assert_eq!(merger.open_runs(), 1);

        let item = merger.pop().unwrap();
        merger.advance(item.run_id).unwrap();
        assert!(merger.is_empty());
        assert!(merger.pop().is_none());
    }

    #[test]
    fn test_merger_init_error() {
        let input: Vec<std::vec::IntoIter<io::Result<f64>>> =
            vec![vec![Err(io::Error::new(ErrorKind::Other, "test error"))].into_iter()];
        let result = BinaryHeapMerger::new(input);
        assert_eq!(result.err().map(|err| err.to_string()), Some("test error".to_string()));
    }

    #[test]
    fn test_merger_refill_error() {
        let input: Vec<std::vec::IntoIter<io::Result<f64>>> = vec![
            vec![Ok(3.0), Err(io::Error::new(ErrorKind::Other, "test error"))].into_iter(),
            vec![Ok(1.0), Ok(2.0)].into_iter(),
        ];
        let merger = BinaryHeapMerger::new(input).unwrap();

        let actual: Vec<Result<f64, String>> = merger
            .map(|item| item.map(|i| i.value).map_err(|err| err.to_string()))
            .collect();
        assert_eq!(actual, vec![Ok(1.0), Ok(2.0), Err("test error".to_string())]);
    }
}
