use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::huffman_coding::code::FrequencyTable;

/// Buffers longer than this are counted in parallel.
const PARALLEL_THRESHOLD: usize = 64_000;
/// 16k is pretty much the sweet spot for partition size.
const PARTITION: usize = 16_000;

/// Counts for one partition of the buffer, plus where each byte was first seen.
#[derive(Clone)]
struct Tally {
    counts: [u32; 256],
    first: [usize; 256],
}

impl Tally {
    fn new() -> Self {
        Self {
            counts: [0; 256],
            first: [usize::MAX; 256],
        }
    }

    /// Count `chunk`, which starts at `offset` in the whole buffer.
    fn add(mut self, offset: usize, chunk: &[u8]) -> Self {
        for (i, &el) in chunk.iter().enumerate() {
            let b = el as usize;
            if self.counts[b] == 0 {
                self.first[b] = self.first[b].min(offset + i);
            }
            self.counts[b] += 1;
        }
        self
    }

    /// Key-wise sum. Associative and commutative, so any partitioning gives the same result.
    fn merge(mut self, other: Self) -> Self {
        for b in 0..256 {
            self.counts[b] += other.counts[b];
            self.first[b] = self.first[b].min(other.first[b]);
        }
        self
    }

    /// Present bytes in first-seen order.
    fn into_table(self) -> Result<FrequencyTable> {
        let mut present: Vec<(usize, u8, u32)> = (0..256)
            .filter(|&b| self.counts[b] > 0)
            .map(|b| (self.first[b], b as u8, self.counts[b]))
            .collect();
        present.sort_unstable_by_key(|&(first, _, _)| first);
        FrequencyTable::from_entries(present.into_iter().map(|(_, b, c)| (b, c)).collect())
    }
}

/// Returns a frequency table of the input data. Uses parallelism when the data set is
/// over 64k. Fails with [`Error::EmptyInput`] on an empty buffer.
pub fn freqs(data: &[u8]) -> Result<FrequencyTable> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }
    let tally = if data.len() > PARALLEL_THRESHOLD {
        data.par_chunks(PARTITION)
            .enumerate()
            .fold(Tally::new, |tally, (i, chunk)| tally.add(i * PARTITION, chunk))
            .reduce(Tally::new, Tally::merge)
    } else {
        Tally::new().add(0, data)
    };
    tally.into_table()
}
