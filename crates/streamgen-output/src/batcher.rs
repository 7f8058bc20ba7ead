//! Packing serialized events into request-sized batches.

use streamgen_core::Record;

/// Maximum records accepted by a single put-records request.
pub const MAX_RECORDS_PER_REQUEST: usize = 500;

/// Maximum payload + key bytes accepted by a single put-records request (4.5 MiB).
pub const MAX_BYTES_PER_REQUEST: usize = 4_718_592;

/// An ordered group of records submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
    size: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.size += record.size();
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of payload + key sizes.
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl FromIterator<Record> for Batch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for record in iter {
            batch.push(record);
        }
        batch
    }
}

/// Greedy packer bounded by record count and cumulative byte size.
///
/// Every produced batch holds at most `max_records` records and strictly
/// less than `max_bytes` bytes, except that a record which alone reaches
/// `max_bytes` is emitted in a batch of its own rather than split or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
    max_records: usize,
    max_bytes: usize,
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(MAX_RECORDS_PER_REQUEST, MAX_BYTES_PER_REQUEST)
    }
}

impl Batcher {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            max_bytes: max_bytes.max(1),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn fits(&self, batch: &Batch, record: &Record) -> bool {
        batch.len() < self.max_records && batch.size_bytes() + record.size() < self.max_bytes
    }

    /// Splits records into batches, preserving order.
    pub fn split(&self, records: impl IntoIterator<Item = Record>) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current = Batch::new();

        for record in records {
            if !current.is_empty() && !self.fits(&current, &record) {
                batches.push(std::mem::take(&mut current));
            }
            current.push(record);
        }

        if !current.is_empty() {
            batches.push(current);
        }

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn record(payload: usize, key: &str) -> Record {
        Record::new(vec![b'x'; payload], key)
    }

    #[test]
    fn test_empty_input() {
        assert!(Batcher::default().split(Vec::new()).is_empty());
    }

    #[test]
    fn test_small_input_is_one_batch() {
        let batcher = Batcher::new(500, 1024 * 1024);
        let batches = batcher.split((0..3).map(|i| record(100, &i.to_string())));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[0].size_bytes(), 303);
    }

    #[test]
    fn test_count_limit() {
        let batcher = Batcher::new(500, MAX_BYTES_PER_REQUEST);
        let batches = batcher.split((0..1200).map(|i| record(1024, &format!("{:04}", i))));
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![500, 500, 200]);
    }

    #[test]
    fn test_byte_limit_is_strict() {
        // Two 50-byte records sum to exactly the limit, which is not allowed.
        let batcher = Batcher::new(10, 100);
        let batches = batcher.split(vec![record(49, "a"), record(49, "b"), record(10, "c")]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[1].size_bytes(), 61);
    }

    #[test]
    fn test_oversized_record_stands_alone() {
        let batcher = Batcher::new(10, 100);
        let batches = batcher.split(vec![
            record(10, "a"),
            record(200, "big"),
            record(10, "b"),
        ]);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].records()[0].partition_key, "big");
        assert_eq!(batches[1].size_bytes(), 203);
    }

    #[test]
    fn test_oversized_record_first() {
        let batcher = Batcher::new(10, 100);
        let batches = batcher.split(vec![record(100, "k"), record(1, "a")]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn test_limits_clamped() {
        let batcher = Batcher::new(0, 0);
        assert_eq!(batcher.max_records(), 1);
        assert_eq!(batcher.max_bytes(), 1);
        let batches = batcher.split(vec![record(1, "a"), record(1, "b")]);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_random_inputs_respect_limits_and_order() {
        let mut rng = StdRng::seed_from_u64(1234);

        for _ in 0..200 {
            let max_records = rng.gen_range(1..20);
            let max_bytes = rng.gen_range(50..500);
            let batcher = Batcher::new(max_records, max_bytes);

            let count = rng.gen_range(0..100);
            let input: Vec<Record> = (0..count)
                .map(|i| record(rng.gen_range(0..600), &i.to_string()))
                .collect();

            let batches = batcher.split(input.clone());

            for batch in &batches {
                assert!(!batch.is_empty());
                assert!(batch.len() <= max_records);
                if batch.len() > 1 {
                    assert!(batch.size_bytes() < max_bytes);
                } else if batch.size_bytes() >= max_bytes {
                    // only a single oversized record may break the byte limit
                    assert_eq!(batch.len(), 1);
                }
            }

            let flattened: Vec<Record> = batches.into_iter().flat_map(Batch::into_records).collect();
            assert_eq!(flattened, input);
        }
    }
}
