// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Paged, partitioned hash table for stream-join build state (spec.md §3
//! "Join state", §4.5 "Stream join").
//!
//! Each partition owns a bucket, a linked list of fixed-capacity pages
//! holding schema-sized records contiguously; a full page is never resized,
//! a new page is appended instead (spec.md §8 scenario 6: "page overflow ...
//! all records retained").

/// FNV-1a, the standard "no crate needed, deterministic, good enough for
/// partitioning" hash used for join keys here.
pub fn hash_key(key: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in key {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// A single fixed-capacity page of contiguously packed, schema-sized
/// records.
pub struct Page {
    data: Vec<u8>,
    record_size: usize,
    capacity_records: usize,
    len: usize,
}

impl Page {
    fn new(record_size: usize, capacity_records: usize) -> Self {
        Self {
            data: vec![0u8; record_size * capacity_records],
            record_size,
            capacity_records,
            len: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.len == self.capacity_records
    }

    fn push(&mut self, record: &[u8]) {
        debug_assert_eq!(record.len(), self.record_size);
        debug_assert!(!self.is_full());
        let offset = self.len * self.record_size;
        self.data[offset..offset + self.record_size].copy_from_slice(record);
        self.len += 1;
    }

    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.data[..self.len * self.record_size].chunks_exact(self.record_size)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One partition's bucket: an overflow chain of pages (spec.md §3 "a bucket
/// a linked list of fixed-size pages").
#[derive(Default)]
pub struct Bucket {
    pages: Vec<Page>,
}

impl Bucket {
    fn push(&mut self, record: &[u8], record_size: usize, page_capacity_records: usize) {
        if self.pages.last().map(|p| p.is_full()).unwrap_or(true) {
            self.pages.push(Page::new(record_size, page_capacity_records));
        }
        self.pages.last_mut().unwrap().push(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.pages.iter().flat_map(|page| page.records())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn merge_from(&mut self, other: &Bucket, record_size: usize, page_capacity_records: usize) {
        for record in other.records() {
            self.push(record, record_size, page_capacity_records);
        }
    }
}

/// A hash table partitioned by `hash_key(key) % num_partitions`, each
/// partition independently paged. Built single-threaded (one instance per
/// worker, per side, per window — spec.md §5 "Join build tables:
/// thread-local, no contention"); merged across workers via `merge_from`
/// once a window's build phase ends.
pub struct PartitionedTable {
    record_size: usize,
    page_capacity_records: usize,
    partitions: Vec<Bucket>,
}

impl PartitionedTable {
    pub fn new(num_partitions: usize, record_size: usize, page_capacity_records: usize) -> Self {
        assert!(num_partitions >= 1, "at least one partition required");
        assert!(page_capacity_records >= 1, "a page must hold at least one record");
        Self {
            record_size,
            page_capacity_records,
            partitions: (0..num_partitions).map(|_| Bucket::default()).collect(),
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_of(&self, key: &[u8]) -> usize {
        (hash_key(key) % self.partitions.len() as u64) as usize
    }

    pub fn insert(&mut self, key: &[u8], record: &[u8]) {
        debug_assert_eq!(record.len(), self.record_size);
        let partition = self.partition_of(key);
        self.partitions[partition].push(record, self.record_size, self.page_capacity_records);
    }

    pub fn bucket(&self, partition: usize) -> &Bucket {
        &self.partitions[partition]
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges every partition of `other` into the matching partition of
    /// `self` (spec.md §4.5 phase 1: "local tables from every worker on both
    /// sides are merged into per-partition global buckets").
    pub fn merge_from(&mut self, other: &PartitionedTable) {
        debug_assert_eq!(self.partitions.len(), other.partitions.len());
        for (mine, theirs) in self.partitions.iter_mut().zip(&other.partitions) {
            mine.merge_from(theirs, self.record_size, self.page_capacity_records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_overflow_retains_every_record() {
        // spec.md §8 scenario 6: pageSize = 2 * recordSize, numPartitions = 1.
        let mut table = PartitionedTable::new(1, 8, 2);
        for i in 0..100u64 {
            table.insert(&1u64.to_le_bytes(), &i.to_le_bytes());
        }
        assert_eq!(table.len(), 100);
        assert_eq!(table.bucket(0).page_count(), 50);
        let sum: u64 = table.bucket(0).records().map(|r| u64::from_le_bytes(r.try_into().unwrap())).sum();
        assert_eq!(sum, (0..100u64).sum());
    }

    #[test]
    fn merge_combines_partitions_from_multiple_workers() {
        let mut worker_a = PartitionedTable::new(4, 8, 16);
        let mut worker_b = PartitionedTable::new(4, 8, 16);
        worker_a.insert(&1u64.to_le_bytes(), &10u64.to_le_bytes());
        worker_b.insert(&1u64.to_le_bytes(), &20u64.to_le_bytes());

        let mut global = PartitionedTable::new(4, 8, 16);
        global.merge_from(&worker_a);
        global.merge_from(&worker_b);
        assert_eq!(global.len(), 2);
    }
}
