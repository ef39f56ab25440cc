/// Usage counters of a [`Heap`](crate::Heap).
///
/// Byte counts are block sizes, headers included. The end sentinels are not
/// part of `total_bytes`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes usable by blocks across all regions.
    pub total_bytes: usize,
    /// Bytes currently held by free blocks.
    pub available_bytes: usize,
    /// Lowest value `available_bytes` has reached since the first region was
    /// assigned.
    pub min_ever_available_bytes: usize,
    /// Blocks handed out, relocations included.
    pub alloc_count: usize,
    /// Blocks returned, relocations included.
    pub release_count: usize,
    /// Number of registered regions.
    pub region_count: usize,
}

impl HeapStats {
    pub(crate) const fn new() -> Self {
        Self {
            total_bytes: 0,
            available_bytes: 0,
            min_ever_available_bytes: 0,
            alloc_count: 0,
            release_count: 0,
            region_count: 0,
        }
    }

    /// Bytes currently held by allocated blocks.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.total_bytes - self.available_bytes
    }

    pub(crate) fn record_regions(&mut self, count: usize, usable: usize) {
        self.region_count += count;
        self.total_bytes += usable;
        self.available_bytes += usable;
        self.min_ever_available_bytes += usable;
    }

    pub(crate) fn record_allocate(&mut self, size: usize) {
        self.alloc_count += 1;
        self.take(size);
    }

    pub(crate) fn record_release(&mut self, size: usize) {
        self.release_count += 1;
        self.give(size);
    }

    /// An in-place resize moved the block size from `old` to `new`.
    pub(crate) fn record_resize(&mut self, old: usize, new: usize) {
        if new > old {
            self.take(new - old);
        } else {
            self.give(old - new);
        }
    }

    fn take(&mut self, size: usize) {
        self.available_bytes -= size;
        self.min_ever_available_bytes = self.min_ever_available_bytes.min(self.available_bytes);
    }

    fn give(&mut self, size: usize) {
        self.available_bytes += size;
    }
}
