//! Allocation engine.

use snafu::OptionExt as _;

use crate::{
    block::{Header, HeapPtr},
    config::{ALIGN, HEADER_SIZE, HeapConfig, block_size_for},
    error::{
        HeapError, InvalidPointerSnafu, InvalidSizeSnafu, OutOfMemorySnafu, SizeOverflowSnafu,
    },
    region::{Region, RegionTable},
    report::DebugReport,
    stats::HeapStats,
};

/// First-fit heap over caller-donated regions.
///
/// The heap never owns the memory it manages: regions are borrowed for `'a`
/// and only the block headers threaded through them belong to the heap.
///
/// # Thread safety
///
/// Every mutating operation takes `&mut self` and runs to completion without
/// locking. Callers sharing a heap between threads must serialize access,
/// e.g. with [`LockedHeap`](crate::LockedHeap).
pub struct Heap<'a> {
    regions: RegionTable<'a>,
    config: HeapConfig,
    stats: HeapStats,
}

impl Default for Heap<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Heap<'a> {
    /// Creates a heap with no regions and the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_config(HeapConfig::new())
    }

    #[must_use]
    pub const fn with_config(config: HeapConfig) -> Self {
        Self {
            regions: RegionTable::new(),
            config,
            stats: HeapStats::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Donates memory regions to the heap.
    ///
    /// Each region becomes one free block closed by an end sentinel occupying
    /// its last [`HEADER_SIZE`] bytes. Calling this again appends more regions;
    /// regions are never merged with each other. If any region is refused,
    /// none of the regions of this call are registered.
    ///
    /// Returns the number of regions added.
    pub fn assign<I>(&mut self, regions: I) -> Result<usize, HeapError>
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        let first = self.regions.len();
        let added = self.regions.assign(regions)?;
        let usable = (first..self.regions.len())
            .filter_map(|index| self.regions.get(index))
            .map(|region| region.end())
            .sum();
        self.stats.record_regions(added, usable);
        Ok(added)
    }

    /// Allocates a block whose payload holds at least `size` bytes.
    ///
    /// The payload content is unspecified unless
    /// [`HeapConfig::zero_fill`] is set.
    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        let total = block_size_for(size).context(InvalidSizeSnafu { size })?;
        let (ptr, block_size) = self.allocate_block(total).context(OutOfMemorySnafu { size })?;
        self.stats.record_allocate(block_size);
        if self.config.zero_fill() {
            self.fill_payload(ptr, 0, 0);
        }
        log::trace!("allocate({size}) -> {ptr} (block {block_size})");
        Ok(ptr)
    }

    /// Allocates a zeroed payload for `count` elements of `size` bytes.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<HeapPtr, HeapError> {
        let bytes = count
            .checked_mul(size)
            .context(SizeOverflowSnafu { count, size })?;
        let ptr = self.allocate(bytes)?;
        if !self.config.zero_fill() {
            self.fill_payload(ptr, 0, 0);
        }
        Ok(ptr)
    }

    /// Returns a block to its region's free chain.
    ///
    /// `None` is accepted and ignored. The block is merged with the free blocks
    /// right before and after it.
    pub fn release<P>(&mut self, ptr: P) -> Result<(), HeapError>
    where
        P: Into<Option<HeapPtr>>,
    {
        let Some(ptr) = ptr.into() else {
            return Ok(());
        };
        let (region, offset, size) = self.locate(ptr)?;
        self.region_mut(region).insert_free(offset, size);
        self.stats.record_release(size);
        log::trace!("release({ptr}) (block {size})");
        Ok(())
    }

    /// Releases the block held in `slot` and clears the slot.
    ///
    /// On error the slot keeps its value.
    pub fn release_and_null(&mut self, slot: &mut Option<HeapPtr>) -> Result<(), HeapError> {
        self.release(*slot)?;
        *slot = None;
        Ok(())
    }

    /// Changes the payload size of a block.
    ///
    /// - `ptr == None` allocates `new_size` bytes (nothing for zero).
    /// - `new_size == 0` releases the block and returns `None`.
    /// - Shrinking keeps the block in place and frees the tail, unless the
    ///   tail is smaller than the minimum block size.
    /// - Growing absorbs the free block after, then the one before (moving the
    ///   payload), and otherwise relocates the payload to a new block.
    ///
    /// The returned handle replaces `ptr`. On failure the original block and
    /// its content are left untouched.
    pub fn resize<P>(&mut self, ptr: P, new_size: usize) -> Result<Option<HeapPtr>, HeapError>
    where
        P: Into<Option<HeapPtr>>,
    {
        let Some(ptr) = ptr.into() else {
            if new_size == 0 {
                return Ok(None);
            }
            return self.allocate(new_size).map(Some);
        };
        if new_size == 0 {
            self.release(ptr)?;
            return Ok(None);
        }

        let (index, offset, size) = self.locate(ptr)?;
        let total = block_size_for(new_size).context(InvalidSizeSnafu { size: new_size })?;
        let min_block_size = self.config.min_block_size();

        if total <= size {
            if size - total >= min_block_size {
                self.region_mut(index).shrink(offset, size, total);
                self.stats.record_resize(size, total);
                log::trace!("resize({ptr}, {new_size}) shrunk block {size} -> {total}");
            }
            return Ok(Some(ptr));
        }

        if let Some((new_offset, new_block)) =
            self.region_mut(index)
                .grow(offset, size, total, min_block_size)
        {
            self.stats.record_resize(size, new_block);
            let new_ptr = HeapPtr::from_header(index, new_offset);
            if self.config.zero_fill() {
                self.fill_payload(new_ptr, size - HEADER_SIZE, 0);
            }
            log::trace!("resize({ptr}, {new_size}) -> {new_ptr} grown in place to {new_block}");
            return Ok(Some(new_ptr));
        }

        self.relocate(ptr, (index, offset, size), total, new_size)
            .map(Some)
    }

    /// Resizes the block held in `slot`, updating the slot only on success.
    pub fn resize_slot(
        &mut self,
        slot: &mut Option<HeapPtr>,
        new_size: usize,
    ) -> Result<(), HeapError> {
        *slot = self.resize(*slot, new_size)?;
        Ok(())
    }

    /// Payload bytes of a live block.
    ///
    /// The slice covers the whole block capacity, which may exceed the size
    /// originally requested.
    pub fn payload(&self, ptr: HeapPtr) -> Result<&[u8], HeapError> {
        let (index, offset, size) = self.locate(ptr)?;
        Ok(&self.region(index).memory()[offset + HEADER_SIZE..offset + size])
    }

    /// Mutable payload bytes of a live block.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Result<&mut [u8], HeapError> {
        let (index, offset, size) = self.locate(ptr)?;
        Ok(&mut self.region_mut(index).memory_mut()[offset + HEADER_SIZE..offset + size])
    }

    /// Payload capacity of a live block.
    pub fn payload_size(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        let (_, _, size) = self.locate(ptr)?;
        Ok(size - HEADER_SIZE)
    }

    /// Absolute address of a live block's payload.
    pub fn address_of(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        let (index, offset, _) = self.locate(ptr)?;
        Ok(self.region(index).base() + offset + HEADER_SIZE)
    }

    /// Snapshot of every free chain.
    #[must_use]
    pub fn debug_report(&self) -> DebugReport<'_, 'a> {
        DebugReport::new(&self.regions)
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// First-fit search over all regions in assignment order.
    fn allocate_block(&mut self, total: usize) -> Option<(HeapPtr, usize)> {
        let min_block_size = self.config.min_block_size();
        let found = self.regions.iter_mut().enumerate().find_map(|(index, region)| {
            let (prev, block) = region.find_fit(total)?;
            let size = region.take(prev, block, total, min_block_size);
            Some((HeapPtr::from_header(index, block.offset), size))
        });
        if found.is_none() {
            log::warn!(
                "out of memory: no free block of {total} bytes ({} bytes free)",
                self.stats.available_bytes
            );
        }
        found
    }

    /// Moves the payload of `old` into a new block, then releases `old`.
    fn relocate(
        &mut self,
        ptr: HeapPtr,
        (index, offset, size): (usize, usize, usize),
        total: usize,
        new_size: usize,
    ) -> Result<HeapPtr, HeapError> {
        let (new_ptr, new_block) = self
            .allocate_block(total)
            .context(OutOfMemorySnafu { size: new_size })?;
        self.stats.record_allocate(new_block);

        let keep = (size - HEADER_SIZE).min(new_size);
        self.regions.copy(
            (index, ptr.offset()),
            (new_ptr.region(), new_ptr.offset()),
            keep,
        );
        if self.config.zero_fill() {
            self.fill_payload(new_ptr, keep, 0);
        }

        self.region_mut(index).insert_free(offset, size);
        self.stats.record_release(size);
        log::debug!("resize({ptr}, {new_size}) relocated to {new_ptr} ({keep} bytes moved)");
        Ok(new_ptr)
    }

    /// Validates a handle and returns its region, header offset and block size.
    fn locate(&self, ptr: HeapPtr) -> Result<(usize, usize, usize), HeapError> {
        let found = self.regions.get(ptr.region()).and_then(|region| {
            let offset = ptr
                .header_offset()
                .filter(|offset| offset.is_multiple_of(ALIGN) && *offset < region.end())?;
            let Header::Allocated { size } = region.header(offset) else {
                return None;
            };
            (offset + size <= region.end() && region.is_block_start(offset))
                .then_some((ptr.region(), offset, size))
        });
        if found.is_none() {
            log::warn!("rejected pointer {ptr}: not a live block");
        }
        found.context(InvalidPointerSnafu { pointer: ptr })
    }

    fn region(&self, index: usize) -> &Region<'a> {
        self.regions
            .get(index)
            .unwrap_or_else(|| unreachable!("region #{index} was located before"))
    }

    fn region_mut(&mut self, index: usize) -> &mut Region<'a> {
        self.regions
            .get_mut(index)
            .unwrap_or_else(|| unreachable!("region #{index} was located before"))
    }

    /// Fills the payload of `ptr` with `value`, starting `from` bytes in.
    fn fill_payload(&mut self, ptr: HeapPtr, from: usize, value: u8) {
        if let Ok(payload) = self.payload_mut(ptr) {
            if let Some(tail) = payload.get_mut(from..) {
                tail.fill(value);
            }
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MIN_BLOCK_SIZE;

    #[repr(C, align(8))]
    struct Bytes<const N: usize>([u8; N]);

    fn with_test_heap<const N: usize, F>(config: HeapConfig, test_fn: F)
    where
        F: FnOnce(&mut Heap<'_>),
    {
        let mut bytes = Bytes([0x11u8; N]);
        let mut heap = Heap::with_config(config);
        heap.assign([&mut bytes.0[..]]).unwrap();
        test_fn(&mut heap);
        check_invariants(&heap);
    }

    /// Free blocks as `(region, offset, size)`.
    fn chain(heap: &Heap<'_>) -> Vec<(usize, usize, usize)> {
        heap.debug_report()
            .iter()
            .map(|block| {
                let base = heap.region(block.region).base();
                (block.region, block.address - base, block.free_size)
            })
            .collect()
    }

    fn check_invariants(heap: &Heap<'_>) {
        let mut available = 0;
        for region in heap.regions.iter() {
            let mut covered = 0;
            let mut prev_free = false;
            let mut free_blocks = Vec::new();
            for (offset, header) in region.blocks() {
                assert_eq!(offset, covered);
                let free = matches!(header, Header::Free { .. });
                assert!(!(free && prev_free), "adjacent free blocks at {offset:#x}");
                if free {
                    free_blocks.push((offset, header.size()));
                }
                prev_free = free;
                covered += header.size();
            }
            assert_eq!(covered + HEADER_SIZE, region.len());
            assert_eq!(region.header(region.end()), Header::End);

            let chain = region
                .free_chain()
                .map(|block| (block.offset, block.size))
                .collect::<Vec<_>>();
            assert_eq!(chain, free_blocks);
            available += region.free_bytes();
        }
        assert_eq!(heap.stats().available_bytes, available);
    }

    #[test]
    fn test_documented_shrink_example() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let ptrs = (0..4).map(|_| heap.allocate(16).unwrap()).collect::<Vec<_>>();
            assert_eq!(chain(heap), [(0, 96, 24)]);
            assert_eq!(heap.debug_report().total_free(), 24);

            let ptr = heap.resize(ptrs[0], 12).unwrap().unwrap();
            assert_eq!(ptr, ptrs[0]);
            assert_eq!(heap.payload_size(ptr).unwrap(), 16);
            assert_eq!(chain(heap), [(0, 96, 24)]);

            let ptr = heap.resize(ptr, 4).unwrap().unwrap();
            assert_eq!(ptr, ptrs[0]);
            assert_eq!(heap.payload_size(ptr).unwrap(), 8);
            assert_eq!(chain(heap), [(0, 16, 8), (0, 96, 24)]);
            assert_eq!(heap.debug_report().total_free(), 32);
            check_invariants(heap);
        });
    }

    #[test]
    fn test_allocate_release_round_trip() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            assert_eq!(chain(heap), [(0, 0, 120)]);
            let ptr = heap.allocate(40).unwrap();
            assert_eq!(ptr.offset(), HEADER_SIZE);
            assert_eq!(chain(heap), [(0, 48, 72)]);

            heap.release(ptr).unwrap();
            assert_eq!(chain(heap), [(0, 0, 120)]);
        });
    }

    #[test]
    fn test_invalid_size() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            assert!(matches!(
                heap.allocate(0),
                Err(HeapError::InvalidSize { size: 0, .. })
            ));
            assert!(matches!(
                heap.allocate(usize::MAX),
                Err(HeapError::InvalidSize { .. })
            ));
            assert!(matches!(
                heap.allocate_zeroed(usize::MAX, 2),
                Err(HeapError::SizeOverflow {
                    count: usize::MAX,
                    size: 2,
                    ..
                })
            ));
            assert!(matches!(
                heap.allocate_zeroed(0, 16),
                Err(HeapError::InvalidSize { size: 0, .. })
            ));
            assert_eq!(chain(heap), [(0, 0, 120)]);
        });
    }

    #[test]
    fn test_out_of_memory_and_recovery() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            assert!(matches!(
                heap.allocate(113),
                Err(HeapError::OutOfMemory { size: 113, .. })
            ));
            let ptr = heap.allocate(112).unwrap();
            assert!(chain(heap).is_empty());
            assert!(matches!(
                heap.allocate(1),
                Err(HeapError::OutOfMemory { .. })
            ));

            heap.release(ptr).unwrap();
            let ptr = heap.allocate(1).unwrap();
            heap.release(ptr).unwrap();
        });
    }

    #[test]
    fn test_release_coalesces_both_sides() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let ptrs = (0..4).map(|_| heap.allocate(16).unwrap()).collect::<Vec<_>>();

            heap.release(ptrs[1]).unwrap();
            assert_eq!(chain(heap), [(0, 24, 24), (0, 96, 24)]);

            heap.release(ptrs[3]).unwrap();
            assert_eq!(chain(heap), [(0, 24, 24), (0, 72, 48)]);

            heap.release(ptrs[2]).unwrap();
            assert_eq!(chain(heap), [(0, 24, 96)]);

            heap.release(ptrs[0]).unwrap();
            assert_eq!(chain(heap), [(0, 0, 120)]);
        });
    }

    #[test]
    fn test_release_null_and_slots() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            heap.release(None::<HeapPtr>).unwrap();

            let mut slot = None;
            heap.release_and_null(&mut slot).unwrap();
            assert_eq!(slot, None);

            let ptr = heap.allocate(16).unwrap();
            slot = Some(ptr);
            heap.release_and_null(&mut slot).unwrap();
            assert_eq!(slot, None);

            // A stale handle is rejected and stays in the slot.
            slot = Some(ptr);
            assert!(heap.release_and_null(&mut slot).is_err());
            assert_eq!(slot, Some(ptr));
        });
    }

    #[test]
    fn test_invalid_pointers_are_rejected() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let ptr = heap.allocate(64).unwrap();

            // Fake header inside the payload.
            let payload = heap.payload_mut(ptr).unwrap();
            payload[8..12].copy_from_slice(&0xDEAD_BEEF_u32.to_ne_bytes());
            payload[12..16].copy_from_slice(&(16_u32 | (1 << 31)).to_ne_bytes());

            for forged in [
                HeapPtr::from_header(1, 0),
                HeapPtr::from_header(0, 4),
                HeapPtr::from_header(0, 16),
                HeapPtr::from_header(0, 72),
                HeapPtr::from_header(0, 120),
            ] {
                assert!(
                    matches!(heap.release(forged), Err(HeapError::InvalidPointer { .. })),
                    "{forged}"
                );
                assert!(heap.resize(forged, 8).is_err());
                assert!(heap.payload(forged).is_err());
            }

            heap.release(ptr).unwrap();
            assert!(matches!(
                heap.release(ptr),
                Err(HeapError::InvalidPointer { .. })
            ));
            assert_eq!(chain(heap), [(0, 0, 120)]);
        });
    }

    #[test]
    fn test_shrink_threshold() {
        let config = HeapConfig::new().with_min_block_size(16).unwrap();
        with_test_heap::<128, _>(config, |heap| {
            let ptr = heap.allocate(32).unwrap();
            assert_eq!(chain(heap), [(0, 40, 80)]);

            let ptr = heap.resize(ptr, 24).unwrap().unwrap();
            assert_eq!(heap.payload_size(ptr).unwrap(), 32);
            assert_eq!(chain(heap), [(0, 40, 80)]);

            let ptr = heap.resize(ptr, 16).unwrap().unwrap();
            assert_eq!(heap.payload_size(ptr).unwrap(), 16);
            assert_eq!(chain(heap), [(0, 24, 96)]);
        });
    }

    #[test]
    fn test_allocation_keeps_small_excess() {
        let config = HeapConfig::new().with_min_block_size(16).unwrap();
        with_test_heap::<128, _>(config, |heap| {
            // 120 - 112 leaves 8 bytes, below the split threshold.
            let ptr = heap.allocate(104).unwrap();
            assert_eq!(heap.payload_size(ptr).unwrap(), 112);
            assert!(chain(heap).is_empty());
        });
        assert_eq!(HeapConfig::new().min_block_size(), DEFAULT_MIN_BLOCK_SIZE);
    }

    #[test]
    fn test_grow_in_place_forward() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let _a = heap.allocate(16).unwrap();
            let b = heap.allocate(16).unwrap();
            heap.payload_mut(b).unwrap().copy_from_slice(b"0123456789abcdef");

            let grown = heap.resize(b, 40).unwrap().unwrap();
            assert_eq!(grown, b);
            assert_eq!(heap.payload_size(grown).unwrap(), 40);
            assert_eq!(&heap.payload(grown).unwrap()[..16], b"0123456789abcdef");
            assert_eq!(chain(heap), [(0, 72, 48)]);
        });
    }

    #[test]
    fn test_grow_into_previous_block() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let a = heap.allocate(16).unwrap();
            let b = heap.allocate(16).unwrap();
            let _c = heap.allocate(64).unwrap();
            heap.payload_mut(b).unwrap().copy_from_slice(b"0123456789abcdef");
            heap.release(a).unwrap();

            let grown = heap.resize(b, 24).unwrap().unwrap();
            assert_eq!(grown, a);
            assert_eq!(&heap.payload(grown).unwrap()[..16], b"0123456789abcdef");
            assert_eq!(chain(heap), [(0, 32, 16)]);
            assert!(heap.payload(b).is_err());
        });
    }

    #[test]
    fn test_grow_relocates() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let a = heap.allocate(16).unwrap();
            let _b = heap.allocate(16).unwrap();
            let _c = heap.allocate(16).unwrap();
            heap.payload_mut(a).unwrap().copy_from_slice(b"0123456789abcdef");

            let moved = heap.resize(a, 32).unwrap().unwrap();
            assert_ne!(moved, a);
            assert_eq!(moved.offset(), 80);
            assert_eq!(&heap.payload(moved).unwrap()[..16], b"0123456789abcdef");
            assert_eq!(chain(heap), [(0, 0, 24), (0, 112, 8)]);

            let stats = heap.stats();
            assert_eq!(stats.alloc_count, 4);
            assert_eq!(stats.release_count, 1);
        });
    }

    #[test]
    fn test_failed_relocation_keeps_block() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let a = heap.allocate(16).unwrap();
            let _b = heap.allocate(88).unwrap();
            heap.payload_mut(a).unwrap().copy_from_slice(b"0123456789abcdef");
            let before = heap.stats();

            let mut slot = Some(a);
            assert!(matches!(
                heap.resize_slot(&mut slot, 64),
                Err(HeapError::OutOfMemory { size: 64, .. })
            ));
            assert_eq!(slot, Some(a));
            assert_eq!(heap.payload(a).unwrap(), b"0123456789abcdef");
            assert_eq!(heap.stats(), before);
            assert!(chain(heap).is_empty());
        });
    }

    #[test]
    fn test_resize_null_and_zero() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            assert_eq!(heap.resize(None::<HeapPtr>, 0).unwrap(), None);

            let mut slot = None;
            heap.resize_slot(&mut slot, 16).unwrap();
            let ptr = slot.unwrap();
            assert_eq!(heap.payload_size(ptr).unwrap(), 16);

            heap.resize_slot(&mut slot, 0).unwrap();
            assert_eq!(slot, None);
            assert!(heap.payload(ptr).is_err());
            assert_eq!(chain(heap), [(0, 0, 120)]);
        });
    }

    #[test]
    fn test_multiple_regions() {
        let mut bytes = Bytes([0u8; 128]);
        let (first, second) = bytes.0.split_at_mut(64);
        let mut heap = Heap::new();
        assert_eq!(heap.assign([first, second]).unwrap(), 2);

        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(24).unwrap();
        assert_eq!((a.region(), b.region()), (0, 0));
        assert_eq!(chain(&heap), [(1, 0, 56)]);

        heap.payload_mut(a).unwrap().copy_from_slice(b"0123456789abcdef");
        let moved = heap.resize(a, 32).unwrap().unwrap();
        assert_eq!(moved.region(), 1);
        assert_eq!(&heap.payload(moved).unwrap()[..16], b"0123456789abcdef");
        assert_eq!(chain(&heap), [(0, 0, 24), (1, 40, 16)]);

        let c = heap.allocate(8).unwrap();
        assert_eq!(c.region(), 0);
        assert!(heap.allocate(40).is_err());
        check_invariants(&heap);

        let stats = heap.stats();
        assert_eq!(stats.region_count, 2);
        assert_eq!(stats.total_bytes, 112);
    }

    #[test]
    fn test_assign_appends_regions() {
        let mut bytes = Bytes([0u8; 128]);
        let (first, second) = bytes.0.split_at_mut(64);
        let mut heap = Heap::new();
        heap.assign([first]).unwrap();
        let a = heap.allocate(48).unwrap();
        assert!(heap.allocate(16).is_err());

        heap.assign([second]).unwrap();
        let b = heap.allocate(16).unwrap();
        assert_eq!((a.region(), b.region()), (0, 1));
        assert_eq!(heap.stats().region_count, 2);
        check_invariants(&heap);
    }

    #[test]
    fn test_zero_fill() {
        with_test_heap::<128, _>(HeapConfig::new().with_zero_fill(true), |heap| {
            let ptr = heap.allocate(16).unwrap();
            assert!(heap.payload(ptr).unwrap().iter().all(|&b| b == 0));
            heap.payload_mut(ptr).unwrap().fill(0xFF);

            let _next = heap.allocate(16).unwrap();
            let moved = heap.resize(ptr, 48).unwrap().unwrap();
            let payload = heap.payload(moved).unwrap();
            assert!(payload[..16].iter().all(|&b| b == 0xFF));
            assert!(payload[16..].iter().all(|&b| b == 0));
        });
    }

    #[test]
    fn test_allocate_zeroed() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let plain = heap.allocate(16).unwrap();
            assert!(heap.payload(plain).unwrap().iter().all(|&b| b == 0x11));

            let zeroed = heap.allocate_zeroed(4, 4).unwrap();
            assert_eq!(heap.payload(zeroed).unwrap(), [0; 16]);
        });
    }

    #[test]
    fn test_stats() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let stats = heap.stats();
            assert_eq!(stats.total_bytes, 120);
            assert_eq!(stats.available_bytes, 120);

            let a = heap.allocate(16).unwrap();
            let _b = heap.allocate(16).unwrap();
            heap.release(a).unwrap();

            let stats = heap.stats();
            assert_eq!(stats.available_bytes, 96);
            assert_eq!(stats.min_ever_available_bytes, 72);
            assert_eq!(stats.used_bytes(), 24);
            assert_eq!(stats.alloc_count, 2);
            assert_eq!(stats.release_count, 1);
        });
    }

    #[test]
    fn test_address_of() {
        let mut bytes = Bytes([0u8; 128]);
        let base = bytes.0.as_ptr().addr();
        let mut heap = Heap::new();
        heap.assign([&mut bytes.0[..]]).unwrap();

        let _a = heap.allocate(16).unwrap();
        let b = heap.allocate(16).unwrap();
        assert_eq!(heap.address_of(b).unwrap(), base + 32);
        assert_eq!(heap.address_of(b).unwrap() % ALIGN, 0);
    }

    #[test]
    fn test_report_display() {
        with_test_heap::<128, _>(HeapConfig::new(), |heap| {
            let ptrs = (0..4).map(|_| heap.allocate(16).unwrap()).collect::<Vec<_>>();
            heap.resize(ptrs[0], 4).unwrap();

            let report = heap.debug_report();
            assert_eq!(report.block_count(), 2);
            let text = report.to_string();
            assert!(text.ends_with("total free: 32 bytes in 2 blocks"), "{text}");
            assert_eq!(text.lines().count(), 4);
            assert!(text.lines().nth(2).unwrap().ends_with("end"));
        });
    }
}
