use core::fmt;

use spin::{Mutex, MutexGuard};

use crate::{Heap, HeapConfig, HeapError, HeapPtr, HeapStats};

/// A [`Heap`] behind a spin lock, shareable between threads.
///
/// Each method locks the heap for the duration of one operation. Use
/// [`LockedHeap::lock`] to run several operations, or to take a
/// [`DebugReport`](crate::DebugReport), under a single lock.
pub struct LockedHeap<'a> {
    heap: Mutex<Heap<'a>>,
}

impl Default for LockedHeap<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockedHeap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("LockedHeap");
        match self.heap.try_lock() {
            Some(heap) => d.field("stats", &heap.stats()),
            None => d.field("stats", &"<locked>"),
        };
        d.finish()
    }
}

impl<'a> LockedHeap<'a> {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_config(HeapConfig::new())
    }

    #[must_use]
    pub const fn with_config(config: HeapConfig) -> Self {
        Self {
            heap: Mutex::new(Heap::with_config(config)),
        }
    }

    /// Locks the heap until the guard is dropped.
    #[must_use]
    pub fn lock(&self) -> MutexGuard<'_, Heap<'a>> {
        self.heap.lock()
    }

    #[must_use]
    pub fn into_inner(self) -> Heap<'a> {
        self.heap.into_inner()
    }

    pub fn assign<I>(&self, regions: I) -> Result<usize, HeapError>
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        self.lock().assign(regions)
    }

    pub fn allocate(&self, size: usize) -> Result<HeapPtr, HeapError> {
        self.lock().allocate(size)
    }

    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Result<HeapPtr, HeapError> {
        self.lock().allocate_zeroed(count, size)
    }

    pub fn release<P>(&self, ptr: P) -> Result<(), HeapError>
    where
        P: Into<Option<HeapPtr>>,
    {
        self.lock().release(ptr)
    }

    pub fn release_and_null(&self, slot: &mut Option<HeapPtr>) -> Result<(), HeapError> {
        self.lock().release_and_null(slot)
    }

    pub fn resize<P>(&self, ptr: P, new_size: usize) -> Result<Option<HeapPtr>, HeapError>
    where
        P: Into<Option<HeapPtr>>,
    {
        self.lock().resize(ptr, new_size)
    }

    pub fn resize_slot(&self, slot: &mut Option<HeapPtr>, new_size: usize) -> Result<(), HeapError> {
        self.lock().resize_slot(slot, new_size)
    }

    /// Sum of all free block sizes, taken under the lock.
    #[must_use]
    pub fn total_free(&self) -> usize {
        self.lock().debug_report().total_free()
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.lock().stats()
    }
}
