//! Free chain maintenance.
//!
//! Free blocks of a region form a singly linked chain sorted by address. The
//! chain starts at [`Region::first_free`] and ends at the region's end
//! sentinel:
//!
//! ```text
//! first_free ──▶ ┌──────┐ ──▶ ┌──────┐ ──▶ ┌──────┐ ──▶ end sentinel
//!                │ free │     │ free │     │ free │
//!                └──────┘     └──────┘     └──────┘
//! ```
//!
//! Two free blocks in the chain are never adjacent in memory: every insertion
//! merges the new block with the free neighbours it touches.

use crate::{block::Header, config::HEADER_SIZE, region::Region};

/// A free block as seen while walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeBlock {
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) next: usize,
}

/// Free blocks surrounding an offset.
#[derive(Debug, Clone, Copy)]
struct Neighbours {
    /// Free block preceding `prev`, `None` if `prev` is the chain head.
    before_prev: Option<usize>,
    /// Last free block below the offset, `None` if there is none.
    prev: Option<usize>,
    /// First free block above the offset, or the end sentinel.
    next: usize,
}

/// Iterator over the free chain of one region.
pub(crate) struct FreeChain<'r> {
    region: &'r Region<'r>,
    current: usize,
}

impl Iterator for FreeChain<'_> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == self.region.end() {
            return None;
        }
        let block = self.region.free_block(self.current);
        assert!(
            block.next > block.offset,
            "free chain is not address ordered at {:#x}",
            block.offset
        );
        self.current = block.next;
        Some(block)
    }
}

impl Region<'_> {
    pub(crate) fn free_chain(&self) -> FreeChain<'_> {
        FreeChain {
            region: self,
            current: self.first_free,
        }
    }

    /// Total size of all free blocks, headers included.
    pub(crate) fn free_bytes(&self) -> usize {
        self.free_chain().map(|block| block.size).sum()
    }

    fn free_block(&self, offset: usize) -> FreeBlock {
        match self.header(offset) {
            Header::Free { size, next } => FreeBlock { offset, size, next },
            header => panic!("block at {offset:#x} is not free: {header:?}"),
        }
    }

    /// Points `prev` (or the chain head) at `next`.
    fn link(&mut self, prev: Option<usize>, next: usize) {
        match prev {
            Some(prev) => {
                let FreeBlock { size, .. } = self.free_block(prev);
                self.set_header(prev, Header::Free { size, next });
            }
            None => self.first_free = next,
        }
    }

    fn neighbours(&self, offset: usize) -> Neighbours {
        let mut before_prev = None;
        let mut prev = None;
        let mut next = self.first_free;
        for block in self.free_chain() {
            if block.offset >= offset {
                assert_ne!(block.offset, offset, "block {offset:#x} is already free");
                break;
            }
            before_prev = prev;
            prev = Some(block.offset);
            next = block.next;
        }
        Neighbours {
            before_prev,
            prev,
            next,
        }
    }

    /// Returns the first free block able to hold `total` bytes, with the free
    /// block preceding it.
    pub(crate) fn find_fit(&self, total: usize) -> Option<(Option<usize>, FreeBlock)> {
        let mut prev = None;
        for block in self.free_chain() {
            if block.size >= total {
                return Some((prev, block));
            }
            prev = Some(block.offset);
        }
        None
    }

    /// Hands out the span `offset..offset + size` as an allocated block of at
    /// least `total` bytes.
    ///
    /// The span must already be out of the chain, with `prev` being the free
    /// block below it and `next` the free block above it. If the excess is at
    /// least `min_block_size`, it is split off as a free block in the same
    /// chain slot; otherwise the whole span is allocated. Returns the size of
    /// the allocated block.
    fn claim(
        &mut self,
        prev: Option<usize>,
        next: usize,
        offset: usize,
        size: usize,
        total: usize,
        min_block_size: usize,
    ) -> usize {
        assert!(size >= total);
        let excess = size - total;
        if excess >= min_block_size {
            let rest = offset + total;
            self.set_header(rest, Header::Free { size: excess, next });
            self.link(prev, rest);
            self.set_header(offset, Header::Allocated { size: total });
            total
        } else {
            self.link(prev, next);
            self.set_header(offset, Header::Allocated { size });
            size
        }
    }

    /// Allocates `total` bytes out of the free block `block`.
    pub(crate) fn take(
        &mut self,
        prev: Option<usize>,
        block: FreeBlock,
        total: usize,
        min_block_size: usize,
    ) -> usize {
        self.claim(
            prev,
            block.next,
            block.offset,
            block.size,
            total,
            min_block_size,
        )
    }

    /// Returns the span `offset..offset + size` to the free chain.
    ///
    /// The block is placed at its address-ordered position and merged with the
    /// previous and the next free block when they touch it. Returns the offset
    /// of the resulting free block.
    pub(crate) fn insert_free(&mut self, offset: usize, size: usize) -> usize {
        let Neighbours { prev, next, .. } = self.neighbours(offset);

        let (start, mut size) = match prev.map(|prev| self.free_block(prev)) {
            Some(prev) if prev.offset + prev.size == offset => (prev.offset, prev.size + size),
            _ => (offset, size),
        };

        let mut after = next;
        if next != self.end() {
            let next = self.free_block(next);
            if start + size == next.offset {
                size += next.size;
                after = next.next;
            }
        }

        self.set_header(start, Header::Free { size, next: after });
        if start == offset {
            self.link(prev, start);
        }
        start
    }

    /// Reduces the allocated block at `offset` from `size` to `total` bytes and
    /// frees the tail.
    pub(crate) fn shrink(&mut self, offset: usize, size: usize, total: usize) {
        assert!(total < size);
        self.set_header(offset, Header::Allocated { size: total });
        self.insert_free(offset + total, size - total);
    }

    /// Tries to grow the allocated block at `offset` to `total` bytes without
    /// leaving the region.
    ///
    /// The free block right after the allocation is absorbed first. If that is
    /// not enough, the free block right before it is absorbed too, along with
    /// the one after if it touches the block, and the payload is moved down. Returns the new
    /// block offset and size, or `None` if the neighbours are too small, in
    /// which case nothing is modified.
    pub(crate) fn grow(
        &mut self,
        offset: usize,
        size: usize,
        total: usize,
        min_block_size: usize,
    ) -> Option<(usize, usize)> {
        let Neighbours {
            before_prev,
            prev,
            next,
        } = self.neighbours(offset);

        let next = (next != self.end())
            .then(|| self.free_block(next))
            .filter(|block| block.offset == offset + size);
        if let Some(next) = next {
            if size + next.size >= total {
                let size = self.claim(
                    prev,
                    next.next,
                    offset,
                    size + next.size,
                    total,
                    min_block_size,
                );
                return Some((offset, size));
            }
        }

        let prev = prev
            .map(|prev| self.free_block(prev))
            .filter(|block| block.offset + block.size == offset)?;
        // A touching next block is absorbed too; a split remainder must not
        // border a free block.
        let (combined, after) = match next {
            Some(next) => (prev.size + size + next.size, next.next),
            None => (prev.size + size, prev.next),
        };
        if combined < total {
            return None;
        }

        self.memory_mut().copy_within(
            offset + HEADER_SIZE..offset + size,
            prev.offset + HEADER_SIZE,
        );
        let size = self.claim(
            before_prev,
            after,
            prev.offset,
            combined,
            total,
            min_block_size,
        );
        Some((prev.offset, size))
    }
}
