//! Free chain snapshots for diagnostics.
//!
//! ```text
//!     #  region             address   size   next
//!     0       0  0x00007ffd5a1c0010      8   0x00007ffd5a1c0060
//!     1       0  0x00007ffd5a1c0060     24   end
//! total free: 32 bytes in 2 blocks
//! ```

use core::fmt;

use crate::{
    config::HEADER_SIZE,
    free_list::FreeChain,
    region::{Region, RegionTable},
};

/// Successor of a free block in its region's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextFree {
    /// Address of the next free block.
    Block(usize),
    /// The block is the last one before the region's end sentinel.
    End,
}

impl fmt::Display for NextFree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(addr) => write!(f, "{addr:#018x}"),
            Self::End => f.write_str("end"),
        }
    }
}

/// One row of a [`DebugReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlockInfo {
    /// Position of the block across all regions, starting at 0.
    pub index: usize,
    /// Region holding the block.
    pub region: usize,
    /// Address of the block header.
    pub address: usize,
    /// Total block size, header included.
    pub free_size: usize,
    /// Next free block in the same region.
    pub next: NextFree,
}

impl FreeBlockInfo {
    /// Largest payload the block could serve without its header.
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        self.free_size - HEADER_SIZE
    }
}

/// Read-only view of every region's free chain.
///
/// The report borrows the heap, so it always reflects a consistent state.
pub struct DebugReport<'h, 'a> {
    regions: &'h RegionTable<'a>,
}

impl<'h, 'a> DebugReport<'h, 'a> {
    pub(crate) fn new(regions: &'h RegionTable<'a>) -> Self {
        Self { regions }
    }

    /// Iterates over the free blocks, region by region in address order.
    #[must_use]
    pub fn iter(&self) -> FreeBlocks<'h, 'a> {
        FreeBlocks {
            regions: self.regions,
            region: 0,
            chain: None,
            index: 0,
        }
    }

    /// Sum of all free block sizes.
    #[must_use]
    pub fn total_free(&self) -> usize {
        self.regions.iter().map(Region::free_bytes).sum()
    }

    /// Number of free blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.regions.iter().map(|r| r.free_chain().count()).sum()
    }
}

impl<'h, 'a> IntoIterator for &DebugReport<'h, 'a> {
    type Item = FreeBlockInfo;
    type IntoIter = FreeBlocks<'h, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for DebugReport<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>5}  {:>6}  {:>18}  {:>6}   next",
            "#", "region", "address", "size"
        )?;
        let mut count = 0;
        let mut total = 0;
        for block in self {
            writeln!(
                f,
                "{:>5}  {:>6}  {:#018x}  {:>6}   {}",
                block.index, block.region, block.address, block.free_size, block.next
            )?;
            count += 1;
            total += block.free_size;
        }
        write!(f, "total free: {total} bytes in {count} blocks")
    }
}

impl fmt::Debug for DebugReport<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator returned by [`DebugReport::iter`].
pub struct FreeBlocks<'h, 'a> {
    regions: &'h RegionTable<'a>,
    region: usize,
    chain: Option<FreeChain<'h>>,
    index: usize,
}

impl Iterator for FreeBlocks<'_, '_> {
    type Item = FreeBlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let region = self.regions.get(self.region)?;
            let chain = self.chain.get_or_insert_with(|| region.free_chain());
            let Some(block) = chain.next() else {
                self.chain = None;
                self.region += 1;
                continue;
            };

            let base = region.base();
            let next = if block.next == region.end() {
                NextFree::End
            } else {
                NextFree::Block(base + block.next)
            };
            let info = FreeBlockInfo {
                index: self.index,
                region: self.region,
                address: base + block.offset,
                free_size: block.size,
                next,
            };
            self.index += 1;
            return Some(info);
        }
    }
}
