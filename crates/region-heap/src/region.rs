//! Region table.
//!
//! Each donated region is laid out as a run of physically adjacent blocks
//! closed by a zero-size end sentinel:
//!
//! ```text
//! offset 0                                                  len - HEADER_SIZE
//! ┌─────────┬─────────┬────────────────────┬───────┬─────────┬────────────┐
//! │ block   │ block   │ block              │  ...  │ block   │ end (size 0)│
//! └─────────┴─────────┴────────────────────┴───────┴─────────┴────────────┘
//! ```
//!
//! The start sentinel is not stored in the region: [`Region`] keeps the offset
//! of the first free block itself, which plays the same role at the head of
//! the free chain.

use core::ops::Range;

use arrayvec::ArrayVec;
use snafu::ensure;

use crate::{
    block::Header,
    config::{ALIGN, HEADER_SIZE, MAX_BLOCK_SIZE, MAX_REGIONS},
    error::{HeapError, InvalidRegionSnafu, RegionFault},
};

/// Smallest region that can hold the end sentinel and one allocatable block.
const MIN_REGION_SIZE: usize = HEADER_SIZE + HEADER_SIZE + ALIGN;

pub(crate) struct Region<'a> {
    memory: &'a mut [u8],
    /// Head of the free chain; equals [`Region::end`] when nothing is free.
    pub(crate) first_free: usize,
}

impl<'a> Region<'a> {
    /// Formats `memory` as a single free block followed by the end sentinel.
    pub(crate) fn new(memory: &'a mut [u8]) -> Self {
        assert!(memory.len() >= MIN_REGION_SIZE);
        assert!(memory.len().is_multiple_of(ALIGN));

        let end = memory.len() - HEADER_SIZE;
        Header::Free {
            size: end,
            next: end,
        }
        .write(memory, 0);
        Header::End.write(memory, end);

        Self {
            memory,
            first_free: 0,
        }
    }

    /// Absolute address of the first byte of the region.
    pub(crate) fn base(&self) -> usize {
        self.memory.as_ptr().addr()
    }

    /// Region length in bytes, sentinel included.
    pub(crate) fn len(&self) -> usize {
        self.memory.len()
    }

    /// Offset of the end sentinel; also the number of bytes usable by blocks.
    pub(crate) fn end(&self) -> usize {
        self.memory.len() - HEADER_SIZE
    }

    fn span(&self) -> Range<usize> {
        self.base()..self.base() + self.len()
    }

    pub(crate) fn memory(&self) -> &[u8] {
        self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut [u8] {
        self.memory
    }

    pub(crate) fn header(&self, offset: usize) -> Header {
        Header::read(self.memory, offset)
    }

    pub(crate) fn set_header(&mut self, offset: usize, header: Header) {
        header.write(self.memory, offset);
    }

    /// Iterates over every block in address order, free or allocated.
    pub(crate) fn blocks(&self) -> Blocks<'_> {
        Blocks {
            region: self,
            offset: 0,
        }
    }

    /// Returns `true` if a block header starts exactly at `offset`.
    pub(crate) fn is_block_start(&self, offset: usize) -> bool {
        self.blocks()
            .map(|(start, _)| start)
            .take_while(|&start| start <= offset)
            .any(|start| start == offset)
    }
}

/// Physical walk over the blocks of a region, stopping at the end sentinel.
pub(crate) struct Blocks<'r> {
    region: &'r Region<'r>,
    offset: usize,
}

impl Iterator for Blocks<'_> {
    type Item = (usize, Header);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.region.end() {
            return None;
        }
        let header = self.region.header(self.offset);
        let start = self.offset;
        match header {
            Header::Free { .. } | Header::Allocated { .. } => self.offset += header.size(),
            Header::End | Header::Corrupt => {
                panic!("broken block chain at offset {start:#x}: {header:?}")
            }
        }
        Some((start, header))
    }
}

/// Ordered set of regions donated to a heap.
pub(crate) struct RegionTable<'a> {
    regions: ArrayVec<Region<'a>, MAX_REGIONS>,
}

impl<'a> RegionTable<'a> {
    pub(crate) const fn new() -> Self {
        Self {
            regions: ArrayVec::new_const(),
        }
    }

    /// Validates every region in `regions`, then registers all of them.
    ///
    /// Nothing is registered unless every region is accepted. Returns the
    /// number of regions added.
    pub(crate) fn assign<I>(&mut self, regions: I) -> Result<usize, HeapError>
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        let mut pending = ArrayVec::<&'a mut [u8], MAX_REGIONS>::new();
        for memory in regions {
            let index = self.regions.len() + pending.len();
            ensure!(
                index < MAX_REGIONS,
                InvalidRegionSnafu {
                    index,
                    reason: RegionFault::TableFull
                }
            );

            let len = usable_len(memory).map_err(|reason| {
                InvalidRegionSnafu { index, reason }.build()
            })?;
            let memory = &mut memory[..len];

            let span = memory.as_ptr().addr()..memory.as_ptr().addr() + len;
            let overlaps = self.regions.iter().any(|r| overlap(&r.span(), &span))
                || pending.iter().any(|m| {
                    let start = m.as_ptr().addr();
                    overlap(&(start..start + m.len()), &span)
                });
            ensure!(
                !overlaps,
                InvalidRegionSnafu {
                    index,
                    reason: RegionFault::Overlap
                }
            );

            pending.push(memory);
        }

        ensure!(
            !pending.is_empty(),
            InvalidRegionSnafu {
                index: self.regions.len(),
                reason: RegionFault::NoRegions
            }
        );

        let added = pending.len();
        for memory in pending {
            let region = Region::new(memory);
            log::debug!(
                "region #{} registered: base={:#x} len={} usable={}",
                self.regions.len(),
                region.base(),
                region.len(),
                region.end()
            );
            self.regions.push(region);
        }
        Ok(added)
    }

    pub(crate) fn len(&self) -> usize {
        self.regions.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Region<'a>> {
        self.regions.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Region<'a>> {
        self.regions.get_mut(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Region<'a>> {
        self.regions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Region<'a>> {
        self.regions.iter_mut()
    }

    /// Copies `len` bytes between two payload locations, possibly in
    /// different regions. Overlapping ranges in one region are handled.
    pub(crate) fn copy(&mut self, src: (usize, usize), dst: (usize, usize), len: usize) {
        let ((src_region, src_offset), (dst_region, dst_offset)) = (src, dst);
        if src_region == dst_region {
            self.regions[src_region]
                .memory
                .copy_within(src_offset..src_offset + len, dst_offset);
            return;
        }

        let (low, high) = self.regions.split_at_mut(src_region.max(dst_region));
        let (src, dst) = if src_region < dst_region {
            (&low[src_region], &mut high[0])
        } else {
            (&high[0], &mut low[dst_region])
        };
        dst.memory[dst_offset..][..len].copy_from_slice(&src.memory[src_offset..][..len]);
    }
}

/// Checks a candidate region and returns its length truncated to [`ALIGN`].
fn usable_len(memory: &[u8]) -> Result<usize, RegionFault> {
    if memory.is_empty() {
        return Err(RegionFault::Empty);
    }
    if !memory.as_ptr().addr().is_multiple_of(ALIGN) {
        return Err(RegionFault::Misaligned);
    }
    if memory.len() > MAX_BLOCK_SIZE {
        return Err(RegionFault::TooLarge);
    }
    let len = memory.len() / ALIGN * ALIGN;
    if len < MIN_REGION_SIZE {
        return Err(RegionFault::TooSmall);
    }
    Ok(len)
}

fn overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
