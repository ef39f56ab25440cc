use core::fmt;

use snafu::{Location, Snafu};

use crate::block::HeapPtr;

/// Why a region was refused by [`Heap::assign`](crate::Heap::assign).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFault {
    /// No region was supplied.
    NoRegions,
    /// The region has zero length.
    Empty,
    /// The region cannot hold an end sentinel and one minimal block.
    TooSmall,
    /// The region base is not aligned to [`ALIGN`](crate::config::ALIGN).
    Misaligned,
    /// The region exceeds [`MAX_BLOCK_SIZE`](crate::config::MAX_BLOCK_SIZE).
    TooLarge,
    /// The region overlaps a registered region or another one in the same call.
    Overlap,
    /// The region table is full.
    TableFull,
}

impl fmt::Display for RegionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoRegions => "no regions supplied",
            Self::Empty => "zero-length region",
            Self::TooSmall => "region too small",
            Self::Misaligned => "misaligned region base",
            Self::TooLarge => "region too large",
            Self::Overlap => "overlapping region",
            Self::TableFull => "region table full",
        };
        f.write_str(msg)
    }
}

/// Errors reported by the heap.
///
/// Every failure leaves the heap in the state it had before the call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum HeapError {
    #[snafu(display("invalid region #{index}: {reason}"))]
    InvalidRegion {
        index: usize,
        reason: RegionFault,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("invalid allocation size: {size}"))]
    InvalidSize {
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("allocation size overflows: {count} elements of {size} bytes"))]
    SizeOverflow {
        count: usize,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("out of memory: no free block can hold {size} bytes"))]
    OutOfMemory {
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pointer {pointer} does not refer to a live block"))]
    InvalidPointer {
        pointer: HeapPtr,
        #[snafu(implicit)]
        location: Location,
    },
}
