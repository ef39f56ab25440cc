//! Block header encoding and the payload handle.
//!
//! Every block, free or allocated, starts with an 8-byte header stored inside
//! the region bytes:
//!
//! ```text
//! ┌──────────────┬───────────────────────────┬─────────────────────────┐
//! │ next: u32    │ size: u32                 │ payload ...             │
//! │ free: offset │ bit 31: allocated flag    │ (size - HEADER_SIZE)    │
//! │ alloc: mark  │ bits 0..31: total size    │                         │
//! └──────────────┴───────────────────────────┴─────────────────────────┘
//! ```
//!
//! Free blocks store the region offset of the next free block (or of the end
//! sentinel). Allocated blocks store [`ALLOC_MARK`] there instead, which lets
//! release and resize reject handles that do not point at a live block.

use core::fmt;

use dataview::{DataView, Pod};
use platform_cast::CastFrom as _;

use crate::config::{ALIGN, HEADER_SIZE};

const ALLOC_BIT: u32 = 1 << 31;
const ALLOC_MARK: u32 = 0xDEAD_BEEF;
const NO_NEXT: u32 = u32::MAX;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
struct RawHeader {
    next: u32,
    size: u32,
}
const _: () = assert!(size_of::<RawHeader>() == HEADER_SIZE);

/// Decoded block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Header {
    /// Free block linked to the free block (or end sentinel) at `next`.
    Free { size: usize, next: usize },
    /// Block handed out to a caller.
    Allocated { size: usize },
    /// Zero-size marker closing the region.
    End,
    /// Bytes that do not decode as any header.
    Corrupt,
}

impl Header {
    /// Total size of the block including its header.
    pub(crate) fn size(self) -> usize {
        match self {
            Self::Free { size, .. } | Self::Allocated { size } => size,
            Self::End | Self::Corrupt => 0,
        }
    }

    pub(crate) fn read(memory: &[u8], offset: usize) -> Self {
        let raw = DataView::from(memory).read::<RawHeader>(offset);
        let size = usize::cast_from(raw.size & !ALLOC_BIT);
        let next = usize::cast_from(raw.next);
        let sized = size != 0 && size.is_multiple_of(ALIGN);
        match (raw.size & ALLOC_BIT != 0, raw.next) {
            (false, NO_NEXT) if size == 0 => Self::End,
            (false, raw_next) if raw_next != ALLOC_MARK && sized && next.is_multiple_of(ALIGN) => {
                Self::Free { size, next }
            }
            (true, ALLOC_MARK) if sized => Self::Allocated { size },
            _ => Self::Corrupt,
        }
    }

    pub(crate) fn write(self, memory: &mut [u8], offset: usize) {
        let raw = match self {
            Self::Free { size, next } => RawHeader {
                next: encode(next),
                size: encode(size),
            },
            Self::Allocated { size } => RawHeader {
                next: ALLOC_MARK,
                size: encode(size) | ALLOC_BIT,
            },
            Self::End => RawHeader {
                next: NO_NEXT,
                size: 0,
            },
            Self::Corrupt => unreachable!("corrupt headers are never written"),
        };
        DataView::from_mut(memory).write(offset, &raw);
    }
}

/// Converts a region offset or size into its header representation.
///
/// Regions are capped at [`MAX_BLOCK_SIZE`](crate::config::MAX_BLOCK_SIZE)
/// when assigned, so every offset and size fits in 31 bits.
#[expect(clippy::cast_possible_truncation)]
fn encode(value: usize) -> u32 {
    debug_assert!(value < usize::cast_from(ALLOC_BIT));
    value as u32
}

/// Opaque handle to an allocated payload.
///
/// The handle names the region and the payload offset inside it; the header
/// sits [`HEADER_SIZE`] bytes below. Handles are plain values: after the block
/// is released or resized, the old handle is dead even if a later allocation
/// happens to produce an equal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr {
    region: usize,
    offset: usize,
}

impl HeapPtr {
    pub(crate) fn from_header(region: usize, header_offset: usize) -> Self {
        Self {
            region,
            offset: header_offset + HEADER_SIZE,
        }
    }

    /// Index of the region holding the payload.
    #[must_use]
    pub fn region(&self) -> usize {
        self.region
    }

    /// Offset of the payload from the region base.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of the block header, if the handle can have one.
    pub(crate) fn header_offset(self) -> Option<usize> {
        self.offset.checked_sub(HEADER_SIZE)
    }
}

impl fmt::Display for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.region, self.offset)
    }
}
