//! First-fit free-list heap over caller-donated memory regions.
//!
//! The heap does not own any memory. The caller donates one or more byte
//! regions and the heap threads an 8-byte header in front of every block it
//! carves out of them. Free blocks of each region form a chain kept in address
//! order, so every release can merge a block with its free neighbours.
//!
//! Handles returned by the heap are [`HeapPtr`] values: a region index and an
//! offset, validated on every use. Releasing a block twice or passing a forged
//! handle is reported as [`HeapError::InvalidPointer`] and never corrupts the
//! heap.
//!
//! # Usage
//!
//! ```
//! use region_heap::{Heap, HeapConfig};
//!
//! #[repr(C, align(8))]
//! struct Memory([u8; 128]);
//!
//! let mut memory = Memory([0; 128]);
//! let mut heap = Heap::with_config(HeapConfig::new().with_zero_fill(true));
//! heap.assign([&mut memory.0[..]])?;
//!
//! let a = heap.allocate(16)?;
//! heap.payload_mut(a)?[..5].copy_from_slice(b"hello");
//!
//! // Growing may move the block; the content is preserved.
//! let a = heap.resize(a, 64)?.unwrap();
//! assert_eq!(&heap.payload(a)?[..5], b"hello");
//!
//! let mut slot = Some(a);
//! heap.release_and_null(&mut slot)?;
//! assert_eq!(slot, None);
//!
//! // 128 bytes minus the end sentinel.
//! assert_eq!(heap.debug_report().total_free(), 120);
//! # Ok::<(), region_heap::HeapError>(())
//! ```
//!
//! # Block layout
//!
//! | Field  | Free block              | Allocated block           |
//! |--------|-------------------------|---------------------------|
//! | `next` | offset of next free one | `0xDEADBEEF`              |
//! | `size` | total size              | total size, top bit set   |
//!
//! Sizes include the header and are multiples of [`config::ALIGN`]. Each
//! region ends with a zero-size sentinel header, so a region of `n` bytes
//! offers `n - 8` bytes to its blocks.
//!
//! # Thread safety
//!
//! [`Heap`] needs `&mut self` for every change. [`LockedHeap`] wraps it in a
//! spin lock for shared use.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    block::HeapPtr,
    config::{ConfigError, HeapConfig},
    error::{HeapError, RegionFault},
    heap::Heap,
    locked::LockedHeap,
    report::{DebugReport, FreeBlockInfo, FreeBlocks, NextFree},
    stats::HeapStats,
};

mod block;
pub mod config;
mod error;
mod free_list;
mod heap;
mod locked;
mod region;
mod report;
mod stats;
