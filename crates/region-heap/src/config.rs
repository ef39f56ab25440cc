//! Layout constants and runtime policy of the heap.

use snafu::{Snafu, ensure};

/// Granule of every block size and alignment of every payload.
pub const ALIGN: usize = 8;

/// Size of the metadata record placed in front of every block.
///
/// The header holds two `u32` words: the offset of the next free block and the
/// total block size (with the allocated bit in the top position).
pub const HEADER_SIZE: usize = 8;

/// Smallest remainder worth splitting off as a new free block.
///
/// A free block only needs its header to stay linked in the free chain, so the
/// default equals [`HEADER_SIZE`].
pub const DEFAULT_MIN_BLOCK_SIZE: usize = HEADER_SIZE;

/// Maximum number of regions a single heap can manage.
pub const MAX_REGIONS: usize = 16;

/// Largest block (and region) size that fits the header encoding.
pub const MAX_BLOCK_SIZE: usize = (1 << 31) - 1;

const _: () = assert!(ALIGN.is_power_of_two());
const _: () = assert!(HEADER_SIZE.is_multiple_of(ALIGN));
const _: () = assert!(DEFAULT_MIN_BLOCK_SIZE >= HEADER_SIZE);

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum ConfigError {
    #[snafu(display(
        "minimum block size {size} must be a multiple of {} and at least {}",
        ALIGN,
        HEADER_SIZE
    ))]
    InvalidMinBlockSize {
        size: usize,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}

/// Runtime policy of a [`Heap`](crate::Heap).
///
/// ```
/// use region_heap::HeapConfig;
///
/// let config = HeapConfig::new()
///     .with_min_block_size(16)
///     .unwrap()
///     .with_zero_fill(true);
/// assert_eq!(config.min_block_size(), 16);
/// assert!(config.zero_fill());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    min_block_size: usize,
    zero_fill: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            zero_fill: false,
        }
    }

    /// Sets the split threshold used by allocation and in-place resizing.
    ///
    /// When the excess of a chosen block is smaller than this value the whole
    /// block is handed out instead of being split.
    pub fn with_min_block_size(self, size: usize) -> Result<Self, ConfigError> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::config_error::*;

        ensure!(
            size >= HEADER_SIZE && size.is_multiple_of(ALIGN) && size <= MAX_BLOCK_SIZE,
            InvalidMinBlockSizeSnafu { size }
        );
        Ok(Self {
            min_block_size: size,
            ..self
        })
    }

    /// Zero every payload handed out by allocation or relocation.
    #[must_use]
    pub const fn with_zero_fill(self, zero_fill: bool) -> Self {
        Self { zero_fill, ..self }
    }

    #[must_use]
    pub const fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    #[must_use]
    pub const fn zero_fill(&self) -> bool {
        self.zero_fill
    }
}

/// Rounds `size` up to the block granule and adds the header overhead.
///
/// Returns `None` for zero sizes and for totals that do not fit a header.
pub(crate) fn block_size_for(size: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }
    let total = size.checked_next_multiple_of(ALIGN)?.checked_add(HEADER_SIZE)?;
    (total <= MAX_BLOCK_SIZE).then_some(total)
}
