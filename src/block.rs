//! Container Blocks
//!
//! Everything after the free-map is a run of equally sized blocks.  A file owns an ordered list of
//! block numbers, and its bytes are laid out across those blocks in list order.  Block `n` lives at
//! `content_base + n * block_size`, where `content_base` is the first byte after the free-map.
//!
//! The last few blocks of the region are not for file content at all: they hold the serialized
//! file table.  Those are marked used when the container is formatted, so the allocator simply
//! never sees them as free.

pub(crate) mod map;
pub(crate) mod storage;

/// Index of a block within the content region
///
/// Block lists are persisted as `u32`, so that is what we use everywhere.
pub type BlockNumber = u32;

/// Block size, and other block-ish byte counts
pub type BlockSize = u64;

/// How many blocks are needed to hold `len` bytes
pub(crate) fn blocks_needed(len: u64, block_size: BlockSize) -> u64 {
    if block_size == 0 {
        0
    } else {
        (len + block_size - 1) / block_size
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ceiling_division() {
        assert_eq!(blocks_needed(0, 512), 0);
        assert_eq!(blocks_needed(1, 512), 1);
        assert_eq!(blocks_needed(512, 512), 1);
        assert_eq!(blocks_needed(513, 512), 2);
        assert_eq!(blocks_needed(10, 0), 0);
    }
}
