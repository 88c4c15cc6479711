//! Block Free-Map
//!
//! One byte per block: `0` is free, `1` is in use.  The map is persisted verbatim, immediately after
//! the user table.
//!
//! Allocation is first-fit in index order and need not be contiguous.  It is all or nothing: when
//! the map can't satisfy a request, every block claimed along the way is handed back before the
//! error is returned, so a failed allocation leaves the map exactly as it found it.
use log::{debug, trace};

use crate::{
    block::BlockNumber,
    error::{OmniErrorKind, Result},
};

const FREE: u8 = 0;
const USED: u8 = 1;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FreeMap {
    map: Vec<u8>,
}

impl FreeMap {
    /// A map of `count` free blocks
    pub(crate) fn new(count: usize) -> Self {
        FreeMap {
            map: vec![FREE; count],
        }
    }

    /// Rebuild a map from its persisted bytes
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        FreeMap { map: bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    /// The number of available, un-allocated blocks.
    ///
    pub(crate) fn free_block_count(&self) -> usize {
        self.map.iter().filter(|b| **b == FREE).count()
    }

    #[cfg(test)]
    pub(crate) fn is_free(&self, block: BlockNumber) -> bool {
        self.map.get(block as usize) == Some(&FREE)
    }

    /// Mark a run of blocks as permanently used
    ///
    /// This is how the file table region is fenced off at format time.
    pub(crate) fn reserve(&mut self, first: usize, count: usize) {
        let end = (first + count).min(self.map.len());
        for b in &mut self.map[first.min(end)..end] {
            *b = USED;
        }
    }

    /// Claim `count` blocks
    ///
    /// The first `count` free blocks, in index order, are marked used and returned.  If fewer than
    /// `count` are available, the blocks claimed by this call are released again and the call
    /// fails with `NoSpace`.
    pub(crate) fn allocate(&mut self, count: usize) -> Result<Vec<BlockNumber>> {
        let mut claimed = Vec::with_capacity(count);

        for (number, state) in self.map.iter_mut().enumerate() {
            if claimed.len() == count {
                break;
            }
            if *state == FREE {
                *state = USED;
                claimed.push(number as BlockNumber);
            }
        }

        if claimed.len() < count {
            debug!(
                "allocation of {} blocks failed; only {} free, rolling back",
                count,
                claimed.len()
            );
            self.release(&claimed);
            return Err(OmniErrorKind::NoSpace.into());
        }

        trace!("allocated blocks {:?}", claimed);
        Ok(claimed)
    }

    /// Recycle blocks
    ///
    /// The blocks are no longer being used, and are returned to the free pool.  Numbers past the
    /// end of the map are ignored.
    pub(crate) fn release(&mut self, blocks: &[BlockNumber]) {
        for block in blocks {
            if let Some(state) = self.map.get_mut(*block as usize) {
                *state = FREE;
            }
        }
        trace!("released blocks {:?}", blocks);
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn first_fit_in_order() {
        let mut map = FreeMap::new(8);
        assert_eq!(map.allocate(3).unwrap(), vec![0, 1, 2]);

        map.release(&[1]);
        assert_eq!(
            map.allocate(2).unwrap(),
            vec![1, 3],
            "allocation need not be contiguous"
        );
        assert_eq!(map.free_block_count(), 4);
    }

    #[test]
    fn exhaustion_rolls_back() {
        let mut map = FreeMap::new(6);
        map.allocate(2).unwrap();
        map.release(&[0]);
        let before = map.clone();

        assert_matches!(
            map.allocate(6).map_err(|e| e.kind()),
            Err(OmniErrorKind::NoSpace)
        );
        assert_eq!(
            map.as_bytes(),
            before.as_bytes(),
            "a failed allocation leaves the map byte-for-byte unchanged"
        );
    }

    #[test]
    fn release_ignores_bogus_blocks() {
        let mut map = FreeMap::new(4);
        map.allocate(4).unwrap();
        map.release(&[2, 99, 1000]);
        assert_eq!(map.free_block_count(), 1);
        assert!(map.is_free(2));
        assert!(!map.is_free(99));
    }

    #[test]
    fn reserved_blocks_are_never_allocated() {
        let mut map = FreeMap::new(4);
        map.reserve(2, 2);
        assert_eq!(map.allocate(2).unwrap(), vec![0, 1]);
        assert!(map.allocate(1).is_err());
    }

    #[test]
    fn zero_block_allocation() {
        let mut map = FreeMap::new(0);
        assert!(map.allocate(0).unwrap().is_empty());
    }
}
