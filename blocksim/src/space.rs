//! Free-space accounting views.
//!
//! Both views are recomputed from the block store on every call. They describe a partition for
//! display and checking; allocation always consults the store itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::store::{BlockNumber, BlockRange, BlockStatus, BlockStore};

/// How a partition presents its free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpaceManagementMethod {
    Bitmap,
    FreeList,
}

impl fmt::Display for SpaceManagementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpaceManagementMethod::Bitmap => "bitmap",
            SpaceManagementMethod::FreeList => "freeList",
        })
    }
}

impl FromStr for SpaceManagementMethod {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitmap" => Ok(SpaceManagementMethod::Bitmap),
            "freelist" | "free-list" => Ok(SpaceManagementMethod::FreeList),
            other => Err(SimError::Validation(format!(
                "unknown space management method \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block of a partition, 0 for free and 1 for anything else. Bit `i` describes the
/// partition's `i`th block, not disk block `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// A bitmap of `len` free entries.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; (len + 63) / 64],
            len,
        }
    }

    /// Projects the occupancy of `range` out of the store.
    pub fn for_range(store: &BlockStore, range: BlockRange) -> Self {
        let mut bmp = Bitmap::new(range.len());
        for (offset, block) in store.slice(range).iter().enumerate() {
            if block.status != BlockStatus::Free {
                bmp.set_reserved(offset);
            }
        }
        bmp
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, offset: usize) -> State {
        assert!(offset < self.len, "bitmap offset {} out of range", offset);
        let mask = 0b01_u64 << (offset % 64);
        if self.words[offset / 64] & mask == 0 {
            State::Free
        } else {
            State::Used
        }
    }

    pub fn set_reserved(&mut self, offset: usize) {
        assert!(offset < self.len, "bitmap offset {} out of range", offset);
        self.words[offset / 64] |= 0b01_u64 << (offset % 64);
    }

    pub fn count_free(&self) -> usize {
        self.len - self.words.iter().map(|w| w.count_ones() as usize).sum::<usize>()
    }

    /// The bitmap as a sequence of 0/1 values.
    pub fn bits(&self) -> Vec<u8> {
        (0..self.len)
            .map(|offset| match self.get(offset) {
                State::Free => 0,
                State::Used => 1,
            })
            .collect()
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits() {
            write!(f, "{}", bit)?;
        }
        Ok(())
    }
}

/// Disk block numbers of the free blocks in `range`, ascending.
pub fn free_block_list(store: &BlockStore, range: BlockRange) -> Vec<BlockNumber> {
    store
        .slice(range)
        .iter()
        .filter(|b| b.status == BlockStatus::Free)
        .map(|b| b.index)
        .collect()
}

/// The view a partition's space management method calls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpaceView {
    Bitmap(Bitmap),
    FreeList(Vec<BlockNumber>),
}

impl SpaceView {
    pub fn project(method: SpaceManagementMethod, store: &BlockStore, range: BlockRange) -> Self {
        match method {
            SpaceManagementMethod::Bitmap => SpaceView::Bitmap(Bitmap::for_range(store, range)),
            SpaceManagementMethod::FreeList => {
                SpaceView::FreeList(free_block_list(store, range))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new(100);

        bmp.set_reserved(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new(130);

        bmp.set_reserved(0);
        bmp.set_reserved(129);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(129), State::Used);
        assert_eq!(bmp.count_free(), 128);
    }

    #[test]
    #[should_panic]
    fn reading_past_the_end_panics() {
        Bitmap::new(8).get(8);
    }

    #[test]
    fn projects_partition_relative_bits() {
        let mut store = BlockStore::new(8);
        let range = BlockRange::new(4, 7);
        store.reserve_range(range, 1);
        store.set_reserved(5, BlockStatus::Used);
        store.set_reserved(7, BlockStatus::Directory);

        let bmp = Bitmap::for_range(&store, range);
        assert_eq!(bmp.bits(), vec![0, 1, 0, 1]);
        assert_eq!(bmp.to_string(), "0101");
        assert_eq!(free_block_list(&store, range), vec![4, 6]);
    }

    #[test]
    fn view_follows_partition_method() {
        let mut store = BlockStore::new(4);
        let range = BlockRange::new(0, 3);
        store.reserve_range(range, 1);

        match SpaceView::project(SpaceManagementMethod::FreeList, &store, range) {
            SpaceView::FreeList(list) => assert_eq!(list, vec![0, 1, 2, 3]),
            other => panic!("unexpected view {:?}", other),
        }
    }
}
