use serde::{Deserialize, Serialize};

use crate::catalog::PartitionId;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockStatus {
    /// Not reserved by any partition.
    Unallocated,
    /// Reserved by a partition and available for files or directories.
    Free,
    /// Holds file data or a file's index block.
    Used,
    /// Holds directory bookkeeping.
    Directory,
}

impl BlockStatus {
    /// Whether the block is consumed by a file or directory.
    pub fn is_occupied(self) -> bool {
        matches!(self, BlockStatus::Used | BlockStatus::Directory)
    }
}

/// One fixed-size storage unit. Only the status and ownership live here; the simulator stores
/// no file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: BlockNumber,
    pub status: BlockStatus,
    pub owner_partition: Option<PartitionId>,
    /// Successor under linked allocation. `None` on the last block of a chain.
    pub next_block: Option<BlockNumber>,
    /// Data block pointers, present only on an index block.
    pub indexed_blocks: Option<Vec<BlockNumber>>,
}

impl Block {
    fn unallocated(index: BlockNumber) -> Self {
        Self {
            index,
            status: BlockStatus::Unallocated,
            owner_partition: None,
            next_block: None,
            indexed_blocks: None,
        }
    }

    /// Drops chain and index metadata, leaving status and owner alone.
    pub fn clear_links(&mut self) {
        self.next_block = None;
        self.indexed_blocks = None;
    }
}

/// Inclusive range of block numbers, the shape of every partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: BlockNumber,
    pub end: BlockNumber,
}

impl BlockRange {
    pub fn new(start: BlockNumber, end: BlockNumber) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, blocknr: BlockNumber) -> bool {
        (self.start..=self.end).contains(&blocknr)
    }

    pub fn overlaps(&self, other: &BlockRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<BlockNumber> {
        self.start..=self.end
    }
}

/// The ordered array of block records every other component reads and mutates. It is the
/// single source of truth for occupancy; bitmaps and free lists are projections of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStore {
    blocks: Vec<Block>,
}

impl BlockStore {
    /// Creates `nblocks` blocks, all unallocated.
    pub fn new(nblocks: usize) -> Self {
        Self {
            blocks: (0..nblocks).map(Block::unallocated).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, blocknr: BlockNumber) -> Option<&Block> {
        self.blocks.get(blocknr)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Blocks of `range`, which must lie on the disk.
    pub fn slice(&self, range: BlockRange) -> &[Block] {
        &self.blocks[range.start..=range.end]
    }

    pub fn status(&self, blocknr: BlockNumber) -> BlockStatus {
        self.blocks[blocknr].status
    }

    pub fn is_free(&self, blocknr: BlockNumber) -> bool {
        self.blocks
            .get(blocknr)
            .map_or(false, |b| b.status == BlockStatus::Free)
    }

    pub fn count_free(&self, range: BlockRange) -> usize {
        self.slice(range)
            .iter()
            .filter(|b| b.status == BlockStatus::Free)
            .count()
    }

    /// Marks a block as consumed with the given status.
    pub fn set_reserved(&mut self, blocknr: BlockNumber, status: BlockStatus) {
        debug_assert!(status.is_occupied());
        self.blocks[blocknr].status = status;
    }

    /// Returns a consumed block to its partition's free pool.
    pub fn set_free(&mut self, blocknr: BlockNumber) {
        let block = &mut self.blocks[blocknr];
        block.status = BlockStatus::Free;
        block.clear_links();
    }

    pub fn set_next(&mut self, blocknr: BlockNumber, next: Option<BlockNumber>) {
        self.blocks[blocknr].next_block = next;
    }

    pub fn set_index(&mut self, blocknr: BlockNumber, entries: Vec<BlockNumber>) {
        self.blocks[blocknr].indexed_blocks = Some(entries);
    }

    /// Hands every block of `range` to a partition as free space.
    pub fn reserve_range(&mut self, range: BlockRange, owner: PartitionId) {
        for block in &mut self.blocks[range.start..=range.end] {
            block.status = BlockStatus::Free;
            block.owner_partition = Some(owner);
            block.clear_links();
        }
    }

    /// Returns every block of `range` to the unpartitioned pool.
    pub fn release_range(&mut self, range: BlockRange) {
        for block in &mut self.blocks[range.start..=range.end] {
            *block = Block::unallocated(block.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_is_unallocated() {
        let store = BlockStore::new(8);
        assert_eq!(store.len(), 8);
        assert!(store
            .blocks()
            .iter()
            .enumerate()
            .all(|(i, b)| b.index == i && b.status == BlockStatus::Unallocated));
    }

    #[test]
    fn can_reserve_and_release_partition_range() {
        let mut store = BlockStore::new(8);
        let range = BlockRange::new(2, 5);

        store.reserve_range(range, 1);
        assert_eq!(store.count_free(range), 4);
        assert_eq!(store.status(1), BlockStatus::Unallocated);
        assert_eq!(store.get(5).unwrap().owner_partition, Some(1));

        store.release_range(range);
        assert_eq!(store.count_free(range), 0);
        assert_eq!(store.get(5).unwrap().owner_partition, None);
    }

    #[test]
    fn freeing_a_block_drops_its_links() {
        let mut store = BlockStore::new(4);
        store.reserve_range(BlockRange::new(0, 3), 1);
        store.set_reserved(0, BlockStatus::Used);
        store.set_next(0, Some(2));
        store.set_index(0, vec![1, 2]);

        store.set_free(0);
        let block = store.get(0).unwrap();
        assert_eq!(block.status, BlockStatus::Free);
        assert_eq!(block.next_block, None);
        assert_eq!(block.indexed_blocks, None);
    }

    #[test]
    fn ranges_overlap_inclusively() {
        let a = BlockRange::new(0, 4);
        assert!(a.overlaps(&BlockRange::new(4, 9)));
        assert!(a.overlaps(&BlockRange::new(1, 2)));
        assert!(!a.overlaps(&BlockRange::new(5, 9)));
        assert_eq!(a.len(), 5);
    }
}
