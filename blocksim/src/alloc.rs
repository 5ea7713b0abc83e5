//! Block allocation policies.
//!
//! Each allocator works inside one partition's range, selects blocks by scanning that range from
//! its first block upwards, and marks its selection with the status the caller asks for (`Used`
//! for file data, `Directory` for directory bookkeeping). A failed allocation returns `None` and
//! leaves every block untouched.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::store::{BlockNumber, BlockRange, BlockStatus, BlockStore};

/// How a partition lays out the blocks of its files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllocationMethod {
    Contiguous,
    Linked,
    Indexed,
}

impl AllocationMethod {
    /// Physical blocks consumed by an object needing `data_blocks` blocks of data. Indexed
    /// allocation spends one extra block on the index.
    pub fn physical_blocks(self, data_blocks: usize) -> usize {
        match self {
            AllocationMethod::Contiguous | AllocationMethod::Linked => data_blocks,
            AllocationMethod::Indexed => data_blocks.saturating_add(1),
        }
    }

    /// Runs this method's allocator over `range`.
    pub fn allocate(
        self,
        store: &mut BlockStore,
        range: BlockRange,
        count: usize,
        status: BlockStatus,
    ) -> Option<AllocationInfo> {
        match self {
            AllocationMethod::Contiguous => {
                let blocks = allocate_contiguous(store, range, count, status)?;
                Some(AllocationInfo::contiguous(&blocks))
            }
            AllocationMethod::Linked => {
                let blocks = allocate_linked(store, range, count, status)?;
                Some(AllocationInfo::Linked { blocks })
            }
            AllocationMethod::Indexed => {
                let (index_block, file_blocks) = allocate_indexed(store, range, count, status)?;
                Some(AllocationInfo::Indexed {
                    index_block,
                    file_blocks,
                })
            }
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocationMethod::Contiguous => "contiguous",
            AllocationMethod::Linked => "linked",
            AllocationMethod::Indexed => "indexed",
        })
    }
}

impl FromStr for AllocationMethod {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contiguous" => Ok(AllocationMethod::Contiguous),
            "linked" => Ok(AllocationMethod::Linked),
            "indexed" => Ok(AllocationMethod::Indexed),
            other => Err(SimError::Validation(format!(
                "unknown allocation method \"{}\"",
                other
            ))),
        }
    }
}

/// Method specific description of where an object's blocks are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AllocationInfo {
    #[serde(rename_all = "camelCase")]
    Contiguous {
        start_block: BlockNumber,
        end_block: BlockNumber,
        total_blocks: usize,
    },
    Linked { blocks: Vec<BlockNumber> },
    #[serde(rename_all = "camelCase")]
    Indexed {
        index_block: BlockNumber,
        file_blocks: Vec<BlockNumber>,
    },
}

impl AllocationInfo {
    fn contiguous(blocks: &[BlockNumber]) -> Self {
        AllocationInfo::Contiguous {
            start_block: blocks[0],
            end_block: blocks[blocks.len() - 1],
            total_blocks: blocks.len(),
        }
    }

    /// Every block held, in layout order. Indexed objects list the index block first.
    pub fn blocks(&self) -> Vec<BlockNumber> {
        match self {
            AllocationInfo::Contiguous {
                start_block,
                end_block,
                ..
            } => (*start_block..=*end_block).collect(),
            AllocationInfo::Linked { blocks } => blocks.clone(),
            AllocationInfo::Indexed {
                index_block,
                file_blocks,
            } => std::iter::once(*index_block)
                .chain(file_blocks.iter().copied())
                .collect(),
        }
    }

    pub fn first_block(&self) -> BlockNumber {
        match self {
            AllocationInfo::Contiguous { start_block, .. } => *start_block,
            AllocationInfo::Linked { blocks } => blocks[0],
            AllocationInfo::Indexed { index_block, .. } => *index_block,
        }
    }
}

/// Yields the free blocks of a range in ascending order. Each call to the iterator resumes
/// where the previous one stopped, so a sequence of calls never hands out a block twice.
pub struct NextAvailableAllocation<'a> {
    /// Keeps track of the next starting place for looking for available blocks.
    marker: BlockNumber,
    store: &'a BlockStore,
    range: BlockRange,
}

impl<'a> NextAvailableAllocation<'a> {
    pub fn new(store: &'a BlockStore, range: BlockRange) -> Self {
        Self {
            marker: range.start,
            store,
            range,
        }
    }
}

impl Iterator for NextAvailableAllocation<'_> {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        while self.marker <= self.range.end {
            let blocknr = self.marker;
            self.marker += 1;
            if self.store.is_free(blocknr) {
                return Some(blocknr);
            }
        }
        None
    }
}

/// First `count` free blocks of the range, or `None` when the range holds fewer. Nothing is
/// marked.
pub fn find_free(store: &BlockStore, range: BlockRange, count: usize) -> Option<Vec<BlockNumber>> {
    let found: Vec<BlockNumber> = NextAvailableAllocation::new(store, range)
        .take(count)
        .collect();
    if found.len() < count {
        return None;
    }
    Some(found)
}

/// First-fit, single pass search for `count` consecutive free blocks. A non-free block resets
/// the current run; the scan never backtracks to look for a tighter fit.
pub fn allocate_contiguous(
    store: &mut BlockStore,
    range: BlockRange,
    count: usize,
    status: BlockStatus,
) -> Option<Vec<BlockNumber>> {
    if count == 0 {
        return None;
    }
    let mut run_start = range.start;
    let mut run_len = 0;
    for blocknr in range.iter() {
        if !store.is_free(blocknr) {
            run_len = 0;
            continue;
        }
        if run_len == 0 {
            run_start = blocknr;
        }
        run_len += 1;
        if run_len == count {
            let run: Vec<BlockNumber> = (run_start..=blocknr).collect();
            for &b in &run {
                store.set_reserved(b, status);
            }
            debug!("contiguous run {}..={} allocated", run_start, blocknr);
            return Some(run);
        }
    }
    debug!("no run of {} free blocks in {:?}", count, range);
    None
}

/// Takes the first `count` free blocks wherever they are and chains them through `next_block`.
pub fn allocate_linked(
    store: &mut BlockStore,
    range: BlockRange,
    count: usize,
    status: BlockStatus,
) -> Option<Vec<BlockNumber>> {
    if count == 0 {
        return None;
    }
    let blocks = find_free(store, range, count)?;
    for (pos, &b) in blocks.iter().enumerate() {
        store.set_reserved(b, status);
        store.set_next(b, blocks.get(pos + 1).copied());
    }
    debug!("linked chain {:?} allocated", blocks);
    Some(blocks)
}

/// Takes `count + 1` free blocks: the first becomes the index block and records the rest, in
/// order, as the data blocks. Returns the index block and the data blocks.
pub fn allocate_indexed(
    store: &mut BlockStore,
    range: BlockRange,
    count: usize,
    status: BlockStatus,
) -> Option<(BlockNumber, Vec<BlockNumber>)> {
    if count == 0 {
        return None;
    }
    let mut found = find_free(store, range, count + 1)?;
    let data = found.split_off(1);
    let index = found[0];
    store.set_reserved(index, status);
    for &b in &data {
        store.set_reserved(b, status);
    }
    store.set_index(index, data.clone());
    debug!("index block {} allocated for {:?}", index, data);
    Some((index, data))
}

/// Whether the `delta` blocks right after `last` are free and still inside `range`.
pub fn tail_is_free(store: &BlockStore, range: BlockRange, last: BlockNumber, delta: usize) -> bool {
    (1..=delta).all(|step| {
        let blocknr = last + step;
        range.contains(blocknr) && store.is_free(blocknr)
    })
}

/// Returns `blocks` to the free pool, dropping their chain and index metadata.
pub fn release(store: &mut BlockStore, blocks: &[BlockNumber]) {
    for &b in blocks {
        store.set_free(b);
    }
}
