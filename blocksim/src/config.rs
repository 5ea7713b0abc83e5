use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Longest name accepted for partitions, directories and files.
pub const MAX_NAME_LEN: usize = 255;

/// Characters that may never appear in a name.
pub const FORBIDDEN_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Geometry of the simulated disk. Set once per session and never changed afterwards; a new
/// geometry means a new, empty disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Number of blocks on the disk, addressed 0 to n - 1.
    pub block_quantity: usize,
    /// Size of every block in KB.
    pub block_size_kb: u64,
}

impl DiskConfig {
    pub fn new(block_quantity: usize, block_size_kb: u64) -> Result<Self> {
        if block_quantity == 0 {
            return Err(SimError::Validation(
                "block quantity must be greater than zero".to_string(),
            ));
        }
        if block_size_kb == 0 {
            return Err(SimError::Validation(
                "block size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            block_quantity,
            block_size_kb,
        })
    }

    /// Capacity in KB, saturating at `u64::MAX`.
    pub fn total_capacity_kb(&self) -> u64 {
        self.blocks_kb(self.block_quantity)
    }

    /// KB held by `blocks` whole blocks, saturating at `u64::MAX`.
    pub fn blocks_kb(&self, blocks: usize) -> u64 {
        (blocks as u64).saturating_mul(self.block_size_kb)
    }

    /// Whole blocks needed to hold `size_kb`, rounding the last partial block up. Sizes beyond
    /// what a block count can express saturate at `usize::MAX`, which no partition can hold.
    pub fn blocks_for(&self, size_kb: u64) -> usize {
        usize::try_from(size_kb.div_ceil(self.block_size_kb)).unwrap_or(usize::MAX)
    }
}
