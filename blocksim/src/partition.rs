use log::info;
use serde::{Deserialize, Serialize};

use crate::alloc::AllocationMethod;
use crate::catalog::{now_millis, Directory, PartitionId};
use crate::dir::DirectoryMethod;
use crate::error::{Result, SimError};
use crate::fs::{percentage, Disk};
use crate::path::{self, ROOT};
use crate::space::SpaceManagementMethod;
use crate::store::{BlockNumber, BlockRange};

/// A contiguous, inclusive block range governed by one allocation, directory and
/// space-management method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub id: PartitionId,
    pub name: String,
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    pub allocation_method: AllocationMethod,
    pub directory_method: DirectoryMethod,
    pub space_management_method: SpaceManagementMethod,
    /// Physical blocks held by files and directories, index blocks included.
    pub used_blocks: usize,
    /// Working directory new files and directories are created in.
    pub current_path: String,
}

impl Partition {
    pub fn range(&self) -> BlockRange {
        BlockRange::new(self.start_block, self.end_block)
    }

    pub fn total_blocks(&self) -> usize {
        self.end_block - self.start_block + 1
    }

    pub fn free_blocks(&self) -> usize {
        self.total_blocks() - self.used_blocks
    }

    pub fn usage_percentage(&self) -> u32 {
        percentage(self.used_blocks, self.total_blocks())
    }

    pub fn size_kb(&self, block_size_kb: u64) -> u64 {
        (self.total_blocks() as u64).saturating_mul(block_size_kb)
    }
}

impl Disk {
    /// Reserves `start_block..=end_block` as a new partition with an empty root directory.
    ///
    /// # Errors
    ///
    /// Invalid names and ranges are `Validation` errors; a name already in use (ignoring case)
    /// or a range intersecting another partition is a `Conflict`. The first problem found is
    /// reported and nothing changes.
    pub fn create_partition(
        &mut self,
        name: &str,
        start_block: BlockNumber,
        end_block: BlockNumber,
        allocation_method: AllocationMethod,
        directory_method: DirectoryMethod,
        space_management_method: SpaceManagementMethod,
    ) -> Result<&Partition> {
        path::validate_name(name, "partition")?;
        if let Some(existing) = self
            .partitions
            .values()
            .find(|p| path::same_name(&p.name, name))
        {
            return Err(SimError::Conflict(format!(
                "a partition named \"{}\" already exists",
                existing.name
            )));
        }
        if start_block > end_block {
            return Err(SimError::Validation(format!(
                "start block {} is after end block {}",
                start_block, end_block
            )));
        }
        if end_block >= self.config.block_quantity {
            return Err(SimError::Validation(format!(
                "blocks must lie between 0 and {}",
                self.config.block_quantity - 1
            )));
        }
        let range = BlockRange::new(start_block, end_block);
        if let Some(other) = self.partitions.values().find(|p| p.range().overlaps(&range)) {
            return Err(SimError::Conflict(format!(
                "blocks {}-{} conflict with partition \"{}\" (blocks {}-{})",
                start_block, end_block, other.name, other.start_block, other.end_block
            )));
        }

        let id = self.next_partition_id;
        if self.partitions.contains_key(&id) {
            return Err(SimError::Inconsistent(format!(
                "partition id {} is already in use",
                id
            )));
        }
        self.catalog.next_directory_id()?;

        self.next_partition_id += 1;
        self.store.reserve_range(range, id);
        self.catalog.insert_directory(Directory {
            id: 0,
            name: ROOT.to_string(),
            partition_id: id,
            parent_path: ROOT.to_string(),
            full_path: ROOT.to_string(),
            block_allocated: None,
            allocation_info: None,
            created_at: now_millis(),
        })?;
        info!(
            "Created partition \"{}\" over blocks {}-{} ({}, {}, {}).",
            name, start_block, end_block, allocation_method, directory_method, space_management_method
        );
        self.partitions.insert(
            id,
            Partition {
                id,
                name: name.to_string(),
                start_block,
                end_block,
                allocation_method,
                directory_method,
                space_management_method,
                used_blocks: 0,
                current_path: ROOT.to_string(),
            },
        );
        self.partition(id)
    }

    /// Removes a partition together with every file and directory inside it and returns its
    /// range to the unallocated pool.
    pub fn delete_partition(&mut self, id: PartitionId) -> Result<()> {
        let partition = self
            .partitions
            .remove(&id)
            .ok_or_else(|| SimError::not_found("partition", id))?;

        let files: Vec<_> = self.catalog.files_in(id).map(|f| f.id).collect();
        let dirs: Vec<_> = self.catalog.directories_in(id).map(|d| d.id).collect();
        for file in &files {
            self.catalog.remove_file(*file);
        }
        for dir in &dirs {
            self.catalog.remove_directory(*dir);
        }
        self.store.release_range(partition.range());
        info!(
            "Deleted partition \"{}\" with {} files and {} directories.",
            partition.name,
            files.len(),
            // The root is bookkeeping, not a user directory.
            dirs.len().saturating_sub(1)
        );
        Ok(())
    }

    pub fn partition(&self, id: PartitionId) -> Result<&Partition> {
        self.partitions
            .get(&id)
            .ok_or_else(|| SimError::not_found("partition", id))
    }

    pub(crate) fn partition_mut(&mut self, id: PartitionId) -> Result<&mut Partition> {
        self.partitions
            .get_mut(&id)
            .ok_or_else(|| SimError::not_found("partition", id))
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    /// Looks up a partition by name, ignoring case.
    pub fn find_partition(&self, name: &str) -> Option<&Partition> {
        self.partitions
            .values()
            .find(|p| path::same_name(&p.name, name))
    }
}
