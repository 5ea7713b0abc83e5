use log::{info, warn};

use crate::alloc::{self, AllocationInfo};
use crate::catalog::{now_millis, File, FileId, PartitionId};
use crate::dir::DirectoryMethod;
use crate::error::{Result, SimError};
use crate::fs::Disk;
use crate::path;
use crate::store::{BlockNumber, BlockRange, BlockStatus, BlockStore};

impl Disk {
    /// Creates a file of `size_in_kb` at the partition's current path and allocates its blocks
    /// with the partition's allocation method.
    pub fn create_file(
        &mut self,
        name: &str,
        size_in_kb: u64,
        partition_id: PartitionId,
    ) -> Result<&File> {
        let partition = self.partition(partition_id)?;
        path::validate_name(name, "file")?;
        if size_in_kb == 0 {
            return Err(SimError::Validation(
                "file size must be a positive number".to_string(),
            ));
        }

        let dir_path = partition.current_path.clone();
        if partition.directory_method == DirectoryMethod::TwoLevel && path::depth(&dir_path) != 1 {
            return Err(SimError::PolicyViolation(
                "two-level partitions keep files inside a user directory".to_string(),
            ));
        }
        if let Some(kind) = self.catalog.name_taken(partition_id, &dir_path, name) {
            return Err(SimError::Conflict(format!(
                "a {} named \"{}\" already exists in {}",
                kind, name, dir_path
            )));
        }

        let required_blocks = self.config.blocks_for(size_in_kb);
        let method = partition.allocation_method;
        let needed = method.physical_blocks(required_blocks);
        let available = partition.free_blocks();
        if needed > available {
            warn!(
                "Rejected file \"{}\": {} blocks needed, {} free.",
                name, needed, available
            );
            return Err(SimError::InsufficientSpace {
                required: needed,
                available,
            });
        }

        let range = partition.range();
        self.catalog.next_file_id()?;
        let allocation_info = match method.allocate(
            &mut self.store,
            range,
            required_blocks,
            BlockStatus::Used,
        ) {
            Some(info) => info,
            None => {
                warn!(
                    "Rejected file \"{}\": {} allocation of {} blocks failed.",
                    name, method, needed
                );
                return Err(SimError::InsufficientSpace {
                    required: needed,
                    available,
                });
            }
        };

        self.partition_mut(partition_id)?.used_blocks += needed;
        let file = self.catalog.insert_file(File {
            id: 0,
            name: name.to_string(),
            size_in_kb,
            directory_path: dir_path,
            partition_id,
            required_blocks,
            allocated_blocks: allocation_info.blocks(),
            allocation_info,
            created_at: now_millis(),
        })?;
        info!(
            "Created file \"{}\" ({}KB) in blocks {:?}.",
            file.full_path(),
            size_in_kb,
            file.allocated_blocks
        );
        Ok(file)
    }

    /// Deletes a file, returning all of its blocks, the index block included, to the free pool.
    pub fn delete_file(&mut self, id: FileId) -> Result<()> {
        let file = self.file(id)?;
        let partition_id = file.partition_id;
        self.partition(partition_id)?;

        let file = match self.catalog.remove_file(id) {
            Some(file) => file,
            None => return Err(SimError::not_found("file", id)),
        };
        alloc::release(&mut self.store, &file.allocated_blocks);
        self.partition_mut(partition_id)?.used_blocks -= file.allocated_blocks.len();
        info!(
            "Deleted file \"{}\", freeing blocks {:?}.",
            file.full_path(),
            file.allocated_blocks
        );
        Ok(())
    }

    /// Changes a file's size. Growing allocates only the missing blocks and never relocates the
    /// file; shrinking releases blocks from the end of the file.
    ///
    /// # Errors
    ///
    /// A zero size or the current size is a `Validation` error. Growing needs enough free
    /// blocks in the partition (`InsufficientSpace`), and a contiguous file can only grow into
    /// the free blocks right after it (`UnsupportedExpansion`).
    pub fn resize_file(&mut self, id: FileId, new_size_in_kb: u64) -> Result<&File> {
        let mut file = self.file(id)?.clone();
        let partition = self.partition(file.partition_id)?;
        let range = partition.range();
        let available = partition.free_blocks();

        if new_size_in_kb == 0 {
            return Err(SimError::Validation(
                "file size must be greater than zero".to_string(),
            ));
        }
        if new_size_in_kb == file.size_in_kb {
            return Err(SimError::Validation(format!(
                "file \"{}\" is already {}KB",
                file.name, new_size_in_kb
            )));
        }

        let current = file.required_blocks;
        let wanted = self.config.blocks_for(new_size_in_kb);
        if wanted > current {
            let delta = wanted - current;
            if delta > available {
                warn!(
                    "Rejected growth of \"{}\": {} blocks needed, {} free.",
                    file.name, delta, available
                );
                return Err(SimError::InsufficientSpace {
                    required: delta,
                    available,
                });
            }
            grow(&mut self.store, range, &mut file, delta)?;
            self.partition_mut(file.partition_id)?.used_blocks += delta;
        } else if wanted < current {
            let delta = current - wanted;
            shrink(&mut self.store, &mut file, delta);
            self.partition_mut(file.partition_id)?.used_blocks -= delta;
        }

        info!(
            "Resized file \"{}\" from {}KB to {}KB ({} -> {} blocks).",
            file.full_path(),
            file.size_in_kb,
            new_size_in_kb,
            current,
            wanted
        );
        file.size_in_kb = new_size_in_kb;
        file.required_blocks = wanted;
        match self.catalog.file_mut(id) {
            Some(slot) => *slot = file,
            None => return Err(SimError::not_found("file", id)),
        }
        self.file(id)
    }
}

/// Appends `delta` blocks to `file`. Every check happens before the first block is marked.
fn grow(store: &mut BlockStore, range: BlockRange, file: &mut File, delta: usize) -> Result<()> {
    let added: Vec<BlockNumber> = match &mut file.allocation_info {
        AllocationInfo::Contiguous {
            end_block,
            total_blocks,
            ..
        } => {
            if !alloc::tail_is_free(store, range, *end_block, delta) {
                return Err(SimError::UnsupportedExpansion {
                    name: file.name.clone(),
                    first: *end_block + 1,
                    last: *end_block + delta,
                });
            }
            let added: Vec<BlockNumber> = (*end_block + 1..=*end_block + delta).collect();
            for &b in &added {
                store.set_reserved(b, BlockStatus::Used);
            }
            *end_block += delta;
            *total_blocks += delta;
            added
        }
        AllocationInfo::Linked { blocks } => {
            let added = alloc::find_free(store, range, delta).ok_or(
                SimError::InsufficientSpace {
                    required: delta,
                    available: store.count_free(range),
                },
            )?;
            let mut tail = blocks.last().copied();
            for &b in &added {
                store.set_reserved(b, BlockStatus::Used);
                if let Some(prev) = tail {
                    store.set_next(prev, Some(b));
                }
                tail = Some(b);
            }
            blocks.extend_from_slice(&added);
            added
        }
        AllocationInfo::Indexed {
            index_block,
            file_blocks,
        } => {
            let added = alloc::find_free(store, range, delta).ok_or(
                SimError::InsufficientSpace {
                    required: delta,
                    available: store.count_free(range),
                },
            )?;
            for &b in &added {
                store.set_reserved(b, BlockStatus::Used);
            }
            file_blocks.extend_from_slice(&added);
            store.set_index(*index_block, file_blocks.clone());
            added
        }
    };
    file.allocated_blocks.extend_from_slice(&added);
    Ok(())
}

/// Releases the last `delta` blocks of `file`. An indexed file's index block is never among
/// them because a file keeps at least one data block.
fn shrink(store: &mut BlockStore, file: &mut File, delta: usize) {
    let keep = file.allocated_blocks.len() - delta;
    let removed = file.allocated_blocks.split_off(keep);
    alloc::release(store, &removed);

    match &mut file.allocation_info {
        AllocationInfo::Contiguous {
            end_block,
            total_blocks,
            ..
        } => {
            *end_block -= delta;
            *total_blocks -= delta;
        }
        AllocationInfo::Linked { blocks } => {
            blocks.truncate(keep);
            if let Some(&tail) = blocks.last() {
                store.set_next(tail, None);
            }
        }
        AllocationInfo::Indexed {
            index_block,
            file_blocks,
        } => {
            file_blocks.truncate(file_blocks.len() - delta);
            store.set_index(*index_block, file_blocks.clone());
        }
    }
}
