use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::alloc;
use crate::catalog::{now_millis, Directory, DirectoryId, PartitionId};
use crate::error::{Result, SimError};
use crate::fs::Disk;
use crate::path::{self, ROOT};
use crate::store::BlockStatus;

/// How a partition organizes its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectoryMethod {
    /// Single level: every file lives in the root and no directory can be created.
    Flat,
    /// User directories under the root only; files live inside a user directory.
    TwoLevel,
    /// Directories nest without limit.
    Tree,
}

impl fmt::Display for DirectoryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirectoryMethod::Flat => "flat",
            DirectoryMethod::TwoLevel => "twoLevel",
            DirectoryMethod::Tree => "tree",
        })
    }
}

impl FromStr for DirectoryMethod {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" | "single" => Ok(DirectoryMethod::Flat),
            "twolevel" | "two-level" => Ok(DirectoryMethod::TwoLevel),
            "tree" => Ok(DirectoryMethod::Tree),
            other => Err(SimError::Validation(format!(
                "unknown directory method \"{}\"",
                other
            ))),
        }
    }
}

impl Disk {
    /// Creates a directory at the partition's current path. The directory takes one block
    /// through the partition's allocation method, two under indexed allocation, all tagged as
    /// directory blocks.
    pub fn create_directory(&mut self, name: &str, partition_id: PartitionId) -> Result<&Directory> {
        let partition = self.partition(partition_id)?;
        path::validate_name(name, "directory")?;

        let parent_path = partition.current_path.clone();
        if let Some(kind) = self.catalog.name_taken(partition_id, &parent_path, name) {
            return Err(SimError::Conflict(format!(
                "a {} named \"{}\" already exists in {}",
                kind, name, parent_path
            )));
        }

        match partition.directory_method {
            DirectoryMethod::Flat => {
                warn!("Rejected directory \"{}\" on flat partition.", name);
                return Err(SimError::PolicyViolation(
                    "flat partitions do not allow directories".to_string(),
                ));
            }
            DirectoryMethod::TwoLevel if parent_path != ROOT => {
                warn!("Rejected nested directory \"{}\" on two-level partition.", name);
                return Err(SimError::PolicyViolation(
                    "two-level partitions only allow directories at the root".to_string(),
                ));
            }
            DirectoryMethod::TwoLevel | DirectoryMethod::Tree => {}
        }

        let method = partition.allocation_method;
        let needed = method.physical_blocks(1);
        let available = partition.free_blocks();
        let range = partition.range();
        if needed > available {
            return Err(SimError::InsufficientSpace {
                required: needed,
                available,
            });
        }
        self.catalog.next_directory_id()?;
        let allocation_info =
            match method.allocate(&mut self.store, range, 1, BlockStatus::Directory) {
                Some(info) => info,
                None => {
                    return Err(SimError::InsufficientSpace {
                        required: needed,
                        available,
                    })
                }
            };

        self.partition_mut(partition_id)?.used_blocks += needed;
        let dir = self.catalog.insert_directory(Directory {
            id: 0,
            name: name.to_string(),
            partition_id,
            full_path: path::join(&parent_path, name),
            parent_path,
            block_allocated: Some(allocation_info.first_block()),
            allocation_info: Some(allocation_info),
            created_at: now_millis(),
        })?;
        info!(
            "Created directory \"{}\" in blocks {:?}.",
            dir.full_path,
            dir.blocks()
        );
        Ok(dir)
    }

    /// Deletes a directory with every file and subdirectory below it, deepest first, and
    /// releases all of their blocks. A current path inside the deleted tree moves up to the
    /// deleted directory's parent.
    pub fn delete_directory(&mut self, id: DirectoryId) -> Result<()> {
        let dir = self.directory(id)?.clone();
        if dir.is_root() {
            return Err(SimError::Forbidden(
                "the root directory cannot be deleted".to_string(),
            ));
        }
        self.partition(dir.partition_id)?;

        let files: Vec<_> = self
            .catalog
            .files_in(dir.partition_id)
            .filter(|f| path::is_within(&f.directory_path, &dir.full_path))
            .map(|f| (f.id, f.allocated_blocks.clone()))
            .collect();
        let mut subdirs: Vec<_> = self
            .catalog
            .directories_in(dir.partition_id)
            .filter(|d| path::is_within(&d.full_path, &dir.full_path))
            .map(|d| (d.id, d.full_path.clone(), d.blocks()))
            .collect();
        subdirs.sort_by(|a, b| path::depth(&b.1).cmp(&path::depth(&a.1)).then(a.1.cmp(&b.1)));

        let mut released = 0;
        for (file_id, blocks) in &files {
            alloc::release(&mut self.store, blocks);
            released += blocks.len();
            self.catalog.remove_file(*file_id);
        }
        for (dir_id, _, blocks) in &subdirs {
            alloc::release(&mut self.store, blocks);
            released += blocks.len();
            self.catalog.remove_directory(*dir_id);
        }

        let partition = self.partition_mut(dir.partition_id)?;
        partition.used_blocks -= released;
        if path::is_within(&partition.current_path, &dir.full_path) {
            partition.current_path = dir.parent_path.clone();
        }
        info!(
            "Deleted directory \"{}\" with {} files and {} subdirectories, freeing {} blocks.",
            dir.full_path,
            files.len(),
            subdirs.len().saturating_sub(1),
            released
        );
        Ok(())
    }

    /// Moves the partition's current path. `target` may be absolute or relative and may use
    /// `.` and `..`.
    pub fn change_directory(&mut self, partition_id: PartitionId, target: &str) -> Result<&str> {
        let cwd = &self.partition(partition_id)?.current_path;
        let resolved = path::resolve(cwd, target);
        if self.catalog.directory_at(partition_id, &resolved).is_none() {
            return Err(SimError::not_found("directory", resolved));
        }
        let partition = self.partition_mut(partition_id)?;
        partition.current_path = resolved;
        Ok(&partition.current_path)
    }

    pub fn current_path(&self, partition_id: PartitionId) -> Result<&str> {
        Ok(&self.partition(partition_id)?.current_path)
    }
}
