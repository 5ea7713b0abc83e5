use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::alloc::AllocationInfo;
use crate::error::{Result, SimError};
use crate::path::{self, ROOT};
use crate::store::BlockNumber;

pub type PartitionId = u32;
pub type FileId = u32;
pub type DirectoryId = u32;

/// A named unit of storage. Files carry no content, only a size and the blocks that would hold
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: FileId,
    pub name: String,
    pub size_in_kb: u64,
    /// Full path of the directory holding the file.
    pub directory_path: String,
    pub partition_id: PartitionId,
    /// Data blocks needed for `size_in_kb`. An indexed file's index block is not counted.
    pub required_blocks: usize,
    /// Every block held. Indexed files list their index block first.
    pub allocated_blocks: Vec<BlockNumber>,
    pub allocation_info: AllocationInfo,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl File {
    /// KB lost to rounding the file up to whole blocks.
    pub fn internal_fragmentation_kb(&self, block_size_kb: u64) -> u64 {
        (self.required_blocks as u64)
            .saturating_mul(block_size_kb)
            .saturating_sub(self.size_in_kb)
    }

    pub fn full_path(&self) -> String {
        path::join(&self.directory_path, &self.name)
    }
}

/// A node of a partition's namespace. The root (`/`) exists from partition creation, holds no
/// blocks and can never be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub id: DirectoryId,
    pub name: String,
    pub partition_id: PartitionId,
    pub parent_path: String,
    pub full_path: String,
    /// Primary block; the index block under indexed allocation.
    pub block_allocated: Option<BlockNumber>,
    pub allocation_info: Option<AllocationInfo>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl Directory {
    pub fn is_root(&self) -> bool {
        self.full_path == ROOT
    }

    /// Every block the directory holds, the index block first under indexed allocation.
    pub fn blocks(&self) -> Vec<BlockNumber> {
        self.allocation_info
            .as_ref()
            .map(AllocationInfo::blocks)
            .unwrap_or_default()
    }
}

/// Registry of every file and directory on the disk, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    files: BTreeMap<FileId, File>,
    directories: BTreeMap<DirectoryId, Directory>,
    next_file_id: FileId,
    next_directory_id: DirectoryId,
}

fn stale_counter(kind: &str, id: u32) -> SimError {
    SimError::Inconsistent(format!("{} id {} is already in use", kind, id))
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            next_file_id: 1,
            next_directory_id: 1,
            ..Default::default()
        }
    }

    /// Id the next inserted file gets. Fails when the counter points at an existing record,
    /// so callers can check before they allocate anything.
    pub fn next_file_id(&self) -> Result<FileId> {
        if self.files.contains_key(&self.next_file_id) {
            return Err(stale_counter("file", self.next_file_id));
        }
        Ok(self.next_file_id)
    }

    pub fn next_directory_id(&self) -> Result<DirectoryId> {
        if self.directories.contains_key(&self.next_directory_id) {
            return Err(stale_counter("directory", self.next_directory_id));
        }
        Ok(self.next_directory_id)
    }

    /// Stores a file under a fresh id, overwriting whatever id the caller put in it.
    pub fn insert_file(&mut self, mut file: File) -> Result<&File> {
        let id = self.next_file_id;
        match self.files.entry(id) {
            Entry::Occupied(_) => Err(stale_counter("file", id)),
            Entry::Vacant(slot) => {
                self.next_file_id += 1;
                file.id = id;
                Ok(slot.insert(file))
            }
        }
    }

    /// Stores a directory under a fresh id, overwriting whatever id the caller put in it.
    pub fn insert_directory(&mut self, mut dir: Directory) -> Result<&Directory> {
        let id = self.next_directory_id;
        match self.directories.entry(id) {
            Entry::Occupied(_) => Err(stale_counter("directory", id)),
            Entry::Vacant(slot) => {
                self.next_directory_id += 1;
                dir.id = id;
                Ok(slot.insert(dir))
            }
        }
    }

    /// Checks that every record sits under its own id and that both counters are past every
    /// id in use.
    pub fn check_ids(&self) -> Result<()> {
        for (&key, file) in &self.files {
            if key != file.id || key >= self.next_file_id {
                return Err(SimError::Inconsistent(format!(
                    "file \"{}\" is stored under id {} (record id {}, next id {})",
                    file.name, key, file.id, self.next_file_id
                )));
            }
        }
        for (&key, dir) in &self.directories {
            if key != dir.id || key >= self.next_directory_id {
                return Err(SimError::Inconsistent(format!(
                    "directory \"{}\" is stored under id {} (record id {}, next id {})",
                    dir.full_path, key, dir.id, self.next_directory_id
                )));
            }
        }
        Ok(())
    }

    pub fn file(&self, id: FileId) -> Option<&File> {
        self.files.get(&id)
    }

    pub(crate) fn file_mut(&mut self, id: FileId) -> Option<&mut File> {
        self.files.get_mut(&id)
    }

    pub fn directory(&self, id: DirectoryId) -> Option<&Directory> {
        self.directories.get(&id)
    }

    pub fn remove_file(&mut self, id: FileId) -> Option<File> {
        self.files.remove(&id)
    }

    pub fn remove_directory(&mut self, id: DirectoryId) -> Option<Directory> {
        self.directories.remove(&id)
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.files.values()
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.directories.values()
    }

    pub fn files_in(&self, partition: PartitionId) -> impl Iterator<Item = &File> {
        self.files
            .values()
            .filter(move |f| f.partition_id == partition)
    }

    pub fn directories_in(&self, partition: PartitionId) -> impl Iterator<Item = &Directory> {
        self.directories
            .values()
            .filter(move |d| d.partition_id == partition)
    }

    pub fn directory_at(&self, partition: PartitionId, full_path: &str) -> Option<&Directory> {
        self.directories_in(partition)
            .find(|d| d.full_path == full_path)
    }

    /// Files and directories directly inside `dir_path`.
    pub fn children(
        &self,
        partition: PartitionId,
        dir_path: &str,
    ) -> (Vec<&Directory>, Vec<&File>) {
        let dirs = self
            .directories_in(partition)
            .filter(|d| !d.is_root() && d.parent_path == dir_path)
            .collect();
        let files = self
            .files_in(partition)
            .filter(|f| f.directory_path == dir_path)
            .collect();
        (dirs, files)
    }

    /// Kind of the entry already named `name` inside `dir_path`, ignoring case.
    pub fn name_taken(&self, partition: PartitionId, dir_path: &str, name: &str) -> Option<&'static str> {
        let (dirs, files) = self.children(partition, dir_path);
        if dirs.iter().any(|d| path::same_name(&d.name, name)) {
            return Some("directory");
        }
        if files.iter().any(|f| path::same_name(&f.name, name)) {
            return Some("file");
        }
        None
    }
}
