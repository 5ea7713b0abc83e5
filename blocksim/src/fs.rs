use std::collections::{BTreeMap, HashMap};
use std::fs::File as StdFile;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::alloc::AllocationInfo;
use crate::catalog::{Catalog, Directory, DirectoryId, File, FileId, PartitionId};
use crate::config::DiskConfig;
use crate::error::{Result, SimError};
use crate::partition::Partition;
use crate::space::{self, Bitmap, SpaceView};
use crate::store::{Block, BlockNumber, BlockStatus, BlockStore};

/// Usage figures for a single partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionUsage {
    pub id: PartitionId,
    pub name: String,
    pub used_blocks: usize,
    pub total_blocks: usize,
    pub usage_percentage: u32,
}

/// Aggregate block usage of the whole disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub block_size_kb: u64,
    pub total_blocks: usize,
    pub total_capacity_kb: u64,
    /// Blocks reserved by some partition.
    pub partitioned_blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub unallocated_blocks: usize,
    pub disk_usage_percentage: u32,
    /// KB of consumed blocks not covered by file sizes: rounding slack plus directory and
    /// index blocks.
    pub internal_fragmentation_kb: u64,
    pub partitions: Vec<PartitionUsage>,
}

/// Which record holds a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockOwner {
    File(FileId),
    Directory(DirectoryId),
}

/// Files and directories directly inside one directory, sorted by name.
#[derive(Debug)]
pub struct Listing<'a> {
    pub directories: Vec<&'a Directory>,
    pub files: Vec<&'a File>,
}

pub(crate) fn percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

/// One simulated disk and everything on it. Each session owns its own `Disk`; nothing is
/// shared between instances.
///
/// # Layout
/// ====================================================================
/// | unallocated | Partition A (free/used/dir) | unallocated | Part. B |
/// ====================================================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub(crate) config: DiskConfig,
    pub(crate) store: BlockStore,
    pub(crate) partitions: BTreeMap<PartitionId, Partition>,
    pub(crate) catalog: Catalog,
    pub(crate) next_partition_id: PartitionId,
}

impl Disk {
    /// Creates a disk of `block_quantity` unallocated blocks of `block_size_kb` KB each.
    pub fn new(block_quantity: usize, block_size_kb: u64) -> Result<Self> {
        let config = DiskConfig::new(block_quantity, block_size_kb)?;
        info!(
            "Configured disk with {} blocks of {}KB.",
            block_quantity, block_size_kb
        );
        Ok(Disk {
            config,
            store: BlockStore::new(block_quantity),
            partitions: BTreeMap::new(),
            catalog: Catalog::new(),
            next_partition_id: 1,
        })
    }

    /// Discards every partition, file and directory and starts over with a new geometry. On
    /// error the disk is left as it was.
    pub fn configure(&mut self, block_quantity: usize, block_size_kb: u64) -> Result<()> {
        *self = Disk::new(block_quantity, block_size_kb)?;
        Ok(())
    }

    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    pub fn blocks(&self) -> &[Block] {
        self.store.blocks()
    }

    pub fn block(&self, blocknr: BlockNumber) -> Option<&Block> {
        self.store.get(blocknr)
    }

    pub fn file(&self, id: FileId) -> Result<&File> {
        self.catalog
            .file(id)
            .ok_or_else(|| SimError::not_found("file", id))
    }

    pub fn directory(&self, id: DirectoryId) -> Result<&Directory> {
        self.catalog
            .directory(id)
            .ok_or_else(|| SimError::not_found("directory", id))
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.catalog.files()
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.catalog.directories()
    }

    pub fn files_in_partition(&self, id: PartitionId) -> Result<Vec<&File>> {
        self.partition(id)?;
        Ok(self.catalog.files_in(id).collect())
    }

    /// Looks up a file by name, ignoring case, in a directory of a partition.
    pub fn find_file(&self, partition: PartitionId, dir_path: &str, name: &str) -> Option<&File> {
        self.catalog
            .files_in(partition)
            .find(|f| f.directory_path == dir_path && crate::path::same_name(&f.name, name))
    }

    pub fn find_directory(&self, partition: PartitionId, full_path: &str) -> Option<&Directory> {
        self.catalog.directory_at(partition, full_path)
    }

    pub fn list_directory(&self, partition: PartitionId, dir_path: &str) -> Result<Listing<'_>> {
        self.partition(partition)?;
        if self.catalog.directory_at(partition, dir_path).is_none() {
            return Err(SimError::not_found("directory", dir_path));
        }
        let (mut directories, mut files) = self.catalog.children(partition, dir_path);
        directories.sort_by_key(|d| d.name.to_lowercase());
        files.sort_by_key(|f| f.name.to_lowercase());
        Ok(Listing { directories, files })
    }

    pub fn bitmap(&self, partition: PartitionId) -> Result<Bitmap> {
        let range = self.partition(partition)?.range();
        Ok(Bitmap::for_range(&self.store, range))
    }

    pub fn free_block_list(&self, partition: PartitionId) -> Result<Vec<BlockNumber>> {
        let range = self.partition(partition)?.range();
        Ok(space::free_block_list(&self.store, range))
    }

    /// The bitmap or the free list, whichever the partition is configured to show.
    pub fn space_view(&self, partition: PartitionId) -> Result<SpaceView> {
        let p = self.partition(partition)?;
        Ok(SpaceView::project(
            p.space_management_method,
            &self.store,
            p.range(),
        ))
    }

    pub fn usage_stats(&self) -> UsageStats {
        let total_blocks = self.store.len();
        let partitioned_blocks: usize = self.partitions.values().map(Partition::total_blocks).sum();
        let used_blocks: usize = self.partitions.values().map(|p| p.used_blocks).sum();
        let block_size_kb = self.config.block_size_kb;
        // Rounding slack inside files, then whole blocks spent on directories and indexes.
        let slack_kb = self
            .catalog
            .files()
            .map(|f| f.internal_fragmentation_kb(block_size_kb))
            .fold(0u64, u64::saturating_add);
        let data_blocks: usize = self.catalog.files().map(|f| f.required_blocks).sum();
        let overhead_kb = self.config.blocks_kb(used_blocks.saturating_sub(data_blocks));
        UsageStats {
            block_size_kb,
            total_blocks,
            total_capacity_kb: self.config.total_capacity_kb(),
            partitioned_blocks,
            used_blocks,
            free_blocks: partitioned_blocks - used_blocks,
            unallocated_blocks: total_blocks - partitioned_blocks,
            disk_usage_percentage: percentage(used_blocks, total_blocks),
            internal_fragmentation_kb: slack_kb.saturating_add(overhead_kb),
            partitions: self
                .partitions
                .values()
                .map(|p| PartitionUsage {
                    id: p.id,
                    name: p.name.clone(),
                    used_blocks: p.used_blocks,
                    total_blocks: p.total_blocks(),
                    usage_percentage: p.usage_percentage(),
                })
                .collect(),
        }
    }

    pub fn block_owner(&self, blocknr: BlockNumber) -> Option<BlockOwner> {
        if let Some(f) = self
            .catalog
            .files()
            .find(|f| f.allocated_blocks.contains(&blocknr))
        {
            return Some(BlockOwner::File(f.id));
        }
        self.catalog
            .directories()
            .find(|d| d.blocks().contains(&blocknr))
            .map(|d| BlockOwner::Directory(d.id))
    }

    /// Walks a linked file's chain from its first block through the `next_block` pointers.
    pub fn follow_chain(&self, id: FileId) -> Result<Vec<BlockNumber>> {
        let file = self.file(id)?;
        if !matches!(file.allocation_info, AllocationInfo::Linked { .. }) {
            return Err(SimError::Validation(format!(
                "file \"{}\" is not stored as a linked chain",
                file.name
            )));
        }
        let mut chain = Vec::new();
        let mut cursor = Some(file.allocation_info.first_block());
        while let Some(blocknr) = cursor {
            if chain.len() > self.store.len() {
                return Err(SimError::Inconsistent(format!(
                    "chain of file \"{}\" loops",
                    file.name
                )));
            }
            chain.push(blocknr);
            cursor = self.store.get(blocknr).and_then(|b| b.next_block);
        }
        Ok(chain)
    }

    /// Pointer list held by an index block.
    pub fn index_entries(&self, blocknr: BlockNumber) -> Option<&[BlockNumber]> {
        self.store.get(blocknr)?.indexed_blocks.as_deref()
    }

    /// Verifies that partitions, usage counters, block statuses and the catalog agree with
    /// each other, reporting the first disagreement found.
    pub fn check(&self) -> Result<()> {
        let fail = |msg: String| Err(SimError::Inconsistent(msg));

        if self.store.len() != self.config.block_quantity {
            return fail(format!(
                "store holds {} blocks, disk has {}",
                self.store.len(),
                self.config.block_quantity
            ));
        }

        for (&key, p) in &self.partitions {
            if key != p.id || key >= self.next_partition_id {
                return fail(format!(
                    "partition \"{}\" is stored under id {} (record id {}, next id {})",
                    p.name, key, p.id, self.next_partition_id
                ));
            }
        }
        self.catalog.check_ids()?;

        let parts: Vec<&Partition> = self.partitions.values().collect();
        for (i, a) in parts.iter().enumerate() {
            if a.end_block >= self.store.len() || a.start_block > a.end_block {
                return fail(format!("partition \"{}\" has an invalid range", a.name));
            }
            if let Some(b) = parts[i + 1..].iter().find(|b| a.range().overlaps(&b.range())) {
                return fail(format!("partitions \"{}\" and \"{}\" overlap", a.name, b.name));
            }
        }

        for block in self.store.blocks() {
            let home = parts.iter().find(|p| p.range().contains(block.index));
            match (block.status, home) {
                (BlockStatus::Unallocated, None) if block.owner_partition.is_none() => {}
                (BlockStatus::Unallocated, _) => {
                    return fail(format!("block {} is unallocated inside a partition", block.index))
                }
                (_, Some(p)) if block.owner_partition == Some(p.id) => {}
                _ => {
                    return fail(format!(
                        "block {} is tagged with the wrong partition",
                        block.index
                    ))
                }
            }
        }

        let mut owners: HashMap<BlockNumber, usize> = HashMap::new();
        for file in self.catalog.files() {
            let p = match self.partitions.get(&file.partition_id) {
                Some(p) => p,
                None => return fail(format!("file \"{}\" has no partition", file.name)),
            };
            if file.allocated_blocks != file.allocation_info.blocks() {
                return fail(format!("file \"{}\" block list disagrees with its layout", file.name));
            }
            let data_blocks = file
                .allocated_blocks
                .len()
                .saturating_sub(p.allocation_method.physical_blocks(0));
            if data_blocks != file.required_blocks {
                return fail(format!("file \"{}\" holds the wrong number of blocks", file.name));
            }
            for &b in &file.allocated_blocks {
                if !p.range().contains(b) || self.store.status(b) != BlockStatus::Used {
                    return fail(format!("block {} of file \"{}\" is not in use", b, file.name));
                }
                *owners.entry(b).or_default() += 1;
            }
            self.check_layout(&file.allocation_info, &file.name)?;
        }
        for dir in self.catalog.directories() {
            let p = match self.partitions.get(&dir.partition_id) {
                Some(p) => p,
                None => return fail(format!("directory \"{}\" has no partition", dir.full_path)),
            };
            for b in dir.blocks() {
                if !p.range().contains(b) || self.store.status(b) != BlockStatus::Directory {
                    return fail(format!(
                        "block {} of directory \"{}\" is not a directory block",
                        b, dir.full_path
                    ));
                }
                *owners.entry(b).or_default() += 1;
            }
            if let Some(info) = &dir.allocation_info {
                self.check_layout(info, &dir.full_path)?;
            }
        }
        if let Some((b, _)) = owners.iter().find(|&(_, &count)| count > 1) {
            return fail(format!("block {} is owned more than once", b));
        }

        for p in &parts {
            let occupied = self
                .store
                .slice(p.range())
                .iter()
                .filter(|b| b.status.is_occupied())
                .count();
            if occupied != p.used_blocks {
                return fail(format!(
                    "partition \"{}\" counts {} used blocks but {} are occupied",
                    p.name, p.used_blocks, occupied
                ));
            }
            let owned = p.range().iter().filter(|b| owners.contains_key(b)).count();
            if owned != occupied {
                return fail(format!("partition \"{}\" has unowned occupied blocks", p.name));
            }
            let roots = self
                .catalog
                .directories_in(p.id)
                .filter(|d| d.is_root())
                .count();
            if roots != 1 {
                return fail(format!("partition \"{}\" has {} root directories", p.name, roots));
            }
            if self.catalog.directory_at(p.id, &p.current_path).is_none() {
                return fail(format!(
                    "current path {} of partition \"{}\" does not exist",
                    p.current_path, p.name
                ));
            }
        }
        Ok(())
    }

    fn check_layout(&self, info: &AllocationInfo, name: &str) -> Result<()> {
        match info {
            AllocationInfo::Contiguous { .. } => Ok(()),
            AllocationInfo::Linked { blocks } => {
                for (pos, &b) in blocks.iter().enumerate() {
                    if self.store.get(b).and_then(|blk| blk.next_block) != blocks.get(pos + 1).copied() {
                        return Err(SimError::Inconsistent(format!(
                            "chain of \"{}\" is broken at block {}",
                            name, b
                        )));
                    }
                }
                Ok(())
            }
            AllocationInfo::Indexed {
                index_block,
                file_blocks,
            } => {
                if self.index_entries(*index_block) != Some(file_blocks.as_slice()) {
                    return Err(SimError::Inconsistent(format!(
                        "index block {} of \"{}\" disagrees with its data blocks",
                        index_block, name
                    )));
                }
                Ok(())
            }
        }
    }

    /// Writes the whole session as JSON.
    pub fn save_snapshot<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads a session written by [`Disk::save_snapshot`], rejecting it unless it passes
    /// [`Disk::check`].
    pub fn load_snapshot<R: Read>(reader: R) -> Result<Self> {
        let disk: Disk = serde_json::from_reader(reader)?;
        disk.check()?;
        Ok(disk)
    }

    pub fn save_snapshot_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = BufWriter::new(StdFile::create(path)?);
        self.save_snapshot(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn open_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        Disk::load_snapshot(BufReader::new(StdFile::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::AllocationMethod;
    use crate::dir::DirectoryMethod;
    use crate::space::SpaceManagementMethod;

    fn disk_with_partition(method: AllocationMethod) -> (Disk, PartitionId) {
        let mut disk = Disk::new(16, 2).unwrap();
        let id = disk
            .create_partition(
                "data",
                0,
                15,
                method,
                DirectoryMethod::Tree,
                SpaceManagementMethod::Bitmap,
            )
            .unwrap()
            .id;
        (disk, id)
    }

    #[test]
    fn new_disk_is_fully_unallocated() {
        let disk = Disk::new(8, 4).unwrap();
        let stats = disk.usage_stats();
        assert_eq!(stats.unallocated_blocks, 8);
        assert_eq!(stats.total_capacity_kb, 32);
        assert!(disk.check().is_ok());
    }

    #[test]
    fn configure_resets_everything() {
        let (mut disk, _) = disk_with_partition(AllocationMethod::Linked);
        disk.configure(4, 1).unwrap();
        assert_eq!(disk.partitions().count(), 0);
        assert_eq!(disk.blocks().len(), 4);
        assert_eq!(disk.files().count(), 0);
    }

    #[test]
    fn failed_configure_keeps_disk() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Linked);
        assert!(disk.configure(0, 1).is_err());
        assert!(disk.partition(id).is_ok());
    }

    #[test]
    fn stats_report_fragmentation() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Contiguous);
        disk.create_file("a", 3, id).unwrap();
        disk.create_file("b", 4, id).unwrap();

        let stats = disk.usage_stats();
        assert_eq!(stats.used_blocks, 4);
        assert_eq!(stats.free_blocks, 12);
        assert_eq!(stats.internal_fragmentation_kb, 1);
        assert_eq!(stats.disk_usage_percentage, 25);
        assert_eq!(stats.partitions[0].usage_percentage, 25);
    }

    #[test]
    fn reports_block_owners() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Linked);
        let dir = disk.create_directory("docs", id).unwrap().id;
        let file = disk.create_file("a", 2, id).unwrap().id;

        assert_eq!(disk.block_owner(0), Some(BlockOwner::Directory(dir)));
        assert_eq!(disk.block_owner(1), Some(BlockOwner::File(file)));
        assert_eq!(disk.block_owner(2), None);
    }

    #[test]
    fn check_detects_counter_drift() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Linked);
        disk.create_file("a", 4, id).unwrap();
        disk.partitions.get_mut(&id).unwrap().used_blocks = 1;
        assert!(matches!(disk.check(), Err(SimError::Inconsistent(_))));
    }

    #[test]
    fn check_detects_broken_chain() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Linked);
        let file = disk.create_file("a", 6, id).unwrap().clone();
        disk.store.set_next(file.allocated_blocks[0], None);
        assert!(disk.check().is_err());
    }

    #[test]
    fn snapshot_survives_a_round_trip_in_memory() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Indexed);
        disk.create_directory("docs", id).unwrap();
        disk.create_file("a", 5, id).unwrap();

        let mut buf = Vec::new();
        disk.save_snapshot(&mut buf).unwrap();
        let restored = Disk::load_snapshot(buf.as_slice()).unwrap();
        assert_eq!(restored, disk);
    }

    #[test]
    fn listing_outlives_the_path_it_was_asked_for() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Linked);
        disk.create_file("a", 1, id).unwrap();

        let listing = {
            let dir_path = String::from("/");
            disk.list_directory(id, &dir_path).unwrap()
        };
        assert_eq!(listing.files.len(), 1);
        assert!(listing.directories.is_empty());
    }

    #[test]
    fn stale_partition_counter_is_rejected() {
        let (mut disk, _) = disk_with_partition(AllocationMethod::Linked);
        disk.configure(32, 1).unwrap();
        disk.create_partition(
            "a",
            0,
            7,
            AllocationMethod::Linked,
            DirectoryMethod::Tree,
            SpaceManagementMethod::Bitmap,
        )
        .unwrap();
        disk.next_partition_id = 1;
        assert!(matches!(disk.check(), Err(SimError::Inconsistent(_))));

        let before = disk.clone();
        assert!(matches!(
            disk.create_partition(
                "b",
                8,
                15,
                AllocationMethod::Linked,
                DirectoryMethod::Tree,
                SpaceManagementMethod::Bitmap,
            ),
            Err(SimError::Inconsistent(_))
        ));
        assert_eq!(disk, before);
    }

    #[test]
    fn dangling_current_path_is_rejected() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Linked);
        disk.partitions.get_mut(&id).unwrap().current_path = "/gone".to_string();
        assert!(matches!(disk.check(), Err(SimError::Inconsistent(_))));
    }

    #[test]
    fn huge_sizes_return_insufficient_space() {
        let (mut disk, id) = disk_with_partition(AllocationMethod::Indexed);
        assert!(matches!(
            disk.create_file("big", u64::MAX, id),
            Err(SimError::InsufficientSpace { available: 16, .. })
        ));
        let small = disk.create_file("small", 1, id).unwrap().id;
        assert!(matches!(
            disk.resize_file(small, u64::MAX),
            Err(SimError::InsufficientSpace { .. })
        ));
        assert!(disk.check().is_ok());
    }

    #[test]
    fn stats_saturate_on_huge_blocks() {
        let mut disk = Disk::new(2, u64::MAX).unwrap();
        let id = disk
            .create_partition(
                "p",
                0,
                1,
                AllocationMethod::Indexed,
                DirectoryMethod::Flat,
                SpaceManagementMethod::Bitmap,
            )
            .unwrap()
            .id;
        disk.create_file("f", 1, id).unwrap();

        let stats = disk.usage_stats();
        assert_eq!(stats.total_capacity_kb, u64::MAX);
        assert_eq!(stats.internal_fragmentation_kb, u64::MAX);
        assert_eq!(disk.partition(id).unwrap().size_kb(u64::MAX), u64::MAX);
    }

    #[test]
    fn malformed_snapshot_returns_error() {
        assert!(matches!(
            Disk::load_snapshot(&b"{\"config\":"[..]),
            Err(SimError::Snapshot(_))
        ));
    }
}
