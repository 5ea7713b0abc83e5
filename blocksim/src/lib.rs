//! An in-memory disk block allocation simulator.
//!
//! A [`Disk`] is a fixed array of equally sized blocks. Partitions claim contiguous ranges of
//! it, and inside each partition files and directories take blocks through one of three
//! allocation methods (contiguous, linked or indexed). Free space can be observed as a bitmap
//! or a free-block list, and [`Disk::usage_stats`] reports usage and internal fragmentation.
//!
//! ```
//! use blocksim::{AllocationMethod, DirectoryMethod, Disk, SpaceManagementMethod};
//!
//! let mut disk = Disk::new(10, 4).unwrap();
//! let id = disk
//!     .create_partition(
//!         "data",
//!         0,
//!         9,
//!         AllocationMethod::Linked,
//!         DirectoryMethod::Flat,
//!         SpaceManagementMethod::Bitmap,
//!     )
//!     .unwrap()
//!     .id;
//! let file = disk.create_file("notes", 10, id).unwrap();
//! assert_eq!(file.allocated_blocks, vec![0, 1, 2]);
//! ```

pub mod alloc;
mod catalog;
mod config;
mod dir;
mod error;
mod file;
mod fs;
mod partition;
pub mod path;
pub mod space;
pub mod store;

pub use crate::alloc::{AllocationInfo, AllocationMethod};
pub use crate::catalog::{Directory, DirectoryId, File, FileId, PartitionId};
pub use crate::config::{DiskConfig, FORBIDDEN_NAME_CHARS, MAX_NAME_LEN};
pub use crate::dir::DirectoryMethod;
pub use crate::error::{Result, SimError};
pub use crate::fs::{BlockOwner, Disk, Listing, PartitionUsage, UsageStats};
pub use crate::partition::Partition;
pub use crate::space::{Bitmap, SpaceManagementMethod, SpaceView};
pub use crate::store::{Block, BlockNumber, BlockRange, BlockStatus};
