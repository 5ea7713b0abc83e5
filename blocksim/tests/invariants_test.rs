use std::collections::HashSet;

use blocksim::{AllocationMethod, DirectoryMethod, Disk, SpaceManagementMethod};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create(u64),
    Delete(usize),
    Resize(usize, u64),
    Mkdir,
    Rmdir(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1u64..24).prop_map(Op::Create),
        2 => any::<usize>().prop_map(Op::Delete),
        2 => (any::<usize>(), 1u64..24).prop_map(|(i, kb)| Op::Resize(i, kb)),
        1 => Just(Op::Mkdir),
        1 => any::<usize>().prop_map(Op::Rmdir),
    ]
}

fn method() -> impl Strategy<Value = AllocationMethod> {
    prop_oneof![
        Just(AllocationMethod::Contiguous),
        Just(AllocationMethod::Linked),
        Just(AllocationMethod::Indexed),
    ]
}

fn apply(disk: &mut Disk, p: u32, ops: &[Op]) {
    for (n, op) in ops.iter().enumerate() {
        let files: Vec<u32> = disk.files().map(|f| f.id).collect();
        let dirs: Vec<u32> = disk
            .directories()
            .filter(|d| !d.is_root())
            .map(|d| d.id)
            .collect();
        // Failures such as running out of space are expected; only consistency matters.
        let _ = match *op {
            Op::Create(kb) => disk.create_file(&format!("f{}", n), kb, p).map(|_| ()),
            Op::Delete(i) if !files.is_empty() => disk.delete_file(files[i % files.len()]),
            Op::Resize(i, kb) if !files.is_empty() => {
                disk.resize_file(files[i % files.len()], kb).map(|_| ())
            }
            Op::Mkdir => disk.create_directory(&format!("d{}", n), p).map(|_| ()),
            Op::Rmdir(i) if !dirs.is_empty() => disk.delete_directory(dirs[i % dirs.len()]),
            _ => Ok(()),
        };
    }
}

proptest! {
    #[test]
    fn random_workloads_keep_disk_consistent(
        alloc in method(),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let mut disk = Disk::new(40, 2).unwrap();
        let p = disk
            .create_partition("p", 4, 35, alloc, DirectoryMethod::Tree, SpaceManagementMethod::Bitmap)
            .unwrap()
            .id;

        apply(&mut disk, p, &ops);

        prop_assert!(disk.check().is_ok(), "{:?}", disk.check());
        let mut seen = HashSet::new();
        for file in disk.files() {
            for &b in &file.allocated_blocks {
                prop_assert!(seen.insert(b), "block {} held twice", b);
                prop_assert!((4..=35).contains(&b));
            }
        }
        let partition = disk.partition(p).unwrap();
        prop_assert_eq!(
            partition.used_blocks + disk.free_block_list(p).unwrap().len(),
            partition.total_blocks()
        );
        prop_assert!(disk.block(3).unwrap().owner_partition.is_none());
        prop_assert!(disk.block(36).unwrap().owner_partition.is_none());
    }

    #[test]
    fn create_then_delete_restores_free_space(
        alloc in method(),
        ops in prop::collection::vec(op(), 0..20),
        kb in 1u64..30,
    ) {
        let mut disk = Disk::new(40, 2).unwrap();
        let p = disk
            .create_partition("p", 0, 39, alloc, DirectoryMethod::Tree, SpaceManagementMethod::Bitmap)
            .unwrap()
            .id;
        apply(&mut disk, p, &ops);
        let before = disk.bitmap(p).unwrap();

        if let Ok(file) = disk.create_file("probe", kb, p) {
            let id = file.id;
            disk.delete_file(id).unwrap();
        }

        prop_assert_eq!(disk.bitmap(p).unwrap(), before);
    }
}
