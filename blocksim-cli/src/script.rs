//! Line oriented command scripts.
//!
//! One command per line, words separated by whitespace, `#` starts a comment. Partitions are
//! addressed by name.

use anyhow::{anyhow, bail, Context, Result};
use blocksim::{BlockStatus, Disk, PartitionId, SpaceView};
use log::debug;

const MAP_WIDTH: usize = 32;

#[derive(Default)]
pub struct Session {
    pub disk: Option<Disk>,
}

impl Session {
    pub fn new() -> Self {
        Self { disk: None }
    }

    pub fn run_script(&mut self, source: &str) -> Result<()> {
        for (lineno, line) in source.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            debug!("line {}: {:?}", lineno + 1, words);
            self.execute(&words)
                .with_context(|| format!("line {}: {}", lineno + 1, line))?;
        }
        Ok(())
    }

    fn disk(&mut self) -> Result<&mut Disk> {
        self.disk
            .as_mut()
            .ok_or_else(|| anyhow!("no disk configured, start with `disk <blocks> <block-kb>`"))
    }

    fn partition_id(&mut self, name: &str) -> Result<PartitionId> {
        self.disk()?
            .find_partition(name)
            .map(|p| p.id)
            .ok_or_else(|| anyhow!("partition \"{}\" not found", name))
    }

    pub fn execute(&mut self, words: &[&str]) -> Result<()> {
        match words {
            ["disk", blocks, kb] => {
                let disk = Disk::new(blocks.parse()?, kb.parse()?)?;
                self.disk = Some(disk);
            }
            ["partition", name, start, end, alloc, dirs, space] => {
                let p = self.disk()?.create_partition(
                    name,
                    start.parse()?,
                    end.parse()?,
                    alloc.parse()?,
                    dirs.parse()?,
                    space.parse()?,
                )?;
                println!(
                    "partition {} \"{}\" blocks {}-{}",
                    p.id, p.name, p.start_block, p.end_block
                );
            }
            ["rmpart", name] => {
                let id = self.partition_id(name)?;
                self.disk()?.delete_partition(id)?;
            }
            ["mkfile", part, name, kb] => {
                let id = self.partition_id(part)?;
                let file = self.disk()?.create_file(name, kb.parse()?, id)?;
                println!("{} -> {:?}", file.full_path(), file.allocated_blocks);
            }
            ["rm", part, name] => {
                let id = self.file_id(part, name)?;
                self.disk()?.delete_file(id)?;
            }
            ["resize", part, name, kb] => {
                let id = self.file_id(part, name)?;
                let file = self.disk()?.resize_file(id, kb.parse()?)?;
                println!("{} -> {:?}", file.full_path(), file.allocated_blocks);
            }
            ["mkdir", part, name] => {
                let id = self.partition_id(part)?;
                let dir = self.disk()?.create_directory(name, id)?;
                println!("{} -> {:?}", dir.full_path, dir.blocks());
            }
            ["rmdir", part, target] => {
                let id = self.partition_id(part)?;
                let disk = self.disk()?;
                let cwd = disk.current_path(id)?;
                let full = blocksim::path::resolve(cwd, target);
                let dir = disk
                    .find_directory(id, &full)
                    .map(|d| d.id)
                    .ok_or_else(|| anyhow!("directory {} not found", full))?;
                disk.delete_directory(dir)?;
            }
            ["cd", part, target] => {
                let id = self.partition_id(part)?;
                println!("{}", self.disk()?.change_directory(id, target)?);
            }
            ["ls", part] | ["ls", part, _] => {
                let id = self.partition_id(part)?;
                let disk = self.disk()?;
                let dir_path = match words.get(2) {
                    Some(target) => blocksim::path::resolve(disk.current_path(id)?, target),
                    None => disk.current_path(id)?.to_string(),
                };
                let listing = disk.list_directory(id, &dir_path)?;
                for dir in &listing.directories {
                    println!("  {}/", dir.name);
                }
                for file in &listing.files {
                    println!("  {} {}KB", file.name, file.size_in_kb);
                }
            }
            ["space", part] => {
                let id = self.partition_id(part)?;
                match self.disk()?.space_view(id)? {
                    SpaceView::Bitmap(bitmap) => println!("{}", bitmap),
                    SpaceView::FreeList(list) => println!("{:?}", list),
                }
            }
            ["map"] => print!("{}", render_map(self.disk()?)),
            ["stats"] => {
                let stats = self.disk()?.usage_stats();
                println!(
                    "used {} / free {} / unallocated {} blocks, {}% of disk, {}KB lost to fragmentation",
                    stats.used_blocks,
                    stats.free_blocks,
                    stats.unallocated_blocks,
                    stats.disk_usage_percentage,
                    stats.internal_fragmentation_kb
                );
                for p in &stats.partitions {
                    println!(
                        "  {}: {}/{} blocks ({}%)",
                        p.name, p.used_blocks, p.total_blocks, p.usage_percentage
                    );
                }
            }
            ["check"] => {
                self.disk()?.check()?;
                println!("consistent");
            }
            ["save", path] => self.disk()?.save_snapshot_to_path(path)?,
            ["load", path] => self.disk = Some(Disk::open_snapshot(path)?),
            [command, ..] => bail!("unknown command or wrong arguments: {}", command),
            [] => {}
        }
        Ok(())
    }

    fn file_id(&mut self, part: &str, name: &str) -> Result<u32> {
        let id = self.partition_id(part)?;
        let disk = self.disk()?;
        let cwd = disk.current_path(id)?;
        disk.find_file(id, cwd, name)
            .map(|f| f.id)
            .ok_or_else(|| anyhow!("file \"{}\" not found in {}", name, cwd))
    }
}

/// Draws the disk one character per block: `.` unallocated, `-` free, `#` file data and `d`
/// directory blocks.
pub fn render_map(disk: &Disk) -> String {
    let mut out = String::new();
    for row in disk.blocks().chunks(MAP_WIDTH) {
        out.push_str(&format!("{:>6} ", row[0].index));
        for block in row {
            out.push(match block.status {
                BlockStatus::Unallocated => '.',
                BlockStatus::Free => '-',
                BlockStatus::Used => '#',
                BlockStatus::Directory => 'd',
            });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_run_contiguous_script() {
        let mut session = Session::new();
        session
            .run_script(
                "disk 10 1\n\
                 partition data 0 9 contiguous flat bitmap\n\
                 mkfile data a.txt 3 # first\n\
                 mkfile data b.txt 2\n\
                 rm data a.txt\n\
                 mkfile data c.txt 4\n",
            )
            .unwrap();
        let disk = session.disk.unwrap();
        assert_eq!(render_map(&disk), "     0 ---######-\n");
    }

    #[test]
    fn commands_before_disk_fail() {
        let mut session = Session::new();
        assert!(session.run_script("mkfile data a 1").is_err());
    }

    #[test]
    fn unknown_commands_report_line() {
        let mut session = Session::new();
        let err = session.run_script("disk 4 1\n\nfrobnicate").unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));
    }
}
