use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use blocksim::AllocationMethod;
use clap::{Parser, Subcommand};

mod script;

use script::{render_map, Session};

#[derive(Parser)]
#[command(author, version, about = "Disk block allocation simulator", long_about = None)]
struct Cli {
    /// Print the final disk state as a JSON snapshot
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command script
    Run {
        /// Path to the script
        script: PathBuf,
    },
    /// Create, delete and recreate files on a ten block disk
    Demo {
        /// Allocation method of the demo partition
        #[arg(long, default_value = "contiguous")]
        method: AllocationMethod,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut session = Session::new();

    match cli.command {
        Commands::Run { script } => {
            let source = fs::read_to_string(&script)
                .with_context(|| format!("reading {}", script.display()))?;
            session.run_script(&source)?;
        }
        Commands::Demo { method } => {
            session.run_script(&format!(
                "disk 10 1\n\
                 partition demo 0 9 {} flat bitmap\n\
                 mkfile demo a.txt 3\n\
                 mkfile demo b.txt 2\n\
                 rm demo a.txt\n\
                 mkfile demo c.txt 4\n\
                 space demo\n\
                 stats\n",
                method
            ))?;
        }
    }

    if let Some(disk) = &session.disk {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(disk)?);
        } else {
            print!("{}", render_map(disk));
        }
    }

    Ok(())
}
