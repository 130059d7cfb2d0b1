//! Back up the link structure of a tree into a manifest, and restore it
//! onto a link-less mirror.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "translink")]
#[command(about = "Back up and restore the link structure of a tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record links under a tree into a manifest, removing them
    Backup {
        /// Root of the tree
        base_dir: PathBuf,
        /// File or directory to examine, absolute or relative to the root
        name: PathBuf,
        /// Examine directory contents as well
        #[arg(short, long)]
        recursive: bool,
        /// Record only; do not remove links
        #[arg(short = 'd', long)]
        dry_run: bool,
        /// Store junction targets relative to the tree root
        #[arg(short = 'j', long)]
        relative_junctions: bool,
        /// Append the manifest to a file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Recreate the links recorded in a manifest
    Restore {
        /// Root of the restored tree
        base_dir: PathBuf,
        /// Print only; do not create links
        #[arg(short = 'd', long)]
        dry_run: bool,
        /// Read the manifest from a file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use std::fs::OpenOptions;
    use std::io;

    use anyhow::Context;

    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Backup { base_dir, name, recursive, dry_run, relative_junctions, file } => {
            let opts = ntlink::BackupOptions { dry_run, recursive, relative_junctions };
            match file {
                Some(path) => {
                    let mut out = OpenOptions::new()
                        .append(true)
                        .create(true)
                        .open(&path)
                        .with_context(|| format!("cannot open {}", path.display()))?;
                    ntlink::backup_links(&base_dir, &name, &mut out, &opts)
                }
                None => {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    ntlink::backup_links(&base_dir, &name, &mut out, &opts)
                }
            }
            .context("backup failed")?;
        }
        Commands::Restore { base_dir, dry_run, file } => {
            match file {
                Some(path) => {
                    let mut input = std::fs::File::open(&path)
                        .with_context(|| format!("cannot open {}", path.display()))?;
                    ntlink::restore_links(&base_dir, &mut input, dry_run)
                }
                None => {
                    let stdin = io::stdin();
                    let mut input = stdin.lock();
                    ntlink::restore_links(&base_dir, &mut input, dry_run)
                }
            }
            .context("restore failed")?;
        }
    }
    Ok(())
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    // keep the argument surface identical so --help works everywhere
    let _ = Cli::parse();
    anyhow::bail!("NTFS links require a Windows host");
}
