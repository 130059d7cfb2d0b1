//! Create, remove and inspect NTFS links from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "junc")]
#[command(about = "Create, remove and inspect NTFS links", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a link pointing at a target
    Link {
        /// What the link should point at
        target: PathBuf,
        /// Where to create the link
        link: PathBuf,
    },
    /// Remove a link
    Unlink { link: PathBuf },
    /// Print a link's literal target
    Info { link: PathBuf },
}

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Link { target, link } => {
            ntlink::create_link(&target, &link).with_context(|| {
                format!("cannot link {} -> {}", link.display(), target.display())
            })?;
        }
        Commands::Unlink { link } => {
            ntlink::remove_link(&link)
                .with_context(|| format!("cannot unlink {}", link.display()))?;
        }
        Commands::Info { link } => {
            let target = ntlink::read_link(&link)
                .with_context(|| format!("cannot read link {}", link.display()))?;
            println!("{}", target.display());
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
