//! Backup and restore of a tree's link structure.
//!
//! Backup walks a tree, records every symlink, junction and file link as a
//! manifest line, and (unless dry-running) removes the link so the tree can
//! be copied by tools that would otherwise follow or choke on the links.
//! Restore replays the manifest onto a link-less mirror of the tree.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::link::{self, BlindLinkKind};
use crate::manifest::{self, Record, RecordKind};
use crate::path::{self as wpath, strip_nt_prefix, Simplify};
use crate::probe::{probe_under, probe_wide, Probe, ProbeFlags};
use crate::stat::LinkKind;
use crate::walk::{Walk, WalkOptions};
use crate::wide;

/// Knobs for [`backup_links`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BackupOptions {
    /// Record links without removing them.
    pub dry_run: bool,
    /// Descend into directories.
    pub recursive: bool,
    /// Store junction targets relative to the tree root. Junctions whose
    /// target sits on another drive cannot be relativized; they are left in
    /// place with a warning.
    pub relative_junctions: bool,
}

/// Discovers links under `name` (absolute, or relative to `base_dir`) and
/// appends one manifest record per link to `out`.
///
/// A `name` that does not exist is a success and writes nothing, so sweeps
/// over moving trees stay idempotent. Per-link failures are logged and
/// skipped; only manifest write failures abort.
pub fn backup_links<W: Write>(
    base_dir: &Path,
    name: &Path,
    out: &mut W,
    opts: &BackupOptions,
) -> io::Result<()> {
    let base_w = wpath::absolutize(
        &wide::to_wide(base_dir.as_os_str()),
        None,
        Simplify::CollapseAndNormalize,
    )?;
    let name_w = wide::to_wide(name.as_os_str());
    let mut writer = manifest::Writer::new(out);
    backup_one(&base_w, &name_w, &mut writer, opts)
}

fn backup_one<W: Write>(
    base_w: &[u16],
    name_w: &[u16],
    out: &mut manifest::Writer<&mut W>,
    opts: &BackupOptions,
) -> io::Result<()> {
    let abs = wpath::absolutize(name_w, Some(base_w), Simplify::CollapseAndNormalize)?;
    let abs_path = PathBuf::from(wide::from_wide(&abs));
    let st = match link::stat_link(&abs_path) {
        Ok(st) => st,
        Err(e) => {
            debug!("skipping {}: {e}", abs_path.display());
            return Ok(());
        }
    };
    if st.kind.is_link() {
        let rel = match wpath::relativize(&abs, base_w) {
            Ok(rel) => rel,
            Err(e) => {
                warn!("cannot relativize {}: {e}", abs_path.display());
                return Ok(());
            }
        };
        let raw = match link::read_link(&abs_path) {
            Ok(target) => wide::to_wide(target.as_os_str()),
            Err(e) => {
                warn!("cannot read link {}: {e}", abs_path.display());
                return Ok(());
            }
        };
        let mut target = strip_nt_prefix(&raw).to_vec();
        if let Some(nul) = target.iter().position(|&u| u == 0) {
            warn!("link length mismatch in {}", abs_path.display());
            target.truncate(nul);
        }
        if st.kind == LinkKind::Junction && opts.relative_junctions {
            target = match wpath::relativize(&target, base_w) {
                Ok(rel_target) => rel_target,
                Err(e) => {
                    // leave the junction alone rather than record a target
                    // the restore could not reconstruct
                    warn!(
                        "junction target of {} cannot be made relative: {e}",
                        abs_path.display()
                    );
                    return Ok(());
                }
            };
        }
        if !opts.dry_run {
            if let Err(e) = link::remove_link(&abs_path) {
                warn!("cannot remove {}: {e}", abs_path.display());
                return Ok(());
            }
        }
        let kind = match st.kind {
            LinkKind::DirectorySymlink => RecordKind::DirectorySymlink,
            LinkKind::Junction => RecordKind::Junction,
            _ => RecordKind::FileLink,
        };
        out.write_record(&Record { kind, link: rel, target })?;
    } else if st.kind == LinkKind::Directory && opts.recursive {
        // one level at a time; the recursion is explicit so links found
        // below are handled (and removed) before anything descends further
        let walk = Walk::new(
            abs_path.clone(),
            WalkOptions { depth_first: false, follow_symlinks: false },
        );
        for level in walk {
            let level = level?;
            for entry in &level.entries {
                let child = wide::to_wide(level.dir.join(&entry.name).as_os_str());
                backup_one(base_w, &child, out, opts)?;
            }
        }
    }
    Ok(())
}

/// Reads manifest records from `input` and reinstates each link under a
/// link-less mirror rooted at `base_dir`.
///
/// A link path that already exists, or whose ancestors contain a reparse
/// point, is skipped: the restore target must be a clean tree. Individual
/// failures are logged and the stream continues; a structurally broken
/// manifest stops it.
pub fn restore_links<R: Read>(base_dir: &Path, input: &mut R, dry_run: bool) -> io::Result<()> {
    let base_w = wpath::absolutize(
        &wide::to_wide(base_dir.as_os_str()),
        None,
        Simplify::CollapseAndNormalize,
    )?;
    let mut reader = manifest::Reader::new(input);
    loop {
        let record = match reader.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let link_abs =
            wpath::absolutize(&record.link, Some(&base_w), Simplify::CollapseAndNormalize)?;
        let link_path = PathBuf::from(wide::from_wide(&link_abs));
        // only the stretch below the tree root has to be link-free; an
        // absolute manifest path is probed whole
        let probed = if wpath::is_absolute(&record.link) {
            let flags = ProbeFlags { dont_follow_intermediate: true, follow_last: false };
            probe_wide(&record.link, flags)
        } else {
            probe_under(&base_w, &record.link)
        };
        match probed {
            Ok(Probe::Missing) => {
                let target_path = PathBuf::from(wide::from_wide(&record.target));
                let kind = match record.kind {
                    RecordKind::DirectorySymlink => BlindLinkKind::DirectorySymlink,
                    RecordKind::FileLink => BlindLinkKind::FileSymlink,
                    RecordKind::Junction => BlindLinkKind::Junction,
                };
                if dry_run {
                    info!("would link {} -> {}", link_path.display(), target_path.display());
                } else if let Err(e) = link::blind_link(&target_path, &link_path, kind, base_dir) {
                    warn!("cannot restore {}: {e}", link_path.display());
                }
            }
            Ok(_) => {
                debug!("skipping {}: present or behind a link", link_path.display());
            }
            Err(e) => {
                warn!("cannot probe {}: {e}", link_path.display());
            }
        }
    }
}
