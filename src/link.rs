//! The POSIX-style surface: one create/read/remove/stat/rename vocabulary
//! over the three link flavors the filesystem actually has.
//!
//! Creation prefers a native NT symbolic link and falls back to the older
//! mechanisms when the host refuses: a mount-point junction for directory
//! targets, a hardlink for file targets. The hardlink fallback is lossy by
//! nature (removing the original leaves the "link" alive, which is correct
//! for hardlinks but not for symlinks); callers that need to tell the
//! difference can look at [`LinkStat::kind`].

use std::fs;
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::path::{Path, PathBuf};
use std::ptr;

use log::debug;

use crate::internals::{self, c, get_file_information};
use crate::path::{self as wpath, Simplify};
use crate::probe::{probe_wide, Probe, ProbeFlags};
use crate::stat::{filetime_to_system_time, LinkKind, LinkStat};
use crate::wide;

/// What [`blind_link`] should install, since it cannot classify a target
/// that does not exist yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlindLinkKind {
    FileSymlink,
    DirectorySymlink,
    Junction,
    HardLink,
}

pub(crate) fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    let link_w = wide::to_wide(link.as_os_str());
    if !matches!(probe_wide(&link_w, ProbeFlags::default())?, Probe::Missing) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "link name already exists",
        ));
    }
    let target_w = wide::to_wide(target.as_os_str());
    let attributes = match probe_wide(&target_w, ProbeFlags::default())? {
        Probe::Exists { attributes } => attributes,
        // we know nothing about the target, so we cannot pick a link flavor
        _ => return Err(io::Error::new(io::ErrorKind::NotFound, "no such target")),
    };
    let is_dir = attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0;
    match native_symlink(target, link, is_dir) {
        Err(e) if native_symlinks_unavailable(&e) => {
            debug!("native symlink unavailable ({e}), using the old mechanisms");
            if is_dir {
                internals::create_junction(target, link)
            } else {
                hardlink_raw(target, link)
            }
        }
        other => other,
    }
}

pub(crate) fn hard_link(original: &Path, link: &Path) -> io::Result<()> {
    let link_w = wide::to_wide(link.as_os_str());
    if !matches!(probe_wide(&link_w, ProbeFlags::default())?, Probe::Missing) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "link name already exists",
        ));
    }
    let original_w = wide::to_wide(original.as_os_str());
    let attributes = match probe_wide(&original_w, ProbeFlags::default())? {
        Probe::Exists { attributes } => attributes,
        _ => return Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
    };
    if attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "hard links to directories are not permitted",
        ));
    }
    hardlink_raw(original, link)
}

pub(crate) fn read_link(path: &Path) -> io::Result<PathBuf> {
    let path_w = wide::to_wide(path.as_os_str());
    let attributes = match probe_wide(&path_w, ProbeFlags::default())? {
        Probe::Exists { attributes } => attributes,
        _ => return Err(io::Error::new(io::ErrorKind::NotFound, "no such path")),
    };
    if attributes & c::FILE_ATTRIBUTE_REPARSE_POINT == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a link"));
    }
    let target = internals::read_reparse_target(path).map_err(not_a_reparse_to_invalid)?;
    Ok(PathBuf::from(wide::from_wide(&target.substitute)))
}

pub(crate) fn remove_link(path: &Path) -> io::Result<()> {
    let path_w = wide::to_wide(path.as_os_str());
    let attributes = match probe_wide(&path_w, ProbeFlags::default())? {
        Probe::Exists { attributes } => attributes,
        _ => return Err(io::Error::new(io::ErrorKind::NotFound, "no such path")),
    };
    let is_dir = attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0;
    // removing the directory entry of a reparse point removes the point,
    // never what it targets
    if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

pub(crate) fn stat_link(path: &Path) -> io::Result<LinkStat> {
    let path_w = wide::to_wide(path.as_os_str());
    let probed = match probe_wide(&path_w, ProbeFlags::default())? {
        Probe::Exists { attributes } => attributes,
        _ => return Err(io::Error::new(io::ErrorKind::NotFound, "no such path")),
    };
    let file = fs::OpenOptions::new()
        .access_mode(0)
        .custom_flags(c::FILE_FLAG_BACKUP_SEMANTICS | c::FILE_FLAG_OPEN_REPARSE_POINT)
        .open(path)?;
    let info = get_file_information(file.as_raw_handle())?;
    let mut attributes = info.dwFileAttributes;
    // handle queries occasionally drop the reparse bit; the directory
    // probe saw it, so put it back
    if probed & c::FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        attributes |= c::FILE_ATTRIBUTE_REPARSE_POINT;
    }
    drop(file);

    let is_dir = attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0;
    let kind = if attributes & c::FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        match internals::read_reparse_target(path) {
            Ok(t) if t.tag == c::IO_REPARSE_TAG_MOUNT_POINT => LinkKind::Junction,
            Ok(t) if t.tag == c::IO_REPARSE_TAG_SYMLINK => {
                if is_dir {
                    LinkKind::DirectorySymlink
                } else {
                    LinkKind::FileSymlink
                }
            }
            _ => LinkKind::UnknownReparse,
        }
    } else if is_dir {
        LinkKind::Directory
    } else {
        LinkKind::File
    };

    let size = if kind == LinkKind::File {
        (u64::from(info.nFileSizeHigh) << 32) | u64::from(info.nFileSizeLow)
    } else {
        0
    };
    Ok(LinkStat {
        kind,
        mode: kind.mode_bits(),
        nlink: info.nNumberOfLinks,
        size,
        dev: u64::from(info.dwVolumeSerialNumber),
        ino: (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow),
        created: filetime_to_system_time(filetime_u64(info.ftCreationTime)),
        accessed: filetime_to_system_time(filetime_u64(info.ftLastAccessTime)),
        modified: filetime_to_system_time(filetime_u64(info.ftLastWriteTime)),
        attributes,
    })
}

pub(crate) fn rename(old: &Path, new: &Path) -> io::Result<()> {
    // If both names resolve to the same existing file, rename is a no-op.
    if let (Ok(s_old), Ok(s_new)) = (stat_link(old), stat_link(new)) {
        if s_old.is_same_file(&s_new) {
            return Ok(());
        }
    }
    let old_w = wide::to_wide(old.as_os_str());
    let old_attributes = match probe_wide(&old_w, ProbeFlags::default())? {
        Probe::Exists { attributes } => attributes,
        _ => return Err(io::Error::new(io::ErrorKind::NotFound, "no such path")),
    };
    let new_w = wide::to_wide(new.as_os_str());
    if let Probe::Exists { attributes: new_attributes } = probe_wide(&new_w, ProbeFlags::default())? {
        let old_dir = old_attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0;
        let new_dir = new_attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0;
        if old_dir && !new_dir {
            return Err(io::Error::new(io::ErrorKind::NotADirectory, "not a directory"));
        }
        if !old_dir && new_dir {
            return Err(io::Error::new(io::ErrorKind::IsADirectory, "is a directory"));
        }
        // empty directories and files give way; non-empty directories make
        // the removal (and the rename) fail
        remove_link(new)?;
    }
    let old_c = wide::to_cwstr(&old_w);
    let new_c = wide::to_cwstr(&new_w);
    if unsafe {
        c::MoveFileExW(
            old_c.as_ptr(),
            new_c.as_ptr(),
            c::MOVEFILE_COPY_ALLOWED | c::MOVEFILE_WRITE_THROUGH,
        )
    } == 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Installs a link without requiring the target to exist: the restore path
/// recreates links whose targets may themselves be links yet to be
/// restored, or may point outside the tree.
pub(crate) fn blind_link(
    target: &Path,
    link: &Path,
    kind: BlindLinkKind,
    base_dir: &Path,
) -> io::Result<()> {
    let target_w = wide::to_wide(target.as_os_str());
    match kind {
        BlindLinkKind::Junction => {
            // junction targets are absolute; resolve against the tree root
            let base_w = wide::to_wide(base_dir.as_os_str());
            let abs = wpath::absolutize(&target_w, Some(&base_w), Simplify::CollapseAndNormalize)?;
            internals::create_junction(&to_path(&abs), link)
        }
        BlindLinkKind::DirectorySymlink => match native_symlink(target, link, true) {
            Err(e) if native_symlinks_unavailable(&e) => {
                // the junction stand-in needs an absolute target; symlink
                // semantics resolve relative targets against the directory
                // holding the link, not against the tree root
                let abs = if wpath::is_absolute(&target_w) {
                    target_w
                } else {
                    let link_w = wide::to_wide(link.as_os_str());
                    let link_abs =
                        wpath::absolutize(&link_w, None, Simplify::CollapseAndNormalize)?;
                    let dir = wpath::parent_of(&link_abs).to_vec();
                    wpath::absolutize(&target_w, Some(&dir), Simplify::CollapseAndNormalize)?
                };
                internals::create_junction(&to_path(&abs), link)
            }
            other => other,
        },
        BlindLinkKind::FileSymlink => match native_symlink(target, link, false) {
            Err(e) if native_symlinks_unavailable(&e) => hardlink_raw(target, link),
            other => other,
        },
        BlindLinkKind::HardLink => hardlink_raw(target, link),
    }
}

fn native_symlink(target: &Path, link: &Path, dir: bool) -> io::Result<()> {
    let target_c = wide::to_cwstr(&wide::to_wide(target.as_os_str()));
    let link_c = wide::to_cwstr(&wide::to_wide(link.as_os_str()));
    let flags = if dir { c::SYMBOLIC_LINK_FLAG_DIRECTORY } else { 0 };
    let ok = unsafe {
        c::CreateSymbolicLinkW(
            link_c.as_ptr(),
            target_c.as_ptr(),
            flags | c::SYMBOLIC_LINK_FLAG_ALLOW_UNPRIVILEGED_CREATE,
        )
    };
    if ok != 0 {
        return Ok(());
    }
    let e = io::Error::last_os_error();
    // systems older than 1709 reject the unprivileged-create flag wholesale
    if e.raw_os_error() == Some(c::ERROR_INVALID_PARAMETER as i32) {
        let ok = unsafe { c::CreateSymbolicLinkW(link_c.as_ptr(), target_c.as_ptr(), flags) };
        if ok != 0 {
            return Ok(());
        }
        return Err(io::Error::last_os_error());
    }
    Err(e)
}

/// Whether a `CreateSymbolicLinkW` failure means "use the old mechanisms"
/// rather than "the caller's request is bad".
fn native_symlinks_unavailable(e: &io::Error) -> bool {
    const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;
    matches!(
        e.raw_os_error().map(|code| code as u32),
        Some(
            c::ERROR_INVALID_FUNCTION
                | c::ERROR_NOT_SUPPORTED
                | c::ERROR_PRIVILEGE_NOT_HELD
                | ERROR_CALL_NOT_IMPLEMENTED,
        )
    )
}

fn hardlink_raw(original: &Path, link: &Path) -> io::Result<()> {
    let original_c = wide::to_cwstr(&wide::to_wide(original.as_os_str()));
    let link_c = wide::to_cwstr(&wide::to_wide(link.as_os_str()));
    if unsafe { c::CreateHardLinkW(link_c.as_ptr(), original_c.as_ptr(), ptr::null()) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn not_a_reparse_to_invalid(e: io::Error) -> io::Error {
    if e.raw_os_error() == Some(c::ERROR_NOT_A_REPARSE_POINT as i32) {
        io::Error::new(io::ErrorKind::InvalidInput, "not a link")
    } else {
        e
    }
}

fn to_path(w: &[u16]) -> PathBuf {
    PathBuf::from(wide::from_wide(w))
}

fn filetime_u64(ft: c::FILETIME) -> u64 {
    (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime)
}
