/*!
POSIX-style symbolic links on NTFS.

NTFS has three link-shaped objects instead of one: mount-point junctions
(a little known NTFS v5+ feature roughly equivalent to Unix directory
symbolic links), hardlinks, and — on newer systems — true symbolic links.
This crate puts one POSIX-looking vocabulary over all three
([`create_link`], [`read_link`], [`remove_link`], [`stat_link`],
[`rename`]) and builds a pair of tree utilities on top of it:
[`backup_links`] collapses every link under a tree into a textual
[manifest](manifest), and [`restore_links`] reconstructs the links from
that manifest on a link-less copy of the tree.

Junction points are supported in Windows 2000 and onwards, where a
directory serves as a symbolic link to another directory on the computer.
For example, if the directory `D:\SYMLINK` specified `C:\WINNT\SYSTEM32`
as its target, then an application accessing `D:\SYMLINK\DRIVERS` would
in reality be accessing `C:\WINNT\SYSTEM32\DRIVERS`. The junction-level
primitives are exposed directly as [`create_junction`],
[`junction_target`], [`remove_junction`] and [`is_junction`].

Everything here only works on NTFS volumes; the pure path and manifest
modules build everywhere so their behavior can be tested on any host.
*/
#![doc(html_root_url = "https://docs.rs/ntlink/~0.3")]
#![deny(rust_2021_compatibility)]

pub mod manifest;
pub mod path;

mod stat;
mod wide;

pub use stat::{LinkKind, LinkStat, S_IFDIR, S_IFJUN, S_IFLNK, S_IFMT, S_IFREG};

#[cfg(windows)]
mod archive;
#[cfg(windows)]
mod internals;
#[cfg(windows)]
mod link;
#[cfg(windows)]
pub mod probe;
#[cfg(windows)]
pub mod walk;

#[cfg(all(test, windows))]
mod tests;

#[cfg(windows)]
pub use archive::BackupOptions;
#[cfg(windows)]
pub use link::BlindLinkKind;

use std::io;
use std::path::Path;
#[cfg(windows)]
use std::path::PathBuf;

/// Creates a link at `link` pointing to `target`, picking the flavor from
/// what `target` is.
///
/// `target` must exist and `link` must not. On hosts with native NT
/// symbolic links the link is a true symlink (file or directory flavor to
/// match the target); elsewhere a directory target gets a junction and a
/// file target gets a **hardlink**. The hardlink stand-in is lossy:
/// removing the original file leaves the link readable, where a POSIX
/// symlink would dangle.
///
/// # Example
///
/// ```rust,no_run
/// use std::io;
/// # use std::fs;
/// fn main() -> io::Result<()> {
///     let tmpdir = tempfile::tempdir()?;
///     let target = tmpdir.path().join("target");
///     let link = tmpdir.path().join("link");
///     fs::create_dir_all(&target)?;
///     ntlink::create_link(&target, &link)
/// }
/// ```
#[cfg(windows)]
pub fn create_link<P, Q>(target: P, link: Q) -> io::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    link::create_link(target.as_ref(), link.as_ref())
}

/// Creates a hardlink at `link` to the existing file `original`.
///
/// Directories cannot be hardlinked; asking fails with permission-denied
/// the way `link(2)` reports `EPERM`.
#[cfg(windows)]
pub fn hard_link<P, Q>(original: P, link: Q) -> io::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    link::hard_link(original.as_ref(), link.as_ref())
}

/// Reads the literal target stored in the link at `path`.
///
/// The result is exactly what the reparse point carries: junction targets
/// keep their `\??\` prefix and symlink targets may be relative. Paths
/// that exist but are not links fail with `InvalidInput`.
#[cfg(windows)]
pub fn read_link<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    link::read_link(path.as_ref())
}

/// Removes the link (or file, or empty directory) at `path`.
///
/// Removing a link never touches what it points at: junctions and
/// directory symlinks are removed as directory entries, file symlinks and
/// hardlinks as files.
#[cfg(windows)]
pub fn remove_link<P: AsRef<Path>>(path: P) -> io::Result<()> {
    link::remove_link(path.as_ref())
}

/// Collects metadata for `path` without following a final link.
#[cfg(windows)]
pub fn stat_link<P: AsRef<Path>>(path: P) -> io::Result<LinkStat> {
    link::stat_link(path.as_ref())
}

/// Renames `old` to `new` with POSIX `rename(2)` semantics: renaming a
/// name onto a second name of the same file is a no-op, an existing `new`
/// is replaced when kinds agree (empty directories and files only), and
/// cross-volume moves degrade to copy.
#[cfg(windows)]
pub fn rename<P, Q>(old: P, new: Q) -> io::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    link::rename(old.as_ref(), new.as_ref())
}

/// Changing ownership is not something the emulation can offer; this
/// always fails with `InvalidInput`, like `lchown(2)` returning `EINVAL`.
pub fn chown_link<P: AsRef<Path>>(_path: P, _uid: u32, _gid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "changing ownership is not supported",
    ))
}

/// Installs a link of an explicitly chosen [`BlindLinkKind`] without
/// requiring the target to exist.
///
/// This is the restore primitive: targets may be links that have not been
/// restored yet, or may point outside the tree. Junction targets are made
/// absolute against `base_dir`; relative symlink targets keep symlink
/// semantics (they resolve against the link's own directory).
#[cfg(windows)]
pub fn blind_link<P, Q, B>(target: P, link: Q, kind: BlindLinkKind, base_dir: B) -> io::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    B: AsRef<Path>,
{
    link::blind_link(target.as_ref(), link.as_ref(), kind, base_dir.as_ref())
}

/// Creates a junction point from the specified directory to the specified
/// target directory.
///
/// N.B. Only works on NTFS.
///
/// A missing `junction` is created as an empty directory; an existing
/// empty directory or junction is (re-)targeted in place. The target does
/// not need to exist.
///
/// # Example
///
/// ```rust,no_run
/// use std::io;
/// # use std::fs;
/// fn main() -> io::Result<()> {
///     let tmpdir = tempfile::tempdir()?;
///     let target = tmpdir.path().join("target");
///     let junction = tmpdir.path().join("junction");
///     # fs::create_dir_all(&target)?;
///     ntlink::create_junction(&target, &junction)
/// }
/// ```
#[cfg(windows)]
pub fn create_junction<P, Q>(target: P, junction: Q) -> io::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    internals::create_junction(target.as_ref(), junction.as_ref())
}

/// Removes the reparse data from the `junction`, leaving the empty
/// directory and the target directory as they are.
///
/// N.B. Only works on NTFS.
#[cfg(windows)]
pub fn remove_junction<P: AsRef<Path>>(junction: P) -> io::Result<()> {
    internals::remove_junction(junction.as_ref())
}

/// Determines whether the specified path exists and refers to a junction
/// point.
#[cfg(windows)]
pub fn is_junction<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    internals::is_junction(path.as_ref())
}

/// Gets the target of the specified junction point, exactly as stored:
/// with the `\??\` prefix.
///
/// N.B. Only works on NTFS.
#[cfg(windows)]
pub fn junction_target<P: AsRef<Path>>(junction: P) -> io::Result<PathBuf> {
    internals::junction_target(junction.as_ref())
}

/// Walks `name` under `base_dir`, appends a manifest record for every link
/// found, and removes the recorded links unless
/// [`BackupOptions::dry_run`] is set. See [`manifest`] for the record
/// format.
#[cfg(windows)]
pub fn backup_links<B, N, W>(
    base_dir: B,
    name: N,
    out: &mut W,
    opts: &BackupOptions,
) -> io::Result<()>
where
    B: AsRef<Path>,
    N: AsRef<Path>,
    W: io::Write,
{
    archive::backup_links(base_dir.as_ref(), name.as_ref(), out, opts)
}

/// Replays a manifest read from `input` onto the link-less tree at
/// `base_dir`. With `dry_run`, prints what would be linked instead of
/// linking.
#[cfg(windows)]
pub fn restore_links<B, R>(base_dir: B, input: &mut R, dry_run: bool) -> io::Result<()>
where
    B: AsRef<Path>,
    R: io::Read,
{
    archive::restore_links(base_dir.as_ref(), input, dry_run)
}
