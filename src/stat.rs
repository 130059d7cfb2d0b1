//! The abstract metadata record produced by `stat_link`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File-type mask over [`LinkStat::mode`].
pub const S_IFMT: u32 = 0o170000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Symbolic link (either flavor).
pub const S_IFLNK: u32 = 0o120000;
/// Mount-point junction. The value is unused by the POSIX file-type space
/// so junctions remain distinguishable from true symlinks.
pub const S_IFJUN: u32 = 0o110000;

/// What kind of object a path names, reparse points included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    File,
    Directory,
    FileSymlink,
    DirectorySymlink,
    Junction,
    /// A reparse point with a tag this crate does not interpret.
    UnknownReparse,
}

impl LinkKind {
    /// True for every flavor the backup tool records.
    pub fn is_link(self) -> bool {
        matches!(
            self,
            LinkKind::FileSymlink | LinkKind::DirectorySymlink | LinkKind::Junction
        )
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn mode_bits(self) -> u32 {
        match self {
            LinkKind::File => S_IFREG,
            LinkKind::Directory => S_IFDIR,
            LinkKind::FileSymlink | LinkKind::DirectorySymlink | LinkKind::UnknownReparse => S_IFLNK,
            LinkKind::Junction => S_IFJUN,
        }
    }
}

/// Metadata for one path, collected without following the final link.
///
/// `dev`/`ino` come from the volume serial number and the NTFS file index;
/// together they identify the underlying file record, which is how
/// [`crate::rename`] detects that two names denote one object.
#[derive(Clone, Debug)]
pub struct LinkStat {
    pub kind: LinkKind,
    /// POSIX-style file-type bits synthesized from `kind`.
    pub mode: u32,
    /// Number of directory entries for the file record.
    pub nlink: u32,
    /// Byte size; zero for directories, junctions and symlinks.
    pub size: u64,
    /// Volume serial number.
    pub dev: u64,
    /// File index on the volume, zero when the volume does not report one.
    pub ino: u64,
    pub created: SystemTime,
    pub accessed: SystemTime,
    pub modified: SystemTime,
    /// The raw attribute bits the metadata was derived from.
    pub attributes: u32,
}

impl LinkStat {
    /// Whether `self` and `other` denote the same underlying file record.
    /// A zero file index never matches anything.
    pub fn is_same_file(&self, other: &LinkStat) -> bool {
        self.ino != 0 && self.ino == other.ino && self.dev == other.dev
    }

    pub fn is_link(&self) -> bool {
        self.kind.is_link()
    }
}

/// Seconds between 1601-01-01 (the FILETIME epoch) and 1970-01-01.
const FILETIME_EPOCH_GAP_SECS: u64 = 11_644_473_600;

/// Converts a FILETIME value (100 ns intervals since 1601) to `SystemTime`.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn filetime_to_system_time(intervals: u64) -> SystemTime {
    let gap = Duration::from_secs(FILETIME_EPOCH_GAP_SECS);
    let since_1601 = Duration::new(intervals / 10_000_000, (intervals % 10_000_000) as u32 * 100);
    match since_1601.checked_sub(gap) {
        Some(after_epoch) => UNIX_EPOCH + after_epoch,
        None => UNIX_EPOCH - (gap - since_1601),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits_are_disjoint_under_the_mask() {
        for kind in [
            LinkKind::File,
            LinkKind::Directory,
            LinkKind::FileSymlink,
            LinkKind::Junction,
        ] {
            assert_eq!(kind.mode_bits() & S_IFMT, kind.mode_bits());
        }
        assert_ne!(LinkKind::Junction.mode_bits(), LinkKind::DirectorySymlink.mode_bits());
    }

    #[test]
    fn filetime_epoch_maps_to_unix_epoch() {
        assert_eq!(
            filetime_to_system_time(FILETIME_EPOCH_GAP_SECS * 10_000_000),
            UNIX_EPOCH
        );
        // one second past the unix epoch
        assert_eq!(
            filetime_to_system_time((FILETIME_EPOCH_GAP_SECS + 1) * 10_000_000),
            UNIX_EPOCH + Duration::from_secs(1)
        );
    }

    #[test]
    fn same_file_needs_a_real_index() {
        let a = LinkStat {
            kind: LinkKind::File,
            mode: S_IFREG,
            nlink: 1,
            size: 0,
            dev: 7,
            ino: 0,
            created: UNIX_EPOCH,
            accessed: UNIX_EPOCH,
            modified: UNIX_EPOCH,
            attributes: 0,
        };
        let b = a.clone();
        assert!(!a.is_same_file(&b));
        let mut c = a.clone();
        c.ino = 42;
        let mut d = c.clone();
        d.dev = 8;
        assert!(c.is_same_file(&c.clone()));
        assert!(!c.is_same_file(&d));
    }
}
