//! A lazy directory walker that yields one directory's worth of entries at
//! a time.
//!
//! Enumeration runs in two passes per directory: a counting pass sizes the
//! allocation, a filling pass populates it, and a mismatch between the two
//! (the directory mutated underneath) retries from scratch. `.` and `..`
//! never appear in the results, and entries come back in the order the
//! filesystem enumerates them.

use std::ffi::OsString;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use crate::internals::c;
use crate::wide;

#[derive(Clone, Copy, Debug, Default)]
pub struct WalkOptions {
    /// Keep descending into subdirectories, yielding a parent before any of
    /// its children. When off, only the root level is yielded and callers
    /// re-enter per child.
    pub depth_first: bool,
    /// Descend into directories that are symlink reparse points. Junction
    /// children are still entered; callers that must not cross them (like
    /// the backup driver) dispose of them before descending.
    pub follow_symlinks: bool,
}

/// One directory entry as the enumeration reported it.
#[derive(Clone, Debug)]
pub struct Entry {
    pub name: OsString,
    pub attributes: u32,
    /// The reparse tag, meaningful only when [`Entry::is_reparse`] holds.
    pub reparse_tag: u32,
    pub size: u64,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.attributes & c::FILE_ATTRIBUTE_DIRECTORY != 0
    }

    pub fn is_reparse(&self) -> bool {
        self.attributes & c::FILE_ATTRIBUTE_REPARSE_POINT != 0
    }

    pub fn is_symlink(&self) -> bool {
        self.is_reparse() && self.reparse_tag == c::IO_REPARSE_TAG_SYMLINK
    }

    fn from_find_data(data: &c::WIN32_FIND_DATAW) -> Entry {
        let len = data.cFileName.iter().position(|&u| u == 0).unwrap_or(data.cFileName.len());
        Entry {
            name: wide::from_wide(&data.cFileName[..len]),
            attributes: data.dwFileAttributes,
            reparse_tag: data.dwReserved0,
            size: (u64::from(data.nFileSizeHigh) << 32) | u64::from(data.nFileSizeLow),
        }
    }
}

/// One step of the walk: a directory, how deep it sits under the root, and
/// its entries.
#[derive(Clone, Debug)]
pub struct WalkedDir {
    pub dir: PathBuf,
    pub depth: usize,
    pub entries: Vec<Entry>,
}

/// Iterator over [`WalkedDir`] levels. Directories that vanish between
/// being scheduled and being read silently end their branch; every other
/// enumeration failure surfaces as an error item.
pub struct Walk {
    opts: WalkOptions,
    pending: Vec<(PathBuf, usize)>,
}

impl Walk {
    pub fn new<P: Into<PathBuf>>(root: P, opts: WalkOptions) -> Self {
        Walk { opts, pending: vec![(root.into(), 0)] }
    }
}

impl Iterator for Walk {
    type Item = io::Result<WalkedDir>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (dir, depth) = self.pending.pop()?;
            let entries = match list_dir(&dir) {
                Ok(Some(entries)) => entries,
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            };
            if self.opts.depth_first {
                // reversed so children pop back off in enumeration order
                for entry in entries.iter().rev() {
                    if !entry.is_dir() {
                        continue;
                    }
                    if !self.opts.follow_symlinks && entry.is_symlink() {
                        continue;
                    }
                    self.pending.push((dir.join(&entry.name), depth + 1));
                }
            }
            return Some(Ok(WalkedDir { dir, depth, entries }));
        }
    }
}

/// Lists a directory, `Ok(None)` when it no longer exists.
fn list_dir(dir: &Path) -> io::Result<Option<Vec<Entry>>> {
    let pattern = wide::to_cwstr(&wide::to_wide(dir.join("*").as_os_str()));
    loop {
        let expected = match count_pass(&pattern)? {
            None => return Ok(None),
            Some(n) => n,
        };
        match fill_pass(&pattern, expected)? {
            None => return Ok(None),
            Some(Fill::Done(entries)) => return Ok(Some(entries)),
            // the set changed between the passes; take both again
            Some(Fill::Raced) => continue,
        }
    }
}

enum Fill {
    Done(Vec<Entry>),
    Raced,
}

fn count_pass(pattern: &[u16]) -> io::Result<Option<usize>> {
    let mut n = 0usize;
    let outcome = enumerate(pattern, |_| {
        n += 1;
        true
    })?;
    Ok(outcome.map(|()| n))
}

fn fill_pass(pattern: &[u16], expected: usize) -> io::Result<Option<Fill>> {
    let mut entries = Vec::with_capacity(expected);
    let mut raced = false;
    let outcome = enumerate(pattern, |data| {
        if entries.len() == expected {
            raced = true;
            return false;
        }
        entries.push(Entry::from_find_data(data));
        true
    })?;
    Ok(outcome.map(|()| if raced { Fill::Raced } else { Fill::Done(entries) }))
}

/// Runs one `FindFirstFileW` enumeration, handing every non-dot entry to
/// `f` until it returns `false`. `Ok(None)` when the path itself is gone.
fn enumerate<F>(pattern: &[u16], mut f: F) -> io::Result<Option<()>>
where
    F: FnMut(&c::WIN32_FIND_DATAW) -> bool,
{
    let mut data: c::WIN32_FIND_DATAW = unsafe { mem::zeroed() };
    let handle = unsafe { c::FindFirstFileW(pattern.as_ptr(), &mut data) };
    if handle == c::INVALID_HANDLE_VALUE {
        let e = io::Error::last_os_error();
        return match e.raw_os_error().map(|code| code as u32) {
            // an existing directory with no matches
            Some(c::ERROR_FILE_NOT_FOUND) => Ok(Some(())),
            // the directory itself is gone
            Some(c::ERROR_PATH_NOT_FOUND) => Ok(None),
            _ => Err(e),
        };
    }
    let handle = scopeguard::guard(handle, |h| unsafe {
        c::FindClose(h);
    });
    loop {
        if !is_dot(&data) && !f(&data) {
            return Ok(Some(()));
        }
        if unsafe { c::FindNextFileW(*handle, &mut data) } == 0 {
            let e = io::Error::last_os_error();
            if e.raw_os_error() == Some(c::ERROR_NO_MORE_FILES as i32) {
                return Ok(Some(()));
            }
            return Err(e);
        }
    }
}

fn is_dot(data: &c::WIN32_FIND_DATAW) -> bool {
    let dot = b'.' as u16;
    data.cFileName[0] == dot
        && (data.cFileName[1] == 0 || (data.cFileName[1] == dot && data.cFileName[2] == 0))
}
