pub(crate) mod c;
mod helpers;
mod scratch;

pub(crate) use helpers::get_file_information;

use std::fs;
use std::io;
use std::mem::size_of;
use std::os::windows::io::AsRawHandle;
use std::path::{Path, PathBuf};
use std::ptr::{addr_of, addr_of_mut, copy_nonoverlapping};
use std::{cmp, slice};

use log::debug;

use crate::wide;
use scratch::ReparseDataScratch;

// This prefix indicates to NTFS that the path is to be treated as a
// non-interpreted path in the virtual file system.
// Ref: <https://learn.microsoft.com/windows-hardware/drivers/kernel/object-manager>
use crate::path::NT_PREFIX as NON_INTERPRETED_PATH_PREFIX;
/// Disables normalization and bypasses MAX_PATH.
/// Ref: <https://learn.microsoft.com/en-us/windows/win32/fileio/maximum-file-path-limitation>
const VERBATIM_PREFIX: [u16; 4] = wide::utf16s(br"\\?\");

const WCHAR_SIZE: u16 = size_of::<u16>() as _;
const UNICODE_NULL_SIZE: u16 = WCHAR_SIZE;

/// Makes `junction` a mount point redirecting to `target`.
///
/// A missing `junction` is created as an empty directory first; an existing
/// directory (or existing junction) is re-targeted in place. `target` does
/// not have to exist: the substitute name is resolved lexically against the
/// current directory and stored as written.
pub fn create_junction(target: &Path, junction: &Path) -> io::Result<()> {
    // We're using low-level APIs to create the junction, and these are more
    // picky about paths. For example, forward slashes cannot be used as a
    // path separator, so we should try to canonicalize the path first.
    let target = helpers::get_full_path(target)?;
    // Strip a Win32 verbatim prefix (\\?\) if present - the NT prefix (\??\)
    // is added below.
    let target = target.strip_prefix(VERBATIM_PREFIX.as_slice()).unwrap_or(&target);
    match fs::symlink_metadata(junction) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(junction)?,
        Err(e) => return Err(e),
        Ok(m) if m.is_dir() || m.file_type().is_symlink() => {}
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "`junction` exists and is not a directory",
            ));
        }
    }
    let file = helpers::open_reparse_point(junction, true)?;
    let mut data = ReparseDataScratch::zeroed();
    let rdb = data.as_mut_ptr();
    let in_buffer_size = build_mount_point_record(target, rdb)?;
    debug!("installing mount point on {:?} ({} bytes)", junction, in_buffer_size);
    helpers::set_reparse_point(file.as_raw_handle(), rdb, u32::from(in_buffer_size))
}

/// Populates a zeroed reparse record with a mount point whose substitute
/// name is `"\??\" + target` and whose print name is empty. Returns the
/// total record size to submit.
fn build_mount_point_record(target: &[u16], rdb: *mut c::REPARSE_DATA_BUFFER) -> io::Result<u16> {
    const MAX_AVAILABLE_PATH_BUFFER: u16 = c::MAXIMUM_REPARSE_DATA_BUFFER_SIZE as u16
        - c::REPARSE_DATA_BUFFER_HEADER_SIZE
        - c::MOUNT_POINT_REPARSE_BUFFER_HEADER_SIZE
        - 2 * UNICODE_NULL_SIZE;

    // SubstituteName = "\??\" + target
    let len = NON_INTERPRETED_PATH_PREFIX.len().saturating_add(target.len());
    let substitute_len_in_bytes = {
        let min_len = cmp::min(len, u16::MAX as usize) as u16;
        // Len without `UNICODE_NULL` at the end
        let substitute_len_in_bytes = min_len.saturating_mul(WCHAR_SIZE);
        // Check if the substitute name may lead to a buffer overflow.
        if substitute_len_in_bytes > MAX_AVAILABLE_PATH_BUFFER {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "`target` is too long"));
        }
        substitute_len_in_bytes
    };

    unsafe {
        // Set the type of reparse point we are creating
        addr_of_mut!((*rdb).ReparseTag).write(c::IO_REPARSE_TAG_MOUNT_POINT);
        addr_of_mut!((*rdb).Reserved).write(0);

        addr_of_mut!((*rdb).ReparseBuffer.SubstituteNameOffset).write(0);
        addr_of_mut!((*rdb).ReparseBuffer.SubstituteNameLength).write(substitute_len_in_bytes);

        // The print name is left empty; it sits right after the substitute
        // name's terminator.
        addr_of_mut!((*rdb).ReparseBuffer.PrintNameOffset)
            .write(substitute_len_in_bytes + UNICODE_NULL_SIZE);
        addr_of_mut!((*rdb).ReparseBuffer.PrintNameLength).write(0);

        // Safe because we checked `MAX_AVAILABLE_PATH_BUFFER`
        let mut path_buffer: *mut u16 = addr_of_mut!((*rdb).ReparseBuffer.PathBuffer).cast();
        copy_nonoverlapping(
            NON_INTERPRETED_PATH_PREFIX.as_ptr(),
            path_buffer,
            NON_INTERPRETED_PATH_PREFIX.len(),
        );
        path_buffer = path_buffer.add(NON_INTERPRETED_PATH_PREFIX.len());
        copy_nonoverlapping(target.as_ptr(), path_buffer, target.len());
        // The scratch is zeroed, so both terminators are already in place.

        // Set the total size of the data buffer: mount-point header plus
        // both names with one terminator each.
        let size = substitute_len_in_bytes
            .wrapping_add(c::MOUNT_POINT_REPARSE_BUFFER_HEADER_SIZE + 2 * UNICODE_NULL_SIZE);
        addr_of_mut!((*rdb).ReparseDataLength).write(size);
        Ok(size.wrapping_add(c::REPARSE_DATA_BUFFER_HEADER_SIZE))
    }
}

/// Removes the mount-point reparse data from `junction`, leaving the empty
/// directory behind.
pub fn remove_junction(junction: &Path) -> io::Result<()> {
    let file = helpers::open_reparse_point(junction, true)?;
    helpers::delete_reparse_point(file.as_raw_handle())
}

/// Whether `path` exists and carries a mount-point reparse record.
pub fn is_junction(path: &Path) -> io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    match read_reparse_target(path) {
        Ok(target) => Ok(target.tag == c::IO_REPARSE_TAG_MOUNT_POINT),
        // a reparse point of some foreign kind is still not a junction
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(false),
        Err(e) => Err(e),
    }
}

/// The target of the junction at `junction`, exactly as stored: with the
/// `\??\` prefix and without a trailing separator.
pub fn junction_target(junction: &Path) -> io::Result<PathBuf> {
    if !junction.exists() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "`junction` does not exist"));
    }
    let target = read_reparse_target(junction)?;
    if target.tag != c::IO_REPARSE_TAG_MOUNT_POINT {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a reparse tag mount point",
        ));
    }
    Ok(PathBuf::from(wide::from_wide(&target.substitute)))
}

/// A reparse point's tag and raw substitute name.
pub(crate) struct ReparseTarget {
    pub tag: u32,
    pub substitute: Vec<u16>,
}

/// Reads the reparse record at `path` and extracts the substitute name of
/// the two link-shaped tags. Fails with `InvalidInput` for tags this crate
/// does not interpret; the OS error comes through untouched when `path` is
/// no reparse point at all.
pub(crate) fn read_reparse_target(path: &Path) -> io::Result<ReparseTarget> {
    let file = helpers::open_reparse_point(path, false)?;
    let mut data = ReparseDataScratch::zeroed();
    let rdb = data.as_mut_ptr();
    helpers::get_reparse_data_point(file.as_raw_handle(), rdb)?;
    // SAFETY: rdb was just filled by the FSCTL
    let rdb = unsafe { data.assume_init() };
    let substitute = match rdb.ReparseTag {
        c::IO_REPARSE_TAG_MOUNT_POINT => {
            let offset = rdb.ReparseBuffer.SubstituteNameOffset / WCHAR_SIZE;
            let len = rdb.ReparseBuffer.SubstituteNameLength / WCHAR_SIZE;
            // SAFETY: offsets come from the filesystem and stay within the
            // maximum-size scratch
            unsafe {
                let buf = rdb.ReparseBuffer.PathBuffer.as_ptr().add(offset as usize);
                slice::from_raw_parts(buf, len as usize).to_vec()
            }
        }
        c::IO_REPARSE_TAG_SYMLINK => {
            // SAFETY: same layout through the header; the symlink body adds
            // a Flags word before the path data
            unsafe {
                let body: *const c::SymbolicLinkReparseBuffer = addr_of!(rdb.ReparseBuffer).cast();
                let offset = (*body).SubstituteNameOffset / WCHAR_SIZE;
                let len = (*body).SubstituteNameLength / WCHAR_SIZE;
                let buf = addr_of!((*body).PathBuffer).cast::<u16>().add(offset as usize);
                slice::from_raw_parts(buf, len as usize).to_vec()
            }
        }
        tag => {
            debug!("uninterpreted reparse tag {tag:#010x} on {path:?}");
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported reparse point type",
            ));
        }
    };
    Ok(ReparseTarget { tag: rdb.ReparseTag, substitute })
}
