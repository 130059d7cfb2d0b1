use std::fs::{File, OpenOptions};
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr;

use super::c;
use crate::wide;

/// Opens a file or directory handle that sees the reparse point itself
/// instead of whatever it points at.
pub fn open_reparse_point(reparse_point: &Path, rdwr: bool) -> io::Result<File> {
    let access = if rdwr {
        c::GENERIC_READ | c::GENERIC_WRITE
    } else {
        c::GENERIC_READ
    };
    let mut opts = OpenOptions::new();
    opts.access_mode(access)
        .share_mode(0)
        .custom_flags(c::FILE_FLAG_OPEN_REPARSE_POINT | c::FILE_FLAG_BACKUP_SEMANTICS);
    match opts.open(reparse_point) {
        #[cfg(feature = "unstable_admin")]
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            // Obtain privilege in case we don't have it yet
            set_privilege(rdwr)?;
            opts.open(reparse_point)
        }
        other => other,
    }
}

#[cfg(feature = "unstable_admin")]
fn set_privilege(rdwr: bool) -> io::Result<()> {
    use std::mem;

    use scopeguard::ScopeGuard;

    const TOKEN_PRIVILEGES_SIZE: u32 = mem::size_of::<c::TOKEN_PRIVILEGES>() as _;
    unsafe {
        let mut handle: c::HANDLE = ptr::null_mut();
        if c::OpenProcessToken(c::GetCurrentProcess(), c::TOKEN_ADJUST_PRIVILEGES, &mut handle) == 0 {
            return Err(io::Error::last_os_error());
        }
        let handle = scopeguard::guard(handle, |h| {
            c::CloseHandle(h);
        });
        let mut tp: c::TOKEN_PRIVILEGES = mem::zeroed();
        let name = if rdwr { c::SE_RESTORE_NAME } else { c::SE_BACKUP_NAME };
        if c::LookupPrivilegeValueW(ptr::null(), name, &mut tp.Privileges[0].Luid) == 0 {
            return Err(io::Error::last_os_error());
        }
        tp.PrivilegeCount = 1;
        tp.Privileges[0].Attributes = c::SE_PRIVILEGE_ENABLED;
        if c::AdjustTokenPrivileges(
            *handle,
            0,
            &tp,
            TOKEN_PRIVILEGES_SIZE,
            ptr::null_mut(),
            ptr::null_mut(),
        ) == 0
        {
            return Err(io::Error::last_os_error());
        }
        if c::GetLastError() == c::ERROR_NOT_ALL_ASSIGNED {
            return Err(io::Error::from_raw_os_error(c::ERROR_NOT_ALL_ASSIGNED as i32));
        }

        let handle = ScopeGuard::into_inner(handle);
        if c::CloseHandle(handle) == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

pub fn get_reparse_data_point(handle: c::HANDLE, rdb: *mut c::REPARSE_DATA_BUFFER) -> io::Result<()> {
    let mut bytes_returned: u32 = 0;
    if unsafe {
        c::DeviceIoControl(
            handle,
            c::FSCTL_GET_REPARSE_POINT,
            ptr::null_mut(),
            0,
            rdb.cast(),
            c::MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
            &mut bytes_returned,
            ptr::null_mut(),
        )
    } == 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn set_reparse_point(handle: c::HANDLE, rdb: *mut c::REPARSE_DATA_BUFFER, len: u32) -> io::Result<()> {
    let mut bytes_returned: u32 = 0;
    if unsafe {
        c::DeviceIoControl(
            handle,
            c::FSCTL_SET_REPARSE_POINT,
            rdb.cast(),
            len,
            ptr::null_mut(),
            0,
            &mut bytes_returned,
            ptr::null_mut(),
        )
    } == 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// See https://msdn.microsoft.com/en-us/library/windows/desktop/aa364560(v=vs.85).aspx
pub fn delete_reparse_point(handle: c::HANDLE) -> io::Result<()> {
    let mut rgdb: c::REPARSE_GUID_DATA_BUFFER = unsafe { std::mem::zeroed() };
    rgdb.ReparseTag = c::IO_REPARSE_TAG_MOUNT_POINT;
    let mut bytes_returned: u32 = 0;

    if unsafe {
        c::DeviceIoControl(
            handle,
            c::FSCTL_DELETE_REPARSE_POINT,
            (&mut rgdb as *mut c::REPARSE_GUID_DATA_BUFFER).cast(),
            u32::from(c::REPARSE_GUID_DATA_BUFFER_HEADER_SIZE),
            ptr::null_mut(),
            0,
            &mut bytes_returned,
            ptr::null_mut(),
        )
    } == 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Resolves a name against the current directory the way the filesystem
/// itself would, without touching the disk. Returns the result without a
/// terminating NUL.
pub fn get_full_path(target: &Path) -> io::Result<Vec<u16>> {
    let path = wide::to_cwstr(&wide::to_wide(target.as_os_str()));
    // A generous initial size also works around `GetFullPathNameW`
    // returning incorrect size hints for some short paths:
    // https://github.com/dylni/normpath/issues/5
    let mut buf: Vec<u16> = vec![0; 512];
    loop {
        unsafe { c::SetLastError(0) };
        let k = unsafe {
            c::GetFullPathNameW(path.as_ptr(), buf.len() as u32, buf.as_mut_ptr(), ptr::null_mut())
        } as usize;
        if k == 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { c::GetLastError() } == c::ERROR_INSUFFICIENT_BUFFER {
            let n = buf.len().saturating_mul(2).min(u32::MAX as usize);
            buf.resize(n, 0);
        } else if k > buf.len() {
            // k is the required size, terminator included
            buf.resize(k, 0);
        } else {
            buf.truncate(k);
            return Ok(buf);
        }
    }
}

pub fn get_file_information(handle: c::HANDLE) -> io::Result<c::BY_HANDLE_FILE_INFORMATION> {
    let mut info: c::BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
    if unsafe { c::GetFileInformationByHandle(handle, &mut info) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(info)
}
