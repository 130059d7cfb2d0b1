//! UTF-16 code-unit plumbing shared by the path algebra, the manifest codec
//! and the Win32 call sites.
//!
//! Everything in this crate that reasons about path *text* does so over
//! `&[u16]` slices with no terminating NUL; conversion to and from the
//! OS-facing forms happens at the edges.

use std::ffi::OsStr;
#[cfg(windows)]
use std::ffi::OsString;

/// Convert ASCII bytes to UTF-16 sequences.
pub(crate) const fn utf16s<const N: usize>(src: &[u8; N]) -> [u16; N] {
    let mut dst = [0u16; N];
    let mut i = 0;
    while i < N {
        dst[i] = src[i] as u16;
        i += 1;
    }
    dst
}

#[cfg(windows)]
pub(crate) fn to_wide(s: &OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    s.encode_wide().collect()
}

#[cfg(windows)]
pub(crate) fn from_wide(w: &[u16]) -> OsString {
    use std::os::windows::ffi::OsStringExt;
    OsString::from_wide(w)
}

// Lossy fallback so the pure modules and their tests build on other hosts.
#[cfg(not(windows))]
pub(crate) fn to_wide(s: &OsStr) -> Vec<u16> {
    s.to_string_lossy().encode_utf16().collect()
}

/// NUL-terminated copy for the `W` entry points.
#[cfg(windows)]
pub(crate) fn to_cwstr(w: &[u16]) -> Vec<u16> {
    let mut v = Vec::with_capacity(w.len() + 1);
    v.extend_from_slice(w);
    v.push(0);
    v
}

/// One-to-one case folding of a single UTF-16 unit. Multi-unit expansions
/// and surrogate pairs fold to themselves, which matches how the filesystem
/// compares names unit by unit.
pub(crate) fn fold(u: u16) -> u16 {
    match char::from_u32(u32::from(u)) {
        Some(c) => {
            let mut lower = c.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(l), None) if (l as u32) < 0x1_0000 => l as u16,
                _ => u,
            }
        }
        None => u,
    }
}

pub(crate) fn eq_ignore_case(a: &[u16], b: &[u16]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| fold(x) == fold(y))
}
