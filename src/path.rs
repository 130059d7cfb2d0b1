//! Path algebra over UTF-16 code units.
//!
//! Windows path text is kept as `&[u16]` throughout: that is the form the
//! filesystem speaks, it round-trips unpaired surrogates, and it keeps this
//! module free of any OS calls so the algebra can be tested anywhere.
//!
//! Both `\` and `/` are accepted as separators everywhere; [`simplify`] can
//! normalize to backslashes on request.

use std::io;

use crate::wide::{eq_ignore_case, fold, utf16s};

pub(crate) const BACKSLASH: u16 = b'\\' as u16;
pub(crate) const SLASH: u16 = b'/' as u16;
const DOT: u16 = b'.' as u16;
const COLON: u16 = b':' as u16;

#[inline]
pub(crate) fn is_sep(u: u16) -> bool {
    u == BACKSLASH || u == SLASH
}

/// How much cleanup [`absolutize`] applies to the joined result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Simplify {
    /// Return the raw join.
    No,
    /// Collapse `\\`, `\.\` and `name\..\` segments.
    Collapse,
    /// [`Simplify::Collapse`] plus `/` → `\` normalization.
    CollapseAndNormalize,
}

/// Decides whether the name is an absolute path.
///
/// A name is absolute iff it starts with a `\\server\share` UNC prefix
/// (backslashes only) or a `X:\` / `X:/` drive root. The drive letter is
/// accepted from the loose ASCII range `A..=z`, which also admits the six
/// punctuation code points between `Z` and `a`; the filesystem never hands
/// out such drives, and keeping the loose range preserves compatibility
/// with paths that were built by hand.
pub fn is_absolute(name: &[u16]) -> bool {
    if name.len() >= 2 && name[0] == BACKSLASH && name[1] == BACKSLASH {
        return true;
    }
    if name.len() >= 3
        && name[0] >= b'A' as u16
        && name[0] <= b'z' as u16
        && name[1] == COLON
        && is_sep(name[2])
    {
        return true;
    }
    false
}

/// Collapses `\\` doublets, `\.\` segments and `name\..\` segments of an
/// absolute name, optionally normalizing `/` to `\`.
///
/// The scan always restarts from index 2 after a mutation so the `X:\`
/// root is never touched, and `..` at the drive root is eliminated rather
/// than hoisted (`C:\..\x` collapses to `C:\x`, matching how the
/// filesystem itself treats `C:\..`).
pub fn simplify(absolute: &[u16], normalize: bool) -> Vec<u16> {
    let mut tmp: Vec<u16> = absolute.to_vec();
    if tmp.len() > 3 {
        let root_sep = tmp[2];

        // "\\" -> "\"
        let mut i = 2;
        while i + 1 < tmp.len() {
            if is_sep(tmp[i]) && is_sep(tmp[i + 1]) {
                tmp.remove(i);
                i = 2;
            } else {
                i += 1;
            }
        }

        // "\.\" -> "\", also a trailing "\."
        i = 2;
        while i + 1 < tmp.len() {
            if is_sep(tmp[i])
                && tmp[i + 1] == DOT
                && (i + 2 == tmp.len() || is_sep(tmp[i + 2]))
            {
                tmp.drain(i..i + 2);
                i = 2;
            } else {
                i += 1;
            }
        }

        // "\name\..\" -> "\", also a trailing "\name\..";
        // ".." directly under the drive root disappears.
        i = 2;
        while i + 2 < tmp.len() {
            if is_sep(tmp[i])
                && tmp[i + 1] == DOT
                && tmp[i + 2] == DOT
                && (i + 3 == tmp.len() || is_sep(tmp[i + 3]))
            {
                let mut k = if i > 3 { i - 1 } else { 3 };
                while k > 2 && !is_sep(tmp[k]) {
                    k -= 1;
                }
                let end = (k + (i + 3 - k)).min(tmp.len());
                tmp.drain(k..end);
                i = 2;
            } else {
                i += 1;
            }
        }

        // everything after "X:" collapsed away: restore the root separator
        if tmp.len() == 2 {
            tmp.push(root_sep);
        }
    }
    if normalize {
        for u in &mut tmp {
            if *u == SLASH {
                *u = BACKSLASH;
            }
        }
    }
    tmp
}

/// Makes an absolute name out of a (possibly relative) one.
///
/// An already-absolute `name` is returned as-is (modulo simplification);
/// otherwise it is joined onto `base`, or onto the process current
/// directory when `base` is `None`.
pub fn absolutize(
    name: &[u16],
    base: Option<&[u16]>,
    mode: Simplify,
) -> io::Result<Vec<u16>> {
    let joined = if is_absolute(name) {
        name.to_vec()
    } else {
        let mut b = match base {
            Some(b) => b.to_vec(),
            None => current_dir_wide()?,
        };
        if !b.is_empty() && !is_sep(b[b.len() - 1]) {
            b.push(BACKSLASH);
        }
        b.extend_from_slice(name);
        b
    };
    Ok(match mode {
        Simplify::No => joined,
        Simplify::Collapse => simplify(&joined, false),
        Simplify::CollapseAndNormalize => simplify(&joined, true),
    })
}

/// Makes a relative name out of an absolute one, against an absolute `base`
/// on the same drive.
///
/// Three shapes: a child of `base` loses the `base` prefix, `base` itself
/// becomes the empty string, and anything else goes up through the longest
/// common ancestor with one `..\` per remaining `base` segment. The result
/// never carries a leading separator. Drive letters are compared
/// case-insensitively; different drives fail with `InvalidInput`.
pub fn relativize(absolute: &[u16], base: &[u16]) -> io::Result<Vec<u16>> {
    if !is_absolute(absolute) || !is_absolute(base) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "both names must be absolute",
        ));
    }
    let s_base = simplify(base, true);
    let s_abs = simplify(absolute, true);
    if fold(s_abs[0]) != fold(s_base[0]) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "names are on different drives",
        ));
    }
    let blen = s_base.len();
    let alen = s_abs.len();
    let mut out: Vec<u16> = Vec::new();
    if alen >= blen && eq_ignore_case(&s_abs[..blen], &s_base) {
        // child of base, or base itself
        if alen > blen && is_sep(s_abs[blen]) {
            out.extend_from_slice(&s_abs[blen + 1..]);
        } else {
            out.extend_from_slice(&s_abs[blen..]);
        }
    } else {
        let lim = blen.min(alen);
        let mut i = 0;
        while i < lim && fold(s_abs[i]) == fold(s_base[i]) {
            i += 1;
        }
        while i > 2 && !is_sep(s_base[i]) {
            i -= 1;
        }
        // i now ends the common ancestor, at a separator boundary
        let mut j = i + 1;
        while j <= blen {
            if j == blen || is_sep(s_base[j]) {
                out.extend_from_slice(&utf16s(b"..\\"));
            }
            j += 1;
        }
        out.extend_from_slice(&s_abs[i + 1..]);
    }
    Ok(out)
}

fn current_dir_wide() -> io::Result<Vec<u16>> {
    let cwd = std::env::current_dir()?;
    Ok(crate::wide::to_wide(cwd.as_os_str()))
}

/// The `\??\` prefix naming the NT object namespace; junction substitute
/// names carry it on disk.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) const NT_PREFIX: [u16; 4] = utf16s(br"\??\");

/// Drops a leading `\??\` when present.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn strip_nt_prefix(w: &[u16]) -> &[u16] {
    w.strip_prefix(NT_PREFIX.as_slice()).unwrap_or(w)
}

/// Everything before the final separator; empty when there is none.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parent_of(w: &[u16]) -> &[u16] {
    match w.iter().rposition(|&u| is_sep(u)) {
        Some(p) => &w[..p],
        None => &w[..0],
    }
}
