//! The metadata probe: does a path exist, what is it, and does anything on
//! the way to it redirect?

use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::internals::{self, c};
use crate::path::{self as wpath, is_sep, strip_nt_prefix, BACKSLASH};
use crate::wide;

/// How far the probe chases links.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeFlags {
    /// Report [`Probe::LinkInPath`] when any intermediate component of the
    /// path is a reparse point, instead of crossing it.
    pub dont_follow_intermediate: bool,
    /// Chase the final component through link targets until something that
    /// is not a link (or does not exist) is reached.
    pub follow_last: bool,
}

/// Outcome of a [`probe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    /// Nothing exists at the path (or a chased link dangles).
    Missing,
    /// The path names something; here are its raw attribute bits.
    Exists { attributes: u32 },
    /// An intermediate component is a reparse point and
    /// [`ProbeFlags::dont_follow_intermediate`] was set.
    LinkInPath,
}

/// Upper bound on link hops while chasing the final component. A chain
/// longer than this reports "too many levels of symbolic links".
const MAX_LINK_HOPS: usize = 32;

pub fn probe<P: AsRef<Path>>(path: P, flags: ProbeFlags) -> io::Result<Probe> {
    probe_wide(&wide::to_wide(path.as_ref().as_os_str()), flags)
}

pub(crate) fn probe_wide(path: &[u16], flags: ProbeFlags) -> io::Result<Probe> {
    if flags.dont_follow_intermediate {
        match ancestor_reparse(path, true)? {
            AncestorReparse::LinkAt(i) => {
                debug!("reparse point at component {i} of {:?}", wide::from_wide(path));
                return Ok(Probe::LinkInPath);
            }
            AncestorReparse::Broken => return Ok(Probe::Missing),
            AncestorReparse::Clean => {}
        }
    }
    let attributes = match attributes(path)? {
        None => return Ok(Probe::Missing),
        Some(a) => a,
    };
    if flags.follow_last {
        return follow_last(path, attributes, flags);
    }
    Ok(Probe::Exists { attributes })
}

/// Probes `rel` below `base` the way the restore driver needs it: the
/// ancestor walk starts at `base` (its own ancestors may legitimately sit
/// behind links), a reparse point anywhere from `base` down to the parent
/// of the leaf reports [`Probe::LinkInPath`], and a broken chain counts as
/// missing.
pub(crate) fn probe_under(base: &[u16], rel: &[u16]) -> io::Result<Probe> {
    match ancestor_reparse_under(base, rel, true)? {
        AncestorReparse::LinkAt(_) => Ok(Probe::LinkInPath),
        AncestorReparse::Broken => Ok(Probe::Missing),
        AncestorReparse::Clean => {
            let joined =
                wpath::absolutize(rel, Some(base), wpath::Simplify::CollapseAndNormalize)?;
            match attributes(&joined)? {
                None => Ok(Probe::Missing),
                Some(attributes) => Ok(Probe::Exists { attributes }),
            }
        }
    }
}

/// Replaces the probe target with its link target until a non-link is
/// reached, re-joining relative targets against the directory of the
/// current target.
fn follow_last(start: &[u16], start_attributes: u32, flags: ProbeFlags) -> io::Result<Probe> {
    let mut current = start.to_vec();
    let mut attributes = start_attributes;
    for _ in 0..MAX_LINK_HOPS {
        if attributes & c::FILE_ATTRIBUTE_REPARSE_POINT == 0 {
            return Ok(Probe::Exists { attributes });
        }
        let target = match internals::read_reparse_target(&to_path(&current)) {
            Ok(t) => strip_nt_prefix(&t.substitute).to_vec(),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                // not a link after all: probe it once more as plain data
                let flags = ProbeFlags { follow_last: false, ..flags };
                return probe_wide(&current, flags);
            }
            Err(e) => return Err(e),
        };
        if target == current {
            return Ok(Probe::Exists { attributes });
        }
        current = if wpath::is_absolute(&target) {
            target
        } else {
            let dir = wpath::parent_of(&current).to_vec();
            wpath::absolutize(&target, Some(&dir), wpath::Simplify::CollapseAndNormalize)?
        };
        attributes = match attributes(&current)? {
            None => return Ok(Probe::Missing),
            Some(a) => a,
        };
    }
    Err(io::Error::new(
        io::ErrorKind::FilesystemLoop,
        "too many levels of symbolic links",
    ))
}

/// Where the prefix walk of [`ancestor_reparse`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AncestorReparse {
    /// Every prefix exists and none of them is a reparse point.
    Clean,
    /// Some prefix does not exist.
    Broken,
    /// The prefix ending at component `i` (0-based) is a reparse point.
    LinkAt(usize),
}

/// Walks the path prefix by prefix and reports the first reparse point on
/// the way. With `exclude_last`, a reparse point at the full path itself
/// does not count.
pub fn ancestor_reparse(path: &[u16], exclude_last: bool) -> io::Result<AncestorReparse> {
    const VERBATIM: [u16; 4] = wide::utf16s(br"\\?\");

    let (mut acc, rest): (Vec<u16>, &[u16]) = if path.starts_with(&VERBATIM) {
        (path[..VERBATIM.len()].to_vec(), &path[VERBATIM.len()..])
    } else {
        // leading separators (the UNC root) stay glued to the accumulator
        let n = path.iter().take_while(|&&u| is_sep(u)).count();
        (path[..n].to_vec(), &path[n..])
    };
    let tokens: Vec<&[u16]> = rest.split(|&u| is_sep(u)).filter(|t| !t.is_empty()).collect();
    let mut next = 0usize;
    if let Some(first) = tokens.first() {
        // a drive token belongs to the root, not to the components we test
        if first.len() == 2
            && first[0] >= b'A' as u16
            && first[0] <= b'z' as u16
            && first[1] == b':' as u16
        {
            acc.extend_from_slice(first);
            next = 1;
            if tokens.len() > 1 {
                acc.push(BACKSLASH);
            }
        }
    }
    if acc.is_empty() {
        // fully relative path: the first component is the first prefix
        match tokens.first() {
            None => return Ok(AncestorReparse::Broken),
            Some(first) => {
                acc.extend_from_slice(first);
                next = 1;
            }
        }
    }
    walk_prefixes(acc, &tokens, next, exclude_last)
}

/// Like [`ancestor_reparse`], but starts the prefix walk at `base` and only
/// tests `base` itself plus the components of the relative path `rel`;
/// whatever sits above `base` is not this probe's business.
pub(crate) fn ancestor_reparse_under(
    base: &[u16],
    rel: &[u16],
    exclude_last: bool,
) -> io::Result<AncestorReparse> {
    let tokens: Vec<&[u16]> = rel.split(|&u| is_sep(u)).filter(|t| !t.is_empty()).collect();
    walk_prefixes(base.to_vec(), &tokens, 0, exclude_last)
}

fn walk_prefixes(
    mut acc: Vec<u16>,
    tokens: &[&[u16]],
    mut next: usize,
    exclude_last: bool,
) -> io::Result<AncestorReparse> {
    let mut component = 0usize;
    loop {
        let at_last = next >= tokens.len();
        match attributes(&acc)? {
            None => return Ok(AncestorReparse::Broken),
            Some(a) if a & c::FILE_ATTRIBUTE_REPARSE_POINT != 0 => {
                if at_last && exclude_last {
                    return Ok(AncestorReparse::Clean);
                }
                return Ok(AncestorReparse::LinkAt(component));
            }
            Some(_) => {}
        }
        if at_last {
            return Ok(AncestorReparse::Clean);
        }
        if !acc.is_empty() && !is_sep(acc[acc.len() - 1]) {
            acc.push(BACKSLASH);
        }
        acc.extend_from_slice(tokens[next]);
        next += 1;
        component += 1;
    }
}

/// Raw attributes of a path, `None` when nothing exists there.
pub(crate) fn attributes(path: &[u16]) -> io::Result<Option<u32>> {
    let cw = wide::to_cwstr(path);
    let attrs = unsafe { c::GetFileAttributesW(cw.as_ptr()) };
    if attrs == c::INVALID_FILE_ATTRIBUTES {
        let e = io::Error::last_os_error();
        if e.kind() == io::ErrorKind::NotFound {
            return Ok(None);
        }
        return Err(e);
    }
    Ok(Some(attrs))
}

fn to_path(w: &[u16]) -> PathBuf {
    PathBuf::from(wide::from_wide(w))
}
