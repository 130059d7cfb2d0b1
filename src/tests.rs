use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::manifest::{Reader, Record, RecordKind};
use crate::probe::{probe, Probe, ProbeFlags};
use crate::walk::{Walk, WalkOptions};
use crate::{BackupOptions, BlindLinkKind, LinkKind, S_IFJUN, S_IFREG};

// https://docs.microsoft.com/en-us/windows/desktop/debug/system-error-codes
const ERROR_NOT_A_REPARSE_POINT: i32 = 0x1126;

fn create_tempdir() -> TempDir {
    tempfile::Builder::new()
        .prefix("ntlink-test-")
        .tempdir_in("target/debug")
        .unwrap()
}

fn strip_nt(p: &Path) -> PathBuf {
    let s = p.to_str().unwrap();
    PathBuf::from(s.strip_prefix(r"\??\").unwrap_or(s))
}

// Symlink targets are stored verbatim and relative ones resolve against
// the link's directory, so the tests hand the API absolute targets.
fn absolute(p: &Path) -> PathBuf {
    std::env::current_dir().unwrap().join(p)
}

fn write_file(path: &Path, contents: &[u8]) {
    File::create(path).unwrap().write_all(contents).unwrap();
}

fn read_records(bytes: &[u8]) -> Vec<Record> {
    let mut reader = Reader::new(bytes);
    let mut out = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        out.push(record);
    }
    out
}

fn wide_to_path(units: &[u16]) -> PathBuf {
    use std::os::windows::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_wide(units))
}

#[test]
fn junction_create_read_delete() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("target");
    let junction = tmpdir.path().join("junction");
    let file = target.join("file");
    let junction_file = junction.join("file");

    fs::create_dir_all(&target).unwrap();
    write_file(&file, b"foo");

    assert!(!super::is_junction(&junction).unwrap(), "junction not created yet");
    super::create_junction(&target, &junction).unwrap();
    assert!(super::is_junction(&junction).unwrap());
    let stored = super::junction_target(&junction).unwrap();
    assert!(
        stored.to_str().unwrap().starts_with(r"\??\"),
        "junction targets keep the NT prefix: {stored:?}"
    );
    assert_eq!(
        fs::canonicalize(strip_nt(&stored)).unwrap(),
        fs::canonicalize(&target).unwrap()
    );
    assert!(junction_file.exists(), "file should be accessible via the junction");

    super::remove_junction(&junction).unwrap();
    assert!(junction.exists(), "directory should not be deleted");
    assert!(!junction_file.exists(), "file should not be located after junction deleted");
    match super::is_junction(&junction) {
        Err(ref e) if e.raw_os_error() == Some(ERROR_NOT_A_REPARSE_POINT) => {}
        other => panic!("junction reparse data should be gone: {other:?}"),
    }
}

#[test]
fn junction_to_missing_target() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("never-created");
    let junction = tmpdir.path().join("junction");

    super::create_junction(&target, &junction).unwrap();
    let meta = fs::symlink_metadata(&junction).unwrap();
    assert!(meta.file_type().is_symlink(), "dangling junctions still exist as links");
}

#[test]
fn junction_retargets_in_place() {
    let tmpdir = create_tempdir();
    let a = tmpdir.path().join("a");
    let b = tmpdir.path().join("b");
    let junction = tmpdir.path().join("junction");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();

    super::create_junction(&a, &junction).unwrap();
    super::create_junction(&b, &junction).unwrap();
    assert_eq!(
        fs::canonicalize(strip_nt(&super::junction_target(&junction).unwrap())).unwrap(),
        fs::canonicalize(&b).unwrap()
    );
}

#[test]
fn junction_on_a_file_fails() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("target");
    let file = tmpdir.path().join("file");
    fs::create_dir_all(&target).unwrap();
    write_file(&file, b"foo");

    match super::create_junction(&target, &file) {
        Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        other => panic!("a file cannot become a junction: {other:?}"),
    }
}

#[test]
fn remove_junction_of_missing_path() {
    let tmpdir = create_tempdir();
    match super::remove_junction(tmpdir.path().join("nothing-here")) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
        other => panic!("expected NotFound: {other:?}"),
    }
}

#[test]
fn remove_link_takes_the_junction_not_the_target() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("a");
    let junction = tmpdir.path().join("b");
    let canary = target.join("do_not_delete");
    fs::create_dir_all(&target).unwrap();
    write_file(&canary, b"foo");

    super::create_junction(&target, &junction).unwrap();
    super::remove_link(&junction).unwrap();

    assert!(fs::symlink_metadata(&junction).is_err(), "junction entry should be gone");
    assert!(canary.exists(), "target contents must be untouched");
}

#[test]
fn create_link_to_directory() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("a");
    let link = tmpdir.path().join("b");
    fs::create_dir_all(&target).unwrap();
    write_file(&target.join("file"), b"foo");

    super::create_link(absolute(&target), &link).unwrap();
    let st = super::stat_link(&link).unwrap();
    assert!(
        matches!(st.kind, LinkKind::DirectorySymlink | LinkKind::Junction),
        "directory links are symlinks or junctions: {:?}",
        st.kind
    );
    assert_eq!(st.size, 0);
    let read_back = strip_nt(&super::read_link(&link).unwrap());
    assert_eq!(
        fs::canonicalize(read_back).unwrap(),
        fs::canonicalize(&target).unwrap()
    );
    assert!(link.join("file").exists());
}

#[test]
fn create_link_to_file() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("file");
    let link = tmpdir.path().join("alias");
    write_file(&target, b"payload");

    super::create_link(absolute(&target), &link).unwrap();
    let st = super::stat_link(&link).unwrap();
    // a true symlink where the host allows it, a hardlink otherwise
    assert!(
        matches!(st.kind, LinkKind::FileSymlink | LinkKind::File),
        "unexpected kind {:?}",
        st.kind
    );
    let mut contents = String::new();
    File::open(&link).unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "payload");
}

#[test]
fn create_link_preconditions() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("target");
    let link = tmpdir.path().join("link");
    fs::create_dir_all(&target).unwrap();
    fs::create_dir_all(&link).unwrap();

    match super::create_link(&target, &link) {
        Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        other => panic!("existing link name must fail: {other:?}"),
    }

    let missing = tmpdir.path().join("missing");
    let link2 = tmpdir.path().join("link2");
    match super::create_link(&missing, &link2) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
        other => panic!("missing target must fail: {other:?}"),
    }
}

#[test]
fn hard_links_share_the_file_record() {
    let tmpdir = create_tempdir();
    let original = tmpdir.path().join("file");
    let alias = tmpdir.path().join("alias");
    write_file(&original, b"foo");

    assert_eq!(super::stat_link(&original).unwrap().nlink, 1);
    super::hard_link(&original, &alias).unwrap();

    let s1 = super::stat_link(&original).unwrap();
    let s2 = super::stat_link(&alias).unwrap();
    assert_eq!(s1.nlink, 2);
    assert_eq!(s2.nlink, 2);
    assert!(s1.is_same_file(&s2));
    assert_eq!(s1.mode, S_IFREG);

    // removing the original leaves the alias readable
    super::remove_link(&original).unwrap();
    let mut contents = String::new();
    File::open(&alias).unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "foo");
}

#[test]
fn hard_link_refuses_directories() {
    let tmpdir = create_tempdir();
    let dir = tmpdir.path().join("dir");
    fs::create_dir_all(&dir).unwrap();
    match super::hard_link(&dir, tmpdir.path().join("alias")) {
        Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {}
        other => panic!("directory hardlinks are not a thing: {other:?}"),
    }
}

#[test]
fn read_link_on_a_plain_file_is_invalid() {
    let tmpdir = create_tempdir();
    let file = tmpdir.path().join("file");
    write_file(&file, b"foo");
    match super::read_link(&file) {
        Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {}
        other => panic!("expected InvalidInput: {other:?}"),
    }
    match super::read_link(tmpdir.path().join("missing")) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
        other => panic!("expected NotFound: {other:?}"),
    }
}

#[test]
fn stat_kinds_and_modes() {
    let tmpdir = create_tempdir();
    let dir = tmpdir.path().join("dir");
    let file = tmpdir.path().join("file");
    let junction = tmpdir.path().join("junction");
    fs::create_dir_all(&dir).unwrap();
    write_file(&file, b"abc");
    super::create_junction(&dir, &junction).unwrap();

    let s = super::stat_link(&file).unwrap();
    assert_eq!(s.kind, LinkKind::File);
    assert_eq!(s.size, 3);

    let s = super::stat_link(&dir).unwrap();
    assert_eq!(s.kind, LinkKind::Directory);

    let s = super::stat_link(&junction).unwrap();
    assert_eq!(s.kind, LinkKind::Junction);
    assert_eq!(s.mode, S_IFJUN);
    assert_eq!(s.size, 0);
}

#[test]
fn rename_onto_the_same_file_is_a_noop() {
    let tmpdir = create_tempdir();
    let a = tmpdir.path().join("a");
    let b = tmpdir.path().join("b");
    write_file(&a, b"foo");
    super::hard_link(&a, &b).unwrap();

    super::rename(&a, &b).unwrap();
    assert!(a.exists(), "no-op rename must not remove the source");
    assert!(b.exists());
}

#[test]
fn rename_replaces_files_and_checks_kinds() {
    let tmpdir = create_tempdir();
    let a = tmpdir.path().join("a");
    let b = tmpdir.path().join("b");
    write_file(&a, b"new");
    write_file(&b, b"old");

    super::rename(&a, &b).unwrap();
    assert!(!a.exists());
    let mut contents = String::new();
    File::open(&b).unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "new");

    let dir = tmpdir.path().join("dir");
    let file = tmpdir.path().join("file");
    fs::create_dir_all(&dir).unwrap();
    write_file(&file, b"x");
    match super::rename(&dir, &file) {
        Err(ref e) if e.kind() == io::ErrorKind::NotADirectory => {}
        other => panic!("directory onto file: {other:?}"),
    }
    match super::rename(&file, &dir) {
        Err(ref e) if e.kind() == io::ErrorKind::IsADirectory => {}
        other => panic!("file onto directory: {other:?}"),
    }

    match super::rename(tmpdir.path().join("missing"), tmpdir.path().join("anywhere")) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
        other => panic!("expected NotFound: {other:?}"),
    }
}

#[test]
fn chown_is_always_invalid() {
    match super::chown_link(r"C:\anything", 0, 0) {
        Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {}
        other => panic!("chown must always fail: {other:?}"),
    }
}

#[test]
fn probe_reports_links_in_the_path() {
    let tmpdir = create_tempdir();
    let real = tmpdir.path().join("real");
    let sub = real.join("sub");
    let junction = tmpdir.path().join("junction");
    fs::create_dir_all(&sub).unwrap();
    super::create_junction(&real, &junction).unwrap();

    let guarded = ProbeFlags { dont_follow_intermediate: true, follow_last: false };
    assert_eq!(
        probe(junction.join("sub"), guarded).unwrap(),
        Probe::LinkInPath,
        "the junction is an intermediate component here"
    );
    assert!(matches!(
        probe(junction.join("sub"), ProbeFlags::default()).unwrap(),
        Probe::Exists { .. }
    ));
    // the last component is excluded from the intermediate check
    assert!(matches!(probe(&junction, guarded).unwrap(), Probe::Exists { .. }));
}

#[test]
fn probe_follows_the_last_link() {
    let tmpdir = create_tempdir();
    let real = tmpdir.path().join("real");
    let junction = tmpdir.path().join("junction");
    let dangling = tmpdir.path().join("dangling");
    fs::create_dir_all(&real).unwrap();
    super::create_junction(&real, &junction).unwrap();
    super::create_junction(tmpdir.path().join("nowhere"), &dangling).unwrap();

    let follow = ProbeFlags { dont_follow_intermediate: false, follow_last: true };
    match probe(&junction, follow).unwrap() {
        Probe::Exists { attributes } => {
            assert_eq!(
                attributes & crate::internals::c::FILE_ATTRIBUTE_REPARSE_POINT,
                0,
                "the resolved target is not a reparse point"
            );
        }
        other => panic!("junction target exists: {other:?}"),
    }
    assert_eq!(probe(&dangling, follow).unwrap(), Probe::Missing);
}

#[test]
fn walk_yields_parents_before_children() {
    let tmpdir = create_tempdir();
    let root = tmpdir.path().join("root");
    fs::create_dir_all(root.join("b").join("c")).unwrap();
    write_file(&root.join("d"), b"x");

    let levels: Vec<_> = Walk::new(&root, WalkOptions { depth_first: true, follow_symlinks: false })
        .collect::<io::Result<Vec<_>>>()
        .unwrap();
    let dirs: Vec<_> = levels.iter().map(|l| l.dir.clone()).collect();
    assert_eq!(dirs, vec![root.clone(), root.join("b"), root.join("b").join("c")]);
    assert_eq!(levels[0].depth, 0);
    assert_eq!(levels[1].depth, 1);
    assert_eq!(levels[2].depth, 2);

    let mut names: Vec<_> = levels[0].entries.iter().map(|e| e.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["b", "d"]);
}

#[test]
fn walk_without_depth_first_stops_at_one_level() {
    let tmpdir = create_tempdir();
    let root = tmpdir.path().join("root");
    fs::create_dir_all(root.join("b").join("c")).unwrap();

    let levels: Vec<_> = Walk::new(&root, WalkOptions::default())
        .collect::<io::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].dir, root);
}

#[test]
fn walk_honors_the_symlink_flag() {
    let tmpdir = create_tempdir();
    let root = tmpdir.path().join("root");
    let outside = tmpdir.path().join("outside");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(&outside).unwrap();
    write_file(&outside.join("file"), b"x");
    let door = root.join("door");
    super::create_link(absolute(&outside), &door).unwrap();

    let visited: Vec<_> =
        Walk::new(&root, WalkOptions { depth_first: true, follow_symlinks: false })
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
            .into_iter()
            .map(|level| level.dir)
            .collect();
    match super::stat_link(&door).unwrap().kind {
        LinkKind::DirectorySymlink => {
            assert!(!visited.contains(&door), "symlink directories are not descended into");
        }
        LinkKind::Junction => {
            assert!(visited.contains(&door), "junction children are still entered");
        }
        other => panic!("unexpected link kind {other:?}"),
    }
}

#[test]
fn walk_of_a_missing_root_yields_nothing() {
    let tmpdir = create_tempdir();
    let mut walk = Walk::new(tmpdir.path().join("missing"), WalkOptions::default());
    assert!(walk.next().is_none());
}

#[test]
fn backup_then_restore_reinstates_junctions() {
    let tmpdir = create_tempdir();
    let base = tmpdir.path();
    let y = base.join("y");
    let x = base.join("x");
    let sub = base.join("sub");
    let z = sub.join("z");
    fs::create_dir_all(&y).unwrap();
    fs::create_dir_all(&sub).unwrap();
    write_file(&y.join("file"), b"inside");
    super::create_junction(&y, &x).unwrap();
    super::create_junction(&y, &z).unwrap();

    let mut bytes = Vec::new();
    let opts = BackupOptions { dry_run: false, recursive: true, relative_junctions: false };
    super::backup_links(base, base, &mut bytes, &opts).unwrap();

    // the links are gone, collapsed into the manifest
    assert!(fs::symlink_metadata(&x).is_err());
    assert!(fs::symlink_metadata(&z).is_err());
    let records = read_records(&bytes);
    assert_eq!(records.len(), 2);
    let mut links: Vec<_> = records.iter().map(|r| wide_to_path(&r.link)).collect();
    links.sort();
    assert_eq!(links, vec![PathBuf::from(r"sub\z"), PathBuf::from("x")]);
    for record in &records {
        assert_eq!(record.kind, RecordKind::Junction);
        assert!(crate::path::is_absolute(&record.target));
        assert!(wide_to_path(&record.target).ends_with("y"));
    }

    // the tree is now its own link-less mirror; replay the manifest on it
    super::restore_links(base, &mut &bytes[..], false).unwrap();
    let st = super::stat_link(&x).unwrap();
    assert!(matches!(st.kind, LinkKind::Junction | LinkKind::DirectorySymlink));
    assert!(x.join("file").exists(), "the junction leads back into y");
    assert!(z.join("file").exists());
}

#[test]
fn backup_dry_run_leaves_links_alone() {
    let tmpdir = create_tempdir();
    let base = tmpdir.path();
    let y = base.join("y");
    let x = base.join("x");
    fs::create_dir_all(&y).unwrap();
    super::create_junction(&y, &x).unwrap();

    let mut bytes = Vec::new();
    let opts = BackupOptions { dry_run: true, recursive: true, relative_junctions: false };
    super::backup_links(base, base, &mut bytes, &opts).unwrap();

    assert!(super::is_junction(&x).unwrap(), "dry run must not remove links");
    assert_eq!(read_records(&bytes).len(), 1);
}

#[test]
fn relative_junction_backups_relocate() {
    let tmpdir = create_tempdir();
    let base = tmpdir.path().join("tree");
    let y = base.join("y");
    let x = base.join("x");
    fs::create_dir_all(&y).unwrap();
    super::create_junction(&y, &x).unwrap();

    let mut bytes = Vec::new();
    let opts = BackupOptions { dry_run: false, recursive: true, relative_junctions: true };
    super::backup_links(&base, &base, &mut bytes, &opts).unwrap();

    let records = read_records(&bytes);
    assert_eq!(records.len(), 1);
    assert!(
        !crate::path::is_absolute(&records[0].target),
        "the junction target should have been relativized"
    );

    // restore into a different mirror of the tree
    let mirror = tmpdir.path().join("mirror");
    fs::create_dir_all(mirror.join("y")).unwrap();
    write_file(&mirror.join("y").join("file"), b"hello");
    super::restore_links(&mirror, &mut &bytes[..], false).unwrap();
    assert!(
        mirror.join("x").join("file").exists(),
        "the relocated junction points into the mirror's own y"
    );
}

#[test]
fn restore_skips_occupied_link_names() {
    let tmpdir = create_tempdir();
    let base = tmpdir.path();
    let y = base.join("y");
    let x = base.join("x");
    fs::create_dir_all(&y).unwrap();
    super::create_junction(&y, &x).unwrap();

    let mut bytes = Vec::new();
    let opts = BackupOptions { dry_run: false, recursive: true, relative_junctions: false };
    super::backup_links(base, base, &mut bytes, &opts).unwrap();

    // something else claimed the link name in the meantime
    fs::create_dir_all(&x).unwrap();
    write_file(&x.join("squatter"), b"here first");

    super::restore_links(base, &mut &bytes[..], false).unwrap();
    assert!(x.join("squatter").exists(), "existing paths are not overwritten");
    assert_eq!(super::stat_link(&x).unwrap().kind, LinkKind::Directory);
}

#[test]
fn restore_rejects_a_broken_manifest() {
    let tmpdir = create_tempdir();
    let garbage: Vec<u8> = "not a manifest\n".encode_utf16().flat_map(u16::to_ne_bytes).collect();
    match super::restore_links(tmpdir.path(), &mut &garbage[..], false) {
        Err(ref e) if e.kind() == io::ErrorKind::InvalidData => {}
        other => panic!("structural errors must stop the restore: {other:?}"),
    }
}

#[test]
fn blind_link_resolves_junction_targets_against_the_base() {
    let tmpdir = create_tempdir();
    let base = tmpdir.path();
    let y = base.join("y");
    fs::create_dir_all(&y).unwrap();
    write_file(&y.join("file"), b"x");

    let link = base.join("j");
    super::blind_link("y", &link, BlindLinkKind::Junction, base).unwrap();
    assert!(link.join("file").exists());
}

#[test]
fn create_dir_all_through_junctions() {
    let tmpdir = create_tempdir();
    let target = tmpdir.path().join("target");
    let junction = tmpdir.path().join("junction");
    let b = junction.join("a/b");

    fs::create_dir_all(&target).unwrap();
    super::create_junction(&target, &junction).unwrap();
    fs::create_dir_all(&b).unwrap();
    // the junction itself is not a directory, but `is_dir()` on a Path
    // follows links
    assert!(junction.is_dir());
    assert!(b.exists());
}

#[test]
fn remove_dir_all_does_not_cross_junctions() {
    // test we do not recursively delete through a junction but only dirs.
    let tmpdir = create_tempdir();
    let link = tmpdir.path().join("link");
    let dir = tmpdir.path().join("dir");
    let canary = dir.join("do_not_delete");
    fs::create_dir_all(&dir).unwrap();
    write_file(&canary, b"foo");
    super::create_junction(&dir, &link).unwrap();
    fs::remove_dir_all(&link).unwrap();

    assert!(!link.is_dir());
    assert!(canary.exists());
}
