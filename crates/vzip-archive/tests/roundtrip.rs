//! Integration tests: archive a real directory tree to a container file,
//! extract it elsewhere, and compare.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vzip_archive::{
    archive_to_path, create_container, extract_from_path, open_container, ArchiveError,
    ArchiveOptions, ContainerError, ContainerReader, ContainerWriter, ExtractOptions,
};
use vzip_crypto::{CryptoError, Key, KEY_SIZE};

fn key() -> Key {
    Key::from_bytes([0x5Au8; KEY_SIZE])
}

fn write_file(path: &Path, content: &[u8], mode: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Dir(u32),
    File(Vec<u8>, u32),
}

/// Relative path → node, for comparing whole trees.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Node> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Node>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let meta = std::fs::metadata(&path).unwrap();
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            let mode = meta.permissions().mode() & 0o777;
            if meta.is_dir() {
                out.insert(rel, Node::Dir(mode));
                visit(root, &path, out);
            } else {
                out.insert(rel, Node::File(std::fs::read(&path).unwrap(), mode));
            }
        }
    }
    let mut out = BTreeMap::new();
    visit(root, root, &mut out);
    out
}

/// Rewrite a container, letting `edit` change entries' payloads on the way.
fn rewrite_container(path: &Path, edit: impl Fn(&str, &mut Vec<u8>)) {
    let mut reader = open_container(path).unwrap();
    let entries: Vec<_> = (0..reader.len())
        .map(|i| reader.read_entry(i).unwrap())
        .collect();
    drop(reader);

    let mut writer = create_container(path).unwrap();
    for mut entry in entries {
        if entry.is_dir {
            writer.add_directory(&entry.path, entry.mode).unwrap();
        } else {
            edit(&entry.path.to_string(), &mut entry.payload);
            writer
                .new_entry(&entry.path, entry.mode)
                .unwrap()
                .write_all(&entry.payload)
                .unwrap();
        }
    }
    writer.close().unwrap();
}

#[test]
fn scenario_b_small_tree() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("project");
    write_file(&src.join("a.txt"), b"x", 0o644);
    write_file(&src.join("sub/b.txt"), b"y", 0o644);

    let container = tmp.path().join("project.zip");
    archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();

    let dest = tmp.path().join("restore");
    let report =
        extract_from_path(&container, &dest, &key(), &ExtractOptions::default(), None).unwrap();

    assert_eq!(report.files, 2);
    assert_eq!(std::fs::read(dest.join("project/a.txt")).unwrap(), b"x");
    assert_eq!(std::fs::read(dest.join("project/sub/b.txt")).unwrap(), b"y");
}

#[test]
fn tree_fidelity_paths_contents_and_modes() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("tree");
    write_file(&src.join("readme.md"), b"# hello\n", 0o644);
    write_file(&src.join("bin/run.sh"), b"#!/bin/sh\necho hi\n", 0o755);
    write_file(&src.join("secrets/key.pem"), &[0xAB; 3000], 0o600);
    write_file(&src.join("zero.bin"), b"", 0o640);
    std::fs::create_dir_all(src.join("empty/nested")).unwrap();
    std::fs::set_permissions(src.join("secrets"), std::fs::Permissions::from_mode(0o700)).unwrap();
    std::fs::set_permissions(src.join("empty"), std::fs::Permissions::from_mode(0o750)).unwrap();

    let container = tmp.path().join("tree.zip");
    let archived =
        archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();
    assert_eq!(archived.files, 4);

    let dest = tmp.path().join("out");
    extract_from_path(&container, &dest, &key(), &ExtractOptions::default(), None).unwrap();

    assert_eq!(snapshot(&src), snapshot(&dest.join("tree")));
}

#[test]
fn scenario_d_empty_file() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("empty.txt");
    write_file(&src, b"", 0o644);

    let container = tmp.path().join("empty.zip");
    archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();

    let dest = tmp.path().join("out");
    extract_from_path(&container, &dest, &key(), &ExtractOptions::default(), None).unwrap();

    let meta = std::fs::metadata(dest.join("empty.txt")).unwrap();
    assert!(meta.is_file());
    assert_eq!(meta.len(), 0);
}

#[test]
fn container_holds_no_plaintext() {
    let tmp = TempDir::new().unwrap();
    let marker = b"UNMISTAKABLE-PLAINTEXT-MARKER-0123456789";
    let src = tmp.path().join("s");
    write_file(&src.join("f.txt"), marker, 0o644);

    let container = tmp.path().join("s.zip");
    archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();

    let raw = std::fs::read(&container).unwrap();
    assert!(!raw.windows(marker.len()).any(|w| w == marker));
    // Names stay in the clear
    assert!(raw.windows(7).any(|w| w == b"s/f.txt"));
}

#[test]
fn wrong_key_rejects_every_file() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("t");
    write_file(&src.join("one"), b"1", 0o644);
    write_file(&src.join("two"), b"2", 0o644);
    write_file(&src.join("d/three"), b"3", 0o644);

    let container = tmp.path().join("t.zip");
    archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();

    let wrong = Key::from_bytes([0x00; KEY_SIZE]);
    let report = extract_from_path(
        &container,
        &tmp.path().join("out"),
        &wrong,
        &ExtractOptions { keep_going: true },
        None,
    )
    .unwrap();

    assert_eq!(report.files, 0);
    assert_eq!(report.failures.len(), 3);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, CryptoError::AuthenticationFailed)));

    let err = extract_from_path(
        &container,
        &tmp.path().join("out2"),
        &wrong,
        &ExtractOptions::default(),
        None,
    )
    .unwrap_err();
    assert!(err.is_authentication_failure());
}

#[test]
fn scenario_c_corrupted_entry() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("c");
    write_file(&src.join("a.txt"), b"first", 0o644);
    write_file(&src.join("b.txt"), b"second", 0o644);
    write_file(&src.join("c.txt"), b"third", 0o644);

    let container = tmp.path().join("c.zip");
    archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();
    rewrite_container(&container, |name, payload| {
        if name == "c/b.txt" {
            let last = payload.len() - 1;
            payload[last] ^= 0x01;
        }
    });

    // Default: abort at the corrupted entry, keep what was already written
    let aborted = tmp.path().join("aborted");
    let err = extract_from_path(&container, &aborted, &key(), &ExtractOptions::default(), None)
        .unwrap_err();
    assert!(err.is_authentication_failure());
    assert!(matches!(&err, ArchiveError::Entry { entry, .. } if entry == "c/b.txt"));
    assert_eq!(std::fs::read(aborted.join("c/a.txt")).unwrap(), b"first");
    assert!(!aborted.join("c/c.txt").exists());

    // keep_going: only the corrupted entry is missing
    let partial = tmp.path().join("partial");
    let report = extract_from_path(
        &container,
        &partial,
        &key(),
        &ExtractOptions { keep_going: true },
        None,
    )
    .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(std::fs::read(partial.join("c/a.txt")).unwrap(), b"first");
    assert_eq!(std::fs::read(partial.join("c/c.txt")).unwrap(), b"third");
    assert!(!partial.join("c/b.txt").exists());
}

#[test]
fn parallel_archive_extracts_identically() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("bulk");
    for i in 0..50 {
        write_file(
            &src.join(format!("dir{}/file{i:03}.dat", i % 5)),
            format!("payload number {i}").repeat(i + 1).as_bytes(),
            0o644,
        );
    }

    let container = tmp.path().join("bulk.zip");
    let report = archive_to_path(
        &src,
        &container,
        &key(),
        &ArchiveOptions { encrypt_batch: 16 },
        None,
    )
    .unwrap();
    assert_eq!(report.files, 50);

    let dest = tmp.path().join("out");
    extract_from_path(&container, &dest, &key(), &ExtractOptions::default(), None).unwrap();
    assert_eq!(snapshot(&src), snapshot(&dest.join("bulk")));
}

#[test]
fn failed_archive_leaves_no_container() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("broken");
    write_file(&src.join("ok.txt"), b"fine", 0o644);
    std::os::unix::fs::symlink(tmp.path().join("nowhere"), src.join("dangling")).unwrap();

    let out_dir = tmp.path().join("out");
    std::fs::create_dir(&out_dir).unwrap();
    let container = out_dir.join("broken.zip");

    let err = archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::SourceNotFound(_)));
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
}

#[test]
fn missing_source_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = archive_to_path(
        &tmp.path().join("absent"),
        &tmp.path().join("absent.zip"),
        &key(),
        &ArchiveOptions::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ArchiveError::SourceNotFound(_)));
}

#[test]
fn garbage_container_is_open_error() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("bogus.zip");
    std::fs::write(&bogus, b"this is not a container").unwrap();

    let err = extract_from_path(
        &bogus,
        &tmp.path().join("out"),
        &key(),
        &ExtractOptions::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ArchiveError::Container(ContainerError::Open(_))));
}

#[test]
fn overwrites_existing_files_on_extract() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("w");
    write_file(&src.join("f"), b"new", 0o644);

    let container = tmp.path().join("w.zip");
    archive_to_path(&src, &container, &key(), &ArchiveOptions::default(), None).unwrap();

    let dest = tmp.path().join("out");
    write_file(&dest.join("w/f"), b"old and longer content", 0o644);
    extract_from_path(&container, &dest, &key(), &ExtractOptions::default(), None).unwrap();

    assert_eq!(std::fs::read(dest.join("w/f")).unwrap(), b"new");
}

#[test]
fn symlinked_source_keeps_the_given_name() {
    let tmp = TempDir::new().unwrap();
    let real = tmp.path().join("real_dir");
    write_file(&real.join("inner.txt"), b"inside", 0o644);
    let link = tmp.path().join("given_name");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let container = tmp.path().join("given_name.zip");
    archive_to_path(&link, &container, &key(), &ArchiveOptions::default(), None).unwrap();

    let mut reader = open_container(&container).unwrap();
    let root = reader.read_entry(0).unwrap();
    assert!(root.is_dir);
    assert_eq!(root.path.to_string(), "given_name");

    let dest = tmp.path().join("out");
    extract_from_path(&container, &dest, &key(), &ExtractOptions::default(), None).unwrap();
    assert_eq!(std::fs::read(dest.join("given_name/inner.txt")).unwrap(), b"inside");
    assert!(!dest.join("real_dir").exists());
}

#[test]
fn dot_source_is_named_after_its_directory() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("here");
    write_file(&src.join("f"), b"1", 0o644);

    let container = tmp.path().join("here.zip");
    archive_to_path(&src.join("."), &container, &key(), &ArchiveOptions::default(), None)
        .unwrap();

    let mut reader = open_container(&container).unwrap();
    assert_eq!(reader.read_entry(0).unwrap().path.to_string(), "here");
}
