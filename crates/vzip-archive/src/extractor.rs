//! Extractor: container of sealed entries → filesystem subtree
//!
//! Entries are processed in container order. Each stored path becomes nested
//! directories under the destination root, the exact inverse of the
//! archiver's mapping.
//!
//! Extraction is NOT atomic. Entries written before a failing entry stay on
//! disk. By default the first entry that fails to open aborts the run; with
//! `keep_going` such entries are skipped and listed in the report instead.
//!
//! Directory permission bits are applied after all entries are written,
//! deepest first, so a directory recorded as read-only still receives its
//! children.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use vzip_crypto::{decrypt, CryptoError, Key};

use crate::container::ContainerReader;
use crate::error::{ArchiveError, ArchiveResult};
use crate::fs::{Filesystem, LocalFs};
use crate::zipfile::open_container;
use crate::ProgressFn;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Skip entries that fail to decrypt instead of aborting
    pub keep_going: bool,
}

/// An entry skipped under `keep_going`.
#[derive(Debug)]
pub struct EntryFailure {
    pub entry: String,
    pub error: CryptoError,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub failures: Vec<EntryFailure>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Extract every entry of `reader` under `dest_root`.
pub fn extract<F, R>(
    fs: &F,
    reader: &mut R,
    dest_root: &Path,
    key: &Key,
    options: &ExtractOptions,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<ExtractReport>
where
    F: Filesystem,
    R: ContainerReader,
{
    fs.create_dir_all(dest_root)
        .map_err(|source| ArchiveError::PathCreation {
            path: dest_root.to_path_buf(),
            source,
        })?;

    let mut report = ExtractReport::default();
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    let result = extract_entries(
        fs,
        reader,
        dest_root,
        key,
        options,
        progress,
        &mut report,
        &mut dir_modes,
    );

    // Apply recorded directory modes even after an abort, so whatever was
    // materialised looks the way the container describes it.
    let modes = apply_dir_modes(fs, dir_modes);

    if let Err(e) = result {
        warn!(
            files = report.files,
            directories = report.directories,
            "extraction aborted; entries already written were left in place"
        );
        return Err(e);
    }
    modes?;

    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            "extraction finished with entries that could not be decrypted"
        );
    }
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn extract_entries<F, R>(
    fs: &F,
    reader: &mut R,
    dest_root: &Path,
    key: &Key,
    options: &ExtractOptions,
    progress: Option<&ProgressFn>,
    report: &mut ExtractReport,
    dir_modes: &mut Vec<(PathBuf, u32)>,
) -> ArchiveResult<()>
where
    F: Filesystem,
    R: ContainerReader,
{
    let total = reader.len() as u64;

    for index in 0..reader.len() {
        let entry = reader.read_entry(index)?;
        let target = entry.path.to_fs_path(dest_root);
        let name = entry.path.to_string();

        if entry.is_dir {
            fs.create_dir_all(&target)
                .map_err(|source| ArchiveError::PathCreation {
                    path: target.clone(),
                    source,
                })?;
            dir_modes.push((target, entry.mode));
            report.directories += 1;
            debug!(entry = %name, "created directory");
        } else {
            if let Some(parent) = target.parent() {
                fs.create_dir_all(parent)
                    .map_err(|source| ArchiveError::PathCreation {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }

            match decrypt(&entry.payload, key) {
                Ok(plaintext) => {
                    fs.write_file(&target, &plaintext, entry.mode)
                        .map_err(|source| ArchiveError::DestinationWrite {
                            path: target.clone(),
                            source,
                        })?;
                    report.files += 1;
                    report.bytes += plaintext.len() as u64;
                    debug!(entry = %name, bytes = plaintext.len(), "extracted file");
                }
                Err(error) if options.keep_going => {
                    warn!(entry = %name, %error, "skipping entry");
                    report.failures.push(EntryFailure { entry: name.clone(), error });
                }
                Err(error) => {
                    return Err(ArchiveError::Entry {
                        entry: name,
                        source: error,
                    });
                }
            }
        }

        if let Some(cb) = progress {
            cb(index as u64 + 1, total, &name);
        }
    }
    Ok(())
}

fn apply_dir_modes<F: Filesystem>(fs: &F, mut dir_modes: Vec<(PathBuf, u32)>) -> ArchiveResult<()> {
    dir_modes.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
    for (path, mode) in dir_modes {
        fs.set_mode(&path, mode)
            .map_err(|source| ArchiveError::DestinationWrite { path, source })?;
    }
    Ok(())
}

/// Extract a container file into `dest_root` on the local disk.
pub fn extract_from_path(
    container: &Path,
    dest_root: &Path,
    key: &Key,
    options: &ExtractOptions,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<ExtractReport> {
    info!(
        container = %container.display(),
        dest = %dest_root.display(),
        "extract starting"
    );

    let mut reader = open_container(container)?;
    let report = extract(&LocalFs, &mut reader, dest_root, key, options, progress)?;

    info!(
        files = report.files,
        directories = report.directories,
        bytes = report.bytes,
        "extract complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::{archive, ArchiveOptions};
    use crate::container::{ContainerWriter, StoredEntry};
    use crate::error::ContainerError;
    use crate::memfs::MemFs;
    use crate::path::EntryPath;
    use crate::zipfile::{ZipContainerReader, ZipContainerWriter};
    use std::io::{Cursor, Write};
    use vzip_crypto::KEY_SIZE;

    fn key() -> Key {
        Key::from_bytes([3u8; KEY_SIZE])
    }

    /// In-memory reader over prepared entries, for corrupting payloads.
    struct VecReader(Vec<StoredEntry>);

    impl ContainerReader for VecReader {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn read_entry(&mut self, index: usize) -> Result<StoredEntry, ContainerError> {
            Ok(self.0[index].clone())
        }
    }

    fn archived_entries(fs: &MemFs, source: &str) -> Vec<StoredEntry> {
        let writer = ZipContainerWriter::new(Cursor::new(Vec::new()));
        let (_, cursor) =
            archive(fs, Path::new(source), writer, &key(), &ArchiveOptions::default(), None)
                .unwrap();
        let mut reader = ZipContainerReader::new(Cursor::new(cursor.into_inner())).unwrap();
        (0..reader.len()).map(|i| reader.read_entry(i).unwrap()).collect()
    }

    fn scenario_fs() -> MemFs {
        let src = MemFs::new();
        src.add_file("/in/tree/a.txt", b"x", 0o644);
        src.add_file("/in/tree/sub/b.txt", b"y", 0o600);
        src.add_file("/in/tree/sub/c.txt", b"z", 0o644);
        src
    }

    #[test]
    fn test_roundtrip_into_memfs() {
        let src = scenario_fs();
        let mut reader = VecReader(archived_entries(&src, "/in/tree"));
        let out = MemFs::new();

        let report = extract(
            &out,
            &mut reader,
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(report.files, 3);
        assert_eq!(out.file("/out/tree/a.txt"), Some((b"x".to_vec(), 0o644)));
        assert_eq!(out.file("/out/tree/sub/b.txt"), Some((b"y".to_vec(), 0o600)));
        assert_eq!(out.paths_under("/out"), src.paths_under("/in"));
    }

    #[test]
    fn test_corrupt_entry_aborts_by_default() {
        let mut entries = archived_entries(&scenario_fs(), "/in/tree");
        // entries: tree/, tree/a.txt, tree/sub/, tree/sub/b.txt, tree/sub/c.txt
        let last = entries[3].payload.len() - 1;
        entries[3].payload[last] ^= 0xFF;

        let out = MemFs::new();
        let err = extract(
            &out,
            &mut VecReader(entries),
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap_err();

        assert!(err.is_authentication_failure());
        // Written before the failure and not rolled back
        assert!(out.file("/out/tree/a.txt").is_some());
        // Never reached
        assert!(out.file("/out/tree/sub/c.txt").is_none());
    }

    #[test]
    fn test_corrupt_entry_skipped_with_keep_going() {
        let mut entries = archived_entries(&scenario_fs(), "/in/tree");
        let last = entries[3].payload.len() - 1;
        entries[3].payload[last] ^= 0xFF;

        let out = MemFs::new();
        let report = extract(
            &out,
            &mut VecReader(entries),
            Path::new("/out"),
            &key(),
            &ExtractOptions { keep_going: true },
            None,
        )
        .unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entry, "tree/sub/b.txt");
        assert!(matches!(report.failures[0].error, CryptoError::AuthenticationFailed));
        assert!(!report.is_complete());
        assert!(out.file("/out/tree/sub/b.txt").is_none());
        assert_eq!(out.file("/out/tree/sub/c.txt"), Some((b"z".to_vec(), 0o644)));
    }

    #[test]
    fn test_truncated_payload_reported() {
        let mut entries = archived_entries(&scenario_fs(), "/in/tree");
        entries[1].payload.truncate(5);

        let err = extract(
            &MemFs::new(),
            &mut VecReader(entries),
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap_err();

        assert!(matches!(
            err.crypto_error(),
            Some(CryptoError::PayloadTooShort { len: 5, .. })
        ));
    }

    #[test]
    fn test_wrong_key_fails_every_file() {
        let entries = archived_entries(&scenario_fs(), "/in/tree");
        let report = extract(
            &MemFs::new(),
            &mut VecReader(entries),
            Path::new("/out"),
            &Key::from_bytes([4u8; KEY_SIZE]),
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
    }

    #[test]
    fn test_file_only_containers_get_parent_dirs() {
        // Older containers carry no directory entries at all
        let mut writer = ZipContainerWriter::new(Cursor::new(Vec::new()));
        let payload = vzip_crypto::encrypt(b"deep", &key()).unwrap();
        writer
            .new_entry(&EntryPath::parse("top/a/b/c.txt").unwrap(), 0o644)
            .unwrap()
            .write_all(&payload)
            .unwrap();
        let bytes = writer.close().unwrap().into_inner();

        let out = MemFs::new();
        extract(
            &out,
            &mut ZipContainerReader::new(Cursor::new(bytes)).unwrap(),
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(out.file("/out/top/a/b/c.txt"), Some((b"deep".to_vec(), 0o644)));
    }

    #[test]
    fn test_dir_modes_applied_after_children() {
        let src = MemFs::new();
        src.add_dir("/in/ro", 0o555);
        src.add_file("/in/ro/inner.txt", b"i", 0o444);

        let out = MemFs::new();
        extract(
            &out,
            &mut VecReader(archived_entries(&src, "/in/ro")),
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(out.dir_mode("/out/ro"), Some(0o555));
        assert_eq!(out.file("/out/ro/inner.txt"), Some((b"i".to_vec(), 0o444)));
    }

    #[test]
    fn test_existing_directories_are_fine() {
        let out = MemFs::new();
        out.add_dir("/out/tree/sub", 0o755);

        let report = extract(
            &out,
            &mut VecReader(archived_entries(&scenario_fs(), "/in/tree")),
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(report.directories, 2);
    }

    #[test]
    fn test_dest_blocked_by_file_is_path_creation_error() {
        let out = MemFs::new();
        out.add_file("/out/tree", b"in the way", 0o644);

        let err = extract(
            &out,
            &mut VecReader(archived_entries(&scenario_fs(), "/in/tree")),
            Path::new("/out"),
            &key(),
            &ExtractOptions::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::PathCreation { .. }));
    }
}
