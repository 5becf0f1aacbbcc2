//! Archiver: filesystem subtree → container of sealed entries
//!
//! Two phases:
//!   1. `plan`: walk the source tree in lexicographic order and record every
//!      directory and file as an entry. Only metadata is touched.
//!   2. write: for each planned file, read it whole, seal it under the key
//!      and append it to the container. Directories become payload-less
//!      entries so empty ones survive the round trip.
//!
//! The container path of every entry starts with the base name of the
//! source, so extracting recreates a subtree rooted at that name.
//!
//! With `encrypt_batch > 1`, runs of consecutive files are read and sealed
//! on the rayon pool. Each seal draws its own random nonce; entries are
//! still appended in plan order, so the container listing does not depend
//! on scheduling.

use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use vzip_crypto::{encrypt, Key};

use crate::container::ContainerWriter;
use crate::error::{ArchiveError, ArchiveResult, ContainerError};
use crate::fs::{Filesystem, LocalFs, NodeKind, NodeMeta};
use crate::path::EntryPath;
use crate::zipfile::ZipContainerWriter;
use crate::ProgressFn;

/// Deeper trees are treated as unreadable (typically a symlink loop).
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Files sealed concurrently; 1 keeps everything on the calling thread
    pub encrypt_batch: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self { encrypt_batch: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub files: usize,
    pub directories: usize,
    /// Special files left out of the container
    pub skipped: usize,
    pub plaintext_bytes: u64,
    pub stored_bytes: u64,
}

/// One entry to be written, in container order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    Directory {
        entry: EntryPath,
        mode: u32,
    },
    File {
        entry: EntryPath,
        source: PathBuf,
        mode: u32,
    },
}

impl PlanItem {
    pub fn entry(&self) -> &EntryPath {
        match self {
            PlanItem::Directory { entry, .. } | PlanItem::File { entry, .. } => entry,
        }
    }
}

/// Walk `source` and list the entries an archive of it would contain.
pub fn plan<F: Filesystem>(fs: &F, source: &Path) -> ArchiveResult<(Vec<PlanItem>, usize)> {
    let meta = fs
        .metadata(source)
        .map_err(|e| ArchiveError::unreadable(source, e))?;

    let base = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::SourceUnreadable {
            path: source.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "source has no usable base name",
            ),
        })?;
    let root = EntryPath::root(base)?;

    let mut items = Vec::new();
    let mut skipped = 0;
    walk(fs, source, root, meta, &mut items, &mut skipped)?;
    Ok((items, skipped))
}

fn walk<F: Filesystem>(
    fs: &F,
    path: &Path,
    entry: EntryPath,
    meta: NodeMeta,
    out: &mut Vec<PlanItem>,
    skipped: &mut usize,
) -> ArchiveResult<()> {
    match meta.kind {
        NodeKind::File => out.push(PlanItem::File {
            entry,
            source: path.to_path_buf(),
            mode: meta.mode,
        }),
        NodeKind::Other => {
            warn!(path = %path.display(), "skipping special file");
            *skipped += 1;
        }
        NodeKind::Directory => {
            if entry.depth() > MAX_DEPTH {
                return Err(ArchiveError::SourceUnreadable {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("directory nesting exceeds {MAX_DEPTH} levels"),
                    ),
                });
            }

            let mut names = fs
                .read_dir(path)
                .map_err(|e| ArchiveError::unreadable(path, e))?;
            names.sort();

            out.push(PlanItem::Directory {
                entry: entry.clone(),
                mode: meta.mode,
            });

            for name in names {
                let child_path = path.join(&name);
                let child_meta = fs
                    .metadata(&child_path)
                    .map_err(|e| ArchiveError::unreadable(&child_path, e))?;
                let child_entry = entry.child(&name)?;
                walk(fs, &child_path, child_entry, child_meta, out, skipped)?;
            }
        }
    }
    Ok(())
}

/// State of one archive operation. Owns the writer for its whole lifetime.
struct ArchiveSession<'a, F, W> {
    fs: &'a F,
    writer: W,
    key: &'a Key,
    progress: Option<&'a ProgressFn>,
    report: ArchiveReport,
    files_done: u64,
    files_total: u64,
}

impl<'a, F, W> ArchiveSession<'a, F, W>
where
    F: Filesystem + Sync,
    W: ContainerWriter,
{
    fn write_directory(&mut self, entry: &EntryPath, mode: u32) -> ArchiveResult<()> {
        self.writer.add_directory(entry, mode)?;
        self.report.directories += 1;
        debug!(entry = %entry, "added directory");
        Ok(())
    }

    fn write_files(&mut self, run: &[&PlanItem], parallel: bool) -> ArchiveResult<()> {
        let fs = self.fs;
        let key = self.key;
        let sealed: Vec<ArchiveResult<(Vec<u8>, u64)>> = if parallel {
            run.par_iter().map(|item| seal_file(fs, key, item)).collect()
        } else {
            run.iter().map(|item| seal_file(fs, key, item)).collect()
        };

        for (item, result) in run.iter().zip(sealed) {
            let PlanItem::File { entry, mode, .. } = item else {
                continue;
            };
            let (payload, plain_len) = result?;

            let sink = self.writer.new_entry(entry, *mode)?;
            sink.write_all(&payload)
                .map_err(|e| ContainerError::Write(format!("{entry}: {e}")))?;

            self.report.files += 1;
            self.report.plaintext_bytes += plain_len;
            self.report.stored_bytes += payload.len() as u64;
            self.files_done += 1;
            debug!(entry = %entry, bytes = plain_len, "added file");

            if let Some(cb) = self.progress {
                cb(self.files_done, self.files_total, &entry.to_string());
            }
        }
        Ok(())
    }
}

fn seal_file<F: Filesystem>(fs: &F, key: &Key, item: &PlanItem) -> ArchiveResult<(Vec<u8>, u64)> {
    let PlanItem::File { entry, source, .. } = item else {
        return Ok((Vec::new(), 0));
    };
    let plaintext = fs
        .read(source)
        .map_err(|e| ArchiveError::unreadable(source, e))?;
    let payload = encrypt(&plaintext, key).map_err(|e| ArchiveError::Entry {
        entry: entry.to_string(),
        source: e,
    })?;
    Ok((payload, plaintext.len() as u64))
}

/// Write a planned archive into `writer` and close it.
///
/// The writer is consumed: on success it is closed and its output returned;
/// on failure it is dropped and the caller must discard whatever the sink
/// received.
pub fn write_plan<F, W>(
    fs: &F,
    items: &[PlanItem],
    writer: W,
    key: &Key,
    options: &ArchiveOptions,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<(ArchiveReport, W::Output)>
where
    F: Filesystem + Sync,
    W: ContainerWriter,
{
    let batch = options.encrypt_batch.max(1);
    let files_total = items
        .iter()
        .filter(|i| matches!(i, PlanItem::File { .. }))
        .count() as u64;

    let mut session = ArchiveSession {
        fs,
        writer,
        key,
        progress,
        report: ArchiveReport::default(),
        files_done: 0,
        files_total,
    };

    let mut run: Vec<&PlanItem> = Vec::with_capacity(batch);
    for item in items {
        match item {
            PlanItem::Directory { entry, mode } => {
                if !run.is_empty() {
                    session.write_files(&run, batch > 1)?;
                    run.clear();
                }
                session.write_directory(entry, *mode)?;
            }
            PlanItem::File { .. } => {
                run.push(item);
                if run.len() == batch {
                    session.write_files(&run, batch > 1)?;
                    run.clear();
                }
            }
        }
    }
    if !run.is_empty() {
        session.write_files(&run, batch > 1)?;
    }

    let output = session.writer.close()?;
    Ok((session.report, output))
}

/// Archive the subtree at `source` into `writer`.
pub fn archive<F, W>(
    fs: &F,
    source: &Path,
    writer: W,
    key: &Key,
    options: &ArchiveOptions,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<(ArchiveReport, W::Output)>
where
    F: Filesystem + Sync,
    W: ContainerWriter,
{
    let (items, skipped) = plan(fs, source)?;
    let (mut report, output) = write_plan(fs, &items, writer, key, options, progress)?;
    report.skipped = skipped;
    Ok((report, output))
}

/// Archive a local subtree into a container file at `container`.
///
/// The container is assembled in a temporary file next to the destination
/// and renamed into place only on success, so a failed run leaves nothing
/// at `container`. The result is readable by the owner only.
pub fn archive_to_path(
    source: &Path,
    container: &Path,
    key: &Key,
    options: &ArchiveOptions,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<ArchiveReport> {
    // The root entry keeps the name the caller gave, even for a symlink.
    // Only `.`, `..` and `/` need resolving to get a name at all.
    let source = match source.file_name() {
        Some(_) => source.to_path_buf(),
        None => std::fs::canonicalize(source).map_err(|e| ArchiveError::unreadable(source, e))?,
    };

    info!(
        source = %source.display(),
        container = %container.display(),
        "archive starting"
    );

    let (items, skipped) = plan(&LocalFs, &source)?;

    let dir = container
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".vzip-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| ContainerError::Open(format!("{}: {e}", dir.display())))?;

    let (mut report, _) = write_plan(
        &LocalFs,
        &items,
        ZipContainerWriter::new(tmp.as_file_mut()),
        key,
        options,
        progress,
    )?;
    report.skipped = skipped;

    tmp.as_file()
        .sync_all()
        .map_err(|e| ContainerError::Write(format!("sync: {e}")))?;
    tmp.persist(container)
        .map_err(|e| ContainerError::Write(format!("{}: {}", container.display(), e.error)))?;

    info!(
        files = report.files,
        directories = report.directories,
        bytes = report.plaintext_bytes,
        "archive complete"
    );
    Ok(report)
}
