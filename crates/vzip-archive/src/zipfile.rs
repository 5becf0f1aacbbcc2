//! ZIP implementation of the container seam
//!
//! Entries are written `Stored`: sealed payloads are indistinguishable from
//! random bytes and do not compress. Deflated entries are still readable.
//!
//! A stock unzip tool will happily extract a vzip container and produce
//! `nonce || ciphertext` blobs; nothing in the ZIP format marks the entries
//! as encrypted.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::container::{ContainerReader, ContainerWriter, StoredEntry};
use crate::error::ContainerError;
use crate::path::EntryPath;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Upper bound on the buffer reserved from an entry's declared size.
/// The declared size is untrusted; larger payloads grow as they are read.
const MAX_PREALLOC: u64 = 1 << 20;

pub struct ZipContainerWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> ZipContainerWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
        }
    }
}

fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(mode & 0o777)
}

impl<W: Write + Seek> ContainerWriter for ZipContainerWriter<W> {
    type Output = W;

    fn add_directory(&mut self, path: &EntryPath, mode: u32) -> Result<(), ContainerError> {
        let name = path.to_container_name(true);
        self.zip
            .add_directory(name.as_str(), entry_options(mode))
            .map_err(|e| ContainerError::Write(format!("{name}: {e}")))
    }

    fn new_entry(
        &mut self,
        path: &EntryPath,
        mode: u32,
    ) -> Result<&mut dyn Write, ContainerError> {
        let name = path.to_container_name(false);
        self.zip
            .start_file(name.as_str(), entry_options(mode))
            .map_err(|e| ContainerError::Write(format!("{name}: {e}")))?;
        Ok(&mut self.zip)
    }

    fn close(self) -> Result<W, ContainerError> {
        self.zip
            .finish()
            .map_err(|e| ContainerError::Write(format!("finalizing container: {e}")))
    }
}

pub struct ZipContainerReader<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ZipContainerReader<R> {
    /// Parse the central directory; malformed input is an open error.
    pub fn new(inner: R) -> Result<Self, ContainerError> {
        let archive = ZipArchive::new(inner)
            .map_err(|e| ContainerError::Open(format!("not a valid container: {e}")))?;
        Ok(Self { archive })
    }
}

impl<R: Read + Seek> ContainerReader for ZipContainerReader<R> {
    fn len(&self) -> usize {
        self.archive.len()
    }

    fn read_entry(&mut self, index: usize) -> Result<StoredEntry, ContainerError> {
        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| ContainerError::Read(format!("entry #{index}: {e}")))?;

        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let path = EntryPath::parse(&name)?;
        let mode = file.unix_mode().map(|m| m & 0o777).unwrap_or(if is_dir {
            DEFAULT_DIR_MODE
        } else {
            DEFAULT_FILE_MODE
        });

        let mut payload = Vec::new();
        if !is_dir {
            let hint = file.size().min(file.compressed_size()).min(MAX_PREALLOC);
            payload.reserve(hint as usize);
            file.read_to_end(&mut payload)
                .map_err(|e| ContainerError::Read(format!("{name}: {e}")))?;
        }

        Ok(StoredEntry {
            path,
            is_dir,
            mode,
            payload,
        })
    }
}

/// Create (truncate) a container file at `path`.
pub fn create_container(path: &Path) -> Result<ZipContainerWriter<File>, ContainerError> {
    let file = File::create(path)
        .map_err(|e| ContainerError::Open(format!("{}: {e}", path.display())))?;
    Ok(ZipContainerWriter::new(file))
}

pub fn open_container(path: &Path) -> Result<ZipContainerReader<File>, ContainerError> {
    let file =
        File::open(path).map_err(|e| ContainerError::Open(format!("{}: {e}", path.display())))?;
    ZipContainerReader::new(file)
}
