//! Container seam
//!
//! The archiver and extractor only see these traits. The on-disk format
//! (central directory, checksums, compression) belongs to the implementation.

use std::io::Write;

use crate::error::ContainerError;
use crate::path::EntryPath;

/// An entry read back from a container, payload fully buffered.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub path: EntryPath,
    pub is_dir: bool,
    /// Permission bits (0o777)
    pub mode: u32,
    /// Stored bytes: an envelope for files, empty for directories
    pub payload: Vec<u8>,
}

pub trait ContainerWriter {
    /// What the writer hands back once closed (the underlying sink).
    type Output;

    fn add_directory(&mut self, path: &EntryPath, mode: u32) -> Result<(), ContainerError>;

    /// Start a file entry; bytes written to the returned sink become its content.
    fn new_entry(&mut self, path: &EntryPath, mode: u32)
        -> Result<&mut dyn Write, ContainerError>;

    /// Flush the index and release the sink.
    fn close(self) -> Result<Self::Output, ContainerError>;
}

pub trait ContainerReader {
    /// Number of entries, in container-native order.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entry(&mut self, index: usize) -> Result<StoredEntry, ContainerError>;
}
