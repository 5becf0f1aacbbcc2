//! vzip-archive: map a filesystem subtree onto a container of individually
//! encrypted entries, and back
//!
//! # Overview
//! - `archiver`: deterministic tree walk → sealed entries → container writer
//! - `extractor`: container reader → opened entries → filesystem tree
//! - `container`: the container seam; `zipfile` implements it over ZIP
//! - `fs`: the filesystem seam; `LocalFs` for disk, `MemFs` for tests
//!
//! Entry names, directory structure and permission bits are stored in the
//! clear. Only file contents are encrypted.

pub mod archiver;
pub mod container;
pub mod error;
pub mod extractor;
pub mod fs;
pub mod memfs;
pub mod path;
pub mod zipfile;

pub use archiver::{archive, archive_to_path, plan, ArchiveOptions, ArchiveReport, PlanItem};
pub use container::{ContainerReader, ContainerWriter, StoredEntry};
pub use error::{ArchiveError, ArchiveResult, ContainerError};
pub use extractor::{extract, extract_from_path, EntryFailure, ExtractOptions, ExtractReport};
pub use fs::{Filesystem, LocalFs, NodeKind, NodeMeta};
pub use memfs::MemFs;
pub use path::EntryPath;
pub use zipfile::{create_container, open_container, ZipContainerReader, ZipContainerWriter};

/// Progress callback type (items_done, items_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;
