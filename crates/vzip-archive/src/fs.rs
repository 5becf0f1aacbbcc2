//! Filesystem seam used by the archiver and extractor
//!
//! The walk never touches `std::fs` directly; it goes through [`Filesystem`]
//! so the same code runs against the local disk and against [`MemFs`].
//!
//! [`MemFs`]: crate::memfs::MemFs

use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    /// Sockets, FIFOs, devices: never archived
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMeta {
    pub kind: NodeKind,
    /// Permission bits (0o777)
    pub mode: u32,
    pub len: u64,
}

pub trait Filesystem {
    /// Metadata for `path`, following symlinks.
    fn metadata(&self, path: &Path) -> io::Result<NodeMeta>;

    /// Names of the direct children of a directory, in no particular order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create a directory and any missing ancestors; existing directories are fine.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create or truncate a file, write `data` and set its permission bits.
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn metadata(&self, path: &Path) -> io::Result<NodeMeta> {
        let meta = std::fs::metadata(path)?;
        let kind = if meta.is_dir() {
            NodeKind::Directory
        } else if meta.is_file() {
            NodeKind::File
        } else {
            NodeKind::Other
        };
        Ok(NodeMeta {
            kind,
            mode: mode_of(&meta),
            len: meta.len(),
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().into_string().map_err(|raw| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("file name is not valid UTF-8: {}", raw.to_string_lossy()),
                )
            })?;
            names.push(name);
        }
        Ok(names)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        std::fs::write(path, data)?;
        self.set_mode(path, mode)
    }

    #[cfg(unix)]
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))
    }

    #[cfg(not(unix))]
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        std::fs::set_permissions(path, perms)
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}
