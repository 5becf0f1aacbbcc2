//! In-memory [`Filesystem`] for exercising the walk without touching disk

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::fs::{Filesystem, NodeKind, NodeMeta};

#[derive(Debug, Clone)]
enum MemNode {
    Dir { mode: u32 },
    File { data: Vec<u8>, mode: u32, readable: bool },
    Special,
}

/// A tree of directories and files keyed by absolute path.
///
/// The root (`/`) always exists.
#[derive(Debug, Default)]
pub struct MemFs {
    nodes: Mutex<BTreeMap<PathBuf, MemNode>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: impl AsRef<Path>, mode: u32) {
        let path = path.as_ref();
        self.ensure_parents(path);
        self.lock().insert(path.to_path_buf(), MemNode::Dir { mode });
    }

    pub fn add_file(&self, path: impl AsRef<Path>, data: &[u8], mode: u32) {
        let path = path.as_ref();
        self.ensure_parents(path);
        self.lock().insert(
            path.to_path_buf(),
            MemNode::File {
                data: data.to_vec(),
                mode,
                readable: true,
            },
        );
    }

    /// A file whose content cannot be read (permission denied).
    pub fn add_unreadable_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.ensure_parents(path);
        self.lock().insert(
            path.to_path_buf(),
            MemNode::File {
                data: Vec::new(),
                mode: 0o000,
                readable: false,
            },
        );
    }

    /// A socket/FIFO-like node.
    pub fn add_special(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.ensure_parents(path);
        self.lock().insert(path.to_path_buf(), MemNode::Special);
    }

    /// Content and mode of a file, if `path` is one.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<(Vec<u8>, u32)> {
        match self.lock().get(path.as_ref()) {
            Some(MemNode::File { data, mode, .. }) => Some((data.clone(), *mode)),
            _ => None,
        }
    }

    /// Mode of a directory, if `path` is one.
    pub fn dir_mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        match self.lock().get(path.as_ref()) {
            Some(MemNode::Dir { mode }) => Some(*mode),
            _ => None,
        }
    }

    /// Every path below `root`, relative to it, sorted.
    pub fn paths_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        self.lock()
            .keys()
            .filter_map(|p| p.strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, MemNode>> {
        // A panic while holding the lock leaves the map itself consistent
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_parents(&self, path: &Path) {
        let mut nodes = self.lock();
        for ancestor in path.ancestors().skip(1) {
            if is_root(ancestor) {
                break;
            }
            nodes
                .entry(ancestor.to_path_buf())
                .or_insert(MemNode::Dir { mode: 0o755 });
        }
    }
}

fn is_root(path: &Path) -> bool {
    path.parent().is_none() || path.as_os_str().is_empty()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}: not found", path.display()))
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("{}: not a directory", path.display()),
    )
}

impl Filesystem for MemFs {
    fn metadata(&self, path: &Path) -> io::Result<NodeMeta> {
        if is_root(path) {
            return Ok(NodeMeta {
                kind: NodeKind::Directory,
                mode: 0o755,
                len: 0,
            });
        }
        match self.lock().get(path) {
            Some(MemNode::Dir { mode }) => Ok(NodeMeta {
                kind: NodeKind::Directory,
                mode: *mode,
                len: 0,
            }),
            Some(MemNode::File { data, mode, .. }) => Ok(NodeMeta {
                kind: NodeKind::File,
                mode: *mode,
                len: data.len() as u64,
            }),
            Some(MemNode::Special) => Ok(NodeMeta {
                kind: NodeKind::Other,
                mode: 0o644,
                len: 0,
            }),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        if self.metadata(path)?.kind != NodeKind::Directory {
            return Err(not_a_directory(path));
        }
        Ok(self
            .lock()
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.lock().get(path) {
            Some(MemNode::File { data, readable: true, .. }) => Ok(data.clone()),
            Some(MemNode::File { readable: false, .. }) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", path.display()),
            )),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: not a file", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.lock();
        let mut missing = Vec::new();
        for ancestor in path.ancestors() {
            if is_root(ancestor) {
                break;
            }
            match nodes.get(ancestor) {
                Some(MemNode::Dir { .. }) => break,
                Some(_) => return Err(not_a_directory(ancestor)),
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        for dir in missing {
            nodes.insert(dir, MemNode::Dir { mode: 0o755 });
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut nodes = self.lock();
        if let Some(parent) = path.parent().filter(|p| !is_root(p)) {
            match nodes.get(parent) {
                Some(MemNode::Dir { .. }) => {}
                Some(_) => return Err(not_a_directory(parent)),
                None => return Err(not_found(parent)),
            }
        }
        if let Some(MemNode::Dir { .. }) = nodes.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path.display()),
            ));
        }
        nodes.insert(
            path.to_path_buf(),
            MemNode::File {
                data: data.to_vec(),
                mode: mode & 0o777,
                readable: true,
            },
        );
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        match self.lock().get_mut(path) {
            Some(MemNode::Dir { mode: m }) | Some(MemNode::File { mode: m, .. }) => {
                *m = mode & 0o777;
                Ok(())
            }
            Some(MemNode::Special) => Ok(()),
            None => Err(not_found(path)),
        }
    }
}
