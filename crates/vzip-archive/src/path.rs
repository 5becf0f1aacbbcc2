//! Container entry paths
//!
//! An entry path is a non-empty sequence of plain name segments. Segments
//! that could escape the extraction root (`..`, absolute paths, embedded
//! separators) are rejected both when archiving and when extracting.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ContainerError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPath {
    segments: Vec<String>,
}

impl EntryPath {
    /// A single-segment path: the base name of the archived source.
    pub fn root(name: &str) -> Result<Self, ContainerError> {
        validate_segment(name, name)?;
        Ok(Self {
            segments: vec![name.to_string()],
        })
    }

    pub fn child(&self, name: &str) -> Result<Self, ContainerError> {
        validate_segment(name, &format!("{self}/{name}"))?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Parse a container-native entry name (`a/b/c` or `a/b/` for directories).
    pub fn parse(name: &str) -> Result<Self, ContainerError> {
        let trimmed = name.strip_suffix('/').unwrap_or(name);
        if trimmed.is_empty() {
            return Err(ContainerError::UnsafeEntryPath(name.to_string()));
        }
        let segments = trimmed
            .split('/')
            .map(|seg| validate_segment(seg, name).map(|_| seg.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Container-native name; directories carry a trailing `/`.
    pub fn to_container_name(&self, is_dir: bool) -> String {
        let mut name = self.segments.join("/");
        if is_dir {
            name.push('/');
        }
        name
    }

    /// Nested filesystem path under `root`.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

fn validate_segment(seg: &str, whole: &str) -> Result<(), ContainerError> {
    let bad = seg.is_empty()
        || seg == "."
        || seg == ".."
        || seg.contains(['/', '\\', '\0']);
    if bad {
        Err(ContainerError::UnsafeEntryPath(whole.to_string()))
    } else {
        Ok(())
    }
}
