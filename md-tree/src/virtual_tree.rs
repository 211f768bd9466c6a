//! An in-memory [`Tree`] backing, primarily for tests and for any caller that has
//! already materialized a component layout without touching disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{ByteStream, Error, Tree};

/// A single entry under a directory: either a subdirectory (by name) or a file (by
/// name, with optional contents).
#[derive(Debug, Clone)]
pub enum VirtualEntry {
    Directory(String),
    File { name: String, data: Vec<u8> },
}

impl VirtualEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        VirtualEntry::Directory(name.into())
    }

    pub fn file(name: impl Into<String>, data: Vec<u8>) -> Self {
        VirtualEntry::File {
            name: name.into(),
            data,
        }
    }

    fn name(&self) -> &str {
        match self {
            VirtualEntry::Directory(name) => name,
            VirtualEntry::File { name, .. } => name,
        }
    }
}

/// An in-memory tree: a map from directory path to its children.
#[derive(Debug, Clone, Default)]
pub struct VirtualTree {
    directories: HashMap<PathBuf, Vec<VirtualEntry>>,
}

impl VirtualTree {
    /// Build a [`VirtualTree`] from a list of `(directory, children)` pairs.
    ///
    /// Every ancestor directory of a listed directory must also be present if it is to
    /// be walked -- callers typically construct these bottom-up via a builder in
    /// tests, listing every directory level explicitly.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (PathBuf, Vec<VirtualEntry>)>,
    ) -> Self {
        VirtualTree {
            directories: entries.into_iter().collect(),
        }
    }

    fn find_file(&self, path: &Path) -> Option<&[u8]> {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let name = path.file_name()?.to_string_lossy();
        self.directories.get(parent)?.iter().find_map(|entry| {
            match entry {
                VirtualEntry::File { name: n, data } if *n == name => Some(data.as_slice()),
                _ => None,
            }
        })
    }
}

#[async_trait::async_trait]
impl Tree for VirtualTree {
    async fn exists(&self, path: &Path) -> Result<bool, Error> {
        if self.directories.contains_key(path) {
            return Ok(true);
        }
        Ok(self.find_file(path).is_some())
    }

    async fn is_directory(&self, path: &Path) -> Result<bool, Error> {
        Ok(self.directories.contains_key(path))
    }

    async fn read_directory(&self, path: &Path) -> Result<Vec<String>, Error> {
        match self.directories.get(path) {
            Some(entries) => Ok(entries.iter().map(|e| e.name().to_string()).collect()),
            None => {
                if self.find_file(path).is_some() {
                    Err(Error::NotADirectory(path.to_path_buf()))
                } else {
                    Err(Error::NotFound(path.to_path_buf()))
                }
            }
        }
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, Error> {
        self.find_file(path)
            .map(|data| data.to_vec())
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }

    async fn stream(&self, path: &Path) -> Result<ByteStream, Error> {
        let data = self.read_file(path).await?;
        let stream = futures::stream::once(async move { Ok(bytes::Bytes::from(data)) });
        Ok(Box::pin(stream))
    }
}
