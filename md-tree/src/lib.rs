//! An abstract, read-only file-tree interface with at least two backings.
//!
//! [`Tree`] is the seam between "where a component's files live" and everything else in
//! this workspace that needs to read them: the [`Resolver`](../md_resolver), the
//! transformers, and the writers all work against this trait instead of `std::fs`
//! directly, so a caller can hand in a filesystem tree, an in-memory tree built for a
//! test, or (not implemented here, see [`SPEC_FULL.md`]) a version-control-backed tree.

pub mod filesystem;
pub mod virtual_tree;

use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

/// Errors that can be returned from a [`Tree`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such file or directory: {0}")]
    NotFound(PathBuf),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("I/O failure reading {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A byte stream returned from [`Tree::stream`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// An abstract, read-only view of a directory tree.
///
/// Paths passed to every method are OS-normalized by the caller; implementations are
/// not expected to normalize them again. `read_directory` returns bare entry names, not
/// paths joined to the directory -- callers are responsible for joining.
#[async_trait::async_trait]
pub trait Tree: Send + Sync {
    /// Returns `true` if `path` exists, as either a file or a directory.
    async fn exists(&self, path: &Path) -> Result<bool, Error>;

    /// Returns `true` if `path` exists and is a directory.
    async fn is_directory(&self, path: &Path) -> Result<bool, Error>;

    /// Lists the bare entry names of the directory at `path`.
    async fn read_directory(&self, path: &Path) -> Result<Vec<String>, Error>;

    /// Reads the entire contents of the file at `path`.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, Error>;

    /// Streams the contents of the file at `path`.
    async fn stream(&self, path: &Path) -> Result<ByteStream, Error>;
}

#[cfg(test)]
mod tests {
    use super::virtual_tree::{VirtualEntry, VirtualTree};
    use super::*;

    #[tokio::test]
    async fn exists_and_read_directory_roundtrip() {
        let tree = VirtualTree::from_entries([(
            PathBuf::from("classes"),
            vec![
                VirtualEntry::file("A.cls", b"public class A {}".to_vec()),
                VirtualEntry::file("A.cls-meta.xml", b"<ApexClass/>".to_vec()),
            ],
        )]);

        assert!(tree.exists(Path::new("classes")).await.unwrap());
        assert!(tree.is_directory(Path::new("classes")).await.unwrap());

        let mut names = tree.read_directory(Path::new("classes")).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["A.cls", "A.cls-meta.xml"]);
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let tree = VirtualTree::from_entries([]);
        let err = tree.read_file(Path::new("missing.txt")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
