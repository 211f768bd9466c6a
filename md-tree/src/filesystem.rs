//! A [`Tree`] backed by the native filesystem.

use std::path::{Path, PathBuf};

use crate::{ByteStream, Error, Tree};

/// A [`Tree`] rooted at a real directory on disk.
#[derive(Debug, Clone)]
pub struct FilesystemTree {
    root: PathBuf,
}

impl FilesystemTree {
    /// Create a new [`FilesystemTree`] rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemTree { root: root.into() }
    }

    /// The root this tree was constructed with.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn io_err(path: &Path, source: std::io::Error) -> Error {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.to_path_buf())
        } else {
            tracing::warn!(path = %path.display(), %source, "filesystem tree I/O failure");
            Error::IoFailure {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[async_trait::async_trait]
impl Tree for FilesystemTree {
    async fn exists(&self, path: &Path) -> Result<bool, Error> {
        let full = self.full_path(path);
        match tokio::fs::metadata(&full).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Self::io_err(path, err)),
        }
    }

    async fn is_directory(&self, path: &Path) -> Result<bool, Error> {
        let full = self.full_path(path);
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|err| Self::io_err(path, err))?;
        Ok(metadata.is_dir())
    }

    async fn read_directory(&self, path: &Path) -> Result<Vec<String>, Error> {
        let full = self.full_path(path);
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|err| Self::io_err(path, err))?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(path.to_path_buf()));
        }

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|err| Self::io_err(path, err))?;
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|err| Self::io_err(path, err))?
        {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(entries)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, Error> {
        let full = self.full_path(path);
        tokio::fs::read(&full)
            .await
            .map_err(|err| Self::io_err(path, err))
    }

    async fn stream(&self, path: &Path) -> Result<ByteStream, Error> {
        use tokio::io::AsyncReadExt;

        let full = self.full_path(path);
        let mut file = tokio::fs::File::open(&full)
            .await
            .map_err(|err| Self::io_err(path, err))?;
        let owned_path = path.to_path_buf();

        let stream = async_stream::try_stream! {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf).await.map_err(|source| Error::IoFailure {
                    path: owned_path.clone(),
                    source,
                })?;
                if n == 0 {
                    break;
                }
                yield bytes::Bytes::copy_from_slice(&buf[..n]);
            }
        };
        Ok(Box::pin(stream))
    }
}
