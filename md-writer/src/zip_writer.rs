//! Writes a [`WriterFormat`] into an in-memory ZIP archive.
//!
//! Every component's sources are read to completion before the archive is touched, so
//! a read failure never leaves a half-written entry in the zip.

use std::io::{Cursor, Write};

use md_transform::WriterFormat;
use zip::write::SimpleFileOptions;

use crate::{read_all_staged, Error, Writer};

/// A [`Writer`] that accumulates components into a single in-memory zip buffer.
///
/// Call [`ZipWriter::finalize`] once every component has been written to obtain the
/// finished archive bytes.
pub struct ZipWriter {
    archive: zip::ZipWriter<Cursor<Vec<u8>>>,
}

impl Default for ZipWriter {
    fn default() -> Self {
        ZipWriter::new()
    }
}

impl ZipWriter {
    pub fn new() -> Self {
        ZipWriter {
            archive: zip::ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Finishes the archive and returns its bytes.
    pub fn finalize(mut self) -> Result<Vec<u8>, Error> {
        let cursor = self
            .archive
            .finish()
            .map_err(|source| Error::Zip {
                path: std::path::PathBuf::new(),
                source,
            })?;
        Ok(cursor.into_inner())
    }
}

#[async_trait::async_trait]
impl Writer for ZipWriter {
    async fn write_component(&mut self, format: WriterFormat) -> Result<(), Error> {
        let component = format.component.full_name();
        let staged = read_all_staged(&format).await?;
        tracing::debug!(component, entries = staged.len(), "staging zip entries");

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (path, bytes) in staged {
            let name = path.to_string_lossy().replace('\\', "/");
            self.archive
                .start_file(&name, options)
                .map_err(|source| Error::Zip {
                    path: path.clone(),
                    source,
                })?;
            self.archive
                .write_all(&bytes)
                .map_err(|source| Error::Io {
                    path,
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_component::component::SourceComponent;
    use md_ignore::IgnoreMatcher;
    use md_tree::virtual_tree::{VirtualEntry, VirtualTree};
    use md_tree::Tree;
    use md_transform::TransformerKind;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_component_entries_into_archive() {
        let tree: Arc<dyn Tree> = Arc::new(VirtualTree::from_entries([(
            PathBuf::from("classes"),
            vec![
                VirtualEntry::file("A.cls", b"public class A {}".to_vec()),
                VirtualEntry::file("A.cls-meta.xml", b"<ApexClass/>".to_vec()),
            ],
        )]));
        let ty = md_registry::Registry::global().get("apexclass").unwrap();
        let component = Arc::new(SourceComponent {
            name: "A".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("classes/A.cls-meta.xml")),
            content: Some(PathBuf::from("classes/A.cls")),
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });

        let format = TransformerKind::Default
            .to_metadata_format(component)
            .await
            .unwrap();

        let mut writer = ZipWriter::new();
        writer.write_component(format).await.unwrap();
        let bytes = writer.finalize().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["classes/A.cls", "classes/A.cls-meta.xml"]);
    }
}
