//! Writes a [`WriterFormat`] to a real directory on disk.
//!
//! Each component's files are first staged into a scratch subdirectory, then
//! durably persisted with a rename per file -- if staging fails partway through, the
//! scratch directory is discarded and nothing in the final tree is touched.

use std::path::{Path, PathBuf};

use md_transform::WriterFormat;

use crate::{read_all_staged, Error, Writer};

static SCRATCH_DIRECTORY_NAME: &str = ".md_scratch";

/// A [`Writer`] that streams output into `<root>/<output>`, creating directories as
/// needed.
pub struct StandardWriter {
    root: PathBuf,
}

impl StandardWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StandardWriter { root: root.into() }
    }
}

#[async_trait::async_trait]
impl Writer for StandardWriter {
    async fn write_component(&mut self, format: WriterFormat) -> Result<(), Error> {
        let component = format.component.full_name();
        let staged = read_all_staged(&format).await?;

        let scratch = self
            .root
            .join(SCRATCH_DIRECTORY_NAME)
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|source| io_err(&scratch, source))?;

        let result = stage_and_persist(&self.root, &scratch, staged).await;

        // Best-effort cleanup; the scratch root may already be gone if persisting
        // succeeded, or partially populated if it didn't -- either way it shouldn't
        // linger.
        let _ = tokio::fs::remove_dir_all(&scratch).await;

        tracing::debug!(component, root = %self.root.display(), "wrote component to disk");
        result
    }
}

async fn stage_and_persist(
    root: &Path,
    scratch: &Path,
    staged: Vec<(PathBuf, Vec<u8>)>,
) -> Result<(), Error> {
    let mut pending = Vec::with_capacity(staged.len());
    for (index, (output, bytes)) in staged.into_iter().enumerate() {
        let staged_path = scratch.join(index.to_string());
        tokio::fs::write(&staged_path, &bytes)
            .await
            .map_err(|source| io_err(&staged_path, source))?;
        pending.push((staged_path, root.join(&output)));
    }

    for (staged_path, final_path) in &pending {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }
        tokio::fs::rename(staged_path, final_path)
            .await
            .map_err(|source| io_err(final_path, source))?;
    }

    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
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
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_component_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let tree: Arc<dyn Tree> = Arc::new(VirtualTree::from_entries([(
            std::path::PathBuf::from("classes"),
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
            xml: Some(std::path::PathBuf::from("classes/A.cls-meta.xml")),
            content: Some(std::path::PathBuf::from("classes/A.cls")),
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });

        let format = TransformerKind::Default
            .to_metadata_format(component)
            .await
            .unwrap();

        let mut writer = StandardWriter::new(dir.path());
        writer.write_component(format).await.unwrap();

        let written = tokio::fs::read_to_string(dir.path().join("classes/A.cls"))
            .await
            .unwrap();
        assert_eq!(written, "public class A {}");
        assert!(!dir.path().join(SCRATCH_DIRECTORY_NAME).exists());
    }
}
