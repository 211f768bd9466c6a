//! Per-type strategies that turn a [`SourceComponent`] into write instructions for a
//! target format.
//!
//! Dispatch is by `type.strategies.transformer_id`. The default transformer passes
//! content straight through with a path rewrite; `bundleConcat` and
//! `decomposedMerge` handle the bundle and decomposed-to-merged-xml edge cases.

mod decomposed_merge;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use md_component::component::{Format, SourceComponent};
use md_tree::Tree;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown transformer id: {0}")]
    UnknownTransformer(String),
    #[error(transparent)]
    Tree(#[from] md_tree::Error),
    #[error(transparent)]
    Component(#[from] md_component::component::Error),
    #[error("malformed xml while merging decomposed children: {0}")]
    Xml(String),
}

/// Where a [`WriteInstruction`]'s bytes come from: a path in a [`Tree`] (read lazily,
/// possibly streamed), or bytes already materialized in memory (e.g. a merged xml
/// document built by a transformer).
#[derive(Clone)]
pub enum WriteSource {
    Path { tree: Arc<dyn Tree>, path: PathBuf },
    Bytes(Bytes),
}

impl WriteSource {
    pub async fn read_all(&self) -> Result<Vec<u8>, Error> {
        match self {
            WriteSource::Path { tree, path } => Ok(tree.read_file(path).await?),
            WriteSource::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }

    pub async fn stream(&self) -> Result<md_tree::ByteStream, Error> {
        match self {
            WriteSource::Path { tree, path } => Ok(tree.stream(path).await?),
            WriteSource::Bytes(bytes) => {
                let bytes = bytes.clone();
                let stream =
                    futures::stream::once(async move { Ok::<_, md_tree::Error>(bytes) });
                Ok(Box::pin(stream))
            }
        }
    }
}

/// A single `(source, destination)` pair consumed by a [`Writer`](../md_writer::Writer).
pub struct WriteInstruction {
    pub source: WriteSource,
    pub output: PathBuf,
}

/// A component plus the write instructions needed to materialize it in a target
/// format.
pub struct WriterFormat {
    pub component: Arc<SourceComponent>,
    pub write_infos: Vec<WriteInstruction>,
}

/// The transformer strategies a `MetadataType` can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerKind {
    Default,
    BundleConcat,
    DecomposedMerge,
}

impl TransformerKind {
    pub fn from_id(id: &str) -> Result<Self, Error> {
        match id {
            "default" => Ok(TransformerKind::Default),
            "bundleConcat" => Ok(TransformerKind::BundleConcat),
            "decomposedMerge" => Ok(TransformerKind::DecomposedMerge),
            other => Err(Error::UnknownTransformer(other.to_string())),
        }
    }

    pub async fn to_metadata_format(
        &self,
        component: Arc<SourceComponent>,
    ) -> Result<WriterFormat, Error> {
        tracing::trace!(transformer = ?self, component = %component.full_name(), "transforming to metadata format");
        match self {
            TransformerKind::Default => default::to_format(component, Format::Metadata, None).await,
            TransformerKind::BundleConcat => bundle_concat::to_format(component).await,
            TransformerKind::DecomposedMerge => {
                decomposed_merge::to_metadata_format(component).await
            }
        }
    }

    pub async fn to_source_format(
        &self,
        component: Arc<SourceComponent>,
        merge_with: Option<Arc<SourceComponent>>,
    ) -> Result<WriterFormat, Error> {
        match self {
            TransformerKind::Default => {
                default::to_format(component, Format::Source, merge_with).await
            }
            TransformerKind::BundleConcat => bundle_concat::to_format(component).await,
            TransformerKind::DecomposedMerge => {
                decomposed_merge::to_source_format(component, merge_with).await
            }
        }
    }
}

/// Recursively collects every file under `root` (or just `root` itself if it's a
/// file), in sorted order for deterministic, idempotent write ordering.
async fn collect_files(tree: &Arc<dyn Tree>, root: &Path) -> Result<Vec<PathBuf>, Error> {
    if !tree.is_directory(root).await? {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in tree.read_directory(&dir).await? {
            let path = dir.join(&entry);
            if tree.is_directory(&path).await? {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// The default pass-through transformer: every content file (or, for directory
/// content, every file under it) and the xml file get a path rewrite via
/// `get_package_relative_path`, with no byte transformation.
mod default {
    use super::*;

    pub async fn to_format(
        component: Arc<SourceComponent>,
        target: Format,
        merge_with: Option<Arc<SourceComponent>>,
    ) -> Result<WriterFormat, Error> {
        let mut write_infos = Vec::new();

        if let Some(content) = &component.content {
            for file in collect_files(&component.tree, content).await? {
                let output =
                    component.get_package_relative_path(&file, target, merge_with.as_deref());
                write_infos.push(WriteInstruction {
                    source: WriteSource::Path {
                        tree: Arc::clone(&component.tree),
                        path: file,
                    },
                    output,
                });
            }
        }

        if let Some(xml) = &component.xml {
            let output =
                component.get_package_relative_path(xml, target, merge_with.as_deref());
            write_infos.push(WriteInstruction {
                source: WriteSource::Path {
                    tree: Arc::clone(&component.tree),
                    path: xml.clone(),
                },
                output,
            });
        }

        Ok(WriterFormat {
            component,
            write_infos,
        })
    }
}

/// `bundleConcat`: every file in the bundle directory carries over unchanged in both
/// formats; sorted order makes repeated conversions byte-identical.
mod bundle_concat {
    use super::*;

    pub async fn to_format(component: Arc<SourceComponent>) -> Result<WriterFormat, Error> {
        let Some(content) = component.content.clone() else {
            return Ok(WriterFormat {
                component,
                write_infos: Vec::new(),
            });
        };

        let mut write_infos = Vec::new();
        for file in collect_files(&component.tree, &content).await? {
            let suffix = file
                .strip_prefix(&content)
                .unwrap_or(&file)
                .to_path_buf();
            let output = PathBuf::from(&component.ty.directory_name)
                .join(&component.full_name())
                .join(suffix);
            write_infos.push(WriteInstruction {
                source: WriteSource::Path {
                    tree: Arc::clone(&component.tree),
                    path: file,
                },
                output,
            });
        }

        Ok(WriterFormat {
            component,
            write_infos,
        })
    }
}
