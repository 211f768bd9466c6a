//! Orchestrates transformer dispatch over a [`ComponentSet`], feeding a chosen
//! [`Writer`] one component at a time.
//!
//! Transform work for independent components runs concurrently, bounded by a
//! [`Semaphore`] so the number of open file handles stays capped regardless of
//! component-set size; writer commits happen as each transform completes, one at a
//! time, since a single writer instance is scoped to one conversion call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use md_component::component::SourceComponent;
use md_component::ComponentSet;
use md_transform::{TransformerKind, WriterFormat};
use md_writer::Writer;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("deploy called with a component set containing no source-backed components")]
    DeployNoSource,
    #[error("conversion canceled before every component pipeline completed")]
    Canceled,
    #[error(transparent)]
    Transform(#[from] md_transform::Error),
    #[error(transparent)]
    Write(#[from] md_writer::Error),
}

/// A cooperative cancellation flag for a running [`Converter::convert`] call.
///
/// Setting it does not interrupt a component pipeline that has already started: that
/// pipeline's transform and write still run to completion (or roll back as a unit, per
/// the writer's own atomicity). It only stops remaining, not-yet-started pipelines from
/// being spawned.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which way components move: into the flat metadata layout, or back into the
/// decomposed source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToMetadata,
    ToSource,
}

/// Dispatches `Transformer`s over a set's source-backed components and feeds the
/// results to a [`Writer`], bounding how many component pipelines run at once.
pub struct Converter {
    concurrency: usize,
}

impl Converter {
    pub fn new(concurrency: usize) -> Self {
        Converter {
            concurrency: concurrency.max(1),
        }
    }

    /// Converts every source-backed component in `set` and writes the result via
    /// `writer`. `merge_targets`, when given, lets a `ToSource` conversion rebase each
    /// component's output onto an existing component of the same identity (used when
    /// merging a retrieved metadata set back onto a local source tree).
    pub async fn convert(
        &self,
        set: &mut ComponentSet,
        direction: Direction,
        merge_targets: Option<&mut ComponentSet>,
        writer: &mut dyn Writer,
    ) -> Result<(), Error> {
        self.convert_cancelable(set, direction, merge_targets, writer, None)
            .await
    }

    /// As [`Converter::convert`], but stops spawning new component pipelines as soon as
    /// `cancel` reports canceled. Pipelines already spawned run to completion and are
    /// still written.
    pub async fn convert_cancelable(
        &self,
        set: &mut ComponentSet,
        direction: Direction,
        merge_targets: Option<&mut ComponentSet>,
        writer: &mut dyn Writer,
        cancel: Option<&CancelToken>,
    ) -> Result<(), Error> {
        let components = set.get_source_components();
        if direction == Direction::ToMetadata && components.is_empty() {
            return Err(Error::DeployNoSource);
        }

        let merge_lookup = merge_targets.map(|targets| {
            targets
                .get_source_components()
                .into_iter()
                .map(|c| (identity_key(&c), c))
                .collect::<HashMap<_, _>>()
        });

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<WriterFormat, md_transform::Error>> = JoinSet::new();
        let mut canceled = false;
        for component in components {
            if cancel.is_some_and(CancelToken::is_canceled) {
                tracing::info!("conversion canceled, not spawning remaining component pipelines");
                canceled = true;
                break;
            }

            let transformer = TransformerKind::from_id(&component.ty.strategies.transformer_id)?;
            let merge_with = merge_lookup
                .as_ref()
                .and_then(|lookup| lookup.get(&identity_key(&component)))
                .cloned();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("converter semaphore never closes");
                match direction {
                    Direction::ToMetadata => transformer.to_metadata_format(component).await,
                    Direction::ToSource => {
                        transformer.to_source_format(component, merge_with).await
                    }
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            let format = result.expect("transform task panicked")?;
            tracing::debug!(component = %format.component.full_name(), "writing component");
            writer.write_component(format).await?;
        }

        if canceled {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

fn identity_key(component: &Arc<SourceComponent>) -> String {
    format!("{}#{}", component.ty.id, component.full_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_component::component::Format;
    use md_component::set::Member;
    use md_ignore::IgnoreMatcher;
    use md_tree::virtual_tree::{VirtualEntry, VirtualTree};
    use md_tree::Tree;
    use md_writer::{StandardWriter, ZipWriter};
    use std::path::PathBuf;

    fn apex_class_set() -> ComponentSet {
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
        let mut set = ComponentSet::new();
        set.add(Member::Source(component));
        set
    }

    #[tokio::test]
    async fn converts_and_writes_into_zip() {
        let mut set = apex_class_set();
        let converter = Converter::new(4);
        let mut writer = ZipWriter::new();
        converter
            .convert(&mut set, Direction::ToMetadata, None, &mut writer)
            .await
            .unwrap();
        let bytes = writer.finalize().unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("classes/A.cls").is_ok());
    }

    #[tokio::test]
    async fn converts_and_writes_to_standard_directory() {
        let mut set = apex_class_set();
        let converter = Converter::new(2);
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StandardWriter::new(dir.path());
        converter
            .convert(&mut set, Direction::ToMetadata, None, &mut writer)
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(dir.path().join("classes/A.cls"))
            .await
            .unwrap();
        assert_eq!(written, "public class A {}");
    }

    #[tokio::test]
    async fn deploy_with_no_source_components_fails() {
        let mut set = ComponentSet::new();
        let converter = Converter::new(1);
        let mut writer = ZipWriter::new();
        let err = converter
            .convert(&mut set, Direction::ToMetadata, None, &mut writer)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeployNoSource));
    }

    #[test]
    fn format_variants_are_distinguishable() {
        assert_ne!(Format::Source, Format::Metadata);
    }

    #[tokio::test]
    async fn cancel_before_any_pipeline_spawns_reports_canceled() {
        let mut set = apex_class_set();
        let converter = Converter::new(1);
        let mut writer = ZipWriter::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = converter
            .convert_cancelable(&mut set, Direction::ToMetadata, None, &mut writer, Some(&cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Canceled));
    }
}
