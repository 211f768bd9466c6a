//! Walks a [`Tree`] root and infers which typed component each file or directory
//! belongs to ([`resolve_source`]), and parses a manifest XML into `{type, fullName}`
//! members ([`ManifestResolver`]).

pub mod manifest;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use md_adapters::{AdapterContext, AdapterKind};
use md_component::component::SourceComponent;
use md_component::set::Member;
use md_component::ComponentSet;
use md_ignore::IgnoreMatcher;
use md_registry::{MetadataType, Registry};
use md_tree::Tree;

pub use manifest::{ManifestResolution, ManifestResolver};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("could not infer a metadata type for {0}")]
    TypeInferenceFailed(PathBuf),
    #[error(transparent)]
    Registry(#[from] md_registry::Error),
    #[error(transparent)]
    Adapter(#[from] md_adapters::Error),
    #[error(transparent)]
    Tree(#[from] md_tree::Error),
    #[error(transparent)]
    Ignore(#[from] md_ignore::Error),
    #[error(transparent)]
    Component(#[from] md_component::component::Error),
    #[error(transparent)]
    Manifest(#[from] manifest::Error),
}

/// Walks `paths` against `tree` and resolves every file/directory under them into a
/// [`ComponentSet`] of [`SourceComponent`]s. See the module-level algorithm in
/// `SPEC_FULL.md` §5.5 for the exact precedence rules.
///
/// `ignore_file_name` names the ignore-file `IgnoreMatcher::discover` looks for
/// ascending from each path (`md_ignore::DEFAULT_IGNORE_FILE_NAME` unless the caller
/// overrides it).
///
/// If `filter` is given, a component is yielded only if `filter.has(component)`;
/// otherwise only its children that are in the filter are yielded.
pub async fn resolve_source(
    tree: Arc<dyn Tree>,
    paths: &[PathBuf],
    ignore_file_name: &str,
    mut filter: Option<&mut ComponentSet>,
) -> Result<ComponentSet, Error> {
    tracing::debug!(paths = ?paths, ignore_file_name, "resolving source");
    let registry = Registry::global();
    let mut members = Vec::new();
    let mut consumed: HashSet<PathBuf> = HashSet::new();

    for path in paths {
        if !tree.exists(path).await? {
            tracing::warn!(path = %path.display(), "resolve path not found");
            return Err(Error::PathNotFound(path.clone()));
        }

        let ignore = Arc::new(discover_ignore(path, ignore_file_name));

        if tree.is_directory(path).await? {
            if let Some(ty) = resolve_directory_as_component(registry, &ignore, &tree, path).await? {
                let adapter_ctx = AdapterContext {
                    ty,
                    tree: Arc::clone(&tree),
                    ignore: Arc::clone(&ignore),
                };
                let adapter = AdapterKind::from_id(&ty.strategies.adapter_id)?;
                if let Some(component) = adapter.get_component(&adapter_ctx, path, true).await? {
                    mark_consumed(&mut consumed, &component);
                    yield_with_filter(component, filter.as_deref_mut(), &mut members).await?;
                }
            } else {
                walk_directory(
                    registry,
                    &tree,
                    &ignore,
                    path,
                    &mut consumed,
                    filter.as_deref_mut(),
                    &mut members,
                )
                .await?;
            }
        } else {
            if let Some(component) =
                resolve_component(registry, &tree, &ignore, path, true).await?
            {
                mark_consumed(&mut consumed, &component);
                yield_with_filter(component, filter.as_deref_mut(), &mut members).await?;
            }
        }
    }

    tracing::info!(count = members.len(), "resolved components");
    Ok(ComponentSet::with_seed(members.into_iter()))
}

fn discover_ignore(path: &Path, ignore_file_name: &str) -> IgnoreMatcher {
    IgnoreMatcher::discover(path, ignore_file_name).unwrap_or_else(|_| IgnoreMatcher::empty())
}

fn mark_consumed(consumed: &mut HashSet<PathBuf>, component: &SourceComponent) {
    if let Some(xml) = &component.xml {
        consumed.insert(xml.clone());
    }
    if let Some(content) = &component.content {
        consumed.insert(content.clone());
    }
}

fn is_consumed(consumed: &HashSet<PathBuf>, path: &Path) -> bool {
    consumed
        .iter()
        .any(|prefix| path == prefix || path.starts_with(prefix))
}

async fn yield_with_filter(
    component: SourceComponent,
    filter: Option<&mut ComponentSet>,
    out: &mut Vec<Member>,
) -> Result<(), Error> {
    let Some(filter) = filter else {
        out.push(Member::Source(Arc::new(component)));
        return Ok(());
    };

    let component = Arc::new(component);
    let member = Member::Source(Arc::clone(&component));
    if filter.has(&member) {
        out.push(member);
        return Ok(());
    }

    for child in component.children().await? {
        let child_member = Member::Source(Arc::new(child));
        if filter.has(&child_member) {
            out.push(child_member);
        }
    }
    Ok(())
}

/// Recursively walks `dir`, yielding a component per resolved file or sub-directory,
/// skipping ignored and already-consumed paths.
async fn walk_directory(
    registry: &'static Registry,
    tree: &Arc<dyn Tree>,
    ignore: &Arc<IgnoreMatcher>,
    dir: &Path,
    consumed: &mut HashSet<PathBuf>,
    mut filter: Option<&mut ComponentSet>,
    out: &mut Vec<Member>,
) -> Result<(), Error> {
    for entry in tree.read_directory(dir).await? {
        let path = dir.join(&entry);
        if ignore.denies(&path) || is_consumed(consumed, &path) {
            continue;
        }

        if tree.is_directory(&path).await? {
            if let Some(ty) = resolve_directory_as_component(registry, ignore, tree, &path).await? {
                let adapter_ctx = AdapterContext {
                    ty,
                    tree: Arc::clone(tree),
                    ignore: Arc::clone(ignore),
                };
                let adapter = AdapterKind::from_id(&ty.strategies.adapter_id)?;
                if let Some(component) = adapter.get_component(&adapter_ctx, &path, true).await? {
                    mark_consumed(consumed, &component);
                    yield_with_filter(component, filter.as_deref_mut(), out).await?;
                    continue;
                }
            }
            Box::pin(walk_directory(
                registry,
                tree,
                ignore,
                &path,
                consumed,
                filter.as_deref_mut(),
                out,
            ))
            .await?;
        } else if let Some(component) =
            resolve_component(registry, tree, ignore, &path, false).await?
        {
            mark_consumed(consumed, &component);
            yield_with_filter(component, filter.as_deref_mut(), out).await?;
        }
    }
    Ok(())
}

/// `resolve_component(fsPath, isResolvingSource)` from `SPEC_FULL.md` §5.5.
async fn resolve_component(
    registry: &'static Registry,
    tree: &Arc<dyn Tree>,
    ignore: &Arc<IgnoreMatcher>,
    fs_path: &Path,
    is_resolving_source: bool,
) -> Result<Option<SourceComponent>, Error> {
    let file_name = fs_path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_metadata_xml = file_name.ends_with("-meta.xml");

    if is_metadata_xml && ignore.denies(fs_path) {
        return Ok(None);
    }

    let Some(ty) = resolve_type(registry, fs_path) else {
        return Err(Error::TypeInferenceFailed(fs_path.to_path_buf()));
    };

    let adapter = AdapterKind::from_id(&ty.strategies.adapter_id)?;

    if !is_resolving_source && !is_metadata_xml && !adapter.allow_metadata_with_content() {
        if let Some(suffix) = &ty.suffix {
            if file_name.ends_with(&format!(".{suffix}")) {
                return Ok(None);
            }
        }
    }

    let adapter_ctx = AdapterContext {
        ty,
        tree: Arc::clone(tree),
        ignore: Arc::clone(ignore),
    };
    Ok(adapter
        .get_component(&adapter_ctx, fs_path, is_resolving_source)
        .await?)
}

/// `resolve_type(fsPath)` from `SPEC_FULL.md` §5.5, in its four-step precedence
/// order: strict-folder types, parse-as-metadata-xml, folder-style xml, extension as
/// suffix.
fn resolve_type(registry: &'static Registry, fs_path: &Path) -> Option<&'static MetadataType> {
    let segments: Vec<String> = fs_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let parent_segment = fs_path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned());

    // 1. Strict-folder types.
    for ty in registry.all_types().filter(|ty| ty.strict_directory_name) {
        if segments.iter().any(|s| s == &ty.directory_name) {
            let not_just_under_folder =
                !ty.in_folder || parent_segment.as_deref() != Some(ty.directory_name.as_str());
            if not_just_under_folder {
                return Some(ty);
            }
        }
    }

    let file_name = fs_path.file_name()?.to_string_lossy();
    if let Some(stripped) = file_name.strip_suffix("-meta.xml") {
        if let Some(dot_idx) = stripped.rfind('.') {
            // 2. `*.X-meta.xml`: look up by suffix `X`.
            let suffix = &stripped[dot_idx + 1..];
            if let Some(ty) = registry.find_by_suffix(suffix) {
                return Some(ty);
            }
        } else {
            // 3. Folder-style xml: `<name>-meta.xml` with no dot in `<name>`.
            if let Some(parent_dir_name) = &parent_segment {
                if let Some(ty) =
                    registry.find_type(|ty| &ty.directory_name == parent_dir_name && !ty.in_folder)
                {
                    return Some(ty);
                }
            }
        }
    }

    // 4. Extension as suffix.
    let ext = fs_path.extension()?.to_string_lossy();
    registry.find_by_suffix(&ext)
}

/// `resolve_directory_as_component(dir)` from `SPEC_FULL.md` §5.5: true only when a
/// type resolves, the type has no children, the path contains the type's
/// `directoryName`, and the directory is below the type-folder depth by the type's
/// folder offset (2 normally, 3 for `inFolder`).
async fn resolve_directory_as_component(
    registry: &'static Registry,
    _ignore: &Arc<IgnoreMatcher>,
    _tree: &Arc<dyn Tree>,
    dir: &Path,
) -> Result<Option<&'static MetadataType>, Error> {
    let Some(ty) = resolve_type(registry, dir) else {
        return Ok(None);
    };
    if ty.has_children() {
        return Ok(None);
    }

    let segments: Vec<String> = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let Some(dir_index) = segments.iter().position(|s| s == &ty.directory_name) else {
        return Ok(None);
    };

    let offset = if ty.in_folder { 3 } else { 2 };
    if segments.len() - dir_index == offset {
        Ok(Some(ty))
    } else {
        Ok(None)
    }
}
