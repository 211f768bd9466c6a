//! Per-type strategies for turning a path into a [`SourceComponent`].
//!
//! Dispatch is by `type.strategies.adapter_id`; an unknown id is a fatal
//! `RegistryError` at the resolver layer (`md-resolver` maps [`Error::UnknownAdapter`]
//! into its own error taxonomy).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use md_component::SourceComponent;
use md_ignore::IgnoreMatcher;
use md_registry::MetadataType;
use md_tree::Tree;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown adapter id: {0}")]
    UnknownAdapter(String),
    #[error(transparent)]
    Tree(#[from] md_tree::Error),
}

/// Shared context every adapter variant needs: which type it's building components
/// for, and the tree/ignore pair those components will carry.
#[derive(Clone)]
pub struct AdapterContext {
    pub ty: &'static MetadataType,
    pub tree: Arc<dyn Tree>,
    pub ignore: Arc<IgnoreMatcher>,
}

/// The five component-resolution strategies a `MetadataType` can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Base,
    MatchingContent,
    MixedContent,
    Bundle,
    Decomposed,
}

impl AdapterKind {
    pub fn from_id(id: &str) -> Result<Self, Error> {
        match id {
            "base" => Ok(AdapterKind::Base),
            "matchingContent" => Ok(AdapterKind::MatchingContent),
            "mixedContent" => Ok(AdapterKind::MixedContent),
            "bundle" => Ok(AdapterKind::Bundle),
            "decomposed" => Ok(AdapterKind::Decomposed),
            other => Err(Error::UnknownAdapter(other.to_string())),
        }
    }

    /// Whether a bare content file (no xml in hand yet) is enough for this adapter to
    /// resolve a full component by searching for its counterpart. When `false`, the
    /// resolver skips the content file and waits to reach its `xml` directly.
    pub fn allow_metadata_with_content(&self) -> bool {
        match self {
            AdapterKind::Base => false,
            AdapterKind::MatchingContent => true,
            AdapterKind::MixedContent => true,
            AdapterKind::Bundle => true,
            AdapterKind::Decomposed => false,
        }
    }

    pub async fn get_component(
        &self,
        ctx: &AdapterContext,
        fs_path: &Path,
        is_resolving_source: bool,
    ) -> Result<Option<SourceComponent>, Error> {
        tracing::trace!(adapter = ?self, path = %fs_path.display(), "resolving component via adapter");
        match self {
            AdapterKind::Base => base::get_component(ctx, fs_path).await,
            AdapterKind::MatchingContent => {
                matching_content::get_component(ctx, fs_path, is_resolving_source).await
            }
            AdapterKind::MixedContent => mixed_content::get_component(ctx, fs_path).await,
            AdapterKind::Bundle => bundle::get_component(ctx, fs_path).await,
            AdapterKind::Decomposed => decomposed::get_component(ctx, fs_path).await,
        }
    }
}

fn strip_meta_xml(file_name: &str) -> Option<&str> {
    file_name.strip_suffix("-meta.xml")
}

fn file_stem_before_suffix(file_name: &str, suffix: &str) -> Option<String> {
    file_name
        .strip_suffix(&format!(".{suffix}"))
        .map(|s| s.to_string())
}

/// `Base`: `xml` is the input path if it parses as metadata-xml; `content` is absent.
mod base {
    use super::*;

    pub async fn get_component(
        ctx: &AdapterContext,
        fs_path: &Path,
    ) -> Result<Option<SourceComponent>, Error> {
        let file_name = fs_path.file_name().unwrap_or_default().to_string_lossy();
        let Some(stripped) = strip_meta_xml(&file_name) else {
            return Ok(None);
        };
        // The folder-xml shape is `<name>-meta.xml`; a suffixed shape like
        // `X.object-meta.xml` has already been routed to a different type by the
        // resolver, so here we just take whatever is left after stripping `-meta.xml`.
        let name = stripped.to_string();

        Ok(Some(SourceComponent {
            name,
            ty: ctx.ty,
            parent: None,
            xml: Some(fs_path.to_path_buf()),
            content: None,
            tree: Arc::clone(&ctx.tree),
            ignore: Arc::clone(&ctx.ignore),
        }))
    }
}

/// `MatchingContent`: `X-meta.xml` paired with sibling `X.<suffix>`.
mod matching_content {
    use super::*;

    pub async fn get_component(
        ctx: &AdapterContext,
        fs_path: &Path,
        _is_resolving_source: bool,
    ) -> Result<Option<SourceComponent>, Error> {
        let suffix = ctx.ty.suffix.as_deref().unwrap_or_default();
        let file_name = fs_path.file_name().unwrap_or_default().to_string_lossy();
        let dir = fs_path.parent().unwrap_or_else(|| Path::new(""));

        if let Some(stripped) = file_name.strip_suffix(&format!(".{suffix}-meta.xml")) {
            // Given the xml: pair with the sibling content file.
            let content = dir.join(format!("{stripped}.{suffix}"));
            let content = ctx.tree.exists(&content).await?.then_some(content);
            return Ok(Some(SourceComponent {
                name: stripped.to_string(),
                ty: ctx.ty,
                parent: None,
                xml: Some(fs_path.to_path_buf()),
                content,
                tree: Arc::clone(&ctx.tree),
                ignore: Arc::clone(&ctx.ignore),
            }));
        }

        if let Some(stripped) = file_stem_before_suffix(&file_name, suffix) {
            // Given the content file: search for the sibling xml.
            let xml_path = dir.join(format!("{stripped}.{suffix}-meta.xml"));
            let xml = if ctx.tree.exists(&xml_path).await? {
                Some(xml_path)
            } else {
                None
            };
            return Ok(Some(SourceComponent {
                name: stripped,
                ty: ctx.ty,
                parent: None,
                xml,
                content: Some(fs_path.to_path_buf()),
                tree: Arc::clone(&ctx.tree),
                ignore: Arc::clone(&ctx.ignore),
            }));
        }

        Ok(None)
    }
}

/// `MixedContent`: content is a directory or a single file; xml is a sibling
/// `-meta.xml`. Resolving from any descendant ascends to the type's `directoryName`
/// layer, locates the root entry, then pairs.
mod mixed_content {
    use super::*;

    pub async fn get_component(
        ctx: &AdapterContext,
        fs_path: &Path,
    ) -> Result<Option<SourceComponent>, Error> {
        let Some(root_name) = ascend_to_type_root(ctx, fs_path) else {
            return Ok(None);
        };
        let dir = type_directory(ctx, fs_path);
        let content_candidates = [
            dir.join(&root_name),
            ctx.ty
                .suffix
                .as_deref()
                .map(|s| dir.join(format!("{root_name}.{s}")))
                .unwrap_or_default(),
        ];

        let mut content = None;
        for candidate in content_candidates {
            if candidate.as_os_str().is_empty() {
                continue;
            }
            if ctx.tree.exists(&candidate).await? {
                content = Some(candidate);
                break;
            }
        }

        let xml_file_name = match &ctx.ty.suffix {
            Some(suffix) => format!("{root_name}.{suffix}-meta.xml"),
            None => format!("{root_name}-meta.xml"),
        };
        let xml_path = dir.join(xml_file_name);
        let xml = if ctx.tree.exists(&xml_path).await? {
            Some(xml_path)
        } else {
            None
        };

        if content.is_none() && xml.is_none() {
            return Ok(None);
        }

        Ok(Some(SourceComponent {
            name: root_name,
            ty: ctx.ty,
            parent: None,
            xml,
            content,
            tree: Arc::clone(&ctx.tree),
            ignore: Arc::clone(&ctx.ignore),
        }))
    }

    /// Ascends from `fs_path` to the component's root entry name, i.e. the path
    /// component immediately under the type's `directoryName` (or in-folder
    /// directory).
    pub(super) fn ascend_to_type_root(ctx: &AdapterContext, fs_path: &Path) -> Option<String> {
        let components: Vec<_> = fs_path.components().collect();
        let dir_name = ctx.ty.directory_name.as_str();
        let dir_index = components.iter().position(|c| {
            c.as_os_str().to_string_lossy() == dir_name
        })?;
        let root_offset = if ctx.ty.in_folder { 2 } else { 1 };
        let root_component = components.get(dir_index + root_offset)?;
        let name = root_component.as_os_str().to_string_lossy().into_owned();
        // Strip a trailing suffix/`-meta.xml` if the root entry itself is a file.
        let name = name
            .strip_suffix("-meta.xml")
            .map(str::to_string)
            .unwrap_or(name);
        let name = match &ctx.ty.suffix {
            Some(suffix) => name
                .strip_suffix(&format!(".{suffix}"))
                .map(str::to_string)
                .unwrap_or(name),
            None => name,
        };
        Some(name)
    }

    pub(super) fn type_directory(ctx: &AdapterContext, fs_path: &Path) -> PathBuf {
        let components: Vec<_> = fs_path.components().collect();
        let dir_name = ctx.ty.directory_name.as_str();
        let Some(dir_index) = components
            .iter()
            .position(|c| c.as_os_str().to_string_lossy() == dir_name)
        else {
            return fs_path.parent().unwrap_or(fs_path).to_path_buf();
        };
        let take = if ctx.ty.in_folder {
            dir_index + 2
        } else {
            dir_index + 1
        };
        components
            .into_iter()
            .take(take)
            .collect::<PathBuf>()
    }
}

/// `Bundle`: like `MixedContent`, but `content` is always the directory named after
/// the component; walks never escape it.
mod bundle {
    use super::*;

    pub async fn get_component(
        ctx: &AdapterContext,
        fs_path: &Path,
    ) -> Result<Option<SourceComponent>, Error> {
        let Some(root_name) = mixed_content::ascend_to_type_root(ctx, fs_path) else {
            return Ok(None);
        };
        let dir = mixed_content::type_directory(ctx, fs_path);
        let content = dir.join(&root_name);

        if !ctx.tree.exists(&content).await? {
            return Ok(None);
        }

        Ok(Some(SourceComponent {
            name: root_name,
            ty: ctx.ty,
            parent: None,
            xml: None,
            content: Some(content),
            tree: Arc::clone(&ctx.tree),
            ignore: Arc::clone(&ctx.ignore),
        }))
    }
}

/// `Decomposed`: `content` is a directory; children are promoted by
/// [`SourceComponent::children`], not by this adapter directly.
mod decomposed {
    use super::*;

    pub async fn get_component(
        ctx: &AdapterContext,
        fs_path: &Path,
    ) -> Result<Option<SourceComponent>, Error> {
        let file_name = fs_path.file_name().unwrap_or_default().to_string_lossy();
        let suffix = ctx.ty.suffix.as_deref().unwrap_or_default();

        if let Some(stripped) = file_name.strip_suffix(&format!(".{suffix}-meta.xml")) {
            let content = fs_path
                .parent()
                .unwrap_or(fs_path)
                .join(stripped);
            let content = if ctx.tree.exists(&content).await? {
                Some(content)
            } else {
                None
            };
            return Ok(Some(SourceComponent {
                name: stripped.to_string(),
                ty: ctx.ty,
                parent: None,
                xml: Some(fs_path.to_path_buf()),
                content,
                tree: Arc::clone(&ctx.tree),
                ignore: Arc::clone(&ctx.ignore),
            }));
        }

        Ok(None)
    }
}
