//! [`MetadataComponent`] / [`SourceComponent`]: the typed logical unit everything else
//! in this workspace operates on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use md_ignore::IgnoreMatcher;
use md_registry::MetadataType;
use md_tree::Tree;

/// Which on-disk layout a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The decomposed source-tree layout, rooted at a project package root.
    Source,
    /// The flat packaged layout (what gets zipped up and deployed).
    Metadata,
}

/// An abstract component: just enough to identify a member of the remote service's
/// type system. Used for manifest-derived entries and wildcard members that have no
/// backing files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractComponent {
    pub type_id: String,
    pub full_name: String,
}

/// A concrete, source-backed component: a [`MetadataComponent`] that also knows where
/// its `xml` and/or `content` live.
#[derive(Clone)]
pub struct SourceComponent {
    /// This component's own name, with no parent/namespace prefix.
    pub name: String,
    pub ty: &'static MetadataType,
    pub parent: Option<Arc<SourceComponent>>,
    pub xml: Option<PathBuf>,
    pub content: Option<PathBuf>,
    pub tree: Arc<dyn Tree>,
    pub ignore: Arc<IgnoreMatcher>,
}

impl std::fmt::Debug for SourceComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceComponent")
            .field("name", &self.name)
            .field("type", &self.ty.id)
            .field("full_name", &self.full_name())
            .field("xml", &self.xml)
            .field("content", &self.content)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("component {full_name} of type {type_id} has neither an xml nor a content path")]
    NoFiles { type_id: String, full_name: String },
    #[error(transparent)]
    Tree(#[from] md_tree::Error),
}

impl SourceComponent {
    /// The dotted, folder-prefixed, or plain identifier naming this instance within
    /// its type. This implementation contracts the dotted form for parented
    /// components (see the open question recorded in DESIGN.md).
    pub fn full_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}", parent.full_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// Validates the invariant that a source component has at least one of
    /// `xml`/`content`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.xml.is_none() && self.content.is_none() {
            return Err(Error::NoFiles {
                type_id: self.ty.id.clone(),
                full_name: self.full_name(),
            });
        }
        Ok(())
    }

    /// Yields this component's children, if its type has any.
    ///
    /// Decomposed types walk `content`; non-decomposed types (an `elementParser` in
    /// `type.strategies`) parse elements out of `xml`. Only top-level (unparented)
    /// components can have children -- a child component's own type never recurses
    /// further.
    pub async fn children(self: &Arc<Self>) -> Result<Vec<SourceComponent>, Error> {
        if self.parent.is_some() {
            return Ok(Vec::new());
        }
        let Some(children_meta) = &self.ty.children else {
            return Ok(Vec::new());
        };

        let children = if let Some(content) = &self.content {
            self.walk_decomposed_children(content, children_meta).await
        } else if let (Some(xml), Some(parser)) =
            (&self.xml, &self.ty.strategies.element_parser)
        {
            self.parse_inline_children(xml, children_meta, parser).await
        } else {
            Ok(Vec::new())
        }?;
        tracing::trace!(
            parent = %self.full_name(),
            count = children.len(),
            "resolved children"
        );
        Ok(children)
    }

    async fn walk_decomposed_children(
        self: &Arc<Self>,
        content: &Path,
        children_meta: &md_registry::Children,
    ) -> Result<Vec<SourceComponent>, Error> {
        let mut out = Vec::new();
        self.walk_decomposed_dir(content, children_meta, &mut out)
            .await?;
        Ok(out)
    }

    fn walk_decomposed_dir<'a>(
        self: &'a Arc<Self>,
        dir: &'a Path,
        children_meta: &'a md_registry::Children,
        out: &'a mut Vec<SourceComponent>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + 'a>> {
        Box::pin(async move {
            for entry in self.tree.read_directory(dir).await? {
                let path = dir.join(&entry);
                if self.ignore.denies(&path) {
                    continue;
                }
                if self.tree.is_directory(&path).await? {
                    self.walk_decomposed_dir(&path, children_meta, out).await?;
                    continue;
                }
                let Some((child_type_id, stripped_name)) =
                    match_child_suffix(&entry, &children_meta.suffixes)
                else {
                    continue;
                };
                let Some(child_ty) = md_registry::Registry::global().get(&child_type_id) else {
                    continue;
                };
                out.push(SourceComponent {
                    name: stripped_name,
                    ty: child_ty,
                    parent: Some(Arc::clone(self)),
                    xml: Some(path.clone()),
                    content: None,
                    tree: Arc::clone(&self.tree),
                    ignore: Arc::clone(&self.ignore),
                });
            }
            Ok(())
        })
    }

    async fn parse_inline_children(
        self: &Arc<Self>,
        xml: &Path,
        children_meta: &md_registry::Children,
        parser: &md_registry::ElementParser,
    ) -> Result<Vec<SourceComponent>, Error> {
        let Some(child_type_id) = children_meta.types.keys().next() else {
            return Ok(Vec::new());
        };
        let Some(child_ty) = md_registry::Registry::global().get(child_type_id) else {
            return Ok(Vec::new());
        };
        let bytes = self.tree.read_file(xml).await?;
        let names = extract_element_names(&bytes, parser);

        Ok(names
            .into_iter()
            .map(|name| SourceComponent {
                name,
                ty: child_ty,
                parent: Some(Arc::clone(self)),
                xml: Some(xml.to_path_buf()),
                content: None,
                tree: Arc::clone(&self.tree),
                ignore: Arc::clone(&self.ignore),
            })
            .collect())
    }

    /// Computes where a file under this component belongs in the target format.
    ///
    /// For content files, this is the path relative to the package root: when
    /// `merge_with` is given, the destination preserves `source`'s relative suffix
    /// past this component's `content` root, rebased onto `merge_with`'s `content`.
    pub fn get_package_relative_path(
        &self,
        source: &Path,
        target: Format,
        merge_with: Option<&SourceComponent>,
    ) -> PathBuf {
        if Some(source) == self.xml.as_deref() {
            return self.xml_relative_path(target);
        }

        if let Some(merge_with) = merge_with {
            if let Some(own_content) = &self.content {
                if let Ok(suffix) = source.strip_prefix(own_content) {
                    if let Some(dest_root) = &merge_with.content {
                        return dest_root.join(suffix);
                    }
                }
            }
        }

        self.content_relative_path(source, target)
    }

    /// For a file nested under a directory `content` root (e.g. a MixedContent bundle
    /// like `staticresource`), preserves the subtree suffix past that root so sibling
    /// subdirectories don't collapse onto each other. For a single-file `content`
    /// (`source` equal to the root itself), falls back to just the file name.
    fn content_relative_path(&self, source: &Path, _target: Format) -> PathBuf {
        let suffix = match &self.content {
            Some(content_root) => match source.strip_prefix(content_root) {
                Ok(suffix) if !suffix.as_os_str().is_empty() => suffix.to_path_buf(),
                _ => source.file_name().map(PathBuf::from).unwrap_or_default(),
            },
            None => source.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        self.type_root().join(suffix)
    }

    fn xml_relative_path(&self, target: Format) -> PathBuf {
        let base = self.type_root();
        let file_name = match &self.xml {
            Some(xml) => xml
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            None => return base,
        };

        match target {
            Format::Metadata if self.content.is_none() => {
                base.join(strip_meta_xml_suffix(&file_name))
            }
            Format::Source if self.content.is_none() && !file_name.ends_with("-meta.xml") => {
                base.join(format!("{file_name}-meta.xml"))
            }
            _ => base.join(file_name),
        }
    }

    /// The `directoryName[/folder]` prefix this component's files live under.
    fn type_root(&self) -> PathBuf {
        let mut root = PathBuf::from(&self.ty.directory_name);
        if self.ty.in_folder {
            if let Some(folder) = self.full_name().split('.').next() {
                if folder != self.full_name() {
                    root.push(folder);
                }
            }
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_tree::virtual_tree::{VirtualEntry, VirtualTree};

    fn apex_class_component(tree: Arc<dyn Tree>) -> SourceComponent {
        let ty = md_registry::Registry::global().get("apexclass").unwrap();
        SourceComponent {
            name: "A".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("classes/A.cls-meta.xml")),
            content: Some(PathBuf::from("classes/A.cls")),
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        }
    }

    fn empty_tree() -> Arc<dyn Tree> {
        Arc::new(VirtualTree::from_entries(Vec::<(PathBuf, Vec<VirtualEntry>)>::new()))
    }

    #[test]
    fn full_name_is_dotted_for_parented_components() {
        let parent_ty = md_registry::Registry::global().get("customobject").unwrap();
        let child_ty = md_registry::Registry::global().get("customfield").unwrap();
        let tree = empty_tree();
        let parent = Arc::new(SourceComponent {
            name: "Acc__c".to_string(),
            ty: parent_ty,
            parent: None,
            xml: Some(PathBuf::from("objects/Acc__c/Acc__c.object-meta.xml")),
            content: Some(PathBuf::from("objects/Acc__c")),
            tree: Arc::clone(&tree),
            ignore: Arc::new(IgnoreMatcher::empty()),
        });
        let child = SourceComponent {
            name: "F__c".to_string(),
            ty: child_ty,
            parent: Some(Arc::clone(&parent)),
            xml: Some(PathBuf::from("objects/Acc__c/fields/F__c.field-meta.xml")),
            content: None,
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        };
        assert_eq!(child.full_name(), "Acc__c.F__c");
        assert_eq!(parent.full_name(), "Acc__c");
    }

    #[test]
    fn validate_requires_xml_or_content() {
        let ty = md_registry::Registry::global().get("apexclass").unwrap();
        let component = SourceComponent {
            name: "A".to_string(),
            ty,
            parent: None,
            xml: None,
            content: None,
            tree: empty_tree(),
            ignore: Arc::new(IgnoreMatcher::empty()),
        };
        assert!(matches!(component.validate(), Err(Error::NoFiles { .. })));
    }

    #[test]
    fn package_relative_path_keeps_meta_xml_suffix_when_content_is_paired() {
        let component = apex_class_component(empty_tree());
        let path = component.get_package_relative_path(
            component.xml.as_deref().unwrap(),
            Format::Metadata,
            None,
        );
        assert_eq!(path, PathBuf::from("classes/A.cls-meta.xml"));
    }

    #[test]
    fn package_relative_path_strips_meta_xml_for_xml_only_components() {
        let ty = md_registry::Registry::global().get("reportfolder").unwrap();
        let component = SourceComponent {
            name: "MyFolder".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("reports/MyFolder-meta.xml")),
            content: None,
            tree: empty_tree(),
            ignore: Arc::new(IgnoreMatcher::empty()),
        };
        let path = component.get_package_relative_path(
            component.xml.as_deref().unwrap(),
            Format::Metadata,
            None,
        );
        assert_eq!(path, PathBuf::from("reports/MyFolder"));

        let metadata_format_component = SourceComponent {
            name: "MyFolder".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("reports/MyFolder")),
            content: None,
            tree: empty_tree(),
            ignore: Arc::new(IgnoreMatcher::empty()),
        };
        let back = metadata_format_component.get_package_relative_path(
            metadata_format_component.xml.as_deref().unwrap(),
            Format::Source,
            None,
        );
        assert_eq!(back, PathBuf::from("reports/MyFolder-meta.xml"));
    }

    #[test]
    fn package_relative_path_content_file_lands_under_type_root() {
        let component = apex_class_component(empty_tree());
        let path = component.get_package_relative_path(
            component.content.as_deref().unwrap(),
            Format::Metadata,
            None,
        );
        assert_eq!(path, PathBuf::from("classes/A.cls"));
    }

    #[test]
    fn package_relative_path_preserves_subdirectories_under_a_directory_content_root() {
        let ty = md_registry::Registry::global().get("staticresource").unwrap();
        let component = SourceComponent {
            name: "bundle".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("staticresources/bundle.resource-meta.xml")),
            content: Some(PathBuf::from("staticresources/bundle")),
            tree: empty_tree(),
            ignore: Arc::new(IgnoreMatcher::empty()),
        };

        let css = component.get_package_relative_path(
            &PathBuf::from("staticresources/bundle/css/index.js"),
            Format::Metadata,
            None,
        );
        let js = component.get_package_relative_path(
            &PathBuf::from("staticresources/bundle/js/index.js"),
            Format::Metadata,
            None,
        );

        assert_eq!(css, PathBuf::from("staticresources/css/index.js"));
        assert_eq!(js, PathBuf::from("staticresources/js/index.js"));
        assert_ne!(
            css, js,
            "same-named files in different subfolders must not collapse onto each other"
        );
    }

    #[test]
    fn package_relative_path_rebases_onto_merge_target_content_root() {
        let component = apex_class_component(empty_tree());
        let merge_with = SourceComponent {
            content: Some(PathBuf::from("force-app/main/default/classes/A.cls")),
            ..apex_class_component(empty_tree())
        };
        let path = component.get_package_relative_path(
            &PathBuf::from("classes/A.cls"),
            Format::Source,
            Some(&merge_with),
        );
        assert_eq!(path, PathBuf::from("force-app/main/default/classes/A.cls"));
    }

    #[tokio::test]
    async fn decomposed_children_are_promoted_from_matching_suffixes() {
        let ty = md_registry::Registry::global().get("customobject").unwrap();
        let tree: Arc<dyn Tree> = Arc::new(VirtualTree::from_entries([
            (
                PathBuf::from("objects/Acc__c"),
                vec![
                    VirtualEntry::file("Acc__c.object-meta.xml", b"<CustomObject/>".to_vec()),
                    VirtualEntry::directory("fields"),
                ],
            ),
            (
                PathBuf::from("objects/Acc__c/fields"),
                vec![VirtualEntry::file(
                    "F__c.field-meta.xml",
                    b"<CustomField/>".to_vec(),
                )],
            ),
        ]));
        let parent = Arc::new(SourceComponent {
            name: "Acc__c".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("objects/Acc__c/Acc__c.object-meta.xml")),
            content: Some(PathBuf::from("objects/Acc__c")),
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });

        let children = parent.children().await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].full_name(), "Acc__c.F__c");
        assert_eq!(children[0].ty.id, "customfield");
    }

    #[tokio::test]
    async fn a_child_component_never_recurses_further() {
        let ty = md_registry::Registry::global().get("customfield").unwrap();
        let parent_ty = md_registry::Registry::global().get("customobject").unwrap();
        let tree = empty_tree();
        let parent = Arc::new(SourceComponent {
            name: "Acc__c".to_string(),
            ty: parent_ty,
            parent: None,
            xml: Some(PathBuf::from("objects/Acc__c/Acc__c.object-meta.xml")),
            content: Some(PathBuf::from("objects/Acc__c")),
            tree: Arc::clone(&tree),
            ignore: Arc::new(IgnoreMatcher::empty()),
        });
        let child = Arc::new(SourceComponent {
            name: "F__c".to_string(),
            ty,
            parent: Some(parent),
            xml: Some(PathBuf::from("objects/Acc__c/fields/F__c.field-meta.xml")),
            content: None,
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });
        assert!(child.children().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inline_elements_are_parsed_into_children_via_element_parser() {
        let ty = md_registry::Registry::global().get("customlabels").unwrap();
        let xml = br#"<CustomLabels><labels><fullName>Greeting</fullName></labels><labels><fullName>Farewell</fullName></labels></CustomLabels>"#;
        let tree: Arc<dyn Tree> = Arc::new(VirtualTree::from_entries([(
            PathBuf::from("labels"),
            vec![VirtualEntry::file("CustomLabels.labels-meta.xml", xml.to_vec())],
        )]));
        let parent = Arc::new(SourceComponent {
            name: "CustomLabels".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("labels/CustomLabels.labels-meta.xml")),
            content: None,
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });

        let children = parent.children().await.unwrap();
        let names: Vec<String> = children.iter().map(|c| c.full_name()).collect();
        assert_eq!(names, vec!["Greeting".to_string(), "Farewell".to_string()]);
        assert!(children.iter().all(|c| c.ty.id == "customlabel"));
    }
}

fn strip_meta_xml_suffix(file_name: &str) -> String {
    file_name
        .strip_suffix("-meta.xml")
        .unwrap_or(file_name)
        .to_string()
}

/// Matches a decomposed child file name against `suffixes` (e.g.
/// `"field-meta.xml" -> "customfield"`), returning the child's type id and its
/// `fullName` (the file name with the matched suffix stripped).
fn match_child_suffix(
    file_name: &str,
    suffixes: &std::collections::HashMap<String, String>,
) -> Option<(String, String)> {
    for (suffix, type_id) in suffixes {
        let dotted = format!(".{suffix}");
        if let Some(stripped) = file_name.strip_suffix(&dotted) {
            return Some((type_id.clone(), stripped.to_string()));
        }
    }
    None
}

/// Pulls `nameAttr` values out of elements at `xmlPath` in a small, dependency-free
/// walk over the document's events -- good enough for the flat `<labels><fullName>`
/// shape this element parser targets.
fn extract_element_names(xml_bytes: &[u8], parser: &md_registry::ElementParser) -> Vec<String> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let element_name = parser
        .xml_path
        .rsplit('.')
        .next()
        .unwrap_or(&parser.xml_path);

    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    let mut in_target_element = false;
    let mut in_name_attr = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if local == element_name {
                    in_target_element = true;
                } else if in_target_element && local == parser.name_attr {
                    in_name_attr = true;
                }
            }
            Ok(Event::Text(e)) if in_name_attr => {
                if let Ok(text) = e.decode() {
                    names.push(text.into_owned());
                }
            }
            Ok(Event::End(ref e)) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if local == parser.name_attr {
                    in_name_attr = false;
                } else if local == element_name {
                    in_target_element = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    names
}
