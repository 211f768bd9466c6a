//! `decomposedMerge`: recomposes a decomposed parent (e.g. `CustomObject`) and its
//! children into one merged metadata-format xml document, and splits a merged
//! document back into decomposed files.
//!
//! Convention: a child appears under the root as its own element, tagged with the
//! child type's presentational name (e.g. `<CustomField>...</CustomField>`), the way
//! a decomposed child file's root element is already named.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use md_component::component::SourceComponent;
use md_registry::MetadataType;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::{Error, WriteInstruction, WriteSource, WriterFormat};

pub async fn to_metadata_format(component: Arc<SourceComponent>) -> Result<WriterFormat, Error> {
    let Some(xml_path) = component.xml.clone() else {
        return Ok(WriterFormat {
            component,
            write_infos: Vec::new(),
        });
    };
    let parent_bytes = component.tree.read_file(&xml_path).await?;

    let mut children = component.children().await?;
    children.sort_by(|a, b| a.full_name().cmp(&b.full_name()));

    let mut child_bytes = Vec::new();
    for child in &children {
        if let Some(child_xml) = &child.xml {
            child_bytes.push(child.tree.read_file(child_xml).await?);
        }
    }

    let merged = merge_metadata_xml(&parent_bytes, &child_bytes)?;
    let suffix = component.ty.suffix.as_deref().unwrap_or_default();
    let output = PathBuf::from(&component.ty.directory_name)
        .join(format!("{}.{}", component.full_name(), suffix));

    Ok(WriterFormat {
        component,
        write_infos: vec![WriteInstruction {
            source: WriteSource::Bytes(Bytes::from(merged)),
            output,
        }],
    })
}

pub async fn to_source_format(
    component: Arc<SourceComponent>,
    merge_with: Option<Arc<SourceComponent>>,
) -> Result<WriterFormat, Error> {
    let Some(xml_path) = component.xml.clone() else {
        return Ok(WriterFormat {
            component,
            write_infos: Vec::new(),
        });
    };
    let merged_bytes = component.tree.read_file(&xml_path).await?;
    let suffix = component.ty.suffix.as_deref().unwrap_or_default();

    let base_dir = merge_with
        .as_ref()
        .map(|m| PathBuf::from(&m.ty.directory_name))
        .unwrap_or_else(|| PathBuf::from(&component.ty.directory_name));
    let full_name = merge_with
        .as_ref()
        .map(|m| m.full_name())
        .unwrap_or_else(|| component.full_name());

    let Some(children_meta) = component.ty.children.as_ref() else {
        return Ok(WriterFormat {
            component: Arc::clone(&component),
            write_infos: vec![WriteInstruction {
                source: WriteSource::Bytes(Bytes::from(merged_bytes)),
                output: base_dir.join(format!("{full_name}.{suffix}-meta.xml")),
            }],
        });
    };

    let type_by_tag: HashMap<String, &'static MetadataType> = children_meta
        .types
        .values()
        .map(|ty| (ty.name.clone(), ty))
        .collect();

    let (parent_body, children) = split_metadata_children(&merged_bytes, &type_by_tag)?;

    let mut write_infos = vec![WriteInstruction {
        source: WriteSource::Bytes(Bytes::from(parent_body)),
        output: base_dir.join(format!("{full_name}.{suffix}-meta.xml")),
    }];

    for (child_ty, child_bytes) in children {
        let child_suffix = child_ty.suffix.as_deref().unwrap_or_default();
        let child_name = extract_full_name(&child_bytes).unwrap_or_else(|| "Unknown".to_string());
        let output = base_dir
            .join(&full_name)
            .join(&child_ty.directory_name)
            .join(format!("{child_name}.{child_suffix}-meta.xml"));
        write_infos.push(WriteInstruction {
            source: WriteSource::Bytes(Bytes::from(wrap_with_declaration(&child_bytes))),
            output,
        });
    }

    Ok(WriterFormat {
        component,
        write_infos,
    })
}

/// Streams `parent_bytes`' events back out, splicing every `children_bytes` element
/// (xml declaration stripped) just before the root's closing tag.
fn merge_metadata_xml(parent_bytes: &[u8], children_bytes: &[Vec<u8>]) -> Result<Vec<u8>, Error> {
    let mut reader = Reader::from_reader(parent_bytes);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0i32;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Xml(e.to_string()))?;
        if matches!(event, Event::Eof) {
            break;
        }
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        let closing_root = matches!(event, Event::End(_)) && depth == 0;
        if closing_root {
            for child in children_bytes {
                if let Some(body) = strip_xml_declaration(child) {
                    writer.get_mut().extend_from_slice(b"\n    ");
                    writer.get_mut().extend_from_slice(body);
                }
            }
        }
        writer
            .write_event(event.into_owned())
            .map_err(|e| Error::Xml(e.to_string()))?;
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Splits `bytes` into `(parent body without recognized children, extracted
/// children)`. A direct child of the root whose tag matches a key in `type_by_tag`
/// is pulled out whole (attributes, text, and nested elements) and excluded from the
/// parent body.
fn split_metadata_children(
    bytes: &[u8],
    type_by_tag: &HashMap<String, &'static MetadataType>,
) -> Result<(Vec<u8>, Vec<(&'static MetadataType, Vec<u8>)>), Error> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut parent_writer = Writer::new(Vec::new());
    let mut children = Vec::new();
    let mut depth = 0i32;
    let mut capture: Option<(&'static MetadataType, i32, Writer<Vec<u8>>)> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Xml(e.to_string()))?;
        if matches!(event, Event::Eof) {
            break;
        }
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }

        if let Some((_, base_depth, child_writer)) = capture.as_mut() {
            child_writer
                .write_event(event.clone().into_owned())
                .map_err(|e| Error::Xml(e.to_string()))?;
            if matches!(event, Event::End(_)) && depth == *base_depth - 1 {
                let (ty, _, child_writer) = capture.take().unwrap();
                children.push((ty, child_writer.into_inner()));
            }
            buf.clear();
            continue;
        }

        let candidate_tag = match &event {
            Event::Start(e) if depth == 2 => {
                Some((String::from_utf8_lossy(e.local_name().as_ref()).into_owned(), false))
            }
            Event::Empty(e) if depth == 1 => {
                Some((String::from_utf8_lossy(e.local_name().as_ref()).into_owned(), true))
            }
            _ => None,
        };

        if let Some((tag, is_empty)) = candidate_tag {
            if let Some(ty) = type_by_tag.get(&tag) {
                let mut child_writer = Writer::new(Vec::new());
                child_writer
                    .write_event(event.clone().into_owned())
                    .map_err(|e| Error::Xml(e.to_string()))?;
                if is_empty {
                    children.push((*ty, child_writer.into_inner()));
                } else {
                    capture = Some((*ty, depth, child_writer));
                }
                buf.clear();
                continue;
            }
        }

        parent_writer
            .write_event(event.into_owned())
            .map_err(|e| Error::Xml(e.to_string()))?;
        buf.clear();
    }

    Ok((parent_writer.into_inner(), children))
}

fn strip_xml_declaration(bytes: &[u8]) -> Option<&[u8]> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.trim_start();
    let body = if let Some(rest) = text.strip_prefix("<?xml") {
        let end = rest.find("?>")? + 2;
        rest[end..].trim_start()
    } else {
        text
    };
    Some(body.as_bytes())
}

fn wrap_with_declaration(body: &[u8]) -> Vec<u8> {
    let mut out = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n".to_vec();
    out.extend_from_slice(body);
    out
}

fn extract_full_name(bytes: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut in_full_name = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"fullName" => {
                in_full_name = true;
            }
            Ok(Event::Text(e)) if in_full_name => {
                return e.decode().ok().map(|s| s.into_owned());
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"fullName" => {
                in_full_name = false;
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_ignore::IgnoreMatcher;
    use md_tree::virtual_tree::{VirtualEntry, VirtualTree};
    use md_tree::Tree;

    fn custom_object_tree() -> Arc<dyn Tree> {
        Arc::new(VirtualTree::from_entries([
            (PathBuf::from("objects"), vec![VirtualEntry::directory("Acc__c")]),
            (
                PathBuf::from("objects/Acc__c"),
                vec![
                    VirtualEntry::file(
                        "Acc__c.object-meta.xml",
                        b"<CustomObject xmlns=\"urn:metadata\"><label>Account</label></CustomObject>"
                            .to_vec(),
                    ),
                    VirtualEntry::directory("fields"),
                ],
            ),
            (
                PathBuf::from("objects/Acc__c/fields"),
                vec![VirtualEntry::file(
                    "F__c.field-meta.xml",
                    b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<CustomField><fullName>F__c</fullName><type>Text</type></CustomField>"
                        .to_vec(),
                )],
            ),
        ]))
    }

    fn custom_object_component(tree: Arc<dyn Tree>) -> Arc<SourceComponent> {
        let ty = md_registry::Registry::global().get("customobject").unwrap();
        Arc::new(SourceComponent {
            name: "Acc__c".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("objects/Acc__c/Acc__c.object-meta.xml")),
            content: Some(PathBuf::from("objects/Acc__c")),
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        })
    }

    #[tokio::test]
    async fn merges_decomposed_child_into_parent_xml() {
        let component = custom_object_component(custom_object_tree());
        let format = to_metadata_format(component).await.unwrap();
        assert_eq!(format.write_infos.len(), 1);
        let bytes = format.write_infos[0].source.read_all().await.unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<CustomField>"));
        assert!(text.contains("<label>Account</label>"));
        assert_eq!(
            format.write_infos[0].output,
            PathBuf::from("objects/Acc__c.object")
        );
    }

    #[tokio::test]
    async fn splits_merged_xml_back_into_decomposed_files() {
        let merged = b"<CustomObject xmlns=\"urn:metadata\"><label>Account</label>\n    <CustomField><fullName>F__c</fullName><type>Text</type></CustomField></CustomObject>".to_vec();
        let tree: Arc<dyn Tree> = Arc::new(VirtualTree::from_entries([(
            PathBuf::from("objects"),
            vec![VirtualEntry::file("Acc__c.object", merged)],
        )]));
        let ty = md_registry::Registry::global().get("customobject").unwrap();
        let component = Arc::new(SourceComponent {
            name: "Acc__c".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("objects/Acc__c.object")),
            content: None,
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });

        let format = to_source_format(component, None).await.unwrap();
        assert_eq!(format.write_infos.len(), 2);
        assert!(format
            .write_infos
            .iter()
            .any(|w| w.output == PathBuf::from("objects/Acc__c.object-meta.xml")));
        assert!(format.write_infos.iter().any(|w| w.output
            == PathBuf::from("objects/Acc__c/fields/F__c.field-meta.xml")));
    }
}
