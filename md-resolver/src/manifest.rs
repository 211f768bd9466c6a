//! Parses a manifest XML into `{type, fullName}` members, normalizing the
//! singleton-vs-array quirk and substituting folder types per `SPEC_FULL.md` §5.7.

use md_component::component::AbstractComponent;
use md_component::manifest::RawPackage;
use md_registry::Registry;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed manifest: {0}")]
    Malformed(#[from] quick_xml::DeError),
    #[error("unknown metadata type in manifest: {0}")]
    UnknownType(String),
}

/// The result of parsing a manifest: its members, projected to the folder type where
/// applicable, plus the manifest's own declared version.
#[derive(Debug, Clone)]
pub struct ManifestResolution {
    pub components: Vec<AbstractComponent>,
    pub version: String,
}

/// Parses manifest XML into a [`ManifestResolution`].
pub struct ManifestResolver;

impl ManifestResolver {
    /// Parses `xml`, resolving each `{typeName, fullName}` pair against `registry`.
    pub fn parse(xml: &str, registry: &'static Registry) -> Result<ManifestResolution, Error> {
        let raw: RawPackage = quick_xml::de::from_str(xml)?;
        let (types, version) = raw.normalize();

        let mut components = Vec::new();
        for (type_name, members) in types {
            let ty = registry
                .find_by_name(&type_name)
                .ok_or_else(|| Error::UnknownType(type_name.clone()))?;

            for full_name in members {
                // A folder-typed entry with no `/` denotes the folder component
                // itself, not a leaf inside it.
                let (type_id, full_name) = match &ty.folder_type {
                    Some(folder_type_id) if !full_name.contains('/') => {
                        (folder_type_id.clone(), full_name)
                    }
                    _ => (ty.id.clone(), full_name),
                };
                components.push(AbstractComponent { type_id, full_name });
            }
        }

        Ok(ManifestResolution { components, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Package xmlns="http://soap.sforce.com/2006/04/metadata">
    <types>
        <members>A</members>
        <members>B</members>
        <name>ApexClass</name>
    </types>
    <types>
        <members>MyFolder</members>
        <name>Report</name>
    </types>
    <version>60.0</version>
</Package>"#;

    const SINGLETON_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Package xmlns="http://soap.sforce.com/2006/04/metadata">
    <types>
        <members>A</members>
        <name>ApexClass</name>
    </types>
    <version>60.0</version>
</Package>"#;

    #[test]
    fn singleton_and_array_members_parse_identically() {
        let registry = Registry::global();
        let array = ManifestResolver::parse(MANIFEST, registry).unwrap();
        let singleton = ManifestResolver::parse(SINGLETON_MANIFEST, registry).unwrap();
        assert!(array
            .components
            .iter()
            .any(|c| c.type_id == "apexclass" && c.full_name == "A"));
        assert!(singleton
            .components
            .iter()
            .any(|c| c.type_id == "apexclass" && c.full_name == "A"));
    }

    #[test]
    fn folder_type_substitution() {
        let registry = Registry::global();
        let resolution = ManifestResolver::parse(MANIFEST, registry).unwrap();
        let folder = resolution
            .components
            .iter()
            .find(|c| c.full_name == "MyFolder")
            .unwrap();
        assert_eq!(folder.type_id, "reportfolder");
    }

    #[test]
    fn leaf_inside_folder_keeps_its_own_type() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Package xmlns="http://soap.sforce.com/2006/04/metadata">
    <types>
        <members>MyFolder/MyReport</members>
        <name>Report</name>
    </types>
    <version>60.0</version>
</Package>"#;
        let registry = Registry::global();
        let resolution = ManifestResolver::parse(xml, registry).unwrap();
        assert_eq!(resolution.components[0].type_id, "report");
        assert_eq!(resolution.components[0].full_name, "MyFolder/MyReport");
    }
}
