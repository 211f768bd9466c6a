//! The `MetadataType` record and its nested shapes, as loaded from the static catalog.

use std::collections::HashMap;

use serde::Deserialize;

/// Strategy ids a [`MetadataType`] uses for the adapter and transformer dispatch
/// tables, plus an optional element parser for non-decomposed XML children.
#[derive(Debug, Clone, Deserialize)]
pub struct Strategies {
    #[serde(rename = "adapterId")]
    pub adapter_id: String,
    #[serde(rename = "transformerId")]
    pub transformer_id: String,
    #[serde(rename = "elementParser", default)]
    pub element_parser: Option<ElementParser>,
}

/// Where to find non-decomposed children inline in a parent's XML.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementParser {
    #[serde(rename = "xmlPath")]
    pub xml_path: String,
    #[serde(rename = "nameAttr")]
    pub name_attr: String,
}

/// A decomposed (or element-parsed) type's children: the suffix that identifies a
/// child file, mapped to the child type's id, plus the child `MetadataType` records
/// themselves.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Children {
    /// `suffix -> child type id`, used by the `Decomposed` adapter to recognize a
    /// `-meta.xml` file living under a parent's content directory.
    pub suffixes: HashMap<String, String>,
    /// `child type id -> MetadataType`, the child records themselves.
    pub types: HashMap<String, MetadataType>,
}

/// An immutable, registry-owned record describing a category of component.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataType {
    /// Lowercased stable key.
    pub id: String,
    /// Presentational name, used in the manifest and in package-relative paths.
    pub name: String,
    /// Folder under the package root that components of this type live in.
    #[serde(rename = "directoryName")]
    pub directory_name: String,
    /// File-extension without the leading dot, if this type has a content file.
    #[serde(default)]
    pub suffix: Option<String>,
    /// Whether members are namespaced by an enclosing folder (e.g. Reports).
    #[serde(rename = "inFolder", default)]
    pub in_folder: bool,
    /// Whether files of this type must live directly under `directory_name`.
    #[serde(rename = "strictDirectoryName", default)]
    pub strict_directory_name: bool,
    /// The id of the companion folder type, if this type has folder members.
    #[serde(rename = "folderType", default)]
    pub folder_type: Option<String>,
    /// The id of the folder-content child type to collapse during package.xml
    /// serialization, if any.
    #[serde(rename = "folderContentType", default)]
    pub folder_content_type: Option<String>,
    /// Decomposed (or element-parsed) children, if this type has any.
    #[serde(default)]
    pub children: Option<Children>,
    /// Adapter/transformer dispatch ids.
    pub strategies: Strategies,
}

impl MetadataType {
    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }
}

/// The root shape of the static catalog JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub types: Vec<MetadataType>,
}
