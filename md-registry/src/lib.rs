//! Static catalog of [`MetadataType`] records, loaded once.
//!
//! The catalog is embedded at compile time and parsed the first time anything asks
//! for it; after that, lookups are constant-time except [`Registry::find_type`],
//! which is a deliberate linear scan reserved for the folder-style resolution edge
//! case (there just aren't enough types in a catalog for an index to pay for itself).

pub mod types;

use std::collections::HashMap;
use std::sync::OnceLock;

pub use types::{CatalogDocument, Children, ElementParser, MetadataType, Strategies};

static CATALOG_JSON: &str = include_str!("../catalog/metadata-types.json");

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse the metadata type catalog: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown metadata type: {0}")]
    UnknownType(String),
    #[error("unknown adapter id: {0}")]
    UnknownAdapter(String),
    #[error("unknown transformer id: {0}")]
    UnknownTransformer(String),
}

/// The in-memory catalog, addressable by id, name, suffix, directory name, and
/// folder type.
pub struct Registry {
    by_id: HashMap<String, MetadataType>,
    by_name: HashMap<String, String>,
    by_suffix: HashMap<String, String>,
    by_directory_name: Vec<String>,
    by_folder_type: HashMap<String, String>,
    api_version: String,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// Returns the process-wide [`Registry`], parsing the embedded catalog on first
    /// use.
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| {
            let registry =
                Registry::from_json(CATALOG_JSON).expect("embedded metadata catalog is malformed");
            tracing::info!(types = registry.by_id.len(), "loaded metadata type catalog");
            registry
        })
    }

    /// Parse a catalog document from JSON. Exposed for tests that want a smaller or
    /// different catalog than the embedded one.
    pub fn from_json(json: &str) -> Result<Registry, Error> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Ok(Registry::from_document(document))
    }

    fn from_document(document: CatalogDocument) -> Registry {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_suffix = HashMap::new();
        let mut by_directory_name = Vec::new();
        let mut by_folder_type = HashMap::new();

        for ty in document.types {
            by_name.insert(ty.name.clone(), ty.id.clone());
            if let Some(suffix) = &ty.suffix {
                by_suffix.insert(suffix.clone(), ty.id.clone());
            }
            by_directory_name.push(ty.id.clone());
            if let Some(folder_type) = &ty.folder_type {
                by_folder_type.insert(ty.id.clone(), folder_type.clone());
            }

            // Decomposed children are also independently addressable, e.g. by their
            // own suffix, so the resolver can classify a lone `*.field-meta.xml`.
            if let Some(children) = &ty.children {
                for (child_id, child_ty) in &children.types {
                    by_name.insert(child_ty.name.clone(), child_id.clone());
                    if let Some(suffix) = &child_ty.suffix {
                        by_suffix.insert(suffix.clone(), child_id.clone());
                    }
                    let prev = by_id.insert(child_id.clone(), child_ty.clone());
                    md_ore::assert_none!(prev, "metadata type id '{child_id}' registered more than once");
                }
            }

            let id = ty.id.clone();
            let prev = by_id.insert(id.clone(), ty);
            md_ore::assert_none!(prev, "metadata type id '{id}' registered more than once");
        }

        Registry {
            by_id,
            by_name,
            by_suffix,
            by_directory_name,
            by_folder_type,
            api_version: document.api_version,
        }
    }

    /// Look up a type by its lowercased stable id.
    pub fn get(&self, id: &str) -> Option<&MetadataType> {
        self.by_id.get(id)
    }

    /// Look up a type by its presentational name (as it appears in a manifest).
    pub fn find_by_name(&self, name: &str) -> Option<&MetadataType> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Look up a type by its file-extension suffix (without a leading dot).
    pub fn find_by_suffix(&self, suffix: &str) -> Option<&MetadataType> {
        self.by_suffix.get(suffix).and_then(|id| self.by_id.get(id))
    }

    /// Every registered type whose `directory_name` equals `directory_name`.
    pub fn find_by_directory_name<'a>(
        &'a self,
        directory_name: &'a str,
    ) -> impl Iterator<Item = &'a MetadataType> + 'a {
        self.by_directory_name
            .iter()
            .filter_map(move |id| self.by_id.get(id))
            .filter(move |ty| ty.directory_name == directory_name)
    }

    /// The folder type paired with `type_id`, if any.
    pub fn folder_type_of(&self, type_id: &str) -> Option<&MetadataType> {
        let folder_id = self.by_folder_type.get(type_id)?;
        self.by_id.get(folder_id)
    }

    /// A linear scan used only by the folder-style XML resolution edge case.
    pub fn find_type(&self, predicate: impl Fn(&MetadataType) -> bool) -> Option<&MetadataType> {
        self.by_id.values().find(|ty| predicate(ty))
    }

    /// The catalog-declared API version.
    pub fn get_api_version(&self) -> &str {
        &self.api_version
    }

    /// All registered types, for iteration (e.g. by the resolver's strict-directory
    /// pass, or by `ComponentSet::get_package_xml`'s type-name sort).
    pub fn all_types(&self) -> impl Iterator<Item = &MetadataType> {
        self.by_id.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_catalog_parses_and_has_api_version() {
        let registry = Registry::global();
        assert_eq!(registry.get_api_version(), "60.0");
        assert!(registry.get("apexclass").is_some());
    }

    #[test]
    fn find_by_suffix_resolves_apex_class() {
        let registry = Registry::global();
        let ty = registry.find_by_suffix("cls").unwrap();
        assert_eq!(ty.id, "apexclass");
    }

    #[test]
    fn find_by_name_is_case_sensitive_to_catalog_presentation() {
        let registry = Registry::global();
        assert!(registry.find_by_name("ApexClass").is_some());
        assert!(registry.find_by_name("apexclass").is_none());
    }

    #[test]
    fn folder_type_of_report_is_report_folder() {
        let registry = Registry::global();
        let folder = registry.folder_type_of("report").unwrap();
        assert_eq!(folder.id, "reportfolder");
    }

    #[test]
    fn decomposed_children_are_independently_addressable() {
        let registry = Registry::global();
        let field_type = registry.find_by_suffix("field").unwrap();
        assert_eq!(field_type.id, "customfield");
    }
}
