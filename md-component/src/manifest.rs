//! The `Package` manifest shape shared between serialization (`ComponentSet::get_package_xml`)
//! and parsing (`md-resolver`'s `ManifestResolver`).

use serde::{Deserialize, Serialize};

use md_ore::xml::OneOrMany;

/// Raw, singleton-vs-array-ambiguous shape as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "Package")]
pub struct RawPackage {
    #[serde(rename = "types", default)]
    pub types: OneOrMany<RawTypes>,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTypes {
    pub name: String,
    #[serde(rename = "members", default)]
    pub members: OneOrMany<String>,
}

/// A normalized manifest: every `types` entry has its `members` as a plain `Vec`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "Package")]
pub struct Package {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    pub types: Vec<Types>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Types {
    pub name: String,
    pub members: Vec<String>,
}

pub const METADATA_XMLNS: &str = "http://soap.sforce.com/2006/04/metadata";

impl RawPackage {
    /// Normalize the singleton-vs-array ambiguity for both `types` and each entry's
    /// `members`.
    pub fn normalize(self) -> (Vec<(String, Vec<String>)>, String) {
        let types = self
            .types
            .into_vec()
            .into_iter()
            .map(|t| (t.name, t.members.into_vec()))
            .collect();
        (types, self.version)
    }
}
