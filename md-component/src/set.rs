//! [`ComponentSet`]: a de-duplicating, wildcard-aware collection of components.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::component::{AbstractComponent, SourceComponent};
use crate::manifest::{Package, Types, METADATA_XMLNS};

/// A value interchangeable in a [`ComponentSet`]: either a fully materialized
/// source-backed component, or an abstract `{type, fullName}` pair (manifest entries,
/// wildcards).
#[derive(Clone, Debug)]
pub enum Member {
    Source(Arc<SourceComponent>),
    Abstract(AbstractComponent),
}

impl Member {
    pub fn type_id(&self) -> &str {
        match self {
            Member::Source(c) => &c.ty.id,
            Member::Abstract(c) => &c.type_id,
        }
    }

    pub fn full_name(&self) -> String {
        match self {
            Member::Source(c) => c.full_name(),
            Member::Abstract(c) => c.full_name.clone(),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Member::Source(c) => &c.ty.name,
            Member::Abstract(_) => "",
        }
    }

    fn simple_key(&self) -> String {
        format!("{}#{}", self.type_id(), self.full_name())
    }

    /// A secondary de-dup key for source-backed variants: `type.name + fullName + xml
    /// + content`, so two resolves of the same file pair don't create duplicate
    /// entries even if constructed independently.
    fn source_dedup_key(&self) -> Option<String> {
        match self {
            Member::Source(c) => Some(format!(
                "{}{}{}{}",
                c.ty.name,
                c.full_name(),
                c.xml.as_deref().unwrap_or_default().display(),
                c.content.as_deref().unwrap_or_default().display(),
            )),
            Member::Abstract(_) => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.full_name() == "*"
    }
}

/// A lazily-pulled iterator of members, exhausted the first time the set is
/// inspected (`has`, `add`, iteration, or `get_source_components`).
type Seed = Box<dyn Iterator<Item = Member> + Send>;

/// A de-duplicating, wildcard-aware collection of components.
///
/// Identity is `type.id # fullName`. Iteration yields each unique key exactly once,
/// in first-seen order.
pub struct ComponentSet {
    seed: Option<Seed>,
    members: BTreeMap<String, Member>,
    source_dedup: HashMap<String, ()>,
    order: Vec<String>,
}

impl Default for ComponentSet {
    fn default() -> Self {
        ComponentSet::new()
    }
}

impl ComponentSet {
    pub fn new() -> Self {
        ComponentSet {
            seed: None,
            members: BTreeMap::new(),
            source_dedup: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create a [`ComponentSet`] with a pre-seeded iterator that is only pulled to
    /// exhaustion the first time the set's state is observed.
    pub fn with_seed(seed: impl Iterator<Item = Member> + Send + 'static) -> Self {
        ComponentSet {
            seed: Some(Box::new(seed)),
            members: BTreeMap::new(),
            source_dedup: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Pulls the seed iterator to exhaustion without yielding anything to the caller.
    fn flush_no_yield(&mut self) {
        if let Some(mut seed) = self.seed.take() {
            for member in seed.by_ref() {
                self.insert(member);
            }
        }
    }

    fn insert(&mut self, member: Member) -> bool {
        if let Some(dedup_key) = member.source_dedup_key() {
            if self.source_dedup.contains_key(&dedup_key) {
                return false;
            }
            self.source_dedup.insert(dedup_key, ());
        }

        let key = member.simple_key();
        if self.members.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        let prev = self.members.insert(key, member);
        md_ore::assert_none!(prev);
        true
    }

    /// Add a member to the set explicitly.
    pub fn add(&mut self, member: Member) -> bool {
        self.flush_no_yield();
        self.insert(member)
    }

    /// Whether `type_id`/`full_name` (or a wildcard for `type_id`, or -- if this
    /// component has a parent -- either of those for the parent) is present.
    pub fn has_key(&mut self, type_id: &str, full_name: &str, parent: Option<(&str, &str)>) -> bool {
        self.flush_no_yield();
        self.has_key_flushed(type_id, full_name, parent)
    }

    fn has_key_flushed(&self, type_id: &str, full_name: &str, parent: Option<(&str, &str)>) -> bool {
        let simple = self.members.contains_key(&format!("{type_id}#{full_name}"));
        let wildcard = self.members.contains_key(&format!("{type_id}#*"));
        if simple || wildcard {
            return true;
        }
        if let Some((parent_type, parent_name)) = parent {
            return self.has_key_flushed(parent_type, parent_name, None);
        }
        false
    }

    /// Whether `member` (or its parent, recursively) is present -- see `has_key` for
    /// the wildcard-aware rule.
    pub fn has(&mut self, member: &Member) -> bool {
        let parent = match member {
            Member::Source(c) => c
                .parent
                .as_ref()
                .map(|p| (p.ty.id.clone(), p.full_name())),
            Member::Abstract(_) => None,
        };
        self.has_key(
            member.type_id(),
            &member.full_name(),
            parent.as_ref().map(|(t, n)| (t.as_str(), n.as_str())),
        )
    }

    /// Number of distinct members currently materialized (after flushing the seed).
    pub fn len(&mut self) -> usize {
        self.flush_no_yield();
        self.members.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Iterate over every unique member, in first-seen order.
    pub fn iter(&mut self) -> std::vec::IntoIter<&Member> {
        self.flush_no_yield();
        let members = &self.members;
        self.order
            .iter()
            .filter_map(|key| members.get(key))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Every source-backed component in the set.
    pub fn get_source_components(&mut self) -> Vec<Arc<SourceComponent>> {
        self.flush_no_yield();
        self.order
            .iter()
            .filter_map(|key| match self.members.get(key) {
                Some(Member::Source(c)) => Some(Arc::clone(c)),
                _ => None,
            })
            .collect()
    }

    /// Serializes the current set into a `Package` manifest, sorted and grouped by
    /// type name. A `folderContentType` rewrite collapses a folder-content child
    /// into its parent type's member list, the way the remote service expects.
    pub fn get_package_xml(&mut self, version: &str) -> Result<String, quick_xml::se::SeError> {
        self.flush_no_yield();

        let registry = md_registry::Registry::global();
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for key in &self.order {
            let Some(member) = self.members.get(key) else {
                continue;
            };
            let (type_id, full_name) = match member {
                Member::Source(c) => (c.ty.id.clone(), c.full_name()),
                Member::Abstract(a) => (a.type_id.clone(), a.full_name.clone()),
            };

            // Collapse a folder-content child's members into its parent's, per
            // `folderContentType`.
            let owning_type_id = registry
                .all_types()
                .find(|ty| ty.folder_content_type.as_deref() == Some(type_id.as_str()))
                .map(|ty| ty.id.clone())
                .unwrap_or(type_id);
            let display_name = registry
                .get(&owning_type_id)
                .map(|ty| ty.name.clone())
                .unwrap_or(owning_type_id);

            grouped.entry(display_name).or_default().push(full_name);
        }

        let types = grouped
            .into_iter()
            .map(|(name, mut members)| {
                members.sort();
                members.dedup();
                Types { name, members }
            })
            .collect();

        let package = Package {
            xmlns: METADATA_XMLNS.to_string(),
            types,
            version: version.to_string(),
        };
        quick_xml::se::to_string(&package)
    }
}
