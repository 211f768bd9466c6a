//! Helpers for the singleton-vs-array quirk that shows up in both the manifest XML
//! and the remote service's status payloads.

use serde::Deserialize;

/// A field that XML (de)serializers render as a bare value when there's exactly one,
/// and as a sequence when there's more than one.
///
/// Every call site that reads such a field should go through [`OneOrMany::into_vec`]
/// rather than branching on the shape itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_becomes_single_element_vec() {
        let one: OneOrMany<i32> = OneOrMany::One(7);
        assert_eq!(one.into_vec(), vec![7]);
    }

    #[test]
    fn many_passes_through() {
        let many: OneOrMany<i32> = OneOrMany::Many(vec![1, 2, 3]);
        assert_eq!(many.into_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn default_is_empty() {
        let default: OneOrMany<i32> = OneOrMany::default();
        assert_eq!(default.into_vec(), Vec::<i32>::new());
    }
}
