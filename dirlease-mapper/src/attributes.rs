// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::collections::{BTreeMap, HashMap};

/// The attributes of a single directory entry.
///
/// Names are case-sensitive. Values keep the order the directory returned
/// them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attributes: HashMap<String, Vec<String>>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests.
    pub fn with<N, V, I>(mut self, name: N, values: I) -> Self
    where
        N: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = V>,
    {
        self.insert(name, values);
        self
    }

    /// Replace all values of `name`.
    pub fn insert<N, V, I>(&mut self, name: N, values: I) -> Option<Vec<String>>
    where
        N: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = V>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect())
    }

    /// Append a single value to `name`.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl From<HashMap<String, Vec<String>>> for AttributeSet {
    fn from(attributes: HashMap<String, Vec<String>>) -> Self {
        Self { attributes }
    }
}

impl<N: Into<String>> FromIterator<(N, Vec<String>)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (N, Vec<String>)>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for (name, values) in iter {
            set.insert(name, values);
        }
        set
    }
}

impl IntoIterator for AttributeSet {
    type Item = (String, Vec<String>);
    type IntoIter = std::collections::hash_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

/// One attribute value to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub name: String,
    pub value: String,
}

/// Replacement values to write to a single entry.
///
/// Produced by [`crate::AttributeMapper::map_from_instance`]. Absent members
/// never appear here, so applying a delta never deletes an attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDelta {
    changes: Vec<AttributeChange>,
}

impl AttributeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.changes.push(AttributeChange {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeChange> {
        self.changes.iter()
    }

    /// Values grouped per attribute name, in emission order.
    pub fn grouped(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for change in &self.changes {
            let values = grouped.entry(change.name.as_str()).or_default();
            if !values.contains(&change.value.as_str()) {
                values.push(change.value.as_str());
            }
        }
        grouped
    }
}

impl<'a> IntoIterator for &'a AttributeDelta {
    type Item = &'a AttributeChange;
    type IntoIter = std::slice::Iter<'a, AttributeChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl From<AttributeDelta> for AttributeSet {
    fn from(delta: AttributeDelta) -> Self {
        let mut set = AttributeSet::new();
        for change in delta.changes {
            set.push(change.name, change.value);
        }
        set
    }
}
