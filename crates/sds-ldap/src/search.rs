//! Subtree searches and attribute collection.
//!
//! A search folds every returned entry into one [`AttributeMap`]. Each
//! attribute name is written once: the first value seen wins, and later
//! values for the same name, whether from the same entry or a later one,
//! are dropped. Callers rely on this ordering rule.

use std::collections::BTreeMap;

use ldap3::SearchEntry;
use sds_core::SdsResult;

use crate::connection::DirectoryConnection;

/// Parameters for one subtree search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base DN.
    pub search_base: String,
    /// LDAP filter.
    pub filter: String,
    /// Attributes to return; `None` returns all user attributes.
    pub attributes: Option<Vec<String>>,
    /// Entries per page; 0 leaves paging to the server.
    pub batch_size: u32,
}

impl SearchRequest {
    /// Creates a request for all attributes without paging.
    #[must_use]
    pub fn new(search_base: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            search_base: search_base.into(),
            filter: filter.into(),
            attributes: None,
            batch_size: 0,
        }
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Describes the request as `"{base} {filter} {attributes}"`.
    #[must_use]
    pub fn describe(&self) -> String {
        let attributes = self
            .attributes
            .as_ref()
            .map(|attrs| attrs.join(","))
            .unwrap_or_default();
        format!("{} {} {}", self.search_base, self.filter, attributes)
    }
}

/// One entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Attributes in the order they are folded.
    pub attributes: Vec<(String, Vec<String>)>,
}

impl DirectoryEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Converts an `ldap3` entry.
    ///
    /// `ldap3` does not keep the wire order of attributes, so text
    /// attributes are sorted by name. Binary attributes follow, decoded as
    /// lossy UTF-8.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry) -> Self {
        let mut text: Vec<_> = entry.attrs.into_iter().collect();
        text.sort_by(|a, b| a.0.cmp(&b.0));

        let mut binary: Vec<_> = entry
            .bin_attrs
            .into_iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .collect();
                (name, values)
            })
            .collect();
        binary.sort_by(|a, b| a.0.cmp(&b.0));

        text.extend(binary);

        Self {
            dn: entry.dn,
            attributes: text,
        }
    }
}

/// Attribute name to single value, accumulated across a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    values: BTreeMap<String, String>,
    entries: usize,
}

impl AttributeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one entry into the map.
    ///
    /// Only the first value of a multi-valued attribute is kept, and only
    /// if the name has not been seen before. Attributes without values are
    /// skipped.
    pub fn absorb(&mut self, entry: DirectoryEntry) {
        self.entries += 1;
        for (name, values) in entry.attributes {
            if let Some(first) = values.into_iter().next() {
                self.insert(name, first);
            }
        }
    }

    /// Inserts a value unless the name is already present.
    ///
    /// Returns true if the value was stored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        match self.values.entry(name.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Returns the value for an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no attribute was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of entries folded in.
    #[must_use]
    pub const fn entry_count(&self) -> usize {
        self.entries
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Runs a search and collects its attributes.
///
/// Returns `None` when the search produced no attributes at all.
///
/// ## Errors
///
/// Returns the connection's error unchanged.
pub async fn search(
    conn: &mut dyn DirectoryConnection,
    request: &SearchRequest,
) -> SdsResult<Option<AttributeMap>> {
    let mut map = AttributeMap::new();
    let entries = conn
        .search(request, &mut |entry: DirectoryEntry| map.absorb(entry))
        .await?;

    tracing::debug!(
        base = %request.search_base,
        filter = %request.filter,
        entries,
        attributes = map.len(),
        "Directory search completed"
    );

    Ok((!map.is_empty()).then_some(map))
}
