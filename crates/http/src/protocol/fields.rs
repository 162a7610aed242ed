//! Ordered, case-insensitive storage for header and trailer fields.
//!
//! Names are stored upper-cased; lookups fold the query the same way, so
//! callers may ask with any casing. Duplicate values are preserved in
//! arrival order. Values are raw bytes because `obs-text` is legal in
//! field content.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// `name (upper-cased) -> ordered values`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldMap {
    inner: BTreeMap<String, Vec<Bytes>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under a name, preserving duplicates in order.
    pub fn append(&mut self, name: &str, value: impl Into<Bytes>) {
        self.inner.entry(name.to_ascii_uppercase()).or_default().push(value.into());
    }

    /// All values for a name, any casing.
    pub fn get(&self, name: &str) -> Option<&[Bytes]> {
        self.inner.get(&name.to_ascii_uppercase()).map(Vec::as_slice)
    }

    /// The first value for a name, any casing.
    pub fn first(&self, name: &str) -> Option<&Bytes> {
        self.get(name).and_then(<[Bytes]>::first)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_uppercase())
    }

    /// Iterate `(name, values)` in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Bytes])> {
        self.inner.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Display for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, values) in self.iter() {
            write!(f, "    {name}: ")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "\"{}\"", String::from_utf8_lossy(value))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
