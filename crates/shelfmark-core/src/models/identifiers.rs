use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const ISBN: &str = "isbn";
pub const ASIN: &str = "asin";
pub const MOBI_ASIN: &str = "mobi-asin";

/// Identifier kind → value, at most one value per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierSet(BTreeMap<String, String>);

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Blank values are ignored.
    pub fn with(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(kind, value);
        self
    }

    pub fn insert(&mut self, kind: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.0.insert(kind.into(), value.to_string());
        }
    }

    pub fn get(&self, kind: &str) -> Option<&str> {
        self.0.get(kind).map(String::as_str)
    }

    pub fn isbn(&self) -> Option<&str> {
        self.get(ISBN)
    }

    /// Vendor id under the marketplace key, falling back to the e-book
    /// (`mobi-asin`) and generic (`asin`) kinds.
    pub fn vendor_id(&self, vendor_key: &str) -> Option<&str> {
        self.get(vendor_key)
            .or_else(|| self.get(MOBI_ASIN))
            .or_else(|| self.get(ASIN))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_is_empty() {
        let empty = IdentifierSet::default();
        assert!(empty.is_empty());

        let with_isbn = IdentifierSet::new().with(ISBN, "0982514506");
        assert!(!with_isbn.is_empty());
    }

    #[test]
    fn test_blank_values_are_dropped() {
        let ids = IdentifierSet::new().with(ISBN, "   ").with("amazon", "");
        assert!(ids.is_empty());
    }

    #[test]
    fn test_vendor_id_fallback_order() {
        let ids = IdentifierSet::new()
            .with(ASIN, "B000GENERIC")
            .with(MOBI_ASIN, "B000MOBI");
        assert_eq!(ids.vendor_id("amazon"), Some("B000MOBI"));

        let ids = ids.with("amazon", "B000MAIN");
        assert_eq!(ids.vendor_id("amazon"), Some("B000MAIN"));
        assert_eq!(ids.vendor_id("amazon_uk"), Some("B000MOBI"));
    }

    #[test]
    fn test_one_value_per_kind() {
        let ids = IdentifierSet::new().with(ISBN, "111").with(ISBN, "222");
        assert_eq!(ids.isbn(), Some("222"));
        assert_eq!(ids.iter().count(), 1);
    }
}
