use std::collections::BTreeMap;

/// Multimap from string key to an ordered list of string values.
///
/// Iteration order is key-sorted; values preserve insertion order within
/// a key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first value for `key`, if any value is present at all.
    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    /// The single value for `key`; `None` if absent OR if more than one
    /// value is present (callers that expect single-valued fields should
    /// use this to detect a malformed source record rather than silently
    /// taking the first value).
    pub fn one_value(&self, key: &str) -> Option<&str> {
        match self.values(key) {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key-sorted iteration over `(key, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flattened key-sorted iteration over every `(key, value)` pair,
    /// values in insertion order within a key.
    pub fn iter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iteration_is_key_sorted_values_insertion_ordered() {
        let mut m = Metadata::new();
        m.add("zeta", "1");
        m.add("alpha", "a");
        m.add("alpha", "b");

        let pairs: Vec<_> = m.iter_pairs().collect();
        assert_eq!(pairs, vec![("alpha", "a"), ("alpha", "b"), ("zeta", "1")]);
    }

    #[test]
    fn one_value_requires_exactly_one() {
        let mut m = Metadata::new();
        assert_eq!(m.one_value("k"), None);
        m.add("k", "v");
        assert_eq!(m.one_value("k"), Some("v"));
        m.add("k", "v2");
        assert_eq!(m.one_value("k"), None);
        assert_eq!(m.first_value("k"), Some("v"));
    }
}
