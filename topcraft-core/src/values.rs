//! Insertion-ordered label maps for measurement results.

use fxhash::FxHashMap;

/// Map from label to value that remembers insertion order.
///
/// Re-inserting an existing label overwrites its value in place, so reports
/// list labels in the order they were first measured.
#[derive(Debug, Clone)]
pub struct ValueMap<T> {
    entries: Vec<(String, T)>,
    index: FxHashMap<String, usize>,
}

impl<T> Default for ValueMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T> ValueMap<T> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value, returning the previous one
    pub fn insert(&mut self, label: impl Into<String>, value: T) -> Option<T> {
        let label = label.into();
        if let Some(&idx) = self.index.get(&label) {
            if let Some(slot) = self.entries.get_mut(idx) {
                return Some(std::mem::replace(&mut slot.1, value));
            }
        }
        self.index.insert(label.clone(), self.entries.len());
        self.entries.push((label, value));
        None
    }

    /// Look up a label
    pub fn get(&self, label: &str) -> Option<&T> {
        self.index
            .get(label)
            .and_then(|&idx| self.entries.get(idx))
            .map(|(_, value)| value)
    }

    /// Mutable entry for a label, inserting `T::default()` when missing
    pub fn entry_or_default(&mut self, label: &str) -> &mut T
    where
        T: Default,
    {
        let idx = match self.index.get(label) {
            Some(&idx) => idx,
            None => {
                self.index.insert(label.to_string(), self.entries.len());
                self.entries.push((label.to_string(), T::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries
            .iter()
            .map(|(label, value)| (label.as_str(), value))
    }

    /// Mutable values in insertion order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    /// Labels in insertion order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

impl ValueMap<Vec<f64>> {
    /// Append a value to a label's series
    pub fn push(&mut self, label: &str, value: f64) {
        self.entry_or_default(label).push(value);
    }
}

impl<T> IntoIterator for ValueMap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ValueMap<T> {
    type Item = (&'a str, &'a T);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a T)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut map = ValueMap::new();
        map.insert("memory 1", 1.0);
        map.insert("memory 2", 2.0);
        map.insert("memory 1", 3.0);

        let labels: Vec<_> = map.labels().collect();
        assert_eq!(labels, vec!["memory 1", "memory 2"]);
        assert_eq!(map.get("memory 1"), Some(&3.0));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_push_series() {
        let mut map: ValueMap<Vec<f64>> = ValueMap::new();
        map.push("a", 1.0);
        map.push("b", 5.0);
        map.push("a", 2.0);

        assert_eq!(map.get("a"), Some(&vec![1.0, 2.0]));
        assert_eq!(map.get("b"), Some(&vec![5.0]));
    }

    #[test]
    fn test_clear() {
        let mut map = ValueMap::new();
        map.insert("x", 1u32);
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get("x"), None);
    }
}
