use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Ordered set of class labels; a label's position is its score index.
///
/// Labels are sorted lexicographically (byte order, so case-sensitive), which
/// keeps indices stable across training runs on the same data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVocabulary {
    labels: Vec<String>,
}

impl LabelVocabulary {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = labels.into_iter().map(|l| l.as_ref().to_string()).collect();
        Self {
            labels: unique.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|probe| probe.as_str().cmp(label))
            .ok()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_deduplicated() {
        let vocab = LabelVocabulary::from_labels(["siamese", "bengal", "siamese", "Abyssinian"]);
        assert_eq!(vocab.labels(), &["Abyssinian", "bengal", "siamese"]);
        assert_eq!(vocab.index_of("bengal"), Some(1));
        assert_eq!(vocab.index_of("Bengal"), None);
        assert_eq!(vocab.label(2), Some("siamese"));
        assert_eq!(vocab.label(3), None);
    }

    #[test]
    fn test_order_independent_of_input_order() {
        let a = LabelVocabulary::from_labels(["b", "a", "c"]);
        let b = LabelVocabulary::from_labels(["c", "b", "a", "a"]);
        assert_eq!(a, b);
    }
}
