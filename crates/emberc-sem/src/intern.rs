//! String literal interning.
//!
//! Maps string literal content to a stable numeric id. Ids feed the data
//! labels the emitter writes ahead of each interned string in the
//! read-only data section.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::element::ElementId;

pub struct StringInternMap {
    /// content -> intern id, in first-insertion order
    interned: IndexMap<String, u32>,
    /// string literal element -> intern id
    element_to_id: FxHashMap<ElementId, u32>,
    next_id: u32,
}

impl StringInternMap {
    pub fn new() -> Self {
        Self {
            interned: IndexMap::new(),
            element_to_id: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Intern a literal's content; the same content always yields the same
    /// id.
    pub fn intern(&mut self, element: ElementId, value: &str) -> u32 {
        let id = match self.interned.get(value) {
            Some(&id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.interned.insert(value.to_string(), id);
                id
            }
        };
        self.element_to_id.insert(element, id);
        id
    }

    /// Intern id previously assigned to a literal element.
    pub fn id(&self, element: ElementId) -> Option<u32> {
        self.element_to_id.get(&element).copied()
    }

    pub fn base_label_for_id(&self, id: u32) -> String {
        format!("_intern_str_lit_{id}")
    }

    pub fn data_label_for_id(&self, id: u32) -> String {
        format!("_intern_str_lit_{id}_data")
    }

    pub fn base_label(&self, element: ElementId) -> Option<String> {
        self.id(element).map(|id| self.base_label_for_id(id))
    }

    pub fn data_label(&self, element: ElementId) -> Option<String> {
        self.id(element).map(|id| self.data_label_for_id(id))
    }

    /// Interned strings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.interned.iter().map(|(value, &id)| (value.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }

    pub fn reset(&mut self) {
        self.interned.clear();
        self.element_to_id.clear();
        self.next_id = 1;
    }
}

impl Default for StringInternMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent_by_content() {
        let mut map = StringInternMap::new();
        let first = map.intern(ElementId(1), "hello");
        let second = map.intern(ElementId(2), "hello");
        assert_eq!(first, second);
        assert_eq!(map.len(), 1);
        assert_eq!(map.id(ElementId(1)), map.id(ElementId(2)));
    }

    #[test]
    fn test_distinct_content_distinct_ids() {
        let mut map = StringInternMap::new();
        let a = map.intern(ElementId(1), "a");
        let b = map.intern(ElementId(2), "b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_labels() {
        let mut map = StringInternMap::new();
        let id = map.intern(ElementId(1), "hello");
        assert_eq!(map.base_label_for_id(id), format!("_intern_str_lit_{id}"));
        assert_eq!(
            map.data_label_for_id(id),
            format!("_intern_str_lit_{id}_data")
        );
        assert_eq!(map.base_label(ElementId(1)).unwrap(), map.base_label_for_id(id));
    }

    #[test]
    fn test_iteration_order_is_insertion_order() {
        let mut map = StringInternMap::new();
        map.intern(ElementId(1), "zebra");
        map.intern(ElementId(2), "apple");
        map.intern(ElementId(3), "zebra");
        let order: Vec<_> = map.iter().map(|(value, _)| value.to_string()).collect();
        assert_eq!(order, vec!["zebra", "apple"]);
    }

    #[test]
    fn test_reset() {
        let mut map = StringInternMap::new();
        map.intern(ElementId(1), "x");
        map.reset();
        assert!(map.is_empty());
        assert_eq!(map.id(ElementId(1)), None);
    }
}
