//! List data structure

use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct List {
    items: VecDeque<Bytes>,
}

impl List {
    pub fn new() -> Self {
        List {
            items: VecDeque::new(),
        }
    }

    pub fn push_front(&mut self, value: Bytes) {
        #[cfg(debug_assertions)]
        let pre_len = self.items.len();

        self.items.push_front(value);

        // TigerStyle: Postconditions
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.items.len(),
            pre_len + 1,
            "Postcondition violated: len must increase by 1 after push_front"
        );
    }

    pub fn push_back(&mut self, value: Bytes) {
        #[cfg(debug_assertions)]
        let pre_len = self.items.len();

        self.items.push_back(value);

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.items.len(),
            pre_len + 1,
            "Postcondition violated: len must increase by 1 after push_back"
        );
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// LINDEX - element at index, negative indices count from the tail
    pub fn get(&self, index: isize) -> Option<&Bytes> {
        let len = self.items.len() as isize;
        let idx = if index < 0 { len + index } else { index };

        if idx < 0 || idx >= len {
            return None;
        }

        self.items.get(idx as usize)
    }

    /// LRANGE - inclusive `stop`, Redis index normalization
    pub fn range(&self, start: isize, stop: isize) -> Vec<Bytes> {
        let len = self.items.len() as isize;
        let start = if start < 0 {
            (len + start).max(0)
        } else {
            start.min(len)
        };
        let stop = if stop < 0 {
            (len + stop).max(-1)
        } else {
            stop.min(len - 1)
        };

        if start > stop || start >= len {
            return Vec::new();
        }

        self.items
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }

    /// LPOS - first index holding `value`
    pub fn position(&self, value: &[u8]) -> Option<usize> {
        self.items.iter().position(|item| item.as_ref() == value)
    }

    /// LREM - `count > 0` removes from the head, `count < 0` from the tail,
    /// `count == 0` removes every occurrence. Returns the number removed.
    pub fn remove(&mut self, count: isize, value: &[u8]) -> usize {
        #[cfg(debug_assertions)]
        let pre_len = self.items.len();

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs()
        };
        let mut removed = 0usize;

        if count >= 0 {
            let mut i = 0;
            while i < self.items.len() && removed < limit {
                if self.items[i].as_ref() == value {
                    self.items.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = self.items.len();
            while i > 0 && removed < limit {
                i -= 1;
                if self.items[i].as_ref() == value {
                    self.items.remove(i);
                    removed += 1;
                }
            }
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.items.len(),
            pre_len - removed,
            "Postcondition violated: len must shrink by removed count"
        );

        removed
    }

    /// LINSERT - insert next to the first occurrence of `pivot`.
    /// Returns the new length, or `None` when the pivot is absent.
    pub fn insert(&mut self, before: bool, pivot: &[u8], value: Bytes) -> Option<usize> {
        let at = self.position(pivot)?;
        let at = if before { at } else { at + 1 };
        self.items.insert(at, value);
        Some(self.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(items: &[&'static str]) -> List {
        let mut list = List::new();
        for item in items {
            list.push_back(Bytes::from_static(item.as_bytes()));
        }
        list
    }

    fn strings(items: Vec<Bytes>) -> Vec<String> {
        items
            .into_iter()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .collect()
    }

    #[test]
    fn test_list_range() {
        let list = list_of(&["a", "b", "c", "d"]);

        assert_eq!(strings(list.range(0, -1)), vec!["a", "b", "c", "d"]);
        assert_eq!(strings(list.range(1, 2)), vec!["b", "c"]);
        assert_eq!(strings(list.range(-2, -1)), vec!["c", "d"]);
        assert!(list.range(3, 1).is_empty());
        assert_eq!(strings(list.range(2, 100)), vec!["c", "d"]);
    }

    #[test]
    fn test_list_remove_directions() {
        let mut list = list_of(&["x", "a", "x", "b", "x"]);
        assert_eq!(list.remove(1, b"x"), 1);
        assert_eq!(strings(list.range(0, -1)), vec!["a", "x", "b", "x"]);

        assert_eq!(list.remove(-1, b"x"), 1);
        assert_eq!(strings(list.range(0, -1)), vec!["a", "x", "b"]);

        let mut list = list_of(&["x", "a", "x"]);
        assert_eq!(list.remove(0, b"x"), 2);
        assert_eq!(strings(list.range(0, -1)), vec!["a"]);
        assert_eq!(list.remove(0, b"missing"), 0);
    }

    #[test]
    fn test_list_insert_relative_to_pivot() {
        let mut list = list_of(&["a", "c"]);
        assert_eq!(list.insert(false, b"a", Bytes::from_static(b"b")), Some(3));
        assert_eq!(list.insert(true, b"a", Bytes::from_static(b"z")), Some(4));
        assert_eq!(strings(list.range(0, -1)), vec!["z", "a", "b", "c"]);
        assert_eq!(list.insert(true, b"nope", Bytes::from_static(b"q")), None);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_list_get_negative_index() {
        let list = list_of(&["a", "b", "c"]);
        assert_eq!(list.get(-1).map(|b| b.as_ref()), Some(&b"c"[..]));
        assert_eq!(list.get(0).map(|b| b.as_ref()), Some(&b"a"[..]));
        assert!(list.get(3).is_none());
        assert!(list.get(-4).is_none());
        assert_eq!(list.position(b"b"), Some(1));
    }
}
