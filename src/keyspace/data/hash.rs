//! Hash data structure

use ahash::AHashMap;
use bytes::Bytes;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hash {
    fields: AHashMap<Bytes, Bytes>,
}

impl Hash {
    pub fn new() -> Self {
        Hash {
            fields: AHashMap::new(),
        }
    }

    /// Returns true if the field is new.
    pub fn set(&mut self, field: Bytes, value: Bytes) -> bool {
        self.fields.insert(field, value).is_none()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bytes> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.fields.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Bytes> {
        self.fields.values()
    }
}
