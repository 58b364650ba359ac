use std::collections::HashMap;

/// Dense slot assignment for detector (or monitor) ids.
///
/// Ids keep the order they were first seen in; duplicates are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorIndexMap {
    slots: HashMap<i64, usize>,
    ids: Vec<i64>,
}

impl DetectorIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut map = Self::new();
        for id in ids {
            map.insert(id);
        }
        map
    }

    /// Assign the next slot to `id` unless it already has one.
    pub fn insert(&mut self, id: i64) -> usize {
        if let Some(&slot) = self.slots.get(&id) {
            return slot;
        }
        let slot = self.ids.len();
        self.slots.insert(id, slot);
        self.ids.push(id);
        slot
    }

    pub fn slot(&self, id: i64) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn id(&self, slot: usize) -> Option<i64> {
        self.ids.get(slot).copied()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_dense_and_stable() {
        let map = DetectorIndexMap::from_ids([10, 11, 10, -1, 12]);
        assert_eq!(map.len(), 4);
        assert_eq!(map.slot(10), Some(0));
        assert_eq!(map.slot(-1), Some(2));
        assert_eq!(map.slot(12), Some(3));
        assert_eq!(map.slot(99), None);
        assert_eq!(map.id(1), Some(11));
    }
}
