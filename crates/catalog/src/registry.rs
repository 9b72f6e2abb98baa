use std::collections::BTreeMap;

use shopkeep_core::Entity;

/// Id-ordered collection of entities.
#[derive(Debug, Clone)]
pub struct Registry<T: Entity> {
    items: BTreeMap<T::Id, T>,
}

impl<T: Entity> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: Entity + Clone> Registry<T> {
    pub fn insert(&mut self, item: T) {
        self.items.insert(item.id(), item);
    }

    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: T::Id) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.items.contains_key(&id)
    }

    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.items.values().find(|item| pred(item))
    }

    pub fn filtered(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        self.items.values().filter(|item| pred(item)).cloned().collect()
    }

    pub fn all(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
