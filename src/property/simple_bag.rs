/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::hash::Hash;

use fxhash::FxHashMap;

/// A generic key-to-value store with add/modify/remove change tracking.
///
/// The lighter analog of [`PropertyBag`](crate::property::PropertyBag) for
/// flatter property sets: no schema, no capability flags, no version gating.
/// A single change callback fires on every mutation.
pub struct SimplePropertyBag<K, V> {
    items: FxHashMap<K, V>,
    added: Vec<K>,
    removed: Vec<K>,
    modified: Vec<K>,
    on_change: Option<Box<dyn FnMut()>>,
}

impl<K, V> Default for SimplePropertyBag<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SimplePropertyBag<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        SimplePropertyBag {
            items: FxHashMap::default(),
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
            on_change: None,
        }
    }

    pub fn set_on_change(&mut self, callback: impl FnMut() + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.items.keys()
    }

    /// Sets or removes a value.
    ///
    /// `None` removes the key. Setting a previously removed key reclassifies
    /// it as modified, not added; otherwise a key is added if absent and
    /// modified if present. A key set twice before any sync appears in both
    /// the added and modified lists.
    pub fn set(&mut self, key: K, value: Option<V>) {
        match value {
            Some(value) => self.insert(key, value),
            None => self.remove(key),
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(position) = self.removed.iter().position(|removed| *removed == key) {
            self.removed.remove(position);
            self.track_modified(key.clone());
        } else if !self.items.contains_key(&key) {
            self.added.push(key.clone());
        } else {
            self.track_modified(key.clone());
        }

        self.items.insert(key, value);
        self.changed();
    }

    fn remove(&mut self, key: K) {
        if self.items.remove(&key).is_none() {
            return;
        }

        if let Some(position) = self.added.iter().position(|added| *added == key) {
            // Never seen by the server; removing it leaves no trace.
            self.added.remove(position);
            self.modified.retain(|modified| *modified != key);
        } else {
            self.modified.retain(|modified| *modified != key);
            self.removed.push(key);
        }

        self.changed();
    }

    fn track_modified(&mut self, key: K) {
        if !self.modified.contains(&key) {
            self.modified.push(key);
        }
    }

    pub fn added_keys(&self) -> &[K] {
        &self.added
    }

    pub fn removed_keys(&self) -> &[K] {
        &self.removed
    }

    pub fn modified_keys(&self) -> &[K] {
        &self.modified
    }

    pub fn is_dirty(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.modified.is_empty()
    }

    /// Collapses current state into a clean baseline.
    pub fn clear_change_log(&mut self) {
        self.added.clear();
        self.removed.clear();
        self.modified.clear();
    }

    fn changed(&mut self) {
        if let Some(callback) = self.on_change.as_mut() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn set_classifies_added_then_modified() {
        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();

        bag.set("a", Some(1));
        assert_eq!(bag.added_keys(), ["a"]);
        assert!(bag.modified_keys().is_empty());

        // The key is present now, so a second set also marks it modified.
        bag.set("a", Some(2));
        assert_eq!(bag.added_keys(), ["a"]);
        assert_eq!(bag.modified_keys(), ["a"]);
        assert_eq!(bag.get(&"a"), Some(&2));
    }

    #[test]
    fn set_on_existing_key_tracks_modified() {
        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();
        bag.set("a", Some(1));
        bag.clear_change_log();

        bag.set("a", Some(2));
        assert!(bag.added_keys().is_empty());
        assert_eq!(bag.modified_keys(), ["a"]);
    }

    #[test]
    fn removal_and_reinstatement() {
        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();
        bag.set("a", Some(1));
        bag.clear_change_log();

        bag.set("a", None);
        assert_eq!(bag.removed_keys(), ["a"]);
        assert!(!bag.contains_key(&"a"));

        // Reinstating a removed key is a modification, not an addition.
        bag.set("a", Some(3));
        assert!(bag.removed_keys().is_empty());
        assert!(bag.added_keys().is_empty());
        assert_eq!(bag.modified_keys(), ["a"]);
    }

    #[test]
    fn removing_a_never_added_key_is_a_no_op() {
        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();
        bag.set("a", None);

        assert!(!bag.is_dirty());
        assert!(bag.removed_keys().is_empty());
    }

    #[test]
    fn removing_a_freshly_added_key_leaves_no_trace() {
        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();
        bag.set("a", Some(1));
        bag.set("a", None);

        assert!(bag.added_keys().is_empty());
        assert!(bag.removed_keys().is_empty());

        // Same when the key was also re-set before removal.
        bag.set("b", Some(1));
        bag.set("b", Some(2));
        bag.set("b", None);

        assert!(!bag.is_dirty());
    }

    #[test]
    fn change_callback_fires_on_every_mutation() {
        let count = Rc::new(Cell::new(0));
        let counted = count.clone();

        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();
        bag.set_on_change(move || counted.set(counted.get() + 1));

        bag.set("a", Some(1));
        bag.set("a", Some(2));
        bag.set("a", None);
        assert_eq!(count.get(), 3);

        // No mutation happened, so no notification.
        bag.set("b", None);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn clear_change_log_resets_dirtiness() {
        let mut bag: SimplePropertyBag<&str, i32> = SimplePropertyBag::new();
        bag.set("a", Some(1));
        assert!(bag.is_dirty());

        bag.clear_change_log();
        assert!(!bag.is_dirty());
        assert_eq!(bag.get(&"a"), Some(&1));
    }
}
