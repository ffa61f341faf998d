//! Ordered entity collections for points and spots.
//!
//! [`EntityStore`] keeps every entity's `index` equal to its array position,
//! prunes trailing blank entities before appending, and notifies a single
//! change listener with the full collection after every mutation.

use crate::events::SyncHint;
use crate::types::{CanvasPos, EntityKind, Point, Spot};
use std::collections::HashMap;

/// Behavior shared by entities held in an [`EntityStore`].
pub trait StoredEntity: Clone {
    /// Kind reported in hit results, drags and validation feedback
    const KIND: EntityKind;

    /// Builds a new entity.
    fn create(pos: CanvasPos, label: String, index: usize) -> Self;
    /// The free-text key of the entity (point id or spot name).
    fn label(&self) -> &str;
    /// Replaces the label.
    fn set_label(&mut self, label: String);
    /// Canvas position.
    fn pos(&self) -> CanvasPos;
    /// Moves the entity.
    fn set_pos(&mut self, pos: CanvasPos);
    /// Ordinal index.
    fn index(&self) -> usize;
    /// Overwrites the ordinal index.
    fn set_index(&mut self, index: usize);
}

impl StoredEntity for Point {
    const KIND: EntityKind = EntityKind::Point;

    fn create(pos: CanvasPos, label: String, index: usize) -> Self {
        Point {
            x: pos.x,
            y: pos.y,
            id: label,
            index,
        }
    }

    fn label(&self) -> &str {
        &self.id
    }

    fn set_label(&mut self, label: String) {
        self.id = label;
    }

    fn pos(&self) -> CanvasPos {
        CanvasPos::new(self.x, self.y)
    }

    fn set_pos(&mut self, pos: CanvasPos) {
        self.x = pos.x;
        self.y = pos.y;
    }

    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl StoredEntity for Spot {
    const KIND: EntityKind = EntityKind::Spot;

    fn create(pos: CanvasPos, label: String, index: usize) -> Self {
        Spot {
            x: pos.x,
            y: pos.y,
            name: label,
            index,
        }
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn set_label(&mut self, label: String) {
        self.name = label;
    }

    fn pos(&self) -> CanvasPos {
        CanvasPos::new(self.x, self.y)
    }

    fn set_pos(&mut self, pos: CanvasPos) {
        self.x = pos.x;
        self.y = pos.y;
    }

    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// A single-field edit applied through [`EntityStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntityUpdate {
    /// Set the x coordinate
    X(i32),
    /// Set the y coordinate
    Y(i32),
    /// Set both coordinates
    Position(CanvasPos),
    /// Set the label (point id or spot name)
    Label(String),
}

/// Callback receiving the full collection after each mutation.
pub type ChangeListener<T> = Box<dyn FnMut(&[T], SyncHint)>;

/// Ordered collection with change notification.
pub struct EntityStore<T: StoredEntity> {
    items: Vec<T>,
    listener: Option<ChangeListener<T>>,
}

/// Store of labeled points.
pub type PointStore = EntityStore<Point>;
/// Store of named spots.
pub type SpotStore = EntityStore<Spot>;

impl<T: StoredEntity> Default for EntityStore<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            listener: None,
        }
    }
}

impl<T: StoredEntity + std::fmt::Debug> std::fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("items", &self.items)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl<T: StoredEntity> EntityStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the change listener, replacing any previous one.
    pub fn on_change(&mut self, listener: impl FnMut(&[T], SyncHint) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// All entities in index order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Entity at `index`, if it exists.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the labels in index order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.label())
    }

    /// Appends a new entity and returns its index.
    ///
    /// Trailing entities with an empty label are removed first, so a click that
    /// was never labeled does not leave an orphaned blank behind. Blank entities
    /// in the middle of the list are kept.
    pub fn add(&mut self, pos: CanvasPos, label: impl Into<String>) -> usize {
        let mut pruned = 0;
        while self
            .items
            .last()
            .is_some_and(|last| last.label().trim().is_empty())
        {
            self.items.pop();
            pruned += 1;
        }
        if pruned > 0 {
            log::debug!("Pruned {} trailing unlabeled {}(s)", pruned, T::KIND);
        }

        let index = self.items.len();
        self.items.push(T::create(pos, label.into(), index));
        log::debug!("Added {} #{} at ({}, {})", T::KIND, index, pos.x, pos.y);
        self.notify(SyncHint::Full);
        index
    }

    /// Removes the entity at `index` and re-sequences the remaining ones.
    ///
    /// Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            log::debug!("Ignoring removal of missing {} #{}", T::KIND, index);
            return None;
        }
        let removed = self.items.remove(index);
        self.reindex();
        self.notify(SyncHint::Full);
        Some(removed)
    }

    /// Applies an in-place edit. Returns `false` if `index` is out of range.
    pub fn update(&mut self, index: usize, update: EntityUpdate, hint: SyncHint) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        match update {
            EntityUpdate::X(x) => {
                let pos = item.pos();
                item.set_pos(CanvasPos::new(x, pos.y));
            }
            EntityUpdate::Y(y) => {
                let pos = item.pos();
                item.set_pos(CanvasPos::new(pos.x, y));
            }
            EntityUpdate::Position(pos) => item.set_pos(pos),
            EntityUpdate::Label(label) => item.set_label(label),
        }
        self.notify(hint);
        true
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        self.items.clear();
        self.notify(SyncHint::Full);
    }

    /// Replaces the whole collection, re-sequencing indices.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
        self.reindex();
        self.notify(SyncHint::Full);
    }

    /// Returns the lowest-index entity within `radius` of `pos`.
    ///
    /// `radius` is in canvas units and is not adjusted for zoom.
    pub fn find_at(&self, pos: egui::Pos2, radius: f32) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.pos().distance_to(pos) <= radius)
    }

    /// Returns the lowest index whose label equals `label` exactly.
    pub fn find_by_label(&self, label: &str) -> Option<usize> {
        if label.is_empty() {
            return None;
        }
        self.items.iter().position(|item| item.label() == label)
    }

    /// Groups of indices sharing the same non-empty label.
    ///
    /// Each group holds at least two indices in ascending order; groups are
    /// ordered by their first index.
    pub fn duplicate_groups(&self) -> Vec<Vec<usize>> {
        let mut by_label: HashMap<&str, Vec<usize>> = HashMap::new();
        for item in &self.items {
            let label = item.label();
            if !label.is_empty() {
                by_label.entry(label).or_default().push(item.index());
            }
        }
        let mut groups: Vec<Vec<usize>> = by_label
            .into_values()
            .filter(|indices| indices.len() > 1)
            .collect();
        groups.sort_by_key(|indices| indices[0]);
        groups
    }

    fn reindex(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.set_index(index);
        }
    }

    fn notify(&mut self, hint: SyncHint) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.items, hint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn labeled(labels: &[&str]) -> PointStore {
        let mut store = PointStore::new();
        let mut items = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            items.push(Point::create(CanvasPos::new(i as i32 * 10, 0), label.to_string(), i));
        }
        store.replace_all(items);
        store
    }

    fn assert_indices_match_positions(store: &PointStore) {
        for (position, item) in store.items().iter().enumerate() {
            assert_eq!(item.index, position);
        }
    }

    #[test]
    fn test_add_assigns_next_index() {
        let mut store = PointStore::new();
        assert_eq!(store.add(CanvasPos::new(1, 2), "A"), 0);
        assert_eq!(store.add(CanvasPos::new(3, 4), "B"), 1);
        assert_eq!(store.get(1).unwrap().id, "B");
        assert_eq!(store.get(1).unwrap().pos(), CanvasPos::new(3, 4));
    }

    #[test]
    fn test_trailing_empty_entity_is_pruned_before_add() {
        let mut store = labeled(&["A", ""]);
        store.add(CanvasPos::new(50, 50), "");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().id, "A");
        assert_eq!(store.get(1).unwrap().pos(), CanvasPos::new(50, 50));
    }

    #[test]
    fn test_mid_list_blanks_are_not_pruned() {
        let mut store = labeled(&["A", "", "B", "", ""]);
        store.add(CanvasPos::new(0, 0), "C");
        let labels: Vec<&str> = store.labels().collect();
        assert_eq!(labels, vec!["A", "", "B", "C"]);
        assert_indices_match_positions(&store);
    }

    #[test]
    fn test_indices_follow_positions_after_mixed_sequence() {
        let mut store = PointStore::new();
        for i in 0..6 {
            store.add(CanvasPos::new(i, i), format!("P{i}"));
        }
        store.remove(0);
        assert_indices_match_positions(&store);
        store.remove(3);
        assert_indices_match_positions(&store);
        store.add(CanvasPos::new(9, 9), "P9");
        store.remove(1);
        assert_indices_match_positions(&store);
        let labels: Vec<&str> = store.labels().collect();
        assert_eq!(labels, vec!["P1", "P3", "P5", "P9"]);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut store = labeled(&["A"]);
        assert!(store.remove(5).is_none());
        assert!(!store.update(3, EntityUpdate::X(1), SyncHint::Full));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_fields_in_place() {
        let mut store = labeled(&["A"]);
        store.update(0, EntityUpdate::X(42), SyncHint::Incremental);
        store.update(0, EntityUpdate::Y(7), SyncHint::Incremental);
        store.update(0, EntityUpdate::Label("Z".into()), SyncHint::Full);
        let point = store.get(0).unwrap();
        assert_eq!((point.x, point.y, point.id.as_str()), (42, 7, "Z"));
    }

    #[test]
    fn test_listener_receives_full_collection_and_hint() {
        let seen: Rc<RefCell<Vec<(usize, SyncHint)>>> = Rc::new(RefCell::new(Vec::new()));
        let mut store = SpotStore::new();
        let sink = seen.clone();
        store.on_change(move |items, hint| sink.borrow_mut().push((items.len(), hint)));

        store.add(CanvasPos::new(0, 0), "Gate");
        store.update(0, EntityUpdate::X(5), SyncHint::Incremental);
        store.add(CanvasPos::new(1, 1), "Dock");
        store.clear();

        assert_eq!(
            *seen.borrow(),
            vec![
                (1, SyncHint::Full),
                (1, SyncHint::Incremental),
                (2, SyncHint::Full),
                (0, SyncHint::Full),
            ]
        );
    }

    #[test]
    fn test_find_at_returns_lowest_index_within_radius() {
        let mut store = PointStore::new();
        store.add(CanvasPos::new(100, 100), "A");
        store.add(CanvasPos::new(104, 100), "B");

        assert_eq!(store.find_at(egui::pos2(103.0, 100.0), 8.0), Some(0));
        assert_eq!(store.find_at(egui::pos2(108.0, 100.0), 8.0), Some(0));
        assert_eq!(store.find_at(egui::pos2(110.0, 100.0), 8.0), Some(1));
        assert_eq!(store.find_at(egui::pos2(200.0, 200.0), 8.0), None);
    }

    #[test]
    fn test_duplicate_groups_ignore_empty_labels() {
        let store = labeled(&["A", "", "B", "A", "", "B", "A"]);
        assert_eq!(store.duplicate_groups(), vec![vec![0, 3, 6], vec![2, 5]]);
    }

    #[test]
    fn test_find_by_label() {
        let store = labeled(&["A", "B"]);
        assert_eq!(store.find_by_label("B"), Some(1));
        assert_eq!(store.find_by_label("b"), None);
        assert_eq!(store.find_by_label(""), None);
    }
}
