// ============================================================================
// Local Projections
// ============================================================================
//
// In-memory caches of a filtered subset of remote rows:
//
// - FlatProjection: one ordered list keyed by primary key (top-level rows)
// - GroupedProjection: parent id -> ordered list (child rows)
//
// Both sit on persistent collections, so cloning a projection to derive
// the next one shares structure with the previous one.
//
// ============================================================================

use crate::core::{ChildRow, ProjectedRow};
use im::{HashMap as ImHashMap, Vector};
use std::cmp::Ordering;
use std::fmt;

/// Compares display keys the way a user expects a list to be sorted:
/// case-insensitive over Unicode lowercase, falling back to the raw text so
/// the order stays total.
pub fn compare_display_keys(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

/// Placement of rows in a flat projection.
pub enum ProjectionOrder<T> {
    /// New rows go to the head of the list; updates keep their slot.
    NewestFirst,
    /// The list stays sorted by the extracted display key.
    DisplayKey(fn(&T) -> &str),
}

impl<T> Clone for ProjectionOrder<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ProjectionOrder<T> {}

impl<T> fmt::Debug for ProjectionOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionOrder::NewestFirst => f.write_str("NewestFirst"),
            ProjectionOrder::DisplayKey(_) => f.write_str("DisplayKey"),
        }
    }
}

// ----------------------------------------------------------------------------
// FlatProjection
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct FlatProjection<T: ProjectedRow> {
    rows: Vector<T>,
    order: ProjectionOrder<T>,
}

impl<T: ProjectedRow> FlatProjection<T> {
    pub fn new(order: ProjectionOrder<T>) -> Self {
        Self {
            rows: Vector::new(),
            order,
        }
    }

    pub fn newest_first() -> Self {
        Self::new(ProjectionOrder::NewestFirst)
    }

    pub fn sorted_by(key: fn(&T) -> &str) -> Self {
        Self::new(ProjectionOrder::DisplayKey(key))
    }

    pub fn order(&self) -> ProjectionOrder<T> {
        self.order
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.position(id).and_then(|idx| self.rows.get(idx))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        let idx = self.position(id)?;
        self.rows.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.id()).collect()
    }

    /// Adds a row unless one with the same id is already present.
    pub fn insert(&mut self, row: T) -> bool {
        if self.contains(row.id()) {
            return false;
        }
        match self.order {
            ProjectionOrder::NewestFirst => self.rows.push_front(row),
            ProjectionOrder::DisplayKey(key) => {
                let idx = self.sorted_slot(key, &row);
                self.rows.insert(idx, row);
            }
        }
        true
    }

    /// Replaces the row with the same id and returns the previous version.
    ///
    /// The row keeps its slot unless the list is sorted and the display key
    /// changed.
    pub fn replace(&mut self, row: T) -> Option<T> {
        let idx = self.position(row.id())?;
        if let ProjectionOrder::DisplayKey(key) = self.order {
            let moved = self
                .rows
                .get(idx)
                .is_some_and(|current| key(current) != key(&row));
            if moved {
                let previous = self.rows.remove(idx);
                let slot = self.sorted_slot(key, &row);
                self.rows.insert(slot, row);
                return Some(previous);
            }
        }
        Some(self.rows.set(idx, row))
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let idx = self.position(id)?;
        Some(self.rows.remove(idx))
    }

    /// Replaces the contents with a bulk fetch result.
    ///
    /// Fetch order is kept for newest-first lists. Soft-deleted rows and
    /// repeated ids are skipped. Returns the number of rows kept.
    pub fn load<I: IntoIterator<Item = T>>(&mut self, rows: I) -> usize {
        self.rows.clear();
        for row in rows {
            if row.is_deleted() || self.contains(row.id()) {
                continue;
            }
            match self.order {
                ProjectionOrder::NewestFirst => self.rows.push_back(row),
                ProjectionOrder::DisplayKey(key) => {
                    let idx = self.sorted_slot(key, &row);
                    self.rows.insert(idx, row);
                }
            }
        }
        self.rows.len()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// First slot whose row sorts after `row`; equal keys keep arrival order
    /// after being tie-broken by id.
    fn sorted_slot(&self, key: fn(&T) -> &str, row: &T) -> usize {
        self.rows
            .iter()
            .position(|existing| {
                compare_display_keys(key(existing), key(row))
                    .then_with(|| existing.id().cmp(row.id()))
                    == Ordering::Greater
            })
            .unwrap_or(self.rows.len())
    }
}

impl<T: ProjectedRow> PartialEq for FlatProjection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl<T: ProjectedRow> fmt::Debug for FlatProjection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatProjection")
            .field("order", &self.order)
            .field("rows", &self.rows)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// GroupedProjection
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedProjection<T: ChildRow> {
    groups: ImHashMap<String, Vector<T>>,
}

impl<T: ChildRow> Default for GroupedProjection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ChildRow> GroupedProjection<T> {
    pub fn new() -> Self {
        Self {
            groups: ImHashMap::new(),
        }
    }

    /// Total number of rows across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vector::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn has_group(&self, parent_id: &str) -> bool {
        self.groups.contains_key(parent_id)
    }

    pub fn group(&self, parent_id: &str) -> Option<&Vector<T>> {
        self.groups.get(parent_id)
    }

    /// Ids in a group, head first. Empty for an unknown group.
    pub fn group_ids(&self, parent_id: &str) -> Vec<&str> {
        self.groups
            .get(parent_id)
            .map(|rows| rows.iter().map(|row| row.id()).collect())
            .unwrap_or_default()
    }

    pub fn parent_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Finds a row by id in any group, returning it with its parent id.
    pub fn find(&self, id: &str) -> Option<(&str, &T)> {
        self.groups.iter().find_map(|(parent, rows)| {
            rows.iter()
                .find(|row| row.id() == id)
                .map(|row| (parent.as_str(), row))
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Makes sure an (initially empty) group exists for `parent_id`.
    pub fn ensure_group(&mut self, parent_id: &str) {
        if !self.groups.contains_key(parent_id) {
            self.groups.insert(parent_id.to_string(), Vector::new());
        }
    }

    /// Adds a row at the head of its parent's group.
    ///
    /// Refused when the row has no parent id or its id is already cached.
    pub fn insert(&mut self, row: T) -> bool {
        let Some(parent) = row.parent_id().map(str::to_string) else {
            return false;
        };
        if self.contains(row.id()) {
            return false;
        }
        self.ensure_group(&parent);
        if let Some(rows) = self.groups.get_mut(&parent) {
            rows.push_front(row);
        }
        true
    }

    /// Replaces a cached row in place and returns the previous version.
    ///
    /// A row whose parent id changed moves to the head of the new group.
    pub fn replace(&mut self, row: T) -> Option<T> {
        let (current_parent, idx) = self.locate(row.id(), None)?;
        let target_parent = row
            .parent_id()
            .unwrap_or(current_parent.as_str())
            .to_string();

        if target_parent == current_parent {
            let rows = self.groups.get_mut(&current_parent)?;
            return Some(rows.set(idx, row));
        }

        let previous = self.groups.get_mut(&current_parent)?.remove(idx);
        self.ensure_group(&target_parent);
        if let Some(rows) = self.groups.get_mut(&target_parent) {
            rows.push_front(row);
        }
        Some(previous)
    }

    /// Removes a row by id. `parent_hint` narrows the search when known;
    /// otherwise every group is searched. Emptied groups are kept.
    pub fn remove(&mut self, id: &str, parent_hint: Option<&str>) -> Option<T> {
        let (parent, idx) = self.locate(id, parent_hint)?;
        Some(self.groups.get_mut(&parent)?.remove(idx))
    }

    /// Drops a whole group, returning how many rows it held.
    pub fn remove_group(&mut self, parent_id: &str) -> usize {
        self.groups
            .remove(parent_id)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    /// Replaces the contents with a bulk fetch result (fetch order kept
    /// within each group). Returns the number of rows kept.
    pub fn load<I: IntoIterator<Item = T>>(&mut self, rows: I) -> usize {
        self.groups.clear();
        let mut kept = 0;
        for row in rows {
            if row.is_deleted() || self.contains(row.id()) {
                continue;
            }
            let Some(parent) = row.parent_id().map(str::to_string) else {
                continue;
            };
            self.ensure_group(&parent);
            if let Some(group) = self.groups.get_mut(&parent) {
                group.push_back(row);
                kept += 1;
            }
        }
        kept
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    fn locate(&self, id: &str, parent_hint: Option<&str>) -> Option<(String, usize)> {
        let in_group = |parent: &str| {
            self.groups
                .get(parent)
                .and_then(|rows| rows.iter().position(|row| row.id() == id))
        };

        if let Some(parent) = parent_hint {
            if let Some(idx) = in_group(parent) {
                return Some((parent.to_string(), idx));
            }
        }

        self.groups.iter().find_map(|(parent, rows)| {
            rows.iter()
                .position(|row| row.id() == id)
                .map(|idx| (parent.clone(), idx))
        })
    }
}

/// A projection that drops everything grouped under a removed parent.
pub trait CascadeTarget {
    fn remove_group(&mut self, parent_id: &str) -> usize;
}

impl<T: ChildRow> CascadeTarget for GroupedProjection<T> {
    fn remove_group(&mut self, parent_id: &str) -> usize {
        GroupedProjection::remove_group(self, parent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Customer, Offer};

    fn company(customer: &Customer) -> &str {
        &customer.company_name
    }

    #[test]
    fn test_display_key_comparison_ignores_case() {
        assert_eq!(compare_display_keys("acme", "Beta"), Ordering::Less);
        assert_eq!(compare_display_keys("Zeta", "alpha"), Ordering::Greater);
        assert_eq!(compare_display_keys("Émile", "émile"), Ordering::Less);
        assert_eq!(compare_display_keys("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_newest_first_insert_goes_to_head() {
        let mut projection = FlatProjection::newest_first();
        assert!(projection.insert(Customer::new("c1", "Acme")));
        assert!(projection.insert(Customer::new("c2", "Beta")));
        assert_eq!(projection.ids(), vec!["c2", "c1"]);
    }

    #[test]
    fn test_sorted_insert_and_rename() {
        let mut projection = FlatProjection::sorted_by(company);
        projection.insert(Customer::new("c1", "delta"));
        projection.insert(Customer::new("c2", "Alpha"));
        projection.insert(Customer::new("c3", "charlie"));
        assert_eq!(projection.ids(), vec!["c2", "c3", "c1"]);

        let previous = projection.replace(Customer::new("c2", "zulu")).unwrap();
        assert_eq!(previous.company_name, "Alpha");
        assert_eq!(projection.ids(), vec!["c3", "c1", "c2"]);
    }

    #[test]
    fn test_replace_keeps_slot() {
        let mut projection = FlatProjection::newest_first();
        projection.insert(Customer::new("c1", "Acme"));
        projection.insert(Customer::new("c2", "Beta"));

        let mut renamed = Customer::new("c1", "Acme GmbH");
        renamed.offers_count = 3;
        projection.replace(renamed);

        assert_eq!(projection.ids(), vec!["c2", "c1"]);
        assert_eq!(projection.get("c1").unwrap().company_name, "Acme GmbH");
        assert!(projection.replace(Customer::new("c9", "Ghost")).is_none());
    }

    #[test]
    fn test_load_skips_deleted_and_duplicates() {
        let mut gone = Customer::new("c3", "Gone");
        gone.deleted_at = Some("2024-01-01".into());

        let mut projection = FlatProjection::newest_first();
        let kept = projection.load(vec![
            Customer::new("c1", "Acme"),
            Customer::new("c2", "Beta"),
            Customer::new("c1", "Acme again"),
            gone,
        ]);
        assert_eq!(kept, 2);
        assert_eq!(projection.ids(), vec!["c1", "c2"]);
    }

    #[test]
    fn test_grouped_insert_and_lookup() {
        let mut offers = GroupedProjection::new();
        assert!(offers.insert(Offer::new("o1", "c1")));
        assert!(offers.insert(Offer::new("o2", "c1")));
        assert!(offers.insert(Offer::new("o3", "c2")));
        assert!(!offers.insert(Offer::new("o1", "c2")));

        assert_eq!(offers.group_ids("c1"), vec!["o2", "o1"]);
        assert_eq!(offers.find("o3").map(|(parent, _)| parent), Some("c2"));
        assert_eq!(offers.len(), 3);
        assert_eq!(offers.parent_ids(), vec!["c1", "c2"]);
    }

    #[test]
    fn test_grouped_insert_requires_parent() {
        let mut offers = GroupedProjection::new();
        let mut orphan = Offer::new("o1", "c1");
        orphan.customer_id = None;
        assert!(!offers.insert(orphan));
        assert!(offers.is_empty());
    }

    #[test]
    fn test_grouped_replace_moves_between_parents() {
        let mut offers = GroupedProjection::new();
        offers.insert(Offer::new("o1", "c1"));
        offers.replace(Offer::new("o1", "c2"));

        assert!(offers.group_ids("c1").is_empty());
        assert_eq!(offers.group_ids("c2"), vec!["o1"]);
    }

    #[test]
    fn test_grouped_remove_without_hint_searches_all_groups() {
        let mut offers = GroupedProjection::new();
        offers.insert(Offer::new("o1", "c1"));
        offers.insert(Offer::new("o2", "c2"));

        let removed = offers.remove("o2", None).unwrap();
        assert_eq!(removed.id, "o2");
        assert!(offers.has_group("c2"));
        assert!(offers.group_ids("c2").is_empty());
    }

    #[test]
    fn test_remove_group_counts_rows() {
        let mut offers = GroupedProjection::new();
        offers.insert(Offer::new("o1", "c1"));
        offers.insert(Offer::new("o2", "c1"));
        assert_eq!(CascadeTarget::remove_group(&mut offers, "c1"), 2);
        assert!(!offers.has_group("c1"));
        assert_eq!(offers.remove_group("c1"), 0);
    }
}
