// ============================================================================
// Reconciler
// ============================================================================
//
// Applies one change event to a projection. The functions here never fail:
// an event that does not fit the projection (duplicate insert, update or
// delete of an uncached row) leaves it untouched and reports why.
//
// Contract per event:
// - Insert: add unless the id is already cached (duplicate delivery)
// - Update: replace in place; no-op when the row is not cached
// - Update that sets deleted_at: same as Delete
// - Delete: remove; parents cascade to their grouped children
//
// ============================================================================

use super::activity::ActivityRule;
use super::projection::{CascadeTarget, FlatProjection, GroupedProjection};
use super::soft_delete::{Effect, effect_of, is_soft_delete};
use crate::change::ChangeEvent;
use crate::core::{ChildRow, CountedParent, ProjectedRow, adjust_count};
use std::fmt;

/// Why an event left the projection unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Insert for an id that is already cached.
    DuplicateInsert,
    /// Insert of a row that is already soft-deleted.
    SoftDeleted,
    /// Update or delete for a row outside this projection.
    NotInProjection,
    /// Child row without a grouping key.
    MissingParent,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Skip::DuplicateInsert => "duplicate_insert",
            Skip::SoftDeleted => "soft_deleted",
            Skip::NotInProjection => "not_in_projection",
            Skip::MissingParent => "missing_parent",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Inserted,
    Replaced { previous: T },
    Removed { row: T, soft: bool },
    Ignored(Skip),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Outcome::Ignored(_))
    }

    pub fn skip(&self) -> Option<Skip> {
        match self {
            Outcome::Ignored(skip) => Some(*skip),
            _ => None,
        }
    }
}

/// Result of applying a child event whose parent keeps an active count.
#[derive(Debug, Clone, PartialEq)]
pub struct CountedOutcome<T> {
    pub outcome: Outcome<T>,
    /// Net change applied to parent counters after clamping.
    pub count_delta: i64,
}

/// Result of applying a parent event.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentOutcome<T> {
    pub outcome: Outcome<T>,
    /// Child rows dropped because their parent was removed.
    pub cascaded: usize,
}

/// Applies an event to a flat projection.
pub fn apply_flat<T: ProjectedRow>(projection: &mut FlatProjection<T>, event: ChangeEvent<T>) -> Outcome<T> {
    match effect_of(event) {
        Effect::Insert(after) => {
            if after.is_deleted() {
                Outcome::Ignored(Skip::SoftDeleted)
            } else if projection.insert(after) {
                Outcome::Inserted
            } else {
                Outcome::Ignored(Skip::DuplicateInsert)
            }
        }
        Effect::Update(after) => match projection.replace(after) {
            Some(previous) => Outcome::Replaced { previous },
            None => Outcome::Ignored(Skip::NotInProjection),
        },
        Effect::Remove { image, soft } => remove_flat(projection, image.id(), soft),
    }
}

fn remove_flat<T: ProjectedRow>(projection: &mut FlatProjection<T>, id: &str, soft: bool) -> Outcome<T> {
    match projection.remove(id) {
        Some(row) => Outcome::Removed { row, soft },
        None => Outcome::Ignored(Skip::NotInProjection),
    }
}

/// Applies an event to a parent projection and cascades removals to every
/// child projection grouped under it.
///
/// The cascade runs for any removal event, cached parent or not: children
/// of a deleted parent are stale either way.
pub fn apply_parent<T: ProjectedRow>(
    projection: &mut FlatProjection<T>,
    children: &mut [&mut dyn CascadeTarget],
    event: ChangeEvent<T>,
) -> ParentOutcome<T> {
    let removed_id = removal_image(&event).map(|row| row.id().to_string());
    let outcome = apply_flat(projection, event);
    let cascaded = match removed_id {
        Some(id) => children.iter_mut().map(|child| child.remove_group(&id)).sum(),
        None => 0,
    };
    ParentOutcome { outcome, cascaded }
}

/// Applies an event to a grouped child projection.
pub fn apply_grouped<T: ChildRow>(projection: &mut GroupedProjection<T>, event: ChangeEvent<T>) -> Outcome<T> {
    match effect_of(event) {
        Effect::Insert(after) => {
            if after.is_deleted() {
                Outcome::Ignored(Skip::SoftDeleted)
            } else if after.parent_id().is_none() {
                Outcome::Ignored(Skip::MissingParent)
            } else if projection.insert(after) {
                Outcome::Inserted
            } else {
                Outcome::Ignored(Skip::DuplicateInsert)
            }
        }
        Effect::Update(after) => match projection.replace(after) {
            Some(previous) => Outcome::Replaced { previous },
            None => Outcome::Ignored(Skip::NotInProjection),
        },
        Effect::Remove { image, soft } => remove_grouped(projection, &image, soft),
    }
}

fn remove_grouped<T: ChildRow>(projection: &mut GroupedProjection<T>, image: &T, soft: bool) -> Outcome<T> {
    match projection.remove(image.id(), image.parent_id()) {
        Some(row) => Outcome::Removed { row, soft },
        None => Outcome::Ignored(Skip::NotInProjection),
    }
}

/// Applies a child event and keeps the parent's active count in step.
///
/// Counts move only when a cached child changes:
/// - an applied insert of an active child increments the count
/// - removing a cached active child decrements it
/// - an update flipping activity or moving the child to another parent
///   moves the count by one on each side
///
/// Events for uncached children never touch counts. Their images may be
/// key-only, and the snapshot that left them out already counted the
/// removal. Counts never go below zero; an uncached parent makes the count
/// step a no-op.
pub fn apply_counted_child<P, C>(
    parents: &mut FlatProjection<P>,
    children: &mut GroupedProjection<C>,
    rule: &ActivityRule,
    event: ChangeEvent<C>,
) -> CountedOutcome<C>
where
    P: CountedParent<C>,
    C: ChildRow,
{
    let after = event.after().cloned();
    let outcome = apply_grouped(children, event);

    let is_active = |row: &C| rule.is_active(row.status());
    let count_delta = match (&outcome, after) {
        (Outcome::Inserted, Some(after)) if is_active(&after) => bump::<P, C>(parents, after.parent_id(), 1),
        (Outcome::Removed { row, .. }, _) if is_active(row) => bump::<P, C>(parents, row.parent_id(), -1),
        (Outcome::Replaced { previous }, Some(after)) => {
            let was_active = is_active(previous);
            let now_active = is_active(&after);
            let from = previous.parent_id();
            let to = after.parent_id().or(from);
            if from == to {
                let delta = i64::from(now_active) - i64::from(was_active);
                if delta == 0 { 0 } else { bump::<P, C>(parents, to, delta) }
            } else {
                let mut delta = 0;
                if was_active {
                    delta += bump::<P, C>(parents, from, -1);
                }
                if now_active {
                    delta += bump::<P, C>(parents, to, 1);
                }
                delta
            }
        }
        _ => 0,
    };

    CountedOutcome { outcome, count_delta }
}

/// The image describing the row an event removes, if it removes one.
///
/// A soft delete uses the new image: the old one often carries the key
/// only, while the new one is the full row.
fn removal_image<T: ProjectedRow>(event: &ChangeEvent<T>) -> Option<&T> {
    match event {
        ChangeEvent::Update { before, after } if is_soft_delete(before, after) => Some(after),
        ChangeEvent::Delete { before } => Some(before),
        _ => None,
    }
}

fn bump<P, C>(parents: &mut FlatProjection<P>, parent_id: Option<&str>, delta: i64) -> i64
where
    P: CountedParent<C>,
    C: ChildRow,
{
    parent_id
        .and_then(|id| parents.get_mut(id))
        .map(|parent| adjust_count(<P as CountedParent<C>>::active_count_mut(parent), delta))
        .unwrap_or(0)
}
