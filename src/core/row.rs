// ============================================================================
// Row Contracts
// ============================================================================
//
// The reconciler never reads columns by name. Everything it needs from a
// row is exposed through these traits: the primary key, the soft-delete
// marker, the grouping key of child rows and the counters parents keep
// for their active children.
//
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Bound shared by every row type a projection can hold.
pub trait ProjectedRow: Keyed + SoftDeletable + Clone + Debug + PartialEq + Serialize + DeserializeOwned {}

impl<T> ProjectedRow for T where
    T: Keyed + SoftDeletable + Clone + Debug + PartialEq + Serialize + DeserializeOwned
{
}

/// Row identified by a primary key.
pub trait Keyed {
    fn id(&self) -> &str;
}

/// Row carrying a nullable soft-delete marker.
pub trait SoftDeletable {
    fn deleted_at(&self) -> Option<&str>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Row grouped under a parent row.
pub trait ChildRow: ProjectedRow {
    /// Id of the parent this row is grouped under.
    ///
    /// `None` when the payload did not carry the column (key-only `old`
    /// images of deletes).
    fn parent_id(&self) -> Option<&str>;

    /// Status value the activity rule is evaluated against.
    fn status(&self) -> Option<&str> {
        None
    }
}

/// Parent row that keeps a denormalised count of active `C` children.
pub trait CountedParent<C: ChildRow>: ProjectedRow {
    fn active_count_mut(&mut self) -> &mut i64;
}

/// Adjusts a denormalised counter by `delta`, clamping at zero.
///
/// Returns the delta actually applied.
pub fn adjust_count(count: &mut i64, delta: i64) -> i64 {
    let before = *count;
    *count = before.saturating_add(delta).max(0);
    count.saturating_sub(before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_count_increments() {
        let mut count = 2;
        assert_eq!(adjust_count(&mut count, 1), 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_adjust_count_clamps_at_zero() {
        let mut count = 0;
        assert_eq!(adjust_count(&mut count, -1), 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_adjust_count_repairs_negative_values() {
        // A corrupt snapshot value is pulled back into range on the next step.
        let mut count = -3;
        adjust_count(&mut count, -1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_adjust_count_saturates_at_extremes() {
        let mut count = i64::MAX;
        assert_eq!(adjust_count(&mut count, 1), 0);
        assert_eq!(count, i64::MAX);

        let mut count = i64::MIN;
        assert_eq!(adjust_count(&mut count, i64::MIN), i64::MAX);
        assert_eq!(count, 0);
    }
}
