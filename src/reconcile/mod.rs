// ============================================================================
// Reconciliation
// ============================================================================
//
// Pure, synchronous application of change events to local projections.
// Nothing in this module performs I/O or holds locks.
//
// ============================================================================

pub mod activity;
pub mod projection;
pub mod reconciler;
pub mod soft_delete;

pub use activity::ActivityRule;
pub use projection::{
    CascadeTarget, FlatProjection, GroupedProjection, ProjectionOrder, compare_display_keys,
};
pub use reconciler::{
    CountedOutcome, Outcome, ParentOutcome, Skip, apply_counted_child, apply_flat, apply_grouped,
    apply_parent,
};
pub use soft_delete::{Effect, effect_of, is_soft_delete};
