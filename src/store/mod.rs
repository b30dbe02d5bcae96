// ============================================================================
// Local Projection Store
// ============================================================================
//
// The per-view cache of CRM rows. Owned by exactly one view, mutated only by
// the reconciler, discarded with the view. It is never the source of truth.
//
// ============================================================================

pub mod crm;

pub use crm::{AppliedEffect, ApplySummary, CrmProjection};
