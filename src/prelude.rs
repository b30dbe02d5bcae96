//! Recommended imports grouped by abstraction level.
//!
//! `view` is the default for applications that mount live views.
//! `reconcile` is for callers driving projections themselves.

pub mod view {
    //! Mount a view over a backend and pump changes into it.
    pub use crate::{
        ConnectionStatus, CrmProjection, InMemoryBackend, LiveView, Result, SyncConfig,
        SyncError, Table, ViewScope,
    };
    pub use crate::subscription::{ChangeSource, SnapshotSource};
}

pub mod reconcile {
    //! Pure projection updates without channels.
    pub use crate::change::{ChangeEvent, RawChange, TableChange};
    pub use crate::core::{ChildRow, CountedParent, Keyed, SoftDeletable};
    pub use crate::reconcile::{
        ActivityRule, FlatProjection, GroupedProjection, Outcome, apply_counted_child, apply_flat,
        apply_grouped, apply_parent,
    };
}
