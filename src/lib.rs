// ============================================================================
// livesync Library
// ============================================================================
//
// Keeps local projections of a CRM database (customers plus their contacts,
// offers and tasks) consistent with realtime row-change notifications.
//
//   change      wire payloads, typed change events, channel filters
//   reconcile   pure projection updates (insert / update / soft delete /
//               delete, cascades, derived counters)
//   store       the per-view projection store
//   subscription channel lifecycle over an abstract change source
//   backend     in-process change and snapshot source
//   view        mount / pump / retarget / unmount
//
// ============================================================================

pub mod backend;
pub mod change;
pub mod config;
pub mod core;
pub mod reconcile;
pub mod replay;
pub mod store;
pub mod subscription;
pub mod view;

pub use backend::InMemoryBackend;
pub use change::{ChangeEvent, ChangeKind, ChannelFilter, RawChange, TableChange};
pub use config::{CustomerOrder, SyncConfig};
pub use crate::core::{Contact, Customer, Offer, Result, SyncError, Table, Task};
pub use reconcile::ActivityRule;
pub use replay::{ReplayReport, replay_lines};
pub use store::{AppliedEffect, ApplySummary, CrmProjection};
pub use subscription::{
    ChangeChannel, ChangeSource, ChannelTopic, ConnectionStatus, SnapshotSource,
    SubscriptionManager,
};
pub use view::{LiveView, ViewScope, ViewStats};

pub mod prelude;
