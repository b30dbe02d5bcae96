// ============================================================================
// Realtime Subscriptions
// ============================================================================
//
// Channel lifecycle on top of an abstract change source. A consumer opens
// one channel per (schema, table, filter) topic, pulls changes from all of
// them, and closes them when its scope changes or it goes away.
//
// ============================================================================

pub mod manager;
pub mod source;
pub mod status;

pub use manager::SubscriptionManager;
pub use source::{ChangeChannel, ChangeSource, ChannelCloser, ChannelTopic, SnapshotSource};
pub use status::ConnectionStatus;
