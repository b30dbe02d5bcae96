// ============================================================================
// Change Events
// ============================================================================
//
// Wire payloads from the realtime channel, their typed decoded form and the
// channel filter predicate.
//
// ============================================================================

pub mod event;
pub mod filter;
pub mod payload;

pub use event::{ChangeEvent, ChangeKind, TableChange};
pub use filter::ChannelFilter;
pub use payload::RawChange;
