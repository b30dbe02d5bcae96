use crate::change::{ChannelFilter, RawChange};
use crate::core::{Result, Table};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Identity of one realtime channel: `(schema, table, filter)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelTopic {
    pub schema: String,
    pub table: Table,
    pub filter: Option<ChannelFilter>,
}

impl ChannelTopic {
    pub fn new(schema: impl Into<String>, table: Table) -> Self {
        Self {
            schema: schema.into(),
            table,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: ChannelFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether a change belongs on this channel.
    pub fn accepts(&self, raw: &RawChange) -> bool {
        if raw.schema != self.schema || raw.table != self.table.as_str() {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => raw.routing_image().is_some_and(|row| filter.matches(row)),
        }
    }
}

impl fmt::Display for ChannelTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "realtime:{}:{}", self.schema, self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, ":{filter}")?;
        }
        Ok(())
    }
}

/// Releases a subscription at the source. Must not block or fail.
pub trait ChannelCloser: Send {
    fn close(&mut self);
}

/// An open realtime channel.
///
/// Closing (explicitly or by dropping) unregisters the subscription at the
/// source and discards anything still queued, so no event is observed
/// after `close` returns.
pub struct ChangeChannel {
    receiver: mpsc::UnboundedReceiver<RawChange>,
    closer: Option<Box<dyn ChannelCloser>>,
}

impl ChangeChannel {
    pub fn new(receiver: mpsc::UnboundedReceiver<RawChange>, closer: impl ChannelCloser + 'static) -> Self {
        Self {
            receiver,
            closer: Some(Box::new(closer)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_none()
    }

    /// Waits for the next change. `None` once the channel is closed or the
    /// source stopped sending.
    pub async fn recv(&mut self) -> Option<RawChange> {
        if self.is_closed() {
            return None;
        }
        self.receiver.recv().await
    }

    /// `Ok(None)` when nothing is queued, `Err(())` when the source ended
    /// the channel.
    pub fn try_recv(&mut self) -> std::result::Result<Option<RawChange>, ()> {
        if self.is_closed() {
            return Err(());
        }
        match self.receiver.try_recv() {
            Ok(change) => Ok(Some(change)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(()),
        }
    }

    pub fn close(&mut self) {
        if let Some(mut closer) = self.closer.take() {
            closer.close();
        }
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Drop for ChangeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChangeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Publisher of row changes.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn subscribe(&self, topic: &ChannelTopic) -> Result<ChangeChannel>;
}

/// One-shot bulk fetch used to populate a projection.
///
/// Returns the non-deleted rows matching the topic, newest first.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, topic: &ChannelTopic) -> Result<Vec<JsonValue>>;
}
