use super::source::{ChangeChannel, ChangeSource, ChannelTopic};
use super::status::ConnectionStatus;
use crate::change::RawChange;
use crate::core::{Result, SyncError};
use futures::future::select_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, event};

/// Owns the open channels of one consumer.
///
/// At most one channel is open per topic. Dropping the manager closes
/// every channel it owns.
pub struct SubscriptionManager<S: ChangeSource + ?Sized> {
    source: Arc<S>,
    channels: BTreeMap<ChannelTopic, ChangeChannel>,
    status: watch::Sender<ConnectionStatus>,
}

impl<S: ChangeSource + ?Sized> SubscriptionManager<S> {
    pub fn new(source: Arc<S>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            source,
            channels: BTreeMap::new(),
            status,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn is_subscribed(&self, topic: &ChannelTopic) -> bool {
        self.channels.contains_key(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &ChannelTopic> {
        self.channels.keys()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Opens a channel for `topic`. Returns `false` when one was already open.
    pub async fn subscribe(&mut self, topic: ChannelTopic) -> Result<bool> {
        if self.channels.contains_key(&topic) {
            return Ok(false);
        }

        self.status.send_replace(ConnectionStatus::Connecting);
        match self.source.subscribe(&topic).await {
            Ok(channel) => {
                event!(Level::INFO, topic = %topic, "channel subscribed");
                self.channels.insert(topic, channel);
                self.status.send_replace(ConnectionStatus::Live);
                Ok(true)
            }
            Err(err) => {
                let reason = match &err {
                    SyncError::SubscriptionFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                event!(Level::ERROR, topic = %topic, error = %reason, "channel subscribe failed");
                self.status.send_replace(ConnectionStatus::Disconnected {
                    reason: reason.clone(),
                });
                Err(SyncError::SubscriptionFailed {
                    topic: topic.to_string(),
                    reason,
                })
            }
        }
    }

    /// Closes the channel for `topic`. Returns `false` when none was open.
    pub fn unsubscribe(&mut self, topic: &ChannelTopic) -> bool {
        let Some(mut channel) = self.channels.remove(topic) else {
            return false;
        };
        channel.close();
        event!(Level::INFO, topic = %topic, "channel unsubscribed");
        if self.channels.is_empty() && !self.status.borrow().is_disconnected() {
            self.status.send_replace(ConnectionStatus::Idle);
        }
        true
    }

    /// Closes `from` before opening `to`, so events for `from` are never
    /// delivered once the switch starts.
    pub async fn retarget(&mut self, from: &ChannelTopic, to: ChannelTopic) -> Result<bool> {
        if from == &to && self.is_subscribed(from) {
            return Ok(false);
        }
        self.unsubscribe(from);
        self.subscribe(to).await
    }

    /// Closes every channel. A `Disconnected` status is kept so callers can
    /// still see why the last subscribe failed.
    pub fn close_all(&mut self) -> usize {
        let closed = self.channels.len();
        for (topic, mut channel) in std::mem::take(&mut self.channels) {
            channel.close();
            event!(Level::DEBUG, topic = %topic, "channel closed");
        }
        if !self.status.borrow().is_disconnected() {
            self.status.send_replace(ConnectionStatus::Idle);
        }
        closed
    }

    /// Waits for the next change on any open channel.
    ///
    /// A channel the source ends is dropped and the status turns
    /// `Disconnected`. Returns `None` when no channel is left.
    pub async fn next_change(&mut self) -> Option<(ChannelTopic, RawChange)> {
        loop {
            if self.channels.is_empty() {
                return None;
            }

            let (topic, change) = {
                let pending = self.channels.iter_mut().map(|(topic, channel)| {
                    Box::pin(async move { (topic.clone(), channel.recv().await) })
                });
                let ((topic, change), _, _) = select_all(pending).await;
                (topic, change)
            };

            match change {
                Some(change) => return Some((topic, change)),
                None => self.drop_ended(topic),
            }
        }
    }

    /// Takes one already-queued change without waiting.
    pub fn try_next_change(&mut self) -> Option<(ChannelTopic, RawChange)> {
        let mut ended = Vec::new();
        let mut found = None;

        for (topic, channel) in self.channels.iter_mut() {
            match channel.try_recv() {
                Ok(Some(change)) => {
                    found = Some((topic.clone(), change));
                    break;
                }
                Ok(None) => {}
                Err(()) => ended.push(topic.clone()),
            }
        }

        for topic in ended {
            self.drop_ended(topic);
        }
        found
    }

    fn drop_ended(&mut self, topic: ChannelTopic) {
        self.channels.remove(&topic);
        event!(Level::WARN, topic = %topic, "channel ended by source");
        self.status.send_replace(ConnectionStatus::Disconnected {
            reason: format!("channel {topic} ended by source"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChannelFilter;
    use crate::core::Table;
    use crate::subscription::ChannelCloser;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct StubSource {
        senders: Mutex<HashMap<ChannelTopic, mpsc::UnboundedSender<RawChange>>>,
        opened: Mutex<Vec<ChannelTopic>>,
        refuse: Mutex<bool>,
    }

    struct Noop;

    impl ChannelCloser for Noop {
        fn close(&mut self) {}
    }

    #[async_trait]
    impl ChangeSource for StubSource {
        async fn subscribe(&self, topic: &ChannelTopic) -> Result<ChangeChannel> {
            if *self.refuse.lock()? {
                return Err(SyncError::SubscriptionFailed {
                    topic: topic.to_string(),
                    reason: "refused".into(),
                });
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock()?.insert(topic.clone(), tx);
            self.opened.lock()?.push(topic.clone());
            Ok(ChangeChannel::new(rx, Noop))
        }
    }

    impl StubSource {
        fn send(&self, topic: &ChannelTopic, change: RawChange) {
            let senders = self.senders.lock().unwrap();
            let _ = senders[topic].send(change);
        }

        fn hang_up(&self, topic: &ChannelTopic) {
            self.senders.lock().unwrap().remove(topic);
        }
    }

    fn customers() -> ChannelTopic {
        ChannelTopic::new("public", Table::Customers)
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let source = Arc::new(StubSource::default());
        let mut manager = SubscriptionManager::new(source.clone());

        assert_eq!(manager.status(), ConnectionStatus::Idle);
        assert!(manager.subscribe(customers()).await.unwrap());
        assert!(!manager.subscribe(customers()).await.unwrap());
        assert_eq!(manager.len(), 1);
        assert_eq!(source.opened.lock().unwrap().len(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Live);
    }

    #[tokio::test]
    async fn test_failed_subscribe_reports_disconnected() {
        let source = Arc::new(StubSource::default());
        *source.refuse.lock().unwrap() = true;
        let mut manager = SubscriptionManager::new(source.clone());

        let err = manager.subscribe(customers()).await.unwrap_err();
        assert!(matches!(err, SyncError::SubscriptionFailed { .. }));
        assert!(manager.status().is_disconnected());
        assert!(manager.is_empty());

        *source.refuse.lock().unwrap() = false;
        manager.subscribe(customers()).await.unwrap();
        assert!(manager.status().is_live());
    }

    #[tokio::test]
    async fn test_retarget_closes_old_topic_first() {
        let source = Arc::new(StubSource::default());
        let mut manager = SubscriptionManager::new(source.clone());
        let c1 = ChannelTopic::new("public", Table::Offers).with_filter(ChannelFilter::eq("customer_id", "c1"));
        let c2 = ChannelTopic::new("public", Table::Offers).with_filter(ChannelFilter::eq("customer_id", "c2"));

        manager.subscribe(c1.clone()).await.unwrap();
        source.send(&c1, RawChange::insert("public", Table::Offers, json!({"id": "o1", "customer_id": "c1"})));

        assert!(manager.retarget(&c1, c2.clone()).await.unwrap());
        assert!(!manager.is_subscribed(&c1));
        assert!(manager.is_subscribed(&c2));
        assert!(manager.try_next_change().is_none());

        assert!(!manager.retarget(&c2, c2.clone()).await.unwrap());
    }

    #[tokio::test]
    async fn test_next_change_and_source_hang_up() {
        let source = Arc::new(StubSource::default());
        let mut manager = SubscriptionManager::new(source.clone());
        let mut status = manager.watch_status();
        manager.subscribe(customers()).await.unwrap();

        source.send(&customers(), RawChange::insert("public", Table::Customers, json!({"id": "c1"})));
        let (topic, change) = manager.next_change().await.unwrap();
        assert_eq!(topic, customers());
        assert_eq!(change.table, "customers");

        source.hang_up(&customers());
        assert!(manager.next_change().await.is_none());
        assert!(manager.is_empty());
        assert!(status.borrow_and_update().is_disconnected());
    }

    #[tokio::test]
    async fn test_close_all() {
        let source = Arc::new(StubSource::default());
        let mut manager = SubscriptionManager::new(source);
        manager.subscribe(customers()).await.unwrap();
        manager
            .subscribe(ChannelTopic::new("public", Table::Tasks))
            .await
            .unwrap();

        assert_eq!(manager.close_all(), 2);
        assert!(manager.is_empty());
        assert_eq!(manager.status(), ConnectionStatus::Idle);
        assert!(manager.next_change().await.is_none());
    }
}
