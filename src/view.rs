// ============================================================================
// Live Views
// ============================================================================
//
// A mounted view owns one projection store and the channels that keep it
// current. Channels are opened before the initial fetch, so a change that
// races the fetch is queued and applied afterwards instead of being lost.
//
// ============================================================================

use crate::change::ChannelFilter;
use crate::config::SyncConfig;
use crate::core::{Result, SyncError, Table};
use crate::store::{ApplySummary, CrmProjection};
use crate::subscription::{
    ChangeSource, ChannelTopic, ConnectionStatus, SnapshotSource, SubscriptionManager,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, event, info_span};

/// Which rows a view tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewScope {
    /// Every customer and all child rows.
    AllCustomers,
    /// One customer and its child rows.
    Customer(String),
}

impl ViewScope {
    /// One topic per table, in `Table::ALL` order.
    pub fn topics(&self, schema: &str) -> Vec<ChannelTopic> {
        Table::ALL
            .iter()
            .map(|table| {
                let topic = ChannelTopic::new(schema, *table);
                match (self, table) {
                    (ViewScope::AllCustomers, _) => topic,
                    (ViewScope::Customer(id), Table::Customers) => {
                        topic.with_filter(ChannelFilter::eq("id", id.as_str()))
                    }
                    (ViewScope::Customer(id), _) => {
                        topic.with_filter(ChannelFilter::eq("customer_id", id.as_str()))
                    }
                }
            })
            .collect()
    }
}

impl fmt::Display for ViewScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewScope::AllCustomers => write!(f, "all_customers"),
            ViewScope::Customer(id) => write!(f, "customer:{id}"),
        }
    }
}

/// Counters of what the view did with delivered changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewStats {
    pub applied: u64,
    pub ignored: u64,
    pub malformed: u64,
}

pub struct LiveView<B: ChangeSource + SnapshotSource + ?Sized> {
    backend: Arc<B>,
    schema: String,
    scope: ViewScope,
    projection: CrmProjection,
    subscriptions: SubscriptionManager<B>,
    stats: ViewStats,
    mounted: bool,
}

impl<B: ChangeSource + SnapshotSource + ?Sized> LiveView<B> {
    /// Subscribes every topic of `scope`, then loads the initial snapshot.
    pub async fn mount(backend: Arc<B>, config: &SyncConfig, scope: ViewScope) -> Result<Self> {
        config.validate()?;
        let span = info_span!("livesync.view.mount", scope = %scope, schema = %config.schema);

        let mut view = Self {
            subscriptions: SubscriptionManager::new(backend.clone()),
            backend,
            schema: config.schema.clone(),
            scope,
            projection: CrmProjection::new(config),
            stats: ViewStats::default(),
            mounted: true,
        };

        if let Err(err) = view.open_scope().await {
            span.in_scope(|| event!(Level::ERROR, error = %err, "view mount failed"));
            view.unmount();
            return Err(err);
        }
        view.reload().await?;

        span.in_scope(|| {
            event!(
                Level::INFO,
                customers = view.projection.customers().len(),
                channels = view.subscriptions.len(),
                "view mounted"
            )
        });
        Ok(view)
    }

    pub fn projection(&self) -> &CrmProjection {
        &self.projection
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn stats(&self) -> ViewStats {
        self.stats
    }

    pub fn status(&self) -> ConnectionStatus {
        self.subscriptions.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.subscriptions.watch_status()
    }

    /// Waits for one change and applies it.
    ///
    /// Malformed changes are counted and skipped. Returns `None` once the
    /// view is unmounted or every channel has ended.
    pub async fn pump(&mut self) -> Option<ApplySummary> {
        if !self.mounted {
            return None;
        }
        loop {
            let (topic, raw) = self.subscriptions.next_change().await?;
            match self.projection.apply_raw(&raw) {
                Ok(summary) => {
                    self.record(&summary);
                    return Some(summary);
                }
                Err(err) => {
                    self.stats.malformed += 1;
                    event!(Level::DEBUG, topic = %topic, error = %err, "skipped malformed change");
                }
            }
        }
    }

    /// Applies every change that is already queued, without waiting.
    pub fn pump_ready(&mut self) -> Vec<ApplySummary> {
        let mut applied = Vec::new();
        if !self.mounted {
            return applied;
        }
        while let Some((_, raw)) = self.subscriptions.try_next_change() {
            match self.projection.apply_raw(&raw) {
                Ok(summary) => {
                    self.record(&summary);
                    applied.push(summary);
                }
                Err(_) => self.stats.malformed += 1,
            }
        }
        applied
    }

    /// Switches the view to another scope: old channels close before new
    /// ones open, then the projection is refetched.
    ///
    /// If any channel fails to open or the refetch fails, every channel is
    /// closed, the projection is cleared and the view is left unmounted
    /// under its previous scope.
    pub async fn set_scope(&mut self, scope: ViewScope) -> Result<()> {
        if !self.mounted {
            return Err(SyncError::NotMounted);
        }
        if scope == self.scope {
            return Ok(());
        }

        let from = self.scope.topics(&self.schema);
        let to = scope.topics(&self.schema);
        event!(Level::INFO, from = %self.scope, to = %scope, "retargeting view");

        let previous = std::mem::replace(&mut self.scope, scope);
        let switched = match self.retarget_all(&from, to).await {
            Ok(()) => self.reload().await,
            Err(err) => Err(err),
        };
        if let Err(err) = switched {
            event!(Level::ERROR, scope = %self.scope, error = %err, "scope switch failed");
            self.scope = previous;
            self.projection.clear();
            self.unmount();
            return Err(err);
        }
        Ok(())
    }

    /// Drops the projection and fetches it again from the backend.
    pub async fn reload(&mut self) -> Result<()> {
        if !self.mounted {
            return Err(SyncError::NotMounted);
        }

        self.projection.clear();
        for topic in self.scope.topics(&self.schema) {
            let rows = self.backend.fetch(&topic).await?;
            self.projection.load_snapshot(topic.table, rows);
        }
        if let ViewScope::Customer(id) = &self.scope {
            self.projection.ensure_customer_groups(id);
        }
        Ok(())
    }

    /// Closes every channel. Nothing is applied after this returns.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        let closed = self.subscriptions.close_all();
        self.mounted = false;
        event!(Level::INFO, scope = %self.scope, channels = closed, "view unmounted");
    }

    async fn open_scope(&mut self) -> Result<()> {
        for topic in self.scope.topics(&self.schema) {
            self.subscriptions.subscribe(topic).await?;
        }
        Ok(())
    }

    async fn retarget_all(&mut self, from: &[ChannelTopic], to: Vec<ChannelTopic>) -> Result<()> {
        for (old, new) in from.iter().zip(to) {
            self.subscriptions.retarget(old, new).await?;
        }
        Ok(())
    }

    fn record(&mut self, summary: &ApplySummary) {
        if summary.effect.is_applied() {
            self.stats.applied += 1;
        } else {
            self.stats.ignored += 1;
        }
    }
}

impl<B: ChangeSource + SnapshotSource + ?Sized> Drop for LiveView<B> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_topics() {
        let all = ViewScope::AllCustomers.topics("public");
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|topic| topic.filter.is_none()));

        let one = ViewScope::Customer("c1".into()).topics("public");
        let rendered: Vec<String> = one.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "realtime:public:customers:id=eq.c1",
                "realtime:public:contacts:customer_id=eq.c1",
                "realtime:public:offers:customer_id=eq.c1",
                "realtime:public:tasks:customer_id=eq.c1",
            ]
        );
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(ViewScope::AllCustomers.to_string(), "all_customers");
        assert_eq!(ViewScope::Customer("c9".into()).to_string(), "customer:c9");
    }
}
