use crate::change::{ChangeKind, RawChange};
use crate::core::{Result, SyncError, Table};
use crate::subscription::{ChangeChannel, ChangeSource, ChannelCloser, ChannelTopic, SnapshotSource};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;

type Row = Map<String, JsonValue>;
type Registry = Mutex<HashMap<u64, Subscriber>>;

struct Subscriber {
    topic: ChannelTopic,
    sender: mpsc::UnboundedSender<RawChange>,
}

/// Removes one subscriber from the backend registry.
struct RegistryHandle {
    id: u64,
    registry: Weak<Registry>,
}

impl ChannelCloser for RegistryHandle {
    fn close(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

/// In-process database and realtime service.
///
/// Every mutation emits the matching change, with full `old` and `new`
/// images, to each subscriber whose topic accepts it.
pub struct InMemoryBackend {
    schema: String,
    /// Rows per table, in insertion order
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    subscribers: Arc<Registry>,
    next_subscriber: AtomicU64,
    pending_failures: Mutex<VecDeque<String>>,
    disposed: AtomicBool,
}

impl InMemoryBackend {
    pub fn init(schema: &str) -> Arc<Self> {
        debug!("in-memory backend initialised for schema '{}'", schema);
        Arc::new(Self {
            schema: schema.to_string(),
            tables: RwLock::new(Table::ALL.iter().map(|table| (*table, Vec::new())).collect()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber: AtomicU64::new(1),
            pending_failures: Mutex::new(VecDeque::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Ends every open channel and rejects all further calls.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let dropped = {
            let mut subscribers = self.subscribers.lock()?;
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        self.tables.write()?.clear();
        debug!("in-memory backend disposed, {} subscriber(s) dropped", dropped);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SyncError::Disposed);
        }
        Ok(())
    }

    pub fn subscriber_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.subscribers.lock()?.len())
    }

    /// Makes the next `subscribe` call fail with `reason`.
    pub fn fail_next_subscribe(&self, reason: &str) -> Result<()> {
        self.ensure_open()?;
        self.pending_failures.lock()?.push_back(reason.to_string());
        Ok(())
    }

    /// All rows of a table, soft-deleted ones included.
    pub fn rows(&self, table: Table) -> Result<Vec<JsonValue>> {
        self.ensure_open()?;
        let tables = self.tables.read()?;
        Ok(tables
            .get(&table)
            .map(|rows| rows.iter().cloned().map(JsonValue::Object).collect())
            .unwrap_or_default())
    }

    /// Stores a row and emits an INSERT. Returns the row id, generated when
    /// the row has none.
    pub fn insert(&self, table: Table, row: JsonValue) -> Result<String> {
        self.ensure_open()?;
        let JsonValue::Object(mut row) = row else {
            return Err(SyncError::InvalidRow(format!("{table} row must be a JSON object")));
        };

        let id = match row.get("id") {
            None | Some(JsonValue::Null) => uuid::Uuid::new_v4().to_string(),
            Some(JsonValue::String(id)) => id.clone(),
            Some(JsonValue::Number(id)) => id.to_string(),
            Some(other) => {
                return Err(SyncError::InvalidRow(format!("{table} id {other} is not a key")));
            }
        };
        row.insert("id".to_string(), JsonValue::String(id.clone()));

        {
            let mut tables = self.tables.write()?;
            let rows = tables.entry(table).or_default();
            if rows.iter().any(|existing| row_id(existing) == Some(id.as_str())) {
                return Err(SyncError::DuplicateRow {
                    table: table.to_string(),
                    id,
                });
            }
            rows.push(row.clone());
        }

        self.emit(RawChange::insert(self.schema.as_str(), table, JsonValue::Object(row)))?;
        Ok(id)
    }

    /// Merges `patch` into a stored row and emits an UPDATE.
    pub fn update(&self, table: Table, id: &str, patch: JsonValue) -> Result<()> {
        self.ensure_open()?;
        let JsonValue::Object(patch) = patch else {
            return Err(SyncError::InvalidRow(format!("{table} patch must be a JSON object")));
        };

        let (old_row, new_row) = {
            let mut tables = self.tables.write()?;
            let row = tables
                .get_mut(&table)
                .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
                .ok_or_else(|| SyncError::RowNotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                })?;

            let old_row = row.clone();
            for (column, value) in patch {
                if column != "id" {
                    row.insert(column, value);
                }
            }
            (old_row, row.clone())
        };

        self.emit(RawChange::update(
            self.schema.as_str(),
            table,
            JsonValue::Object(old_row),
            JsonValue::Object(new_row),
        ))
    }

    /// Sets `deleted_at` to the current time.
    pub fn soft_delete(&self, table: Table, id: &str) -> Result<()> {
        let mut patch = Map::new();
        patch.insert("deleted_at".to_string(), JsonValue::String(Utc::now().to_rfc3339()));
        self.update(table, id, JsonValue::Object(patch))
    }

    /// Clears `deleted_at`.
    pub fn restore(&self, table: Table, id: &str) -> Result<()> {
        let mut patch = Map::new();
        patch.insert("deleted_at".to_string(), JsonValue::Null);
        self.update(table, id, JsonValue::Object(patch))
    }

    /// Removes a row and emits a DELETE.
    pub fn delete(&self, table: Table, id: &str) -> Result<()> {
        self.ensure_open()?;
        let removed = {
            let mut tables = self.tables.write()?;
            let rows = tables.get_mut(&table);
            let position = rows
                .as_ref()
                .and_then(|rows| rows.iter().position(|row| row_id(row) == Some(id)));
            match (rows, position) {
                (Some(rows), Some(position)) => rows.remove(position),
                _ => {
                    return Err(SyncError::RowNotFound {
                        table: table.to_string(),
                        id: id.to_string(),
                    });
                }
            }
        };

        self.emit(RawChange::delete(self.schema.as_str(), table, JsonValue::Object(removed)))
    }

    /// Delivers an arbitrary payload without touching stored rows. Returns
    /// the number of subscribers that received it.
    pub fn publish(&self, change: RawChange) -> Result<usize> {
        self.ensure_open()?;
        self.deliver(change)
    }

    fn emit(&self, change: RawChange) -> Result<()> {
        let kind = change.kind().unwrap_or(ChangeKind::Update);
        let table = change.table.clone();
        let delivered = self.deliver(change.with_commit_timestamp(Utc::now().to_rfc3339()))?;
        debug!("{} on '{}' delivered to {} subscriber(s)", kind, table, delivered);
        Ok(())
    }

    fn deliver(&self, change: RawChange) -> Result<usize> {
        let mut subscribers = self.subscribers.lock()?;
        let mut gone = Vec::new();
        let mut delivered = 0;

        for (id, subscriber) in subscribers.iter() {
            if !subscriber.topic.accepts(&change) {
                continue;
            }
            if subscriber.sender.send(change.clone()).is_ok() {
                delivered += 1;
            } else {
                gone.push(*id);
            }
        }

        for id in gone {
            subscribers.remove(&id);
        }
        Ok(delivered)
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(JsonValue::as_str)
}

#[async_trait]
impl ChangeSource for InMemoryBackend {
    async fn subscribe(&self, topic: &ChannelTopic) -> Result<ChangeChannel> {
        self.ensure_open()?;

        if let Some(reason) = self.pending_failures.lock()?.pop_front() {
            warn!("refusing subscription to {}: {}", topic, reason);
            return Err(SyncError::SubscriptionFailed {
                topic: topic.to_string(),
                reason,
            });
        }

        if topic.schema != self.schema {
            return Err(SyncError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: format!("unknown schema '{}'", topic.schema),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock()?.insert(
            id,
            Subscriber {
                topic: topic.clone(),
                sender,
            },
        );
        debug!("subscriber {} registered on {}", id, topic);

        Ok(ChangeChannel::new(
            receiver,
            RegistryHandle {
                id,
                registry: Arc::downgrade(&self.subscribers),
            },
        ))
    }
}

#[async_trait]
impl SnapshotSource for InMemoryBackend {
    async fn fetch(&self, topic: &ChannelTopic) -> Result<Vec<JsonValue>> {
        self.ensure_open()?;
        let tables = self.tables.read()?;
        let rows = tables.get(&topic.table).map(Vec::as_slice).unwrap_or_default();

        Ok(rows
            .iter()
            .rev()
            .filter(|row| row.get("deleted_at").is_none_or(JsonValue::is_null))
            .filter(|row| topic.filter.as_ref().is_none_or(|filter| filter.matches(row)))
            .cloned()
            .map(JsonValue::Object)
            .collect())
    }
}
