// ============================================================================
// Realtime Wire Payload
// ============================================================================
//
// Shape of a postgres change notification as delivered by the hosted
// realtime service:
//
//   { "eventType": "UPDATE", "schema": "public", "table": "offers",
//     "commit_timestamp": "...", "new": {...}, "old": {...} }
//
// The absent side of an insert or delete is sent as `{}`, which is treated
// exactly like `null`.
//
// ============================================================================

use super::event::{ChangeEvent, ChangeKind, TableChange};
use crate::core::{Keyed, Result, SyncError, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default)]
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
    #[serde(rename = "new", default)]
    pub new_row: Option<JsonValue>,
    #[serde(rename = "old", default)]
    pub old_row: Option<JsonValue>,
}

impl RawChange {
    pub fn new(
        kind: ChangeKind,
        schema: impl Into<String>,
        table: impl Into<String>,
        old_row: Option<JsonValue>,
        new_row: Option<JsonValue>,
    ) -> Self {
        Self {
            event_type: kind.as_str().to_string(),
            schema: schema.into(),
            table: table.into(),
            commit_timestamp: None,
            new_row,
            old_row,
        }
    }

    pub fn insert(schema: impl Into<String>, table: Table, new_row: JsonValue) -> Self {
        Self::new(ChangeKind::Insert, schema, table.as_str(), None, Some(new_row))
    }

    pub fn update(schema: impl Into<String>, table: Table, old_row: JsonValue, new_row: JsonValue) -> Self {
        Self::new(ChangeKind::Update, schema, table.as_str(), Some(old_row), Some(new_row))
    }

    pub fn delete(schema: impl Into<String>, table: Table, old_row: JsonValue) -> Self {
        Self::new(ChangeKind::Delete, schema, table.as_str(), Some(old_row), None)
    }

    pub fn with_commit_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.commit_timestamp = Some(timestamp.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn kind(&self) -> Result<ChangeKind> {
        self.event_type.parse()
    }

    /// The image that identifies the row for filtering: `new` when present,
    /// `old` otherwise.
    pub fn routing_image(&self) -> Option<&Map<String, JsonValue>> {
        image(&self.new_row).or_else(|| image(&self.old_row))
    }

    /// Decodes the payload into a typed change for its table.
    pub fn decode(&self) -> Result<TableChange> {
        let table: Table = self.table.parse()?;
        let kind = self.kind()?;
        let change = match table {
            Table::Customers => TableChange::Customers(self.decode_rows(kind)?),
            Table::Contacts => TableChange::Contacts(self.decode_rows(kind)?),
            Table::Offers => TableChange::Offers(self.decode_rows(kind)?),
            Table::Tasks => TableChange::Tasks(self.decode_rows(kind)?),
        };
        Ok(change)
    }

    fn decode_rows<T: DeserializeOwned + Keyed>(&self, kind: ChangeKind) -> Result<ChangeEvent<T>> {
        let new_image = image(&self.new_row);
        let old_image = image(&self.old_row);

        match kind {
            ChangeKind::Insert => {
                let after = self.decode_image(new_image, kind, "new")?;
                Ok(ChangeEvent::Insert { after })
            }
            ChangeKind::Update => {
                let after: T = self.decode_image(new_image, kind, "new")?;
                let before: T = self.decode_image(old_image, kind, "old")?;
                if before.id() != after.id() {
                    return Err(SyncError::MalformedEvent(format!(
                        "{} on '{}' changes primary key from '{}' to '{}'",
                        kind,
                        self.table,
                        before.id(),
                        after.id()
                    )));
                }
                Ok(ChangeEvent::Update { before, after })
            }
            ChangeKind::Delete => {
                let before = self.decode_image(old_image, kind, "old")?;
                Ok(ChangeEvent::Delete { before })
            }
        }
    }

    fn decode_image<T: DeserializeOwned>(
        &self,
        image: Option<&Map<String, JsonValue>>,
        kind: ChangeKind,
        side: &str,
    ) -> Result<T> {
        let image = image.ok_or_else(|| {
            SyncError::MalformedEvent(format!("{} on '{}' has no '{}' row", kind, self.table, side))
        })?;
        serde_json::from_value(JsonValue::Object(image.clone())).map_err(|err| {
            SyncError::MalformedEvent(format!(
                "{} on '{}' has an invalid '{}' row: {}",
                kind, self.table, side, err
            ))
        })
    }
}

/// A row image, or `None` for null, `{}` or a non-object value.
fn image(value: &Option<JsonValue>) -> Option<&Map<String, JsonValue>> {
    match value {
        Some(JsonValue::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_wire_insert() {
        let raw = RawChange::from_json_str(
            r#"{"eventType":"INSERT","schema":"public","table":"offers",
                "commit_timestamp":"2024-01-01T00:00:00Z",
                "new":{"id":"o1","customer_id":"c1","result":"pending"},"old":{}}"#,
        )
        .unwrap();

        match raw.decode().unwrap() {
            TableChange::Offers(ChangeEvent::Insert { after }) => {
                assert_eq!(after.id, "o1");
                assert_eq!(after.result.as_deref(), Some("pending"));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_delete_with_key_only_old() {
        let raw = RawChange::delete("public", Table::Tasks, json!({"id": "t9"}));
        match raw.decode().unwrap() {
            TableChange::Tasks(ChangeEvent::Delete { before }) => {
                assert_eq!(before.id, "t9");
                assert!(before.customer_id.is_none());
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_insert_without_new_is_malformed() {
        let raw = RawChange::new(ChangeKind::Insert, "public", "customers", None, Some(json!({})));
        assert!(matches!(raw.decode(), Err(SyncError::MalformedEvent(_))));
    }

    #[test]
    fn test_update_requires_both_images() {
        let raw = RawChange::new(
            ChangeKind::Update,
            "public",
            "customers",
            Some(json!({})),
            Some(json!({"id": "c1"})),
        );
        assert!(matches!(raw.decode(), Err(SyncError::MalformedEvent(_))));
    }

    #[test]
    fn test_update_key_mismatch_is_malformed() {
        let raw = RawChange::update("public", Table::Customers, json!({"id": "c1"}), json!({"id": "c2"}));
        assert!(matches!(raw.decode(), Err(SyncError::MalformedEvent(_))));
    }

    #[test]
    fn test_unknown_table_and_kind() {
        let raw = RawChange::new(ChangeKind::Insert, "public", "invoices", None, Some(json!({"id": "i1"})));
        assert!(matches!(raw.decode(), Err(SyncError::UnknownTable(_))));

        let mut raw = RawChange::insert("public", Table::Offers, json!({"id": "o1"}));
        raw.event_type = "TRUNCATE".to_string();
        assert!(matches!(raw.decode(), Err(SyncError::MalformedEvent(_))));
    }

    #[test]
    fn test_routing_image_prefers_new() {
        let raw = RawChange::update(
            "public",
            Table::Offers,
            json!({"id": "o1", "customer_id": "c1"}),
            json!({"id": "o1", "customer_id": "c2"}),
        );
        assert_eq!(raw.routing_image().unwrap()["customer_id"], json!("c2"));

        let raw = RawChange::delete("public", Table::Offers, json!({"id": "o1", "customer_id": "c1"}));
        assert_eq!(raw.routing_image().unwrap()["customer_id"], json!("c1"));
    }
}
