// ============================================================================
// CRM Row Model
// ============================================================================
//
// One struct per tracked table. Columns the reconciler does not care about
// are kept in `extra` so a row round-trips without loss.
//
// Every column except `id` is defaulted: the `old` image of a change event
// often carries the primary key only.
//
// ============================================================================

use super::row::{ChildRow, CountedParent, Keyed, SoftDeletable};
use super::{Result, SyncError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// Tables a projection can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Customers,
    Contacts,
    Offers,
    Tasks,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Customers, Table::Contacts, Table::Offers, Table::Tasks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Customers => "customers",
            Table::Contacts => "contacts",
            Table::Offers => "offers",
            Table::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = SyncError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "customers" => Ok(Table::Customers),
            "contacts" => Ok(Table::Contacts),
            "offers" => Ok(Table::Offers),
            "tasks" => Ok(Table::Tasks),
            other => Err(SyncError::UnknownTable(other.to_string())),
        }
    }
}

// ----------------------------------------------------------------------------
// Key deserialisation: ids arrive as strings or as integers depending on the
// column type, both are normalised to strings.
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKey {
    Text(String),
    Int(i64),
    Uint(u64),
}

impl From<RawKey> for String {
    fn from(key: RawKey) -> Self {
        match key {
            RawKey::Text(s) => s,
            RawKey::Int(i) => i.to_string(),
            RawKey::Uint(u) => u.to_string(),
        }
    }
}

fn de_key<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    RawKey::deserialize(deserializer).map(String::from)
}

fn de_opt_key<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<RawKey>::deserialize(deserializer)?.map(String::from))
}

// ----------------------------------------------------------------------------
// Rows
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(deserialize_with = "de_key")]
    pub id: String,
    #[serde(default)]
    pub company_name: String,
    /// Active offers (see the offer activity rule).
    #[serde(default)]
    pub offers_count: i64,
    /// Active tasks (see the task activity rule).
    #[serde(default)]
    pub open_tasks_count: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Customer {
    pub fn new(id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company_name: company_name.into(),
            offers_count: 0,
            open_tasks_count: 0,
            created_at: None,
            deleted_at: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(deserialize_with = "de_key")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_key")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    #[serde(deserialize_with = "de_key")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_key")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Outcome of the offer: empty, `pending` and `none` mean still open.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Offer {
    pub fn new(id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            customer_id: Some(customer_id.into()),
            title: None,
            result: None,
            deleted_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "de_key")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_key")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Task {
    pub fn new(id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            customer_id: Some(customer_id.into()),
            title: None,
            status: None,
            due_date: None,
            deleted_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

// ----------------------------------------------------------------------------
// Contract impls
// ----------------------------------------------------------------------------

macro_rules! impl_row_contracts {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Keyed for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
            }

            impl SoftDeletable for $ty {
                fn deleted_at(&self) -> Option<&str> {
                    self.deleted_at.as_deref()
                }
            }
        )*
    };
}

impl_row_contracts!(Customer, Contact, Offer, Task);

impl ChildRow for Contact {
    fn parent_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }
}

impl ChildRow for Offer {
    fn parent_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    fn status(&self) -> Option<&str> {
        self.result.as_deref()
    }
}

impl ChildRow for Task {
    fn parent_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl CountedParent<Offer> for Customer {
    fn active_count_mut(&mut self) -> &mut i64 {
        &mut self.offers_count
    }
}

impl CountedParent<Task> for Customer {
    fn active_count_mut(&mut self) -> &mut i64 {
        &mut self.open_tasks_count
    }
}
