use crate::core::{Contact, Customer, Keyed, Offer, Result, SyncError, Table, Task};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a change notification as emitted by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(SyncError::MalformedEvent(format!(
                "unknown event type '{other}'"
            ))),
        }
    }
}

/// A single row change.
///
/// The variant shape carries the kind invariant: an insert has only the new
/// image, a delete only the old one, an update both.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Insert { after: T },
    Update { before: T, after: T },
    Delete { before: T },
}

impl<T: Keyed> ChangeEvent<T> {
    pub fn insert(after: T) -> Self {
        ChangeEvent::Insert { after }
    }

    pub fn update(before: T, after: T) -> Self {
        ChangeEvent::Update { before, after }
    }

    pub fn delete(before: T) -> Self {
        ChangeEvent::Delete { before }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert { .. } => ChangeKind::Insert,
            ChangeEvent::Update { .. } => ChangeKind::Update,
            ChangeEvent::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Primary key of the row the event is about.
    pub fn row_id(&self) -> &str {
        match self {
            ChangeEvent::Insert { after } | ChangeEvent::Update { after, .. } => after.id(),
            ChangeEvent::Delete { before } => before.id(),
        }
    }

    pub fn before(&self) -> Option<&T> {
        match self {
            ChangeEvent::Insert { .. } => None,
            ChangeEvent::Update { before, .. } | ChangeEvent::Delete { before } => Some(before),
        }
    }

    pub fn after(&self) -> Option<&T> {
        match self {
            ChangeEvent::Insert { after } | ChangeEvent::Update { after, .. } => Some(after),
            ChangeEvent::Delete { .. } => None,
        }
    }
}

/// A decoded change, tagged by the table it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    Customers(ChangeEvent<Customer>),
    Contacts(ChangeEvent<Contact>),
    Offers(ChangeEvent<Offer>),
    Tasks(ChangeEvent<Task>),
}

impl TableChange {
    pub fn table(&self) -> Table {
        match self {
            TableChange::Customers(_) => Table::Customers,
            TableChange::Contacts(_) => Table::Contacts,
            TableChange::Offers(_) => Table::Offers,
            TableChange::Tasks(_) => Table::Tasks,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            TableChange::Customers(e) => e.kind(),
            TableChange::Contacts(e) => e.kind(),
            TableChange::Offers(e) => e.kind(),
            TableChange::Tasks(e) => e.kind(),
        }
    }

    pub fn row_id(&self) -> &str {
        match self {
            TableChange::Customers(e) => e.row_id(),
            TableChange::Contacts(e) => e.row_id(),
            TableChange::Offers(e) => e.row_id(),
            TableChange::Tasks(e) => e.row_id(),
        }
    }
}

impl From<ChangeEvent<Customer>> for TableChange {
    fn from(event: ChangeEvent<Customer>) -> Self {
        TableChange::Customers(event)
    }
}

impl From<ChangeEvent<Contact>> for TableChange {
    fn from(event: ChangeEvent<Contact>) -> Self {
        TableChange::Contacts(event)
    }
}

impl From<ChangeEvent<Offer>> for TableChange {
    fn from(event: ChangeEvent<Offer>) -> Self {
        TableChange::Offers(event)
    }
}

impl From<ChangeEvent<Task>> for TableChange {
    fn from(event: ChangeEvent<Task>) -> Self {
        TableChange::Tasks(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("INSERT".parse::<ChangeKind>().unwrap(), ChangeKind::Insert);
        assert_eq!("DELETE".parse::<ChangeKind>().unwrap(), ChangeKind::Delete);
        assert!("TRUNCATE".parse::<ChangeKind>().is_err());
        assert!("insert".parse::<ChangeKind>().is_err());
    }

    #[test]
    fn test_event_accessors() {
        let before = Offer::new("o1", "c1").with_result("pending");
        let after = Offer::new("o1", "c1").with_result("won");
        let event = ChangeEvent::update(before.clone(), after.clone());

        assert_eq!(event.kind(), ChangeKind::Update);
        assert_eq!(event.row_id(), "o1");
        assert_eq!(event.before(), Some(&before));
        assert_eq!(event.after(), Some(&after));

        let delete = ChangeEvent::delete(before);
        assert!(delete.after().is_none());
        assert_eq!(delete.row_id(), "o1");
    }

    #[test]
    fn test_table_change_tagging() {
        let change: TableChange = ChangeEvent::insert(Customer::new("c1", "Acme")).into();
        assert_eq!(change.table(), Table::Customers);
        assert_eq!(change.kind(), ChangeKind::Insert);
        assert_eq!(change.row_id(), "c1");
    }
}
