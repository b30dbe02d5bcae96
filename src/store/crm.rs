use crate::change::{ChangeKind, RawChange, TableChange};
use crate::config::{CustomerOrder, SyncConfig};
use crate::core::{ChildRow, Contact, Customer, Offer, ProjectedRow, Result, Table, Task};
use crate::reconcile::{
    ActivityRule, CascadeTarget, FlatProjection, GroupedProjection, Outcome, Skip,
    apply_counted_child, apply_grouped, apply_parent,
};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, event};

/// What a reconciled change did, independent of the row type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedEffect {
    Inserted,
    Updated,
    Removed { soft: bool },
    Ignored(Skip),
}

impl AppliedEffect {
    fn from_outcome<T>(outcome: &Outcome<T>) -> Self {
        match outcome {
            Outcome::Inserted => AppliedEffect::Inserted,
            Outcome::Replaced { .. } => AppliedEffect::Updated,
            Outcome::Removed { soft, .. } => AppliedEffect::Removed { soft: *soft },
            Outcome::Ignored(skip) => AppliedEffect::Ignored(*skip),
        }
    }

    pub fn is_applied(&self) -> bool {
        !matches!(self, AppliedEffect::Ignored(_))
    }
}

impl fmt::Display for AppliedEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedEffect::Inserted => f.write_str("inserted"),
            AppliedEffect::Updated => f.write_str("updated"),
            AppliedEffect::Removed { soft: true } => f.write_str("soft_removed"),
            AppliedEffect::Removed { soft: false } => f.write_str("removed"),
            AppliedEffect::Ignored(skip) => write!(f, "ignored:{skip}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: String,
    pub effect: AppliedEffect,
    /// Child rows dropped along with a removed customer.
    pub cascaded: usize,
    /// Net change to customer counters.
    pub count_delta: i64,
}

/// Local projection store of one view: the customer list plus the child
/// rows grouped per customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmProjection {
    customers: FlatProjection<Customer>,
    contacts: GroupedProjection<Contact>,
    offers: GroupedProjection<Offer>,
    tasks: GroupedProjection<Task>,
    offer_activity: ActivityRule,
    task_activity: ActivityRule,
}

fn company_name(customer: &Customer) -> &str {
    &customer.company_name
}

impl CrmProjection {
    pub fn new(config: &SyncConfig) -> Self {
        let customers = match config.customer_order {
            CustomerOrder::CompanyName => FlatProjection::sorted_by(company_name),
            CustomerOrder::NewestFirst => FlatProjection::newest_first(),
        };
        Self {
            customers,
            contacts: GroupedProjection::new(),
            offers: GroupedProjection::new(),
            tasks: GroupedProjection::new(),
            offer_activity: config.offer_activity.clone(),
            task_activity: config.task_activity.clone(),
        }
    }

    pub fn customers(&self) -> &FlatProjection<Customer> {
        &self.customers
    }

    pub fn contacts(&self) -> &GroupedProjection<Contact> {
        &self.contacts
    }

    pub fn offers(&self) -> &GroupedProjection<Offer> {
        &self.offers
    }

    pub fn tasks(&self) -> &GroupedProjection<Task> {
        &self.tasks
    }

    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.customers.get(id)
    }

    /// Applies one decoded change.
    pub fn apply(&mut self, change: TableChange) -> ApplySummary {
        let table = change.table();
        let kind = change.kind();
        let row_id = change.row_id().to_string();

        let (effect, cascaded, count_delta) = match change {
            TableChange::Customers(event) => {
                let mut children: [&mut dyn CascadeTarget; 3] =
                    [&mut self.contacts, &mut self.offers, &mut self.tasks];
                let result = apply_parent(&mut self.customers, &mut children, event);
                (AppliedEffect::from_outcome(&result.outcome), result.cascaded, 0)
            }
            TableChange::Contacts(event) => {
                let outcome = apply_grouped(&mut self.contacts, event);
                (AppliedEffect::from_outcome(&outcome), 0, 0)
            }
            TableChange::Offers(event) => {
                let result = apply_counted_child(
                    &mut self.customers,
                    &mut self.offers,
                    &self.offer_activity,
                    event,
                );
                (AppliedEffect::from_outcome(&result.outcome), 0, result.count_delta)
            }
            TableChange::Tasks(event) => {
                let result = apply_counted_child(
                    &mut self.customers,
                    &mut self.tasks,
                    &self.task_activity,
                    event,
                );
                (AppliedEffect::from_outcome(&result.outcome), 0, result.count_delta)
            }
        };

        event!(
            Level::DEBUG,
            table = %table,
            kind = %kind,
            row_id = %row_id,
            effect = %effect,
            cascaded,
            count_delta,
            "change reconciled"
        );

        ApplySummary {
            table,
            kind,
            row_id,
            effect,
            cascaded,
            count_delta,
        }
    }

    /// Decodes and applies a wire payload.
    ///
    /// A payload that cannot be decoded is logged and leaves the projection
    /// untouched; the decode error is returned for the caller's bookkeeping.
    pub fn apply_raw(&mut self, raw: &RawChange) -> Result<ApplySummary> {
        match raw.decode() {
            Ok(change) => Ok(self.apply(change)),
            Err(err) => {
                event!(
                    Level::WARN,
                    table = %raw.table,
                    event_type = %raw.event_type,
                    error = %err,
                    "dropping malformed change event"
                );
                Err(err)
            }
        }
    }

    /// Returns the projection that results from applying `change`, leaving
    /// `self` as it was.
    pub fn reconciled(&self, change: TableChange) -> (Self, ApplySummary) {
        let mut next = self.clone();
        let summary = next.apply(change);
        (next, summary)
    }

    /// Replaces one table's rows with the result of a bulk fetch.
    ///
    /// Rows that fail to decode are logged and skipped. Returns the number
    /// of rows kept.
    pub fn load_snapshot(&mut self, table: Table, rows: Vec<JsonValue>) -> usize {
        let kept = match table {
            Table::Customers => self.customers.load(decode_rows(table, rows)),
            Table::Contacts => self.contacts.load(decode_rows(table, rows)),
            Table::Offers => self.offers.load(decode_rows(table, rows)),
            Table::Tasks => self.tasks.load(decode_rows(table, rows)),
        };
        event!(Level::DEBUG, table = %table, kept, "snapshot loaded");
        kept
    }

    /// Makes sure every child projection has a (possibly empty) group for
    /// the customer, so a customer-scoped view reports "no rows" rather
    /// than "not loaded".
    pub fn ensure_customer_groups(&mut self, customer_id: &str) {
        self.contacts.ensure_group(customer_id);
        self.offers.ensure_group(customer_id);
        self.tasks.ensure_group(customer_id);
    }

    pub fn clear(&mut self) {
        self.customers.clear();
        self.contacts.clear();
        self.offers.clear();
        self.tasks.clear();
    }

    /// JSON dump of the projection with deterministic key order.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "customers": self.customers.iter().map(to_value).collect::<Vec<_>>(),
            "contacts": grouped_json(&self.contacts),
            "offers": grouped_json(&self.offers),
            "tasks": grouped_json(&self.tasks),
        })
    }
}

fn decode_rows<T: ProjectedRow>(table: Table, rows: Vec<JsonValue>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(row) => Some(row),
            Err(err) => {
                event!(Level::WARN, table = %table, error = %err, "skipping undecodable snapshot row");
                None
            }
        })
        .collect()
}

fn to_value<T: ProjectedRow>(row: &T) -> JsonValue {
    serde_json::to_value(row).unwrap_or(JsonValue::Null)
}

fn grouped_json<T: ChildRow>(projection: &GroupedProjection<T>) -> JsonValue {
    let groups: BTreeMap<&str, Vec<JsonValue>> = projection
        .parent_ids()
        .into_iter()
        .map(|parent| {
            let rows = projection
                .group(parent)
                .map(|rows| rows.iter().map(to_value).collect::<Vec<_>>())
                .unwrap_or_default();
            (parent, rows)
        })
        .collect();
    let map: Map<String, JsonValue> = groups
        .into_iter()
        .map(|(parent, rows)| (parent.to_string(), JsonValue::Array(rows)))
        .collect();
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeEvent;
    use serde_json::json;

    fn projection() -> CrmProjection {
        CrmProjection::new(&SyncConfig::default())
    }

    #[test]
    fn test_customer_list_sorted_by_company() {
        let mut crm = projection();
        crm.apply(ChangeEvent::insert(Customer::new("c1", "zeta")).into());
        crm.apply(ChangeEvent::insert(Customer::new("c2", "Acme")).into());
        crm.apply(ChangeEvent::insert(Customer::new("c3", "beta")).into());
        assert_eq!(crm.customers().ids(), vec!["c2", "c3", "c1"]);
    }

    #[test]
    fn test_customer_delete_cascades_to_all_children() {
        let mut crm = projection();
        crm.apply(ChangeEvent::insert(Customer::new("c1", "Acme")).into());
        crm.apply(ChangeEvent::insert(Offer::new("o1", "c1")).into());
        crm.apply(ChangeEvent::insert(Task::new("t1", "c1")).into());

        let summary = crm.apply(ChangeEvent::delete(Customer::new("c1", "")).into());
        assert_eq!(summary.effect, AppliedEffect::Removed { soft: false });
        assert_eq!(summary.cascaded, 2);
        assert!(crm.offers().is_empty());
        assert!(crm.tasks().is_empty());
    }

    #[test]
    fn test_task_count_tracks_open_tasks() {
        let mut crm = projection();
        crm.apply(ChangeEvent::insert(Customer::new("c1", "Acme")).into());
        crm.apply(ChangeEvent::insert(Task::new("t1", "c1").with_status("open")).into());
        crm.apply(ChangeEvent::insert(Task::new("t2", "c1").with_status("done")).into());

        let customer = crm.customer("c1").unwrap();
        assert_eq!(customer.open_tasks_count, 1);
        assert_eq!(customer.offers_count, 0);
    }

    #[test]
    fn test_apply_raw_drops_malformed() {
        let mut crm = projection();
        crm.apply(ChangeEvent::insert(Customer::new("c1", "Acme")).into());
        let before = crm.clone();

        let raw = RawChange::insert("public", Table::Offers, json!({"customer_id": "c1"}));
        assert!(crm.apply_raw(&raw).is_err());
        assert_eq!(crm, before);
    }

    #[test]
    fn test_reconciled_leaves_original_untouched() {
        let crm = projection();
        let (next, summary) = crm.reconciled(ChangeEvent::insert(Customer::new("c1", "Acme")).into());
        assert_eq!(summary.effect, AppliedEffect::Inserted);
        assert!(crm.customers().is_empty());
        assert_eq!(next.customers().len(), 1);
    }

    #[test]
    fn test_load_snapshot_skips_bad_rows() {
        let mut crm = projection();
        let kept = crm.load_snapshot(
            Table::Offers,
            vec![
                json!({"id": "o1", "customer_id": "c1"}),
                json!({"customer_id": "c1"}),
                json!({"id": "o2", "customer_id": "c2", "deleted_at": "2024-01-01"}),
            ],
        );
        assert_eq!(kept, 1);
        assert_eq!(crm.offers().group_ids("c1"), vec!["o1"]);
    }

    #[test]
    fn test_to_json_dump() {
        let mut crm = projection();
        crm.apply(ChangeEvent::insert(Customer::new("c1", "Acme")).into());
        crm.ensure_customer_groups("c1");

        let dump = crm.to_json();
        assert_eq!(dump["customers"][0]["id"], json!("c1"));
        assert_eq!(dump["offers"], json!({"c1": []}));
    }
}
