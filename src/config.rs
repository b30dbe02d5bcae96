use crate::core::{Result, SyncError};
use crate::reconcile::ActivityRule;
use serde::{Deserialize, Serialize};

/// How the customer list is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerOrder {
    /// Alphabetical by company name.
    CompanyName,
    /// Most recently inserted first.
    NewestFirst,
}

/// Projection and channel configuration
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use livesync::SyncConfig;
///
/// let config = SyncConfig::from_json_str(r#"{ "schema": "crm" }"#).unwrap();
/// assert_eq!(config.schema, "crm");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Database schema the realtime channels listen on
    pub schema: String,

    /// Ordering of the customer list
    pub customer_order: CustomerOrder,

    /// Which offers count toward `customers.offers_count`
    pub offer_activity: ActivityRule,

    /// Which tasks count toward `customers.open_tasks_count`
    pub task_activity: ActivityRule,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            schema: "public".to_string(),
            customer_order: CustomerOrder::CompanyName,
            offer_activity: ActivityRule::offers(),
            task_activity: ActivityRule::tasks(),
        }
    }

    /// Set the schema name
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    /// Set the customer list ordering
    pub fn customer_order(mut self, order: CustomerOrder) -> Self {
        self.customer_order = order;
        self
    }

    /// Set the offer activity rule
    pub fn offer_activity(mut self, rule: ActivityRule) -> Self {
        self.offer_activity = rule;
        self
    }

    /// Set the task activity rule
    pub fn task_activity(mut self, rule: ActivityRule) -> Self {
        self.task_activity = rule;
        self
    }

    /// Parse a JSON document, then validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.schema.trim().is_empty() {
            return Err(SyncError::InvalidConfig("schema cannot be empty".to_string()));
        }

        if self.schema.contains(':') {
            return Err(SyncError::InvalidConfig(format!(
                "schema '{}' cannot contain ':'",
                self.schema
            )));
        }

        for (name, rule) in [("offer_activity", &self.offer_activity), ("task_activity", &self.task_activity)] {
            if rule.active_values.is_empty() && !rule.missing_is_active {
                return Err(SyncError::InvalidConfig(format!(
                    "{name} can never match: no active values and missing status inactive"
                )));
            }
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
