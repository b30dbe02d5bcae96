use serde::{Deserialize, Serialize};

/// Decides whether a child row counts toward its parent's active count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRule {
    /// Status values that count as active. Compared case-insensitively.
    pub active_values: Vec<String>,
    /// Whether a row without a status counts as active.
    #[serde(default = "default_missing_is_active")]
    pub missing_is_active: bool,
}

fn default_missing_is_active() -> bool {
    true
}

impl ActivityRule {
    pub fn new<I, S>(active_values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            active_values: active_values.into_iter().map(Into::into).collect(),
            missing_is_active: true,
        }
    }

    pub fn missing_is_active(mut self, active: bool) -> Self {
        self.missing_is_active = active;
        self
    }

    /// Offers are open until they carry a result.
    pub fn offers() -> Self {
        Self::new(["", "pending", "none"])
    }

    pub fn tasks() -> Self {
        Self::new(["", "open", "pending", "in_progress"])
    }

    pub fn is_active(&self, status: Option<&str>) -> bool {
        match status {
            None => self.missing_is_active,
            Some(status) => {
                let status = status.trim();
                self.active_values
                    .iter()
                    .any(|value| value.eq_ignore_ascii_case(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_rule() {
        let rule = ActivityRule::offers();
        assert!(rule.is_active(None));
        assert!(rule.is_active(Some("")));
        assert!(rule.is_active(Some("pending")));
        assert!(rule.is_active(Some("None")));
        assert!(!rule.is_active(Some("won")));
        assert!(!rule.is_active(Some("lost")));
    }

    #[test]
    fn test_missing_status_can_be_inactive() {
        let rule = ActivityRule::new(["open"]).missing_is_active(false);
        assert!(!rule.is_active(None));
        assert!(rule.is_active(Some(" open ")));
    }
}
