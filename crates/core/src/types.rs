//! Shared domain types consumed across the CRM crates.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer record. Read-only input to audience evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub total_spend: f64,
    pub visit_count: u32,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            phone: None,
            total_spend: 0.0,
            visit_count: 0,
            last_activity: now,
            created_at: now,
            tags: BTreeSet::new(),
        }
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Whole days elapsed from `then` to `now`. Timestamps in the future count as zero.
pub fn elapsed_days(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_name() {
        let c = Customer::new("Alex Johnson", "alex.johnson@example.com");
        assert_eq!(c.first_name(), "Alex");

        let single = Customer::new("Cher", "cher@example.com");
        assert_eq!(single.first_name(), "Cher");
    }

    #[test]
    fn test_elapsed_days_floors_partial_days() {
        let now = Utc::now();
        assert_eq!(elapsed_days(now - Duration::hours(47), now), 1);
        assert_eq!(elapsed_days(now - Duration::days(90), now), 90);
        assert_eq!(elapsed_days(now + Duration::days(3), now), 0);
    }

    #[test]
    fn test_customer_wire_format() {
        let json = serde_json::json!({
            "id": "6f1c2a3e-7d4b-4f10-9a55-0d2b8c1e9f00",
            "name": "Michael Chen",
            "email": "michael.chen@example.com",
            "totalSpend": 4350,
            "visitCount": 9,
            "lastActivity": "2023-03-22T09:15:00Z",
            "tags": ["new-customer"],
            "createdAt": "2023-01-20T15:45:00Z"
        });
        let c: Customer = serde_json::from_value(json).unwrap();
        assert_eq!(c.total_spend, 4350.0);
        assert!(c.phone.is_none());
        assert!(c.has_tag("new-customer"));
    }
}
