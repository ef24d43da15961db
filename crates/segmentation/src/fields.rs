//! Closed registry of customer attributes a rule may target, with the value
//! type and operator set each one accepts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use crm_core::types::elapsed_days;
use crm_core::{CrmError, CrmResult, Customer};
use serde::{Deserialize, Serialize};

use crate::predicates::ComparisonOperator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomerField {
    TotalSpend,
    LastActivity,
    VisitCount,
    CreatedAt,
}

/// How a field's comparison value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Non-negative currency amount, fractional allowed.
    Amount,
    /// Non-negative whole number.
    Count,
    /// Whole days elapsed since the customer's timestamp.
    DaysAgo,
}

impl CustomerField {
    pub const ALL: [CustomerField; 4] = [
        CustomerField::TotalSpend,
        CustomerField::LastActivity,
        CustomerField::VisitCount,
        CustomerField::CreatedAt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CustomerField::TotalSpend => "totalSpend",
            CustomerField::LastActivity => "lastActivity",
            CustomerField::VisitCount => "visitCount",
            CustomerField::CreatedAt => "createdAt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CustomerField::TotalSpend => "Total Spend",
            CustomerField::LastActivity => "Days Since Last Activity",
            CustomerField::VisitCount => "Visit Count",
            CustomerField::CreatedAt => "Days Since Signup",
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            CustomerField::TotalSpend => ValueKind::Amount,
            CustomerField::VisitCount => ValueKind::Count,
            CustomerField::LastActivity | CustomerField::CreatedAt => ValueKind::DaysAgo,
        }
    }

    pub fn allowed_operators(self) -> &'static [ComparisonOperator] {
        // Every current field is numeric, so all six comparisons apply.
        &ComparisonOperator::ALL
    }

    /// The customer's value for this field as of `now`.
    pub fn extract(self, customer: &Customer, now: DateTime<Utc>) -> f64 {
        match self {
            CustomerField::TotalSpend => customer.total_spend,
            CustomerField::VisitCount => f64::from(customer.visit_count),
            CustomerField::LastActivity => elapsed_days(customer.last_activity, now) as f64,
            CustomerField::CreatedAt => elapsed_days(customer.created_at, now) as f64,
        }
    }

    /// Check `operator` against the registry and coerce `raw` into a typed value.
    pub fn validate(self, operator: ComparisonOperator, raw: &RawValue) -> CrmResult<RuleValue> {
        if !self.allowed_operators().contains(&operator) {
            return Err(CrmError::Validation(format!(
                "operator '{operator}' is not allowed for field '{self}'"
            )));
        }

        let number = raw.as_number().ok_or_else(|| {
            CrmError::Validation(format!(
                "field '{self}' requires a numeric value, got '{raw}'"
            ))
        })?;
        if !number.is_finite() {
            return Err(CrmError::Validation(format!(
                "field '{self}' requires a finite value"
            )));
        }
        if number < 0.0 {
            return Err(CrmError::Validation(format!(
                "field '{self}' requires a non-negative value, got {number}"
            )));
        }

        match self.value_kind() {
            ValueKind::Amount => Ok(RuleValue::Amount(number)),
            ValueKind::Count | ValueKind::DaysAgo if number.fract() != 0.0 => {
                Err(CrmError::Validation(format!(
                    "field '{self}' requires a whole number, got {number}"
                )))
            }
            ValueKind::Count => Ok(RuleValue::Count(number as u64)),
            ValueKind::DaysAgo => Ok(RuleValue::DaysAgo(number as u64)),
        }
    }
}

impl FromStr for CustomerField {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CustomerField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CrmError::UnsupportedField(s.to_string()))
    }
}

impl fmt::Display for CustomerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparison value as typed in by a user: a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            RawValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<u32> for RawValue {
    fn from(n: u32) -> Self {
        RawValue::Number(f64::from(n))
    }
}

impl From<i32> for RawValue {
    fn from(n: i32) -> Self {
        RawValue::Number(f64::from(n))
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

/// A validated comparison value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleValue {
    Amount(f64),
    Count(u64),
    DaysAgo(u64),
}

impl RuleValue {
    pub fn as_f64(self) -> f64 {
        match self {
            RuleValue::Amount(n) => n,
            RuleValue::Count(n) | RuleValue::DaysAgo(n) => n as f64,
        }
    }
}

impl From<RuleValue> for RawValue {
    fn from(value: RuleValue) -> Self {
        match value {
            RuleValue::Amount(n) => RawValue::Number(n),
            RuleValue::Count(n) => RawValue::Number(n as f64),
            // Day counts travel as strings, the way the segment editor stores them.
            RuleValue::DaysAgo(n) => RawValue::Text(n.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_unknown_field_is_unsupported() {
        assert!(matches!(
            "loyaltyTier".parse::<CustomerField>(),
            Err(CrmError::UnsupportedField(name)) if name == "loyaltyTier"
        ));
        assert_eq!("visitCount".parse::<CustomerField>().unwrap(), CustomerField::VisitCount);
    }

    #[test]
    fn test_validate_numeric_string() {
        let v = CustomerField::LastActivity
            .validate(ComparisonOperator::LessThan, &RawValue::from("90"))
            .unwrap();
        assert_eq!(v, RuleValue::DaysAgo(90));

        let v = CustomerField::TotalSpend
            .validate(ComparisonOperator::GreaterThan, &RawValue::from(10000.5))
            .unwrap();
        assert_eq!(v, RuleValue::Amount(10000.5));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let gt = ComparisonOperator::GreaterThan;
        for (field, raw) in [
            (CustomerField::TotalSpend, RawValue::from("lots")),
            (CustomerField::TotalSpend, RawValue::from(-5)),
            (CustomerField::VisitCount, RawValue::from(2.5)),
            (CustomerField::CreatedAt, RawValue::from("")),
        ] {
            assert!(
                matches!(field.validate(gt, &raw), Err(CrmError::Validation(_))),
                "{field} {raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_extract_date_fields_as_elapsed_days() {
        let now = Utc::now();
        let mut c = Customer::new("Emily Rodriguez", "emily.rodriguez@example.com");
        c.last_activity = now - Duration::days(12);
        c.created_at = now - Duration::days(400);
        c.visit_count = 34;
        assert_eq!(CustomerField::LastActivity.extract(&c, now), 12.0);
        assert_eq!(CustomerField::CreatedAt.extract(&c, now), 400.0);
        assert_eq!(CustomerField::VisitCount.extract(&c, now), 34.0);
    }
}
