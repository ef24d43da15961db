//! A single segment predicate: field, operator, comparison value.
//!
//! Rules are immutable. Editing a rule means building a replacement with the
//! same `id`; every replacement is re-validated against the field registry.

use chrono::{DateTime, Utc};
use crm_core::{CrmError, CrmResult, Customer};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fields::{CustomerField, RawValue, RuleValue};
use crate::predicates::{compare_numbers, ComparisonOperator, Conjunction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    id: Uuid,
    field: CustomerField,
    operator: ComparisonOperator,
    value: RuleValue,
    conjunction: Option<Conjunction>,
}

/// Wire form of a rule, before field and value validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub field: String,
    pub operator: String,
    pub value: RawValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conjunction: Option<Conjunction>,
}

impl Rule {
    pub fn new(
        field: CustomerField,
        operator: ComparisonOperator,
        value: impl Into<RawValue>,
    ) -> CrmResult<Self> {
        let value = field.validate(operator, &value.into())?;
        Ok(Self {
            id: Uuid::new_v4(),
            field,
            operator,
            value,
            conjunction: None,
        })
    }

    /// Parse a rule from user-supplied strings.
    pub fn parse(field: &str, operator: &str, value: impl Into<RawValue>) -> CrmResult<Self> {
        Rule::new(field.parse()?, operator.parse()?, value)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn field(&self) -> CustomerField {
        self.field
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn value(&self) -> RuleValue {
        self.value
    }

    pub fn conjunction(&self) -> Option<Conjunction> {
        self.conjunction
    }

    pub fn with_conjunction(mut self, conjunction: Conjunction) -> Self {
        self.conjunction = Some(conjunction);
        self
    }

    pub fn with_field(&self, field: CustomerField) -> CrmResult<Self> {
        let value = field.validate(self.operator, &self.value.into())?;
        Ok(Self {
            field,
            value,
            ..self.clone()
        })
    }

    pub fn with_operator(&self, operator: ComparisonOperator) -> CrmResult<Self> {
        let value = self.field.validate(operator, &self.value.into())?;
        Ok(Self {
            operator,
            value,
            ..self.clone()
        })
    }

    pub fn with_value(&self, value: impl Into<RawValue>) -> CrmResult<Self> {
        let value = self.field.validate(self.operator, &value.into())?;
        Ok(Self {
            value,
            ..self.clone()
        })
    }

    /// Apply this rule alone to `customer` as of `now`.
    pub fn matches(&self, customer: &Customer, now: DateTime<Utc>) -> bool {
        let actual = self.field.extract(customer, now);
        compare_numbers(actual, self.operator, self.value.as_f64())
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} {}",
            self.field.label(),
            self.operator.label(),
            RawValue::from(self.value)
        )
    }
}

impl TryFrom<RawRule> for Rule {
    type Error = CrmError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let field: CustomerField = raw.field.parse()?;
        let operator: ComparisonOperator = raw.operator.parse()?;
        let value = field.validate(operator, &raw.value)?;
        Ok(Self {
            id: raw.id,
            field,
            operator,
            value,
            conjunction: raw.conjunction,
        })
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        Self {
            id: rule.id,
            field: rule.field.as_str().to_string(),
            operator: rule.operator.symbol().to_string(),
            value: rule.value.into(),
            conjunction: rule.conjunction,
        }
    }
}
