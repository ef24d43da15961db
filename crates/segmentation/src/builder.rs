//! Segment builder: fluent API for constructing rule chains.

use crm_core::{CrmError, CrmResult, Customer};

use crate::evaluator::AudienceEvaluator;
use crate::fields::{CustomerField, RawValue};
use crate::predicates::{ComparisonOperator, Conjunction};
use crate::rule::Rule;
use crate::segment::Segment;

/// Collects rules in order. The first invalid rule is remembered and
/// reported by `rules()`/`build()`.
pub struct SegmentBuilder {
    name: String,
    rules: Vec<Rule>,
    error: Option<CrmError>,
}

impl SegmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            error: None,
        }
    }

    /// First rule of the chain.
    pub fn rule(
        self,
        field: CustomerField,
        operator: ComparisonOperator,
        value: impl Into<RawValue>,
    ) -> Self {
        self.push(None, field, operator, value.into())
    }

    pub fn and(
        self,
        field: CustomerField,
        operator: ComparisonOperator,
        value: impl Into<RawValue>,
    ) -> Self {
        self.push(Some(Conjunction::And), field, operator, value.into())
    }

    pub fn or(
        self,
        field: CustomerField,
        operator: ComparisonOperator,
        value: impl Into<RawValue>,
    ) -> Self {
        self.push(Some(Conjunction::Or), field, operator, value.into())
    }

    pub fn spend_over(self, amount: f64) -> Self {
        self.and(CustomerField::TotalSpend, ComparisonOperator::GreaterThan, amount)
    }

    pub fn active_within_days(self, days: u32) -> Self {
        self.and(CustomerField::LastActivity, ComparisonOperator::LessThan, days)
    }

    pub fn signed_up_within_days(self, days: u32) -> Self {
        self.and(CustomerField::CreatedAt, ComparisonOperator::LessThan, days)
    }

    pub fn rules(self) -> CrmResult<Vec<Rule>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.rules),
        }
    }

    pub fn build(self, evaluator: &AudienceEvaluator, customers: &[Customer]) -> CrmResult<Segment> {
        let name = self.name.clone();
        let rules = self.rules()?;
        Segment::create(&name, rules, evaluator, customers)
    }

    fn push(
        mut self,
        conjunction: Option<Conjunction>,
        field: CustomerField,
        operator: ComparisonOperator,
        value: RawValue,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        match Rule::new(field, operator, value) {
            Ok(rule) => {
                let rule = match conjunction {
                    Some(c) if !self.rules.is_empty() => rule.with_conjunction(c),
                    _ => rule,
                };
                self.rules.push(rule);
            }
            Err(err) => self.error = Some(err),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::RuleValue;

    #[test]
    fn test_builder_chain() {
        let rules = SegmentBuilder::new("Lapsed VIPs")
            .spend_over(10000.0)
            .or(CustomerField::VisitCount, ComparisonOperator::GreaterThanOrEqual, 30)
            .rules()
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].conjunction(), None);
        assert_eq!(rules[1].conjunction(), Some(Conjunction::Or));
        assert_eq!(rules[1].value(), RuleValue::Count(30));
    }

    #[test]
    fn test_builder_reports_first_error() {
        let result = SegmentBuilder::new("Broken")
            .rule(CustomerField::TotalSpend, ComparisonOperator::GreaterThan, "ten")
            .active_within_days(30)
            .build(&AudienceEvaluator::new(), &[]);
        assert!(matches!(result, Err(CrmError::Validation(msg)) if msg.contains("ten")));
    }

    #[test]
    fn test_builder_builds_segment() {
        let seg = SegmentBuilder::new("New Customers")
            .signed_up_within_days(30)
            .build(&AudienceEvaluator::new(), &[])
            .unwrap();
        assert_eq!(seg.name, "New Customers");
        assert_eq!(seg.rules.len(), 1);
        assert_eq!(seg.audience_size, 0);
    }
}
