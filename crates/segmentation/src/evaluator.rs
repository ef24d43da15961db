//! Exact audience evaluation of a rule set against customer records.

use chrono::{DateTime, Utc};
use crm_core::{CrmError, CrmResult, Customer};
use tracing::debug;
use uuid::Uuid;

use crate::predicates::Conjunction;
use crate::rule::{RawRule, Rule};

/// Customers matching a rule set, borrowed from the evaluated collection.
#[derive(Debug, Clone)]
pub struct AudienceMatch<'a> {
    pub members: Vec<&'a Customer>,
}

impl AudienceMatch<'_> {
    pub fn count(&self) -> u64 {
        self.members.len() as u64
    }

    pub fn customer_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|c| c.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Evaluates rule sets as a flat left-associative chain:
/// `((r1 OP2 r2) OP3 r3) ...` where `OPi` is rule i's conjunction.
/// AND does not bind tighter than OR.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudienceEvaluator {
    as_of: Option<DateTime<Utc>>,
}

impl AudienceEvaluator {
    pub fn new() -> Self {
        Self { as_of: None }
    }

    /// Evaluate date fields relative to a fixed instant instead of the wall clock.
    pub fn at(as_of: DateTime<Utc>) -> Self {
        Self { as_of: Some(as_of) }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.as_of.unwrap_or_else(Utc::now)
    }

    pub fn matches(&self, rules: &[Rule], customer: &Customer) -> CrmResult<bool> {
        ensure_non_empty(rules)?;
        Ok(fold(rules, customer, self.now()))
    }

    pub fn evaluate<'a>(
        &self,
        rules: &[Rule],
        customers: &'a [Customer],
    ) -> CrmResult<AudienceMatch<'a>> {
        ensure_non_empty(rules)?;
        let now = self.now();
        let members: Vec<&Customer> = customers
            .iter()
            .filter(|c| fold(rules, c, now))
            .collect();
        debug!(
            rules = rules.len(),
            scanned = customers.len(),
            matched = members.len(),
            "Evaluated rule set"
        );
        Ok(AudienceMatch { members })
    }

    pub fn count(&self, rules: &[Rule], customers: &[Customer]) -> CrmResult<u64> {
        self.evaluate(rules, customers).map(|m| m.count())
    }

    /// Validate wire-form rules and evaluate them. Unknown fields fail with
    /// `UnsupportedField` before any customer is considered.
    pub fn evaluate_raw<'a>(
        &self,
        raw: &[RawRule],
        customers: &'a [Customer],
    ) -> CrmResult<AudienceMatch<'a>> {
        let rules = raw
            .iter()
            .cloned()
            .map(Rule::try_from)
            .collect::<CrmResult<Vec<_>>>()?;
        self.evaluate(&rules, customers)
    }
}

fn ensure_non_empty(rules: &[Rule]) -> CrmResult<()> {
    if rules.is_empty() {
        return Err(CrmError::validation("a rule set needs at least one rule"));
    }
    Ok(())
}

// Every rule is evaluated; the first rule's conjunction is ignored and a
// missing conjunction on a later rule means AND.
fn fold(rules: &[Rule], customer: &Customer, now: DateTime<Utc>) -> bool {
    let mut iter = rules.iter();
    let Some(first) = iter.next() else {
        return false;
    };
    iter.fold(first.matches(customer, now), |acc, rule| {
        let conjunction = rule.conjunction().unwrap_or(Conjunction::And);
        conjunction.apply(acc, rule.matches(customer, now))
    })
}
