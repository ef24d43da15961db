//! Named rule sets with a cached audience size.
//!
//! Every operation takes `&Segment` and returns a new value, so a segment
//! shared by several campaign drafts is never mutated underneath them.

use chrono::{DateTime, Utc};
use crm_core::{CrmError, CrmResult, Customer};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::evaluator::AudienceEvaluator;
use crate::predicates::Conjunction;
use crate::rule::Rule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub rules: Vec<Rule>,
    pub audience_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn create(
        name: &str,
        rules: Vec<Rule>,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Segment> {
        let name = validate_name(name)?;
        let audience_size = evaluator.count(&rules, customers)?;
        let now = Utc::now();
        info!(segment = %name, rules = rules.len(), audience = audience_size, "Segment created");
        Ok(Segment {
            id: Uuid::new_v4(),
            name,
            rules,
            audience_size,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the rule set and recompute the audience size.
    pub fn update_rules(
        &self,
        rules: Vec<Rule>,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Segment> {
        let audience_size = evaluator.count(&rules, customers)?;
        info!(
            segment = %self.name,
            previous = self.audience_size,
            audience = audience_size,
            "Segment rules updated"
        );
        Ok(Segment {
            rules,
            audience_size,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    pub fn rename(&self, name: &str) -> CrmResult<Segment> {
        Ok(Segment {
            name: validate_name(name)?,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    /// Append a rule. Rules after the first default to AND.
    pub fn add_rule(
        &self,
        rule: Rule,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Segment> {
        let rule = if self.rules.is_empty() || rule.conjunction().is_some() {
            rule
        } else {
            rule.with_conjunction(Conjunction::And)
        };
        let mut rules = self.rules.clone();
        rules.push(rule);
        self.update_rules(rules, evaluator, customers)
    }

    pub fn remove_rule(
        &self,
        rule_id: Uuid,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Segment> {
        self.position(rule_id)?;
        if self.rules.len() == 1 {
            return Err(CrmError::validation(
                "cannot remove the last rule of a segment",
            ));
        }
        let rules = self
            .rules
            .iter()
            .filter(|r| r.id() != rule_id)
            .cloned()
            .collect();
        self.update_rules(rules, evaluator, customers)
    }

    /// Swap in an edited rule. The replacement must carry the same id.
    pub fn replace_rule(
        &self,
        rule: Rule,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Segment> {
        let idx = self.position(rule.id())?;
        let mut rules = self.rules.clone();
        rules[idx] = rule;
        self.update_rules(rules, evaluator, customers)
    }

    pub fn set_conjunction(
        &self,
        rule_id: Uuid,
        conjunction: Conjunction,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Segment> {
        let idx = self.position(rule_id)?;
        let mut rules = self.rules.clone();
        rules[idx] = rules[idx].clone().with_conjunction(conjunction);
        self.update_rules(rules, evaluator, customers)
    }

    /// Human-readable rule chain, e.g. `Total Spend greater than 1000 AND Visit Count ...`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                let conj = rule.conjunction().unwrap_or_default();
                out.push(' ');
                out.push_str(conj.as_str());
                out.push(' ');
            }
            out.push_str(&rule.describe());
        }
        out
    }

    fn position(&self, rule_id: Uuid) -> CrmResult<usize> {
        self.rules
            .iter()
            .position(|r| r.id() == rule_id)
            .ok_or_else(|| CrmError::not_found("rule", rule_id))
    }
}

fn validate_name(name: &str) -> CrmResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CrmError::validation("segment name must not be empty"));
    }
    Ok(trimmed.to_string())
}
