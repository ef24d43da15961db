//! Comparison operators and rule conjunctions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crm_core::CrmError;
use serde::{Deserialize, Serialize};

/// Joins a rule to the running result of the rules before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Conjunction {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl Conjunction {
    pub fn apply(self, lhs: bool, rhs: bool) -> bool {
        match self {
            Conjunction::And => lhs && rhs,
            Conjunction::Or => lhs || rhs,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "!=")]
    NotEquals,
}

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 6] = [
        ComparisonOperator::GreaterThan,
        ComparisonOperator::LessThan,
        ComparisonOperator::Equals,
        ComparisonOperator::GreaterThanOrEqual,
        ComparisonOperator::LessThanOrEqual,
        ComparisonOperator::NotEquals,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::Equals => "=",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::NotEquals => "!=",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => "greater than",
            ComparisonOperator::LessThan => "less than",
            ComparisonOperator::Equals => "equals",
            ComparisonOperator::GreaterThanOrEqual => "greater than or equal to",
            ComparisonOperator::LessThanOrEqual => "less than or equal to",
            ComparisonOperator::NotEquals => "not equal to",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonOperator::ALL
            .into_iter()
            .find(|op| op.symbol() == s.trim())
            .ok_or_else(|| CrmError::Validation(format!("unknown operator '{s}'")))
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Compare two finite numbers. Rule values are validated as finite at
/// construction, so a NaN here only comes from a corrupt customer record
/// and never matches.
pub fn compare_numbers(actual: f64, operator: ComparisonOperator, expected: f64) -> bool {
    let Some(ordering) = actual.partial_cmp(&expected) else {
        return false;
    };
    match operator {
        ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
        ComparisonOperator::LessThan => ordering == Ordering::Less,
        ComparisonOperator::Equals => ordering == Ordering::Equal,
        ComparisonOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ordering != Ordering::Greater,
        ComparisonOperator::NotEquals => ordering != Ordering::Equal,
    }
}
