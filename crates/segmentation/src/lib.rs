//! Segment rule engine: field/operator/value rules joined by AND/OR,
//! exact audience evaluation, and debounced audience-size estimation.

pub mod builder;
pub mod estimator;
pub mod evaluator;
pub mod fields;
pub mod predicates;
pub mod rule;
pub mod segment;

pub use builder::SegmentBuilder;
pub use estimator::{AudienceEstimator, Estimate, EstimateOutcome};
pub use evaluator::{AudienceEvaluator, AudienceMatch};
pub use fields::{CustomerField, RawValue, RuleValue};
pub use predicates::{ComparisonOperator, Conjunction};
pub use rule::{RawRule, Rule};
pub use segment::Segment;
