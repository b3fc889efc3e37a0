//! Constraint and condition evaluators.
//!
//! Alpha nodes filter single facts through a [`Constraint`]; test nodes filter
//! tuples through a [`Condition`]. Both expose a single `evaluate` capability.
//! Evaluation errors are returned to the caller unchanged.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::EvaluationError;
use crate::fact::FactHandle;
use crate::tuple::Tuple;
use crate::value::Value;
use crate::working_memory::WorkingMemory;

/// Predicate over a single fact.
pub trait Constraint: Send + Sync {
    /// Returns whether `fact` passes.
    fn evaluate(
        &self,
        fact: &Value,
        handle: FactHandle,
        memory: &WorkingMemory,
    ) -> Result<bool, EvaluationError>;
}

/// Predicate over a tuple.
pub trait Condition: Send + Sync {
    /// Returns whether `tuple` passes.
    fn evaluate(&self, tuple: &Tuple, memory: &WorkingMemory) -> Result<bool, EvaluationError>;
}

/// Comparison applied between an extracted value and a reference value.
#[derive(Debug, Clone)]
pub enum Comparator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// Extracted string must match the regex.
    Matches(Regex),
}

impl Comparator {
    /// Builds a regex comparator.
    pub fn matches(pattern: &str) -> Result<Self, EvaluationError> {
        Regex::new(pattern)
            .map(Self::Matches)
            .map_err(|e| EvaluationError::InvalidRegex {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Compares `left` (extracted) against `right` (reference).
    pub fn compare(&self, left: &Value, right: &Value) -> Result<bool, EvaluationError> {
        let ordered = |accept: fn(Ordering) -> bool| {
            left.compare(right)
                .map(accept)
                .ok_or(EvaluationError::IncomparableValues {
                    left: left.type_name(),
                    right: right.type_name(),
                })
        };

        match self {
            Self::Equal => Ok(left == right),
            Self::NotEqual => Ok(left != right),
            Self::Less => ordered(Ordering::is_lt),
            Self::LessOrEqual => ordered(Ordering::is_le),
            Self::Greater => ordered(Ordering::is_gt),
            Self::GreaterOrEqual => ordered(Ordering::is_ge),
            Self::Matches(re) => match left {
                Value::String(s) => Ok(re.is_match(s)),
                other => Err(EvaluationError::NotAString {
                    actual: other.type_name(),
                }),
            },
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => f.write_str("=="),
            Self::NotEqual => f.write_str("!="),
            Self::Less => f.write_str("<"),
            Self::LessOrEqual => f.write_str("<="),
            Self::Greater => f.write_str(">"),
            Self::GreaterOrEqual => f.write_str(">="),
            Self::Matches(re) => write!(f, "matches /{}/", re.as_str()),
        }
    }
}

/// Which part of a fact a constraint reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    /// The whole fact value.
    Fact,
    /// A named record field.
    Field(String),
}

impl Extractor {
    /// Extracts from `fact`; `None` when the field is absent.
    #[must_use]
    pub fn extract<'a>(&self, fact: &'a Value) -> Option<&'a Value> {
        match self {
            Self::Fact => Some(fact),
            Self::Field(name) => fact.field(name),
        }
    }
}

/// `field <comparator> literal`.
///
/// A fact lacking the field does not pass.
#[derive(Debug, Clone)]
pub struct LiteralConstraint {
    extractor: Extractor,
    comparator: Comparator,
    literal: Value,
}

impl LiteralConstraint {
    #[must_use]
    pub fn new(extractor: Extractor, comparator: Comparator, literal: impl Into<Value>) -> Self {
        Self {
            extractor,
            comparator,
            literal: literal.into(),
        }
    }

    /// `field == literal`.
    #[must_use]
    pub fn field_equals(field: impl Into<String>, literal: impl Into<Value>) -> Self {
        Self::new(Extractor::Field(field.into()), Comparator::Equal, literal)
    }
}

impl Constraint for LiteralConstraint {
    fn evaluate(
        &self,
        fact: &Value,
        _handle: FactHandle,
        _memory: &WorkingMemory,
    ) -> Result<bool, EvaluationError> {
        match self.extractor.extract(fact) {
            Some(value) => self.comparator.compare(value, &self.literal),
            None => Ok(false),
        }
    }
}

type ReturnValueFn = dyn Fn(&Value, &WorkingMemory) -> Result<Value, EvaluationError> + Send + Sync;

/// `field <comparator> expression(fact)`; the reference value is computed per fact.
#[derive(Clone)]
pub struct ReturnValueConstraint {
    extractor: Extractor,
    comparator: Comparator,
    expression: Arc<ReturnValueFn>,
}

impl ReturnValueConstraint {
    pub fn new<F>(extractor: Extractor, comparator: Comparator, expression: F) -> Self
    where
        F: Fn(&Value, &WorkingMemory) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    {
        Self {
            extractor,
            comparator,
            expression: Arc::new(expression),
        }
    }
}

impl Constraint for ReturnValueConstraint {
    fn evaluate(
        &self,
        fact: &Value,
        _handle: FactHandle,
        memory: &WorkingMemory,
    ) -> Result<bool, EvaluationError> {
        let Some(value) = self.extractor.extract(fact) else {
            return Ok(false);
        };
        let reference = (self.expression)(fact, memory)?;
        self.comparator.compare(value, &reference)
    }
}

impl fmt::Debug for ReturnValueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValueConstraint")
            .field("extractor", &self.extractor)
            .field("comparator", &self.comparator)
            .finish_non_exhaustive()
    }
}

type FactPredicateFn = dyn Fn(&Value) -> Result<bool, EvaluationError> + Send + Sync;

/// Custom predicate over the fact value.
#[derive(Clone)]
pub struct PredicateConstraint {
    predicate: Arc<FactPredicateFn>,
}

impl PredicateConstraint {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

impl Constraint for PredicateConstraint {
    fn evaluate(
        &self,
        fact: &Value,
        _handle: FactHandle,
        _memory: &WorkingMemory,
    ) -> Result<bool, EvaluationError> {
        (self.predicate)(fact)
    }
}

type TuplePredicateFn =
    dyn Fn(&Tuple, &WorkingMemory) -> Result<bool, EvaluationError> + Send + Sync;

/// Custom predicate over a tuple.
#[derive(Clone)]
pub struct PredicateCondition {
    predicate: Arc<TuplePredicateFn>,
}

impl PredicateCondition {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Tuple, &WorkingMemory) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

impl Condition for PredicateCondition {
    fn evaluate(&self, tuple: &Tuple, memory: &WorkingMemory) -> Result<bool, EvaluationError> {
        (self.predicate)(tuple, memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_memory;

    fn cheese(kind: &str, price: i64) -> Value {
        Value::record([("type", Value::from(kind)), ("price", Value::from(price))])
    }

    #[test]
    fn test_literal_equal() {
        let wm = test_memory();
        let is_cheddar = LiteralConstraint::field_equals("type", "cheddar");
        assert!(is_cheddar.evaluate(&cheese("cheddar", 5), FactHandle::new(0), &wm).unwrap());
        assert!(!is_cheddar.evaluate(&cheese("stilton", 6), FactHandle::new(1), &wm).unwrap());
    }

    #[test]
    fn test_literal_missing_field_does_not_pass() {
        let wm = test_memory();
        let is_cheddar = LiteralConstraint::field_equals("type", "cheddar");
        assert!(!is_cheddar.evaluate(&Value::Int(1), FactHandle::new(0), &wm).unwrap());
    }

    #[test]
    fn test_literal_ordering() {
        let wm = test_memory();
        let cheap = LiteralConstraint::new(Extractor::Field("price".into()), Comparator::Less, 6);
        assert!(cheap.evaluate(&cheese("cheddar", 5), FactHandle::new(0), &wm).unwrap());
        assert!(!cheap.evaluate(&cheese("stilton", 6), FactHandle::new(0), &wm).unwrap());
    }

    #[test]
    fn test_literal_incomparable_is_error() {
        let wm = test_memory();
        let c = LiteralConstraint::new(Extractor::Field("type".into()), Comparator::Greater, 3);
        let err = c.evaluate(&cheese("cheddar", 5), FactHandle::new(0), &wm).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::IncomparableValues {
                left: "string",
                right: "int"
            }
        );
    }

    #[test]
    fn test_regex_comparator() {
        let wm = test_memory();
        let c = LiteralConstraint::new(
            Extractor::Field("type".into()),
            Comparator::matches("^ched").unwrap(),
            Value::Null,
        );
        assert!(c.evaluate(&cheese("cheddar", 5), FactHandle::new(0), &wm).unwrap());
        assert!(!c.evaluate(&cheese("brie", 5), FactHandle::new(0), &wm).unwrap());
        assert!(Comparator::matches("(").is_err());
    }

    #[test]
    fn test_return_value_constraint() {
        let wm = test_memory();
        let c = ReturnValueConstraint::new(
            Extractor::Field("type".into()),
            Comparator::Equal,
            |_, _| Ok(Value::from("cheddar")),
        );
        assert!(c.evaluate(&cheese("cheddar", 5), FactHandle::new(0), &wm).unwrap());
        assert!(!c.evaluate(&cheese("stilton", 6), FactHandle::new(0), &wm).unwrap());
    }

    #[test]
    fn test_predicate_constraint_error_propagates() {
        let wm = test_memory();
        let c = PredicateConstraint::new(|_| Err(EvaluationError::failed("boom")));
        let err = c.evaluate(&Value::Null, FactHandle::new(0), &wm).unwrap_err();
        assert_eq!(err, EvaluationError::failed("boom"));
    }

    #[test]
    fn test_predicate_condition() {
        let wm = test_memory();
        let c = PredicateCondition::new(|tuple, _| Ok(tuple.get(0).is_some()));
        assert!(c.evaluate(&Tuple::new(0, FactHandle::new(0)), &wm).unwrap());
        assert!(!c.evaluate(&Tuple::new(1, FactHandle::new(0)), &wm).unwrap());
    }

    #[test]
    fn test_comparator_display() {
        assert_eq!(Comparator::GreaterOrEqual.to_string(), ">=");
        assert_eq!(Comparator::matches("a+").unwrap().to_string(), "matches /a+/");
    }
}
