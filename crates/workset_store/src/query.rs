//! Query grammar for finder-backed searches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named values bound into a predicate at execution time.
pub type Variables = BTreeMap<String, Value>;

/// A declarative filter over entity properties.
///
/// Predicates are built once and handed to an
/// [`EntityFinder`](crate::EntityFinder); they carry no references to live
/// entities, so a query description can outlive the session that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every entity of the queried type.
    All,
    /// Compares one property against an operand.
    Compare {
        /// Property name to read from candidate entities.
        property: String,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand side of the comparison.
        operand: Operand,
    },
    /// Matches when every inner predicate matches.
    And(Vec<Predicate>),
    /// Matches when at least one inner predicate matches.
    Or(Vec<Predicate>),
    /// Matches when the inner predicate does not.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Builds an equality comparison against a literal.
    #[must_use]
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Eq, Operand::Literal(value.into()))
    }

    /// Builds an inequality comparison against a literal.
    #[must_use]
    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Ne, Operand::Literal(value.into()))
    }

    /// Builds a greater-than comparison against a literal.
    #[must_use]
    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Gt, Operand::Literal(value.into()))
    }

    /// Builds a greater-or-equal comparison against a literal.
    #[must_use]
    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Ge, Operand::Literal(value.into()))
    }

    /// Builds a less-than comparison against a literal.
    #[must_use]
    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Lt, Operand::Literal(value.into()))
    }

    /// Builds a less-or-equal comparison against a literal.
    #[must_use]
    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Le, Operand::Literal(value.into()))
    }

    /// Builds a comparison against a named variable bound at execution time.
    #[must_use]
    pub fn var(property: impl Into<String>, op: CompareOp, variable: impl Into<String>) -> Self {
        Self::compare(property, op, Operand::Variable(variable.into()))
    }

    /// Combines this predicate with another under a conjunction.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut inner) => {
                inner.push(other);
                Self::And(inner)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Combines this predicate with another under a disjunction.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut inner) => {
                inner.push(other);
                Self::Or(inner)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negates this predicate.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn compare(property: impl Into<String>, op: CompareOp, operand: Operand) -> Self {
        Self::Compare {
            property: property.into(),
            op,
            operand,
        }
    }
}

/// Comparison operator in a [`Predicate::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// A value fixed when the predicate was built.
    Literal(Value),
    /// A value looked up in [`Variables`] at execution time.
    Variable(String),
}

/// Sort key for finder results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Property to sort on.
    pub property: String,
    /// Sort direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Builds an ascending sort on a property.
    #[must_use]
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Ascending,
        }
    }

    /// Builds a descending sort on a property.
    #[must_use]
    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Descending,
        }
    }
}

/// Sort direction for an [`OrderBy`] key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest values first.
    Ascending,
    /// Largest values first.
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn and_flattens_left_chain() {
        let p = Predicate::eq("name", "alice")
            .and(Predicate::gt("age", 30))
            .and(Predicate::ne("city", "oslo"));

        match p {
            Predicate::And(inner) => assert_eq!(inner.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn or_flattens_left_chain() {
        let p = Predicate::eq("a", 1).or(Predicate::eq("b", 2)).or(Predicate::eq("c", 3));

        match p {
            Predicate::Or(inner) => assert_eq!(inner.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn comparison_helpers_capture_literal() {
        let p = Predicate::le("age", 65);
        assert_eq!(
            p,
            Predicate::Compare {
                property: "age".into(),
                op: CompareOp::Le,
                operand: Operand::Literal(json!(65)),
            }
        );
    }

    #[test]
    fn variable_operand_round_trips_through_serde() {
        let p = Predicate::var("age", CompareOp::Ge, "min_age");
        let text = serde_json::to_string(&p).unwrap();
        let back: Predicate = serde_json::from_str(&text).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn order_by_helpers_set_direction() {
        assert_eq!(OrderBy::ascending("name").direction, Direction::Ascending);
        assert_eq!(OrderBy::descending("name").direction, Direction::Descending);
    }
}
