use std::fmt::Display;

use cranedb_core::{QueryError, Schema, Value};
use itertools::Itertools as _;

use crate::plan::Plan;
use crate::scan::Scan;

/// Either a field reference or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Field(String),
    Const(Value),
}

impl Expression {
    pub fn evaluate(&self, scan: &Scan) -> Result<Value, QueryError> {
        match self {
            Expression::Field(name) => scan.get_value(name),
            Expression::Const(value) => Ok(value.clone()),
        }
    }

    pub fn as_field_name(&self) -> Option<&str> {
        match self {
            Expression::Field(name) => Some(name),
            Expression::Const(_) => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expression::Field(_) => None,
            Expression::Const(value) => Some(value),
        }
    }

    /// Whether the expression can be evaluated against rows of the schema.
    /// Constants apply everywhere.
    pub fn applies_to(&self, schema: &Schema) -> bool {
        match self {
            Expression::Field(name) => schema.has_field(name),
            Expression::Const(_) => true,
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Field(name) => write!(f, "{name}"),
            Expression::Const(value) => write!(f, "{value}"),
        }
    }
}

/// One equality between two expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    lhs: Expression,
    rhs: Expression,
}

impl Term {
    pub fn new(lhs: Expression, rhs: Expression) -> Self {
        Self { lhs, rhs }
    }

    pub fn is_satisfied(&self, scan: &Scan) -> Result<bool, QueryError> {
        Ok(self.lhs.evaluate(scan)? == self.rhs.evaluate(scan)?)
    }

    pub fn applies_to(&self, schema: &Schema) -> bool {
        self.lhs.applies_to(schema) && self.rhs.applies_to(schema)
    }

    /// Estimated divisor this term applies to the record count of the
    /// given plan's output.
    pub fn reduction_factor(&self, plan: &Plan) -> i64 {
        match (self.lhs.as_field_name(), self.rhs.as_field_name()) {
            (Some(lhs), Some(rhs)) => plan
                .distinct_values(lhs)
                .max(plan.distinct_values(rhs))
                .max(1),
            (Some(field), None) | (None, Some(field)) => plan.distinct_values(field).max(1),
            (None, None) => {
                if self.lhs.as_constant() == self.rhs.as_constant() {
                    1
                } else {
                    i64::MAX
                }
            }
        }
    }

    /// The constant `F` is equated with, when the term has the shape
    /// `F = c` or `c = F`.
    pub fn equates_with_constant(&self, field: &str) -> Option<&Value> {
        if self.lhs.as_field_name() == Some(field) {
            self.rhs.as_constant()
        } else if self.rhs.as_field_name() == Some(field) {
            self.lhs.as_constant()
        } else {
            None
        }
    }

    /// The other field `F` is equated with, when the term has the shape
    /// `F = G` or `G = F`.
    pub fn equates_with_field(&self, field: &str) -> Option<&str> {
        if self.lhs.as_field_name() == Some(field) {
            self.rhs.as_field_name()
        } else if self.rhs.as_field_name() == Some(field) {
            self.lhs.as_field_name()
        } else {
            None
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

/// A conjunction of terms. The empty predicate is satisfied by every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    pub fn new(term: Term) -> Self {
        Self { terms: vec![term] }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn conjoin_with(&mut self, mut other: Predicate) {
        self.terms.append(&mut other.terms);
    }

    pub fn is_satisfied(&self, scan: &Scan) -> Result<bool, QueryError> {
        for term in &self.terms {
            if !term.is_satisfied(scan)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Product of the terms' reduction factors, saturating on overflow.
    pub fn reduction_factor(&self, plan: &Plan) -> i64 {
        self.terms
            .iter()
            .map(|t| t.reduction_factor(plan))
            .fold(1i64, i64::saturating_mul)
    }

    /// The sub-predicate of terms that apply fully to the schema, or `None`
    /// when no term qualifies.
    pub fn select_sub_pred(&self, schema: &Schema) -> Option<Predicate> {
        let terms = self
            .terms
            .iter()
            .filter(|t| t.applies_to(schema))
            .cloned()
            .collect_vec();

        if terms.is_empty() {
            None
        } else {
            Some(Predicate { terms })
        }
    }

    /// The sub-predicate of join terms: terms applying to the union of the
    /// two schemas but to neither alone.
    pub fn join_sub_pred(&self, left: &Schema, right: &Schema) -> Option<Predicate> {
        let mut union = Schema::new();
        union.add_all(left);
        union.add_all(right);

        let terms = self
            .terms
            .iter()
            .filter(|t| !t.applies_to(left) && !t.applies_to(right) && t.applies_to(&union))
            .cloned()
            .collect_vec();

        if terms.is_empty() {
            None
        } else {
            Some(Predicate { terms })
        }
    }

    /// The terms that do not apply to any one of the given schemas alone,
    /// i.e. the ones still unapplied after per-table selects.
    pub fn residual(&self, schemas: &[&Schema]) -> Predicate {
        let terms = self
            .terms
            .iter()
            .filter(|t| !schemas.iter().any(|s| t.applies_to(s)))
            .cloned()
            .collect_vec();

        Predicate { terms }
    }

    pub fn equates_with_constant(&self, field: &str) -> Option<&Value> {
        self.terms
            .iter()
            .find_map(|t| t.equates_with_constant(field))
    }

    pub fn equates_with_field(&self, field: &str) -> Option<&str> {
        self.terms.iter().find_map(|t| t.equates_with_field(field))
    }

    /// Split off the term equating the field with a constant: the constant
    /// plus the predicate holding every other term.
    pub fn split_equates_with_constant(&self, field: &str) -> Option<(Value, Predicate)> {
        let position = self
            .terms
            .iter()
            .position(|t| t.equates_with_constant(field).is_some())?;

        let mut rest = self.clone();
        let term = rest.terms.remove(position);
        let value = term.equates_with_constant(field)?.clone();

        Some((value, rest))
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.terms.iter().join(" and "))
    }
}
