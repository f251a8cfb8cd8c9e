//! Row predicates used by `Filter` and by optional source filters.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use trellis_core::{Row, Value};

/// A boxed row predicate.
pub type RowPredicate = Rc<dyn Fn(&Row) -> bool>;

/// Comparison operator of a [`SimpleCondition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Evaluates `lhs op rhs`. Any comparison involving null is false.
    pub fn eval(self, lhs: &Value, rhs: &Value) -> bool {
        if lhs.is_null() || rhs.is_null() {
            return false;
        }
        let ord = lhs.cmp(rhs);
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// `column op value`.
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleCondition {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl SimpleCondition {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    #[inline]
    pub fn matches(&self, row: &Row) -> bool {
        self.op.eval(row.get(&self.column), &self.value)
    }
}

/// A boolean combination of simple conditions.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Simple(SimpleCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Shorthand for a simple condition.
    pub fn cmp(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Simple(SimpleCondition::new(column, op, value))
    }

    /// Shorthand for `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CompareOp::Eq, value)
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    /// Evaluates the condition. An empty `And` is true, an empty `Or` false.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Simple(c) => c.matches(row),
            Condition::And(cs) => cs.iter().all(|c| c.matches(row)),
            Condition::Or(cs) => cs.iter().any(|c| c.matches(row)),
        }
    }

    /// Converts into a shareable predicate.
    pub fn predicate(self) -> RowPredicate {
        Rc::new(move |row| self.matches(row))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, cs: &[Condition], sep: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, c) in cs.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, ")")
        };
        match self {
            Condition::Simple(c) => write!(f, "{} {} {}", c.column, c.op.symbol(), c.value),
            Condition::And(cs) => join(f, cs, "AND"),
            Condition::Or(cs) => join(f, cs, "OR"),
        }
    }
}
