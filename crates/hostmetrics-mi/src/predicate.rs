//! WHERE-clause filter expressions

use std::cmp::Ordering;
use std::fmt;

use crate::value::Value;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// Compiled filter predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `property <op> literal`
    Compare {
        property: String,
        op: CompareOp,
        value: Value,
    },
    /// `property IS [NOT] NULL`
    IsNull { property: String, negated: bool },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(property: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Eq, value)
    }

    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(property, CompareOp::Like, Value::String(pattern.into()))
    }

    pub fn is_null(property: impl Into<String>) -> Self {
        Predicate::IsNull {
            property: property.into(),
            negated: false,
        }
    }

    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Property names referenced anywhere in the expression
    #[must_use]
    pub fn properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { property, .. } | Predicate::IsNull { property, .. } => {
                out.push(property);
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_properties(out);
                b.collect_properties(out);
            }
            Predicate::Not(inner) => inner.collect_properties(out),
        }
    }

    /// Evaluate against a row; `lookup` resolves a property to its value.
    /// Comparisons involving null or incomparable kinds are false.
    pub fn evaluate<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        match self {
            Predicate::Compare {
                property,
                op,
                value,
            } => lookup(property).is_some_and(|actual| compare(actual, *op, value)),
            Predicate::IsNull { property, negated } => {
                let null = lookup(property).is_none_or(Value::is_null);
                null != *negated
            }
            Predicate::And(a, b) => a.evaluate(lookup) && b.evaluate(lookup),
            Predicate::Or(a, b) => a.evaluate(lookup) || b.evaluate(lookup),
            Predicate::Not(inner) => !inner.evaluate(lookup),
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    if op == CompareOp::Like {
        return match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        };
    }

    let Some(ordering) = actual.compare(expected) else {
        return false;
    };

    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Like => unreachable!("handled above"),
    }
}

/// Case-insensitive LIKE with `%` (any run) and `_` (any one char)
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matched[j]: pattern[..j] matches the text prefix consumed so far
    let mut matched = vec![false; pattern.len() + 1];
    matched[0] = true;
    for j in 1..=pattern.len() {
        matched[j] = matched[j - 1] && pattern[j - 1] == '%';
    }

    for c in text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matched[j],
                '_' => matched[j - 1],
                p => matched[j - 1] && p == c,
            };
        }
        matched = next;
    }

    matched[pattern.len()]
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare {
                property,
                op,
                value,
            } => write!(f, "{property} {} {value}", op.as_str()),
            Predicate::IsNull { property, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{property} IS {not}NULL")
            }
            Predicate::And(a, b) => write!(f, "({a} AND {b})"),
            Predicate::Or(a, b) => write!(f, "({a} OR {b})"),
            Predicate::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}
