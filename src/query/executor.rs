//! In-process evaluation of compiled predicates
//!
//! Used by the in-memory document repository. Semantics follow SQL: a
//! document lacking the field never matches a comparison (negated ones
//! included), and `LIKE` substring matching ignores case.

use std::cmp::Ordering;

use crate::query::sort::parse_date;
use crate::query::{CompareOp, Expr, FieldRef, Scalar, Target};
use crate::types::{AttributeValue, Document};

/// A field value as read from a document
#[derive(Debug, Clone, Copy)]
enum FieldValue<'a> {
    Attribute(&'a AttributeValue),
    Metadata(&'a str),
}

impl FieldValue<'_> {
    fn text(&self) -> String {
        match self {
            FieldValue::Attribute(AttributeValue::String(s)) => s.clone(),
            FieldValue::Attribute(AttributeValue::Integer(i)) => i.to_string(),
            FieldValue::Attribute(AttributeValue::Float(f)) => f.to_string(),
            FieldValue::Attribute(AttributeValue::Boolean(b)) => b.to_string(),
            FieldValue::Metadata(s) => s.to_string(),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            FieldValue::Attribute(AttributeValue::Integer(i)) => Some(*i as f64),
            FieldValue::Attribute(AttributeValue::Float(f)) => Some(*f),
            FieldValue::Attribute(AttributeValue::Boolean(b)) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Attribute(AttributeValue::String(s)) => s.trim().parse().ok(),
            FieldValue::Metadata(s) => s.trim().parse().ok(),
        }
    }
}

/// Evaluates [`Expr`] trees against documents
pub struct ExprEvaluator;

impl ExprEvaluator {
    /// Whether `document` satisfies `expr`
    pub fn matches(expr: &Expr, document: &Document) -> bool {
        match expr {
            Expr::Always => true,
            Expr::All { clauses } => clauses.iter().all(|c| Self::matches(c, document)),
            Expr::Any { clauses } => clauses.iter().any(|c| Self::matches(c, document)),
            Expr::Compare { field, op, value } => {
                let Some(field_value) = Self::field_value(document, field) else {
                    return false;
                };
                let Some(ordering) = Self::compare(field_value, value) else {
                    return false;
                };
                match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Gte => ordering != Ordering::Less,
                    CompareOp::Lte => ordering != Ordering::Greater,
                }
            }
            Expr::InList {
                field,
                values,
                negated,
            } => {
                let Some(field_value) = Self::field_value(document, field) else {
                    return false;
                };
                let found = values
                    .iter()
                    .any(|v| Self::compare(field_value, v) == Some(Ordering::Equal));
                found != *negated
            }
            Expr::Contains {
                field,
                needle,
                negated,
            } => {
                let Some(field_value) = Self::field_value(document, field) else {
                    return false;
                };
                let haystack = field_value.text().to_lowercase();
                haystack.contains(&needle.to_lowercase()) != *negated
            }
        }
    }

    fn field_value<'a>(document: &'a Document, field: &FieldRef) -> Option<FieldValue<'a>> {
        match field.target {
            Target::Attribute => document
                .attributes
                .get(&field.name)
                .map(FieldValue::Attribute),
            Target::Metadata => document
                .metadata
                .get(&field.name)
                .map(|s| FieldValue::Metadata(s.as_str())),
        }
    }

    /// Order a field value against a filter scalar, coercing the field to
    /// the scalar's type. `None` when the two cannot be compared.
    fn compare(field_value: FieldValue<'_>, scalar: &Scalar) -> Option<Ordering> {
        match scalar {
            Scalar::Integer(i) => field_value.number()?.partial_cmp(&(*i as f64)),
            Scalar::Float(f) => field_value.number()?.partial_cmp(f),
            Scalar::Date(d) => Some(parse_date(&field_value.text())?.cmp(d)),
            Scalar::String(s) => match field_value {
                FieldValue::Attribute(AttributeValue::Integer(_))
                | FieldValue::Attribute(AttributeValue::Float(_)) => {
                    field_value.number()?.partial_cmp(&s.trim().parse::<f64>().ok()?)
                }
                _ => Some(field_value.text().as_str().cmp(s.as_str())),
            },
        }
    }
}
