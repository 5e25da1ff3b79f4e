//! Filter and sort specifications
//!
//! Caller-supplied filters and sort keys are validated here and compiled to
//! data ([`Expr`], [`SortSpec`]). Storage adapters translate that data into
//! their own query language; see [`sql`] and [`executor`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::search::SearchHit;
use crate::types::Vector;
use crate::{Error, Result};

pub mod executor;
pub mod predicate;
pub mod sort;
pub mod sql;

pub use executor::ExprEvaluator;
pub use predicate::PredicateBuilder;
pub use sort::{Cast, Direction, SortKey, SortKeySpec, SortSpec, SortTarget, SortValue};

/// Search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vector,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Filter groups by key; groups are AND-ed, filters within a group OR-ed
    #[serde(default)]
    pub filter_groups: BTreeMap<String, Vec<FilterSpec>>,
    #[serde(default)]
    pub sort: Vec<SortKeySpec>,
}

fn default_top_k() -> usize {
    5
}

/// Search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub took_ms: u64,
}

/// Which side of a document a field lives on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Attribute,
    Metadata,
}

/// A named field on a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub target: Target,
    pub name: String,
}

impl FieldRef {
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            target: Target::Attribute,
            name: name.into(),
        }
    }

    pub fn metadata(name: impl Into<String>) -> Self {
        Self {
            target: Target::Metadata,
            name: name.into(),
        }
    }

    /// Attribute names become column references, so they are restricted to
    /// identifier characters. Metadata keys are values and only need to be
    /// non-empty.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidField("field name is empty".to_string()));
        }
        if self.target == Target::Attribute
            && !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::InvalidField(format!(
                "attribute name '{}' must contain only letters, digits and '_'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Filter operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::In => "IN",
            FilterOp::NotIn => "NOT IN",
            FilterOp::Like => "LIKE",
            FilterOp::NotLike => "NOT LIKE",
        }
    }
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" => Ok(FilterOp::Eq),
            "!=" => Ok(FilterOp::Ne),
            ">" => Ok(FilterOp::Gt),
            "<" => Ok(FilterOp::Lt),
            ">=" => Ok(FilterOp::Gte),
            "<=" => Ok(FilterOp::Lte),
            "IN" => Ok(FilterOp::In),
            "NOT IN" => Ok(FilterOp::NotIn),
            "LIKE" => Ok(FilterOp::Like),
            "NOT LIKE" => Ok(FilterOp::NotLike),
            _ => Err(Error::InvalidOperator(s.to_string())),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary comparison inside a compiled expression
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A single comparable value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Scalar {
    /// Textual form, as used for substring matching
    pub fn to_text(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Scalar::String(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Scalar::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Scalar::Float(f))
                } else {
                    Err(Error::InvalidCompareValue(format!("unsupported number {}", n)))
                }
            }
            serde_json::Value::Object(map) if map.len() == 1 && map.contains_key("date") => {
                let raw = map["date"].as_str().ok_or_else(|| {
                    Error::InvalidCompareValue("date must be a YYYY-MM-DD string".to_string())
                })?;
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(Scalar::Date)
                    .map_err(|e| Error::InvalidCompareValue(format!("invalid date '{}': {}", raw, e)))
            }
            other => Err(Error::InvalidCompareValue(format!(
                "expected string, number or date, got {}",
                other
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Scalar::Float(f) if !f.is_finite() => Err(Error::InvalidCompareValue(format!(
                "float {} is not finite",
                f
            ))),
            _ => Ok(()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

/// Value a filter compares against: a scalar, or a list of scalars for
/// `IN`/`NOT IN`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CompareValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl CompareValue {
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        CompareValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Accepts strings, numbers, `{"date": "YYYY-MM-DD"}` objects and flat
    /// arrays of those.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Array(_) => Err(Error::InvalidCompareValue(
                        "nested arrays are not supported".to_string(),
                    )),
                    other => Scalar::from_json(other),
                })
                .collect::<Result<Vec<_>>>()
                .map(CompareValue::List),
            other => Scalar::from_json(other).map(CompareValue::Scalar),
        }
    }
}

impl From<Scalar> for CompareValue {
    fn from(value: Scalar) -> Self {
        CompareValue::Scalar(value)
    }
}

impl From<&str> for CompareValue {
    fn from(value: &str) -> Self {
        CompareValue::Scalar(value.into())
    }
}

impl From<String> for CompareValue {
    fn from(value: String) -> Self {
        CompareValue::Scalar(value.into())
    }
}

impl From<i64> for CompareValue {
    fn from(value: i64) -> Self {
        CompareValue::Scalar(value.into())
    }
}

impl From<f64> for CompareValue {
    fn from(value: f64) -> Self {
        CompareValue::Scalar(value.into())
    }
}

impl From<NaiveDate> for CompareValue {
    fn from(value: NaiveDate) -> Self {
        CompareValue::Scalar(value.into())
    }
}

/// Caller-supplied, unvalidated filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field_name: String,
    pub operator: String,
    pub compare_value: serde_json::Value,
    #[serde(default)]
    pub target: Target,
}

/// A validated filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: FieldRef,
    op: FilterOp,
    value: CompareValue,
}

impl Filter {
    pub fn new(
        field_name: impl Into<String>,
        op: FilterOp,
        value: impl Into<CompareValue>,
        target: Target,
    ) -> Result<Self> {
        let field = FieldRef {
            target,
            name: field_name.into(),
        };
        field.validate()?;

        let value = value.into();
        match &value {
            CompareValue::Scalar(scalar) => scalar.validate()?,
            CompareValue::List(items) => {
                if !matches!(op, FilterOp::In | FilterOp::NotIn) {
                    return Err(Error::InvalidCompareValue(format!(
                        "operator {} does not accept a list",
                        op
                    )));
                }
                for item in items {
                    item.validate()?;
                }
            }
        }

        Ok(Self { field, op, value })
    }

    pub fn from_spec(spec: &FilterSpec) -> Result<Self> {
        let op: FilterOp = spec.operator.parse()?;
        let value = CompareValue::from_json(&spec.compare_value)?;
        Self::new(spec.field_name.clone(), op, value, spec.target)
    }

    pub fn field(&self) -> &FieldRef {
        &self.field
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    pub fn value(&self) -> &CompareValue {
        &self.value
    }

    /// Compile into an expression.
    ///
    /// `IN`/`NOT IN` with an empty list or a scalar value becomes
    /// [`Expr::Always`]. `LIKE` matches the value as a substring anywhere in
    /// the field.
    pub fn to_expr(&self) -> Expr {
        let field = self.field.clone();
        let negated = matches!(self.op, FilterOp::Ne | FilterOp::NotIn | FilterOp::NotLike);

        let scalar = match &self.value {
            CompareValue::List(items) => return Self::in_list(field, items.clone(), negated),
            CompareValue::Scalar(scalar) => scalar.clone(),
        };

        let op = match self.op {
            // Only a list is a membership test
            FilterOp::In | FilterOp::NotIn => return Expr::Always,
            FilterOp::Like | FilterOp::NotLike => {
                return Expr::Contains {
                    field,
                    needle: scalar.to_text(),
                    negated,
                }
            }
            FilterOp::Eq => CompareOp::Eq,
            FilterOp::Ne => CompareOp::Ne,
            FilterOp::Gt => CompareOp::Gt,
            FilterOp::Lt => CompareOp::Lt,
            FilterOp::Gte => CompareOp::Gte,
            FilterOp::Lte => CompareOp::Lte,
        };

        Expr::Compare {
            field,
            op,
            value: scalar,
        }
    }

    fn in_list(field: FieldRef, values: Vec<Scalar>, negated: bool) -> Expr {
        if values.is_empty() {
            return Expr::Always;
        }
        Expr::InList {
            field,
            values,
            negated,
        }
    }
}

/// Language-neutral boolean expression over document fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Matches every document
    Always,
    All {
        clauses: Vec<Expr>,
    },
    Any {
        clauses: Vec<Expr>,
    },
    Compare {
        field: FieldRef,
        op: CompareOp,
        value: Scalar,
    },
    InList {
        field: FieldRef,
        values: Vec<Scalar>,
        negated: bool,
    },
    Contains {
        field: FieldRef,
        needle: String,
        negated: bool,
    },
}

impl Expr {
    pub fn is_always(&self) -> bool {
        matches!(self, Expr::Always)
    }
}
