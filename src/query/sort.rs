//! Composite sort keys
//!
//! Metadata is stored as untyped text, so every metadata key carries an
//! explicit cast deciding whether values order as text, numbers or dates.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::query::{FieldRef, Target};
use crate::types::AttributeValue;
use crate::{Error, Result};

/// Sort direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(Error::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How metadata text is interpreted for ordering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Text,
    Number,
    Date,
}

impl FromStr for Cast {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Cast::Text),
            "number" => Ok(Cast::Number),
            "date" => Ok(Cast::Date),
            other => Err(Error::InvalidRequest(format!("unknown cast '{}'", other))),
        }
    }
}

/// What a sort key orders by
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortTarget {
    #[default]
    Attribute,
    Metadata,
    /// The cosine similarity computed during reranking
    Similarity,
}

/// Caller-supplied, unvalidated sort key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKeySpec {
    #[serde(default)]
    pub field_name: String,
    pub direction: String,
    #[serde(default)]
    pub target: SortTarget,
    #[serde(default)]
    pub cast: Option<String>,
}

/// A validated sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    target: SortTarget,
    field_name: String,
    direction: Direction,
    cast: Option<Cast>,
}

impl SortKey {
    pub fn attribute(field_name: impl Into<String>, direction: Direction) -> Result<Self> {
        let field = FieldRef::attribute(field_name);
        field.validate()?;
        Ok(Self {
            target: SortTarget::Attribute,
            field_name: field.name,
            direction,
            cast: None,
        })
    }

    pub fn metadata(field_name: impl Into<String>, direction: Direction, cast: Cast) -> Result<Self> {
        let field = FieldRef::metadata(field_name);
        field.validate()?;
        Ok(Self {
            target: SortTarget::Metadata,
            field_name: field.name,
            direction,
            cast: Some(cast),
        })
    }

    pub fn similarity(direction: Direction) -> Self {
        Self {
            target: SortTarget::Similarity,
            field_name: String::new(),
            direction,
            cast: None,
        }
    }

    pub fn from_spec(spec: &SortKeySpec) -> Result<Self> {
        let direction: Direction = spec.direction.parse()?;
        match spec.target {
            SortTarget::Attribute => Self::attribute(spec.field_name.clone(), direction),
            SortTarget::Metadata => {
                let cast = spec
                    .cast
                    .as_deref()
                    .ok_or_else(|| Error::MissingCast(spec.field_name.clone()))?
                    .parse::<Cast>()?;
                Self::metadata(spec.field_name.clone(), direction, cast)
            }
            SortTarget::Similarity => Ok(Self::similarity(direction)),
        }
    }

    pub fn target(&self) -> SortTarget {
        self.target
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn cast(&self) -> Option<Cast> {
        self.cast
    }

    /// Document field this key reads, `None` for similarity keys
    pub fn field(&self) -> Option<FieldRef> {
        match self.target {
            SortTarget::Attribute => Some(FieldRef {
                target: Target::Attribute,
                name: self.field_name.clone(),
            }),
            SortTarget::Metadata => Some(FieldRef {
                target: Target::Metadata,
                name: self.field_name.clone(),
            }),
            SortTarget::Similarity => None,
        }
    }

    /// Interpret a raw field value for ordering under this key.
    fn sort_value(&self, raw: Option<&AttributeValue>, similarity: f32) -> Option<SortValue> {
        if self.target == SortTarget::Similarity {
            return Some(SortValue::Number(f64::from(similarity)));
        }

        let raw = raw?;
        match self.cast {
            None => Some(SortValue::from_attribute(raw)),
            Some(Cast::Text) => Some(SortValue::Text(attribute_text(raw))),
            Some(Cast::Number) => match raw {
                AttributeValue::Integer(i) => Some(SortValue::Number(*i as f64)),
                AttributeValue::Float(f) => Some(SortValue::Number(*f)),
                other => attribute_text(other)
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(SortValue::Number),
            },
            Some(Cast::Date) => parse_date(&attribute_text(raw)).map(SortValue::Date),
        }
    }
}

fn attribute_text(value: &AttributeValue) -> String {
    match value {
        AttributeValue::String(s) => s.clone(),
        AttributeValue::Integer(i) => i.to_string(),
        AttributeValue::Float(f) => f.to_string(),
        AttributeValue::Boolean(b) => b.to_string(),
    }
}

/// Parse the leading date out of `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or
/// RFC 3339 text.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// A field value prepared for comparison
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl SortValue {
    fn from_attribute(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Boolean(b) => SortValue::Bool(*b),
            AttributeValue::Integer(i) => SortValue::Number(*i as f64),
            AttributeValue::Float(f) => SortValue::Number(*f),
            AttributeValue::String(s) => SortValue::Text(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortValue::Bool(_) => 0,
            SortValue::Number(_) => 1,
            SortValue::Date(_) => 2,
            SortValue::Text(_) => 3,
        }
    }

    fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Date(a), SortValue::Date(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// An ordered list of sort keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[SortKeySpec]) -> Result<Self> {
        let keys = specs.iter().map(SortKey::from_spec).collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub fn then_by(mut self, key: SortKey) -> Self {
        self.keys.push(key);
        self
    }

    pub fn push(&mut self, key: SortKey) {
        self.keys.push(key);
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Document fields needed to evaluate the ordering, without duplicates
    pub fn fields(&self) -> Vec<FieldRef> {
        let mut fields: Vec<FieldRef> = Vec::new();
        for field in self.keys.iter().filter_map(SortKey::field) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    /// Prepare one row for comparison. `lookup` resolves a document field to
    /// its raw value.
    pub fn row_values<'a, F>(&self, similarity: f32, mut lookup: F) -> Vec<Option<SortValue>>
    where
        F: FnMut(&FieldRef) -> Option<&'a AttributeValue>,
    {
        self.keys
            .iter()
            .map(|key| {
                let raw = key.field().and_then(|field| lookup(&field));
                key.sort_value(raw, similarity)
            })
            .collect()
    }

    /// Compare two prepared rows. Missing values sort last in either
    /// direction.
    pub fn compare(&self, a: &[Option<SortValue>], b: &[Option<SortValue>]) -> Ordering {
        for (key, (va, vb)) in self.keys.iter().zip(a.iter().zip(b.iter())) {
            let ordering = match (va, vb) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => key.direction.apply(x.compare(y)),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direction_validation() {
        assert_eq!("ASC".parse::<Direction>().unwrap(), Direction::Asc);
        assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Desc);
        assert!(matches!(
            "UP".parse::<Direction>(),
            Err(Error::InvalidDirection(_))
        ));
    }

    #[test]
    fn test_metadata_sort_requires_cast() {
        let spec: SortKeySpec = serde_json::from_value(json!({
            "field_name": "views",
            "direction": "DESC",
            "target": "metadata"
        }))
        .unwrap();
        assert!(matches!(
            SortKey::from_spec(&spec),
            Err(Error::MissingCast(_))
        ));

        let spec: SortKeySpec = serde_json::from_value(json!({
            "field_name": "views",
            "direction": "DESC",
            "target": "metadata",
            "cast": "number"
        }))
        .unwrap();
        let key = SortKey::from_spec(&spec).unwrap();
        assert_eq!(key.cast(), Some(Cast::Number));
        assert_eq!(key.field(), Some(FieldRef::metadata("views")));
    }

    #[test]
    fn test_numeric_cast_orders_by_value_not_text() {
        let spec = SortSpec::new()
            .then_by(SortKey::metadata("views", Direction::Desc, Cast::Number).unwrap());
        let values = ["10", "5", "20"].map(|v| AttributeValue::String(v.to_string()));

        let mut rows: Vec<(usize, Vec<Option<SortValue>>)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (i, spec.row_values(0.0, |_| Some(v))))
            .collect();
        rows.sort_by(|a, b| spec.compare(&a.1, &b.1));

        let order: Vec<usize> = rows.into_iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_text_cast_orders_lexically() {
        let spec =
            SortSpec::new().then_by(SortKey::metadata("code", Direction::Asc, Cast::Text).unwrap());
        let a = AttributeValue::String("10".into());
        let b = AttributeValue::String("9".into());
        let ra = spec.row_values(0.0, |_| Some(&a));
        let rb = spec.row_values(0.0, |_| Some(&b));
        assert_eq!(spec.compare(&ra, &rb), Ordering::Less);
    }

    #[test]
    fn test_date_cast() {
        assert_eq!(
            parse_date("2024-03-01 12:30:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            parse_date("2024-03-01T12:30:00Z"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date("soon"), None);

        let spec = SortSpec::new()
            .then_by(SortKey::metadata("published", Direction::Asc, Cast::Date).unwrap());
        let early = AttributeValue::String("2023-12-31".into());
        let late = AttributeValue::String("2024-01-01 00:00:00".into());
        assert_eq!(
            spec.compare(
                &spec.row_values(0.0, |_| Some(&late)),
                &spec.row_values(0.0, |_| Some(&early))
            ),
            Ordering::Greater
        );
    }

    #[test]
    fn test_missing_values_sort_last_both_ways() {
        for direction in [Direction::Asc, Direction::Desc] {
            let spec = SortSpec::new()
                .then_by(SortKey::metadata("views", direction, Cast::Number).unwrap());
            let present = AttributeValue::String("3".into());
            let unparsable = AttributeValue::String("n/a".into());
            let with = spec.row_values(0.0, |_| Some(&present));
            let without = spec.row_values(0.0, |_| None);
            let garbage = spec.row_values(0.0, |_| Some(&unparsable));
            assert_eq!(spec.compare(&with, &without), Ordering::Less);
            assert_eq!(spec.compare(&with, &garbage), Ordering::Less);
        }
    }

    #[test]
    fn test_similarity_key_and_composite_order() {
        let spec = SortSpec::new()
            .then_by(SortKey::attribute("kind", Direction::Asc).unwrap())
            .then_by(SortKey::similarity(Direction::Desc));
        assert_eq!(spec.fields(), vec![FieldRef::attribute("kind")]);

        let post = AttributeValue::String("post".into());
        let page = AttributeValue::String("page".into());
        let a = spec.row_values(0.4, |_| Some(&post));
        let b = spec.row_values(0.9, |_| Some(&post));
        let c = spec.row_values(0.1, |_| Some(&page));

        assert_eq!(spec.compare(&c, &a), Ordering::Less);
        assert_eq!(spec.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_attribute_values_compare_natively() {
        let spec = SortSpec::new().then_by(SortKey::attribute("price", Direction::Asc).unwrap());
        let cheap = AttributeValue::Integer(5);
        let pricey = AttributeValue::Float(12.5);
        assert_eq!(
            spec.compare(
                &spec.row_values(0.0, |_| Some(&cheap)),
                &spec.row_values(0.0, |_| Some(&pricey))
            ),
            Ordering::Less
        );
    }
}
