//! Grouped filter builder
//!
//! Filters live in named groups. A group matches when any of its filters
//! matches; the compiled predicate matches when every non-empty group does.

use std::collections::BTreeMap;

use crate::query::{Expr, Filter, FilterSpec};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct FilterGroup {
    key: String,
    filters: Vec<Filter>,
}

/// Builds an AND-of-ORs predicate from caller filter groups
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    groups: Vec<FilterGroup>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from keyed groups of unvalidated filters, as received over the
    /// API. Fails on the first invalid filter.
    pub fn from_specs(groups: &BTreeMap<String, Vec<FilterSpec>>) -> Result<Self> {
        let mut builder = Self::new();
        for (key, specs) in groups {
            builder.add_filter_group(key.clone());
            for spec in specs {
                builder.add_filter(key, Filter::from_spec(spec)?)?;
            }
        }
        Ok(builder)
    }

    /// Create an empty group. Re-adding an existing key clears that group.
    pub fn add_filter_group(&mut self, key: impl Into<String>) -> &mut Self {
        let key = key.into();
        match self.groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.filters.clear(),
            None => self.groups.push(FilterGroup {
                key,
                filters: Vec::new(),
            }),
        }
        self
    }

    /// Append a filter to an existing group.
    pub fn add_filter(&mut self, key: &str, filter: Filter) -> Result<&mut Self> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.key == key)
            .ok_or_else(|| Error::UnknownFilterGroup(key.to_string()))?;
        group.filters.push(filter);
        Ok(self)
    }

    /// Validate and append a caller-supplied filter to an existing group.
    pub fn add_filter_spec(&mut self, key: &str, spec: &FilterSpec) -> Result<&mut Self> {
        let filter = Filter::from_spec(spec)?;
        self.add_filter(key, filter)
    }

    pub fn has_filters(&self) -> bool {
        self.groups.iter().any(|g| !g.filters.is_empty())
    }

    pub fn group(&self, key: &str) -> Option<&[Filter]> {
        self.groups
            .iter()
            .find(|g| g.key == key)
            .map(|g| g.filters.as_slice())
    }

    /// AND over non-empty groups of OR over each group's filters.
    ///
    /// With no filters at all this is [`Expr::Always`]. A group containing an
    /// `IN` over an empty list or a scalar matches everything, so it drops out
    /// of the AND.
    pub fn compile(&self) -> Expr {
        let mut clauses = Vec::new();

        for group in self.groups.iter().filter(|g| !g.filters.is_empty()) {
            let alternatives: Vec<Expr> = group.filters.iter().map(Filter::to_expr).collect();
            if alternatives.iter().any(Expr::is_always) {
                continue;
            }
            if alternatives.len() == 1 {
                clauses.extend(alternatives);
            } else {
                clauses.push(Expr::Any {
                    clauses: alternatives,
                });
            }
        }

        match clauses.len() {
            0 => Expr::Always,
            1 => clauses.remove(0),
            _ => Expr::All { clauses },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CompareOp, CompareValue, FieldRef, FilterOp, Scalar, Target};

    fn eq(field: &str, value: &str) -> Filter {
        Filter::new(field, FilterOp::Eq, value, Target::Attribute).unwrap()
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let mut builder = PredicateBuilder::new();
        assert!(matches!(
            builder.add_filter("missing", eq("kind", "post")),
            Err(Error::UnknownFilterGroup(_))
        ));
    }

    #[test]
    fn test_has_filters() {
        let mut builder = PredicateBuilder::new();
        assert!(!builder.has_filters());

        builder.add_filter_group("a");
        assert!(!builder.has_filters());
        assert_eq!(builder.compile(), Expr::Always);

        builder.add_filter("a", eq("kind", "post")).unwrap();
        assert!(builder.has_filters());

        builder.add_filter_group("a");
        assert!(!builder.has_filters());
    }

    #[test]
    fn test_and_of_ors() {
        let mut builder = PredicateBuilder::new();
        builder.add_filter_group("kind").add_filter_group("empty").add_filter_group("views");
        builder
            .add_filter("kind", eq("kind", "post"))
            .unwrap()
            .add_filter("kind", eq("kind", "page"))
            .unwrap();
        builder
            .add_filter(
                "views",
                Filter::new("views", FilterOp::Gt, 10i64, Target::Metadata).unwrap(),
            )
            .unwrap();

        let expected = Expr::All {
            clauses: vec![
                Expr::Any {
                    clauses: vec![
                        Expr::Compare {
                            field: FieldRef::attribute("kind"),
                            op: CompareOp::Eq,
                            value: Scalar::String("post".into()),
                        },
                        Expr::Compare {
                            field: FieldRef::attribute("kind"),
                            op: CompareOp::Eq,
                            value: Scalar::String("page".into()),
                        },
                    ],
                },
                Expr::Compare {
                    field: FieldRef::metadata("views"),
                    op: CompareOp::Gt,
                    value: Scalar::Integer(10),
                },
            ],
        };
        assert_eq!(builder.compile(), expected);
    }

    #[test]
    fn test_empty_in_widens_group_to_match_all() {
        let mut builder = PredicateBuilder::new();
        builder.add_filter_group("g");
        builder
            .add_filter(
                "g",
                Filter::new("kind", FilterOp::In, CompareValue::List(vec![]), Target::Attribute)
                    .unwrap(),
            )
            .unwrap()
            .add_filter("g", eq("kind", "post"))
            .unwrap();

        assert!(builder.has_filters());
        assert_eq!(builder.compile(), Expr::Always);
    }

    #[test]
    fn test_scalar_in_group_drops_out() {
        let mut builder = PredicateBuilder::new();
        builder.add_filter_group("kind").add_filter_group("status");
        builder
            .add_filter(
                "kind",
                Filter::new("kind", FilterOp::NotIn, "post", Target::Attribute).unwrap(),
            )
            .unwrap();
        builder.add_filter("status", eq("status", "published")).unwrap();

        assert_eq!(
            builder.compile(),
            Expr::Compare {
                field: FieldRef::attribute("status"),
                op: CompareOp::Eq,
                value: Scalar::String("published".into()),
            }
        );
    }

    #[test]
    fn test_from_specs() {
        let groups: BTreeMap<String, Vec<FilterSpec>> = serde_json::from_value(serde_json::json!({
            "status": [
                {"field_name": "kind", "operator": "IN", "compare_value": ["post", "page"]}
            ]
        }))
        .unwrap();

        let builder = PredicateBuilder::from_specs(&groups).unwrap();
        assert_eq!(builder.group("status").unwrap().len(), 1);

        let bad: BTreeMap<String, Vec<FilterSpec>> = serde_json::from_value(serde_json::json!({
            "g": [{"field_name": "kind", "operator": "IN", "compare_value": [true]}]
        }))
        .unwrap();
        assert!(matches!(
            PredicateBuilder::from_specs(&bad),
            Err(Error::InvalidCompareValue(_))
        ));
    }
}
