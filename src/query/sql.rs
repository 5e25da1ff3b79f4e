//! SQL rendering of compiled predicates and sort keys
//!
//! Targets a MySQL-style schema where document attributes are columns of
//! the document table and metadata lives in a key/value table joined per
//! row. Metadata sort keys are expected to be projected by the outer query
//! as columns named after the key.

use crate::query::{
    Cast, CompareOp, Expr, FieldRef, Scalar, SortSpec, SortTarget, Target,
};

/// Renders [`Expr`] and [`SortSpec`] into SQL fragments
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    document_alias: String,
    metadata_alias: String,
}

impl Default for SqlRenderer {
    fn default() -> Self {
        Self::new("p", "pm")
    }
}

impl SqlRenderer {
    pub fn new(document_alias: impl Into<String>, metadata_alias: impl Into<String>) -> Self {
        Self {
            document_alias: document_alias.into(),
            metadata_alias: metadata_alias.into(),
        }
    }

    /// Render a predicate for use after `WHERE` or `AND`.
    pub fn render_predicate(&self, expr: &Expr) -> String {
        match expr {
            Expr::Always => "1=1".to_string(),
            Expr::All { clauses } if clauses.is_empty() => "1=1".to_string(),
            Expr::Any { clauses } if clauses.is_empty() => "1=0".to_string(),
            Expr::All { clauses } => clauses
                .iter()
                .map(|c| self.render_nested(c))
                .collect::<Vec<_>>()
                .join(" AND "),
            Expr::Any { clauses } => format!(
                "({})",
                clauses
                    .iter()
                    .map(|c| self.render_nested(c))
                    .collect::<Vec<_>>()
                    .join(" OR ")
            ),
            Expr::Compare { field, op, value } => {
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "!=",
                    CompareOp::Gt => ">",
                    CompareOp::Lt => "<",
                    CompareOp::Gte => ">=",
                    CompareOp::Lte => "<=",
                };
                self.condition(field, &format!("{} {}", op, literal(value)))
            }
            Expr::InList {
                field,
                values,
                negated,
            } => {
                let list = values.iter().map(literal).collect::<Vec<_>>().join(",");
                let op = if *negated { "NOT IN" } else { "IN" };
                self.condition(field, &format!("{} ({})", op, list))
            }
            Expr::Contains {
                field,
                needle,
                negated,
            } => {
                let op = if *negated { "NOT LIKE" } else { "LIKE" };
                let pattern = format!("%{}%", escape_like(needle));
                self.condition(field, &format!("{} {}", op, quote(&pattern)))
            }
        }
    }

    /// Render sort keys for use after `ORDER BY`. Similarity keys refer to a
    /// `similarity` column the caller must project.
    pub fn render_order(&self, sort: &SortSpec) -> String {
        sort.keys()
            .iter()
            .map(|key| {
                let column = match (key.target(), key.cast()) {
                    (SortTarget::Similarity, _) => "similarity".to_string(),
                    (SortTarget::Attribute, _) => {
                        format!("{}.{}", self.document_alias, key.field_name())
                    }
                    (SortTarget::Metadata, Some(Cast::Number)) => {
                        format!("CAST({} AS DECIMAL(65,10))", quote_ident(key.field_name()))
                    }
                    (SortTarget::Metadata, Some(Cast::Date)) => {
                        format!("CAST({} AS DATE)", quote_ident(key.field_name()))
                    }
                    (SortTarget::Metadata, _) => quote_ident(key.field_name()),
                };
                format!("{} {}", column, key.direction())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_nested(&self, expr: &Expr) -> String {
        match expr {
            Expr::All { clauses } if clauses.len() > 1 => {
                format!("({})", self.render_predicate(expr))
            }
            _ => self.render_predicate(expr),
        }
    }

    fn condition(&self, field: &FieldRef, rest: &str) -> String {
        match field.target {
            Target::Attribute => format!("{}.{} {}", self.document_alias, field.name, rest),
            Target::Metadata => format!(
                "({m}.meta_key = {key} AND {m}.meta_value {rest})",
                m = self.metadata_alias,
                key = quote(&field.name),
                rest = rest
            ),
        }
    }
}

fn literal(value: &Scalar) -> String {
    match value {
        Scalar::String(s) => quote(s),
        Scalar::Integer(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
    }
}

/// Quote a string literal, escaping backslashes and single quotes.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escape LIKE wildcards so the needle matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn quote_ident(s: &str) -> String {
    format!("`{}`", s.replace('`', "``"))
}
