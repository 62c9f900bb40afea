//! Query specs and their translation into provider request parameters
//!
//! A [`QuerySpec`] describes a listing without committing to a provider.
//! Each provider turns it into its own query-string parameters here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::{BackendError, BackendResult};
use crate::table::Table;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Largest page the base-style service will return
pub const BASE_PAGE_SIZE_MAX: usize = 100;

/// Largest page the row-style service will return
pub const ROW_PAGE_SIZE_MAX: usize = 200;

/// The one filter shape supported: `Field = 'value'`
static FILTER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^=!<>'\s][^=!<>']*?)\s*=\s*'([^']*)'\s*$").expect("filter pattern is valid")
});

// =============================================================================
// Types
// =============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    fn prefix(self) -> char {
        match self {
            Self::Asc => '+',
            Self::Desc => '-',
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Provider-agnostic listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    /// Only return these fields
    pub fields: Option<Vec<String>>,
    /// Drop these fields
    pub exclude: Option<Vec<String>>,
    /// Sort keys, applied in order
    #[serde(default)]
    pub sort: Vec<Sort>,
    /// `Field = 'value'`
    pub filter: Option<String>,
    /// Stop after this many rows
    pub max_rows: Option<usize>,
}

impl QuerySpec {
    /// Empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn filter(mut self, expr: impl Into<String>) -> Self {
        self.filter = Some(expr.into());
        self
    }

    #[must_use]
    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Rows whose link column to `table` contains `value`
    Related { table: Table, value: String },
    /// Rows whose `field` equals `value`
    Equals { field: String, value: String },
}

/// Parse `FieldName = 'value'`.
///
/// A field that names a table becomes a related-row filter on the link
/// column of that name; anything else is plain equality.
pub fn parse_filter(expr: &str) -> BackendResult<Filter> {
    let caps = FILTER_PATTERN
        .captures(expr)
        .ok_or_else(|| BackendError::InvalidFilter(expr.to_string()))?;
    let field = caps[1].trim().to_string();
    let value = caps[2].to_string();

    Ok(match Table::from_canonical(&field) {
        Some(table) => Filter::Related { table, value },
        None => Filter::Equals { field, value },
    })
}

// =============================================================================
// Base-style translation
// =============================================================================

/// Query parameters for a base-style listing, without the page offset.
pub fn base_params(spec: &QuerySpec) -> BackendResult<Vec<(String, String)>> {
    let mut params = Vec::new();

    for field in spec.fields.iter().flatten() {
        params.push(("fields[]".to_string(), field.clone()));
    }

    for (i, sort) in spec.sort.iter().enumerate() {
        params.push((format!("sort[{i}][field]"), sort.field.clone()));
        params.push((
            format!("sort[{i}][direction]"),
            sort.direction.as_str().to_string(),
        ));
    }

    if let Some(expr) = &spec.filter {
        let formula = match parse_filter(expr)? {
            Filter::Related { table, value } => format!(
                "FIND('{}', ARRAYJOIN({{{}}}))",
                escape_formula(&value),
                table
            ),
            Filter::Equals { field, value } => {
                format!("{{{}}} = '{}'", field, escape_formula(&value))
            }
        };
        params.push(("filterByFormula".to_string(), formula));
    }

    let page_size = spec
        .max_rows
        .map_or(BASE_PAGE_SIZE_MAX, |max| max.clamp(1, BASE_PAGE_SIZE_MAX));
    if let Some(max) = spec.max_rows {
        params.push(("maxRecords".to_string(), max.to_string()));
    }
    params.push(("pageSize".to_string(), page_size.to_string()));

    Ok(params)
}

fn escape_formula(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// =============================================================================
// Row-style translation
// =============================================================================

/// Query parameters for a row-style listing.
pub fn row_params(spec: &QuerySpec) -> BackendResult<Vec<(String, String)>> {
    let mut params = vec![("user_field_names".to_string(), "true".to_string())];

    if let Some(fields) = spec.fields.as_ref().filter(|f| !f.is_empty()) {
        params.push(("include".to_string(), fields.join(",")));
    }
    if let Some(exclude) = spec.exclude.as_ref().filter(|f| !f.is_empty()) {
        params.push(("exclude".to_string(), exclude.join(",")));
    }

    if !spec.sort.is_empty() {
        let order: Vec<String> = spec
            .sort
            .iter()
            .map(|s| format!("{}{}", s.direction.prefix(), s.field))
            .collect();
        params.push(("order_by".to_string(), order.join(",")));
    }

    if let Some(expr) = &spec.filter {
        let (key, value) = match parse_filter(expr)? {
            Filter::Related { table, value } => {
                (format!("filter__{table}__link_row_contains"), value)
            }
            Filter::Equals { field, value } => (format!("filter__{field}__equal"), value),
        };
        params.push((key, value));
    }

    let size = spec
        .max_rows
        .map_or(ROW_PAGE_SIZE_MAX, |max| max.clamp(1, ROW_PAGE_SIZE_MAX));
    params.push(("size".to_string(), size.to_string()));

    Ok(params)
}

/// Encode parameters as a query string.
#[must_use]
pub fn encode_params(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_parse_filter_related() {
        assert_eq!(
            parse_filter("Members = 'x@y.com'").unwrap(),
            Filter::Related {
                table: Table::Members,
                value: "x@y.com".into()
            }
        );
    }

    #[test]
    fn test_parse_filter_equality() {
        assert_eq!(
            parse_filter("Email = 'x@y.com'").unwrap(),
            Filter::Equals {
                field: "Email".into(),
                value: "x@y.com".into()
            }
        );
        assert_eq!(
            parse_filter("Display Name='Bob'").unwrap(),
            Filter::Equals {
                field: "Display Name".into(),
                value: "Bob".into()
            }
        );
    }

    #[test]
    fn test_parse_filter_rejects_other_shapes() {
        for expr in [
            "Email != 'x'",
            "Email = x",
            "Email > '3'",
            "AND({Email} = 'x', {Name} = 'y')",
            "= 'x'",
            "",
        ] {
            let err = parse_filter(expr).unwrap_err();
            assert!(
                matches!(err, BackendError::InvalidFilter(_)),
                "{expr}: {err:?}"
            );
        }
    }

    #[test]
    fn test_row_params() {
        let spec = QuerySpec::new()
            .fields(["Name", "Email"])
            .exclude(["Notes"])
            .sort("Date", SortDirection::Desc)
            .sort("Name", SortDirection::Asc)
            .filter("Email = 'x@y.com'")
            .max_rows(50);
        let params = row_params(&spec).unwrap();

        assert_eq!(get(&params, "user_field_names"), Some("true"));
        assert_eq!(get(&params, "include"), Some("Name,Email"));
        assert_eq!(get(&params, "exclude"), Some("Notes"));
        assert_eq!(get(&params, "order_by"), Some("-Date,+Name"));
        assert_eq!(get(&params, "filter__Email__equal"), Some("x@y.com"));
        assert_eq!(get(&params, "size"), Some("50"));
    }

    #[test]
    fn test_row_params_related_filter() {
        let spec = QuerySpec::new().filter("Members = 'x@y.com'");
        let params = row_params(&spec).unwrap();
        assert_eq!(
            get(&params, "filter__Members__link_row_contains"),
            Some("x@y.com")
        );
        assert_eq!(get(&params, "size"), Some("200"));
    }

    #[test]
    fn test_row_params_bad_filter() {
        let spec = QuerySpec::new().filter("Email != 'x'");
        assert!(row_params(&spec).is_err());
    }

    #[test]
    fn test_base_params() {
        let spec = QuerySpec::new()
            .fields(["Name"])
            .sort("Date", SortDirection::Desc)
            .filter("Email = 'o'neil'")
            .max_rows(250);
        // Quotes inside values are not part of the supported grammar.
        assert!(base_params(&spec).is_err());

        let spec = spec.filter("Sessions = 'Friday'");
        let params = base_params(&spec).unwrap();
        assert_eq!(get(&params, "fields[]"), Some("Name"));
        assert_eq!(get(&params, "sort[0][field]"), Some("Date"));
        assert_eq!(get(&params, "sort[0][direction]"), Some("desc"));
        assert_eq!(
            get(&params, "filterByFormula"),
            Some("FIND('Friday', ARRAYJOIN({Sessions}))")
        );
        assert_eq!(get(&params, "maxRecords"), Some("250"));
        assert_eq!(get(&params, "pageSize"), Some("100"));
    }

    #[test]
    fn test_base_params_equality_formula() {
        let spec = QuerySpec::new().filter("Email = 'x@y.com'");
        let params = base_params(&spec).unwrap();
        assert_eq!(
            get(&params, "filterByFormula"),
            Some("{Email} = 'x@y.com'")
        );
    }

    #[test]
    fn test_encode_params() {
        let params = vec![
            ("fields[]".to_string(), "Full Name".to_string()),
            ("size".to_string(), "2".to_string()),
        ];
        assert_eq!(encode_params(&params), "fields%5B%5D=Full+Name&size=2");
    }
}
