//! In-memory emulators for both data services.
//!
//! Each emulator speaks the service's wire format behind [`Transport`], so
//! the real providers, pagination and normalization run unchanged against it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use url::Url;

use clubledger::{
    AirtableProvider, Backend, BackendResult, BaserowProvider, Method, Provider, Request,
    Response, Table, Transport,
};

// =============================================================================
// Constants
// =============================================================================

/// Base id the base-style emulator answers for
pub const BASE_ID: &str = "appClub";

/// Absolute host the row-style emulator puts in `next` links
const ROW_HOST: &str = "https://rows.test";

/// Largest page each service hands out
const BASE_PAGE_MAX: usize = 100;
const ROW_PAGE_MAX: usize = 200;

static FORMULA_EQUALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([^}]+)\} = '(.*)'$").expect("valid regex"));
static FORMULA_FIND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^FIND\('(.*)', ARRAYJOIN\(\{([^}]+)\}\)\)$").expect("valid regex"));

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Airtable,
    Baserow,
}

#[derive(Debug, Clone)]
struct Row {
    id: u64,
    fields: Map<String, Value>,
}

#[derive(Default)]
struct State {
    rows: HashMap<Table, Vec<Row>>,
    next_id: u64,
    requests: Vec<Request>,
    fail_listings: bool,
    fail_writes: bool,
}

/// A fake service holding every table in memory.
pub struct Emulator {
    dialect: Dialect,
    state: Mutex<State>,
}

impl Emulator {
    pub fn new(dialect: Dialect) -> Arc<Self> {
        Arc::new(Self {
            dialect,
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// A provider of the matching kind talking to this emulator.
    pub fn provider(self: &Arc<Self>) -> Arc<dyn Provider> {
        let transport: Arc<dyn Transport> = self.clone();
        match self.dialect {
            Dialect::Airtable => Arc::new(AirtableProvider::new(transport, BASE_ID)),
            Dialect::Baserow => Arc::new(BaserowProvider::new(transport, None)),
        }
    }

    pub fn backend(self: &Arc<Self>) -> Backend {
        Backend::new(self.provider())
    }

    /// Insert a row directly, returning its id as the provider reports it.
    pub fn seed(&self, table: Table, fields: Value) -> String {
        let Value::Object(fields) = fields else {
            panic!("seed fields must be an object");
        };
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.rows.entry(table).or_default().push(Row { id, fields });
        self.render_id(id)
    }

    /// A link-field value pointing at `id`, shaped the way this service
    /// returns links.
    pub fn link(&self, id: &str, display: &str) -> Value {
        match self.dialect {
            Dialect::Airtable => json!(id),
            Dialect::Baserow => json!({ "id": parse_id(id), "value": display }),
        }
    }

    pub fn fail_listings(&self, fail: bool) {
        self.state.lock().unwrap().fail_listings = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(&table)
            .map_or(0, Vec::len)
    }

    /// Number of listings started for `table` (first pages only).
    pub fn fetches(&self, table: Table) -> usize {
        let prefix = self.list_path(table);
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Get && r.path.starts_with(&prefix))
            .filter(|r| !r.path.contains("offset=") && !r.path.contains("page="))
            .count()
    }

    /// Number of table directory loads.
    pub fn directory_loads(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path.starts_with("/api/database/tables/all-tables/"))
            .count()
    }

    /// Path of the most recent listing request for `table`.
    pub fn last_listing(&self, table: Table) -> Option<String> {
        let prefix = self.list_path(table);
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.method == Method::Get && r.path.starts_with(&prefix))
            .map(|r| r.path)
    }

    fn list_path(&self, table: Table) -> String {
        match self.dialect {
            Dialect::Airtable => format!("/v0/{BASE_ID}/{table}?"),
            Dialect::Baserow => format!("/api/database/rows/table/{}/?", table_id(table)),
        }
    }

    fn render_id(&self, id: u64) -> String {
        match self.dialect {
            Dialect::Airtable => format!("rec{id}"),
            Dialect::Baserow => id.to_string(),
        }
    }
}

fn parse_id(id: &str) -> u64 {
    id.trim_start_matches("rec").parse().expect("emulator id")
}

fn table_id(table: Table) -> u64 {
    let index = Table::all()
        .iter()
        .position(|t| *t == table)
        .expect("known table");
    100 + index as u64
}

fn table_for_id(id: u64) -> Option<Table> {
    Table::all().iter().copied().find(|t| table_id(*t) == id)
}

fn not_found() -> Response {
    Response::json(404, &json!({ "error": "NOT_FOUND" }))
}

// =============================================================================
// Transport
// =============================================================================

#[async_trait]
impl Transport for Emulator {
    async fn send(&self, request: Request) -> BackendResult<Response> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;

        let url = Url::parse(&format!("http://emulator{}", request.path)).expect("valid path");
        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        let response = match self.dialect {
            Dialect::Airtable => airtable(&mut state, &request, &segments, &query),
            Dialect::Baserow => baserow(&mut state, &request, &segments, &query),
        };
        Ok(response)
    }
}

fn param<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn write_failure() -> Response {
    Response::json(
        422,
        &json!({ "error": "INVALID_VALUE_FOR_COLUMN", "message": "rejected" }),
    )
}

/// Whether the link column `field` points at a row whose display text
/// contains `needle`.
///
/// Base-style links are bare record ids, so the linked row's `Name` is looked
/// up in the table the column is named after, the way `ARRAYJOIN` sees the
/// primary field. Row-style links carry their display text as `value`.
fn links_contain(
    rows: &HashMap<Table, Vec<Row>>,
    field: &str,
    value: Option<&Value>,
    needle: &str,
) -> bool {
    let items = match value {
        Some(Value::Array(items)) => items.as_slice(),
        _ => return false,
    };
    let linked = Table::from_canonical(field).and_then(|t| rows.get(&t));

    items.iter().any(|item| {
        let display = match item {
            Value::String(id) => linked
                .and_then(|rows| rows.iter().find(|r| format!("rec{}", r.id) == *id))
                .and_then(|row| row.fields.get("Name"))
                .and_then(Value::as_str),
            Value::Object(obj) => obj.get("value").and_then(Value::as_str),
            _ => None,
        };
        display.is_some_and(|text| text.contains(needle))
    })
}

fn field_equals(fields: &Map<String, Value>, field: &str, value: &str) -> bool {
    match fields.get(field) {
        Some(Value::String(s)) => s == value,
        Some(other) => other.to_string() == value,
        None => false,
    }
}

// =============================================================================
// Base-style service
// =============================================================================

fn airtable_record(row: &Row) -> Value {
    json!({
        "id": format!("rec{}", row.id),
        "createdTime": "2024-01-01T12:00:00.000Z",
        "fields": row.fields,
    })
}

fn airtable(
    state: &mut State,
    request: &Request,
    segments: &[String],
    query: &[(String, String)],
) -> Response {
    let table = match segments {
        [v0, base, table, ..] if v0 == "v0" && base == BASE_ID => Table::from_canonical(table),
        _ => None,
    };
    let Some(table) = table else {
        return not_found();
    };
    let record_id = segments.get(3).map(|s| parse_id(s));

    match (request.method, record_id) {
        (Method::Get, None) => {
            if state.fail_listings {
                return Response {
                    status: 503,
                    body: "upstream unavailable".into(),
                };
            }

            let formula = param(query, "filterByFormula");
            let rows: Vec<&Row> = state
                .rows
                .get(&table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| match formula {
                            None => true,
                            Some(f) => {
                                if let Some(c) = FORMULA_EQUALS.captures(f) {
                                    field_equals(&row.fields, &c[1], &c[2])
                                } else if let Some(c) = FORMULA_FIND.captures(f) {
                                    links_contain(&state.rows, &c[2], row.fields.get(&c[2]), &c[1])
                                } else {
                                    false
                                }
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();

            let max_records = param(query, "maxRecords")
                .and_then(|v| v.parse().ok())
                .unwrap_or(usize::MAX);
            let rows = &rows[..rows.len().min(max_records)];

            let page_size = param(query, "pageSize")
                .and_then(|v| v.parse().ok())
                .unwrap_or(BASE_PAGE_MAX)
                .min(BASE_PAGE_MAX);
            let start: usize = param(query, "offset")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let end = (start + page_size).min(rows.len());

            let records: Vec<Value> = rows[start.min(end)..end]
                .iter()
                .map(|row| airtable_record(row))
                .collect();
            let mut body = json!({ "records": records });
            if end < rows.len() {
                body["offset"] = json!(end.to_string());
            }
            Response::json(200, &body)
        }
        (Method::Post, None) => {
            if state.fail_writes {
                return write_failure();
            }
            let fields = request
                .body
                .as_ref()
                .and_then(|b| b.get("fields"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let row = Row {
                id: state.next_id,
                fields,
            };
            state.next_id += 1;
            let record = airtable_record(&row);
            state.rows.entry(table).or_default().push(row);
            Response::json(200, &record)
        }
        (Method::Patch, Some(id)) => {
            if state.fail_writes {
                return write_failure();
            }
            let patch = request
                .body
                .as_ref()
                .and_then(|b| b.get("fields"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let Some(row) = state
                .rows
                .get_mut(&table)
                .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            else {
                return not_found();
            };
            row.fields.extend(patch);
            Response::json(200, &airtable_record(row))
        }
        (Method::Delete, Some(id)) => {
            if state.fail_writes {
                return write_failure();
            }
            let rows = state.rows.entry(table).or_default();
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return not_found();
            }
            Response::json(200, &json!({ "id": format!("rec{id}"), "deleted": true }))
        }
        _ => not_found(),
    }
}

// =============================================================================
// Row-style service
// =============================================================================

fn baserow_row(row: &Row) -> Value {
    let mut obj = row.fields.clone();
    obj.insert("id".to_string(), json!(row.id));
    obj.insert("order".to_string(), json!(format!("{}.00000000000000000000", row.id)));
    Value::Object(obj)
}

fn baserow(
    state: &mut State,
    request: &Request,
    segments: &[String],
    query: &[(String, String)],
) -> Response {
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    if segments == ["api", "database", "tables", "all-tables"] {
        let tables: Vec<Value> = Table::all()
            .iter()
            .map(|t| json!({ "id": table_id(*t), "name": t.as_str(), "database_id": 1 }))
            .collect();
        return Response::json(200, &Value::Array(tables));
    }

    let (table, row_id) = match segments.as_slice() {
        ["api", "database", "rows", "table", tid, rest @ ..] => {
            let table = tid.parse().ok().and_then(table_for_id);
            let row_id = rest.first().and_then(|r| r.parse::<u64>().ok());
            (table, row_id)
        }
        _ => (None, None),
    };
    let Some(table) = table else {
        return not_found();
    };

    match (request.method, row_id) {
        (Method::Get, None) => {
            if state.fail_listings {
                return Response {
                    status: 502,
                    body: "<html>bad gateway</html>".into(),
                };
            }

            let rows: Vec<&Row> = state
                .rows
                .get(&table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| {
                            query.iter().all(|(key, value)| {
                                let Some(rest) = key.strip_prefix("filter__") else {
                                    return true;
                                };
                                if let Some(field) = rest.strip_suffix("__equal") {
                                    field_equals(&row.fields, field, value)
                                } else if let Some(field) = rest.strip_suffix("__link_row_contains")
                                {
                                    links_contain(&state.rows, field, row.fields.get(field), value)
                                } else {
                                    false
                                }
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            let size = param(query, "size")
                .and_then(|v| v.parse().ok())
                .unwrap_or(100)
                .min(ROW_PAGE_MAX);
            let page: usize = param(query, "page")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let start = (page - 1) * size;
            let end = (start + size).min(rows.len());

            let results: Vec<Value> = rows[start.min(end)..end]
                .iter()
                .map(|row| baserow_row(row))
                .collect();
            let next = (end < rows.len()).then(|| {
                format!(
                    "{ROW_HOST}/api/database/rows/table/{}/?user_field_names=true&size={size}&page={}",
                    table_id(table),
                    page + 1
                )
            });
            Response::json(
                200,
                &json!({ "count": rows.len(), "next": next, "results": results }),
            )
        }
        (Method::Post, None) => {
            if state.fail_writes {
                return write_failure();
            }
            let fields = request
                .body
                .as_ref()
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let row = Row {
                id: state.next_id,
                fields,
            };
            state.next_id += 1;
            let body = baserow_row(&row);
            state.rows.entry(table).or_default().push(row);
            Response::json(200, &body)
        }
        (Method::Patch, Some(id)) => {
            if state.fail_writes {
                return write_failure();
            }
            let patch = request
                .body
                .as_ref()
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let Some(row) = state
                .rows
                .get_mut(&table)
                .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            else {
                return not_found();
            };
            row.fields.extend(patch);
            Response::json(200, &baserow_row(row))
        }
        (Method::Delete, Some(id)) => {
            if state.fail_writes {
                return write_failure();
            }
            let rows = state.rows.entry(table).or_default();
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return not_found();
            }
            Response {
                status: 204,
                body: String::new(),
            }
        }
        _ => not_found(),
    }
}
