//! Change lists: the filtered, searched, ordered and paginated listing of a
//! model's records as its [`ModelAdmin`] describes it.
//!
//! Records come from the data layer. Filtering, search and ordering compare
//! raw field values (a foreign key filters on its key); only the rows of the
//! requested page are rendered, and a to-one column costs one round trip per
//! rendered row.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use ormlabs_core::LabsResult;
use ormlabs_db::fields::FieldType;
use ormlabs_db::related::resolve_to_one;
use ormlabs_db::{DbExecutor, Record, Value};
use serde::{Deserialize, Serialize};

use crate::model_admin::{ModelAdmin, STR_COLUMN};

/// Parameters of a change list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeListParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Rows per page; 0 means the admin's `list_per_page`.
    pub page_size: usize,
    /// Optional search query applied across `search_fields`.
    pub search: Option<String>,
    /// Optional ordering field (prefix with "-" for descending).
    pub ordering: Option<String>,
    /// Field-value filters to apply.
    pub filters: HashMap<String, String>,
}

impl ChangeListParams {
    /// Creates parameters for the first page with the admin's page size.
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    /// Sets the page number.
    #[must_use]
    pub const fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the search query.
    #[must_use]
    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    /// Sets the ordering field.
    #[must_use]
    pub fn ordering(mut self, field: impl Into<String>) -> Self {
        self.ordering = Some(field.into());
        self
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeListRow {
    /// The record's primary key.
    pub pk: Value,
    /// One rendered cell per `list_display` column.
    pub cells: Vec<String>,
}

/// A rendered page of a change list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeList {
    /// The `list_display` columns.
    pub columns: Vec<String>,
    /// The rows of the current page.
    pub rows: Vec<ChangeListRow>,
    /// Rows matching the filters and search, across all pages.
    pub count: usize,
    /// The current page (1-indexed, clamped to the available pages).
    pub page: usize,
    /// Rows per page.
    pub page_size: usize,
    /// Number of pages, at least 1.
    pub total_pages: usize,
    /// Whether a next page exists.
    pub has_next: bool,
    /// Whether a previous page exists.
    pub has_previous: bool,
    /// Distinct raw values of each `list_filter` field, sorted.
    pub filter_choices: BTreeMap<String, Vec<String>>,
}

/// Reads the raw value behind a column or filter name.
fn raw_value(record: &dyn Record, name: &str) -> Value {
    if name == "pk" {
        return record.pk_value();
    }
    record
        .record_meta()
        .get_field(name)
        .and_then(|f| record.field_value(&f.attname))
        .unwrap_or(Value::Null)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches_filter(value: &Value, wanted: &str) -> bool {
    value_text(value).map_or_else(|| wanted.is_empty() || wanted == "null", |s| s == wanted)
}

/// Compares two raw values for ordering; NULL sorts first.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

fn collect_filter_choices(
    records: &[Box<dyn Record>],
    filter_fields: &[String],
) -> BTreeMap<String, Vec<String>> {
    let mut choices = BTreeMap::new();
    for field in filter_fields {
        let mut values: Vec<String> = records
            .iter()
            .filter_map(|r| value_text(&raw_value(r.as_ref(), field)))
            .collect();
        values.sort();
        values.dedup();
        choices.insert(field.clone(), values);
    }
    choices
}

fn render_cell(
    db: &dyn DbExecutor,
    admin: &ModelAdmin,
    record: &dyn Record,
    column: &str,
) -> LabsResult<String> {
    if column == STR_COLUMN {
        return Ok(record.describe());
    }
    let field = record.record_meta().get_field(column);
    if let Some(field) = field.filter(|f| {
        matches!(
            f.field_type,
            FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. }
        )
    }) {
        return match resolve_to_one(db, record, field) {
            Ok(related) => Ok(related.describe()),
            Err(e) if e.is_does_not_exist() => Ok(admin.empty_value_display.clone()),
            Err(e) => Err(e),
        };
    }
    Ok(value_text(&raw_value(record, column)).unwrap_or_else(|| admin.empty_value_display.clone()))
}

/// Builds one page of the change list of `admin`'s model.
///
/// Filter choices are collected from the unfiltered records. Filters are
/// applied first, then the search, then the ordering: the requested one, or
/// the admin's first default, or the model's own.
pub fn build_changelist(
    db: &dyn DbExecutor,
    admin: &ModelAdmin,
    params: &ChangeListParams,
) -> LabsResult<ChangeList> {
    let model_key = admin.model_key();
    let records = db.all(&model_key)?;
    let filter_choices = collect_filter_choices(&records, &admin.list_filter);

    let mut selected: Vec<Box<dyn Record>> = records
        .into_iter()
        .filter(|r| {
            params
                .filters
                .iter()
                .all(|(field, wanted)| matches_filter(&raw_value(r.as_ref(), field), wanted))
        })
        .collect();

    if let Some(query) = params.search.as_deref().filter(|q| !q.is_empty()) {
        let query = query.to_lowercase();
        selected.retain(|r| {
            admin.search_fields.iter().any(|field| {
                let field = field.trim_start_matches(['^', '=', '@']);
                value_text(&raw_value(r.as_ref(), field))
                    .is_some_and(|s| s.to_lowercase().contains(&query))
            })
        });
    }

    let ordering = params
        .ordering
        .as_deref()
        .or_else(|| admin.ordering.first().map(String::as_str));
    if let Some(ordering) = ordering {
        let (field, descending) = ordering
            .strip_prefix('-')
            .map_or((ordering, false), |stripped| (stripped, true));
        selected.sort_by(|a, b| {
            let cmp = compare_values(&raw_value(a.as_ref(), field), &raw_value(b.as_ref(), field));
            if descending {
                cmp.reverse()
            } else {
                cmp
            }
        });
    }

    let count = selected.len();
    let page_size = match (params.page_size, admin.list_per_page) {
        (0, 0) => 1,
        (0, per_page) => per_page,
        (size, _) => size,
    };
    let total_pages = count.div_ceil(page_size).max(1);
    let page = params.page.clamp(1, total_pages);
    let start = (page - 1) * page_size;

    let rows = selected
        .iter()
        .skip(start)
        .take(page_size)
        .map(|record| {
            let cells = admin
                .list_display
                .iter()
                .map(|column| render_cell(db, admin, record.as_ref(), column))
                .collect::<LabsResult<Vec<_>>>()?;
            Ok(ChangeListRow {
                pk: record.pk_value(),
                cells,
            })
        })
        .collect::<LabsResult<Vec<_>>>()?;

    tracing::debug!(model = %model_key, count, page, "built change list");
    Ok(ChangeList {
        columns: admin.list_display.clone(),
        rows,
        count,
        page,
        page_size,
        total_pages,
        has_next: page < total_pages,
        has_previous: page > 1,
        filter_choices,
    })
}
