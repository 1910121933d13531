//! Field-path resolution.
//!
//! A path is a field name followed by `__`-separated segments. A segment that
//! names a field of a foreign key's target hops to the target row; any other
//! segment is a transform applied to the value read so far:
//!
//! | Segment | Applies to | Gives |
//! |---|---|---|
//! | `len` | arrays, JSON arrays | the length |
//! | `0`, `1`, ... | arrays, JSON arrays | the element (0-based) |
//! | `year`, `month`, `day` | timestamps | the component |
//! | any other name | JSON objects | the value under that key |
//!
//! A step that does not apply yields NULL.

use chrono::Datelike;

use crate::fields::{FieldDef, FieldType};
use crate::model::ModelMeta;
use crate::registry::ModelRegistry;
use crate::row::Row;
use crate::value::Value;

/// Separator between path segments.
pub const LOOKUP_SEP: &str = "__";

/// Where evaluation reads rows of related models from.
pub trait RowSource {
    /// The registry the paths are resolved against.
    fn registry(&self) -> &ModelRegistry;

    /// The stored row of `model` whose primary key is `pk`.
    fn related_row(&self, model: &str, pk: &Value) -> Option<&Row>;
}

/// One row being evaluated.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    /// Source of related rows.
    pub source: &'a dyn RowSource,
    /// Schema of `row`.
    pub meta: &'a ModelMeta,
    /// The row itself.
    pub row: &'a Row,
}

impl std::fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("model", &self.meta.label())
            .field("row", self.row)
            .finish_non_exhaustive()
    }
}

impl<'a> Scope<'a> {
    /// Creates a scope over `row`.
    pub fn new(source: &'a dyn RowSource, meta: &'a ModelMeta, row: &'a Row) -> Self {
        Self { source, meta, row }
    }

    /// Reads the value a path points at.
    pub fn resolve(&self, path: &str) -> Value {
        let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();
        resolve_segments(self.source, self.meta, self.row, &segments)
    }
}

fn field_of<'m>(meta: &'m ModelMeta, name: &str) -> Option<&'m FieldDef> {
    if name == "pk" {
        meta.pk_field()
    } else {
        meta.get_field(name)
            .or_else(|| meta.fields.iter().find(|f| f.attname == name))
    }
}

/// The target label of a forward to-one field.
fn hop_target(meta: &ModelMeta, field: &FieldDef) -> Option<String> {
    match &field.field_type {
        FieldType::ForeignKey { to, .. } | FieldType::OneToOneField { to, .. } => {
            Some(ModelRegistry::resolve_label(meta.app_label, to))
        }
        _ => None,
    }
}

/// Returns the target schema when `next` names one of its fields.
fn hop<'r>(
    registry: &'r ModelRegistry,
    meta: &ModelMeta,
    field: &FieldDef,
    next: Option<&&str>,
) -> Option<(String, &'r ModelMeta)> {
    let next = next?;
    let target = hop_target(meta, field)?;
    let target_meta = registry.meta(&target).ok()?;
    field_of(target_meta, next).map(|_| (target, target_meta))
}

fn resolve_segments(source: &dyn RowSource, meta: &ModelMeta, row: &Row, segments: &[&str]) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return Value::Null;
    };
    let Some(field) = field_of(meta, head) else {
        return Value::Null;
    };
    let value = row.get_value(&field.attname).cloned().unwrap_or(Value::Null);
    if let Some((target, target_meta)) = hop(source.registry(), meta, field, rest.first()) {
        return source
            .related_row(&target, &value)
            .map_or(Value::Null, |related| {
                resolve_segments(source, target_meta, related, rest)
            });
    }
    rest.iter().fold(value, |value, segment| transform(value, segment))
}

fn transform(value: Value, segment: &str) -> Value {
    let index = segment.parse::<usize>().ok();
    match (value, segment) {
        (Value::List(items), "len") => length(items.len()),
        (Value::Json(serde_json::Value::Array(items)), "len") => length(items.len()),
        (Value::DateTime(dt), "year") => Value::Int(i64::from(dt.year())),
        (Value::DateTime(dt), "month") => Value::Int(i64::from(dt.month())),
        (Value::DateTime(dt), "day") => Value::Int(i64::from(dt.day())),
        (Value::List(items), _) => index
            .and_then(|i| items.into_iter().nth(i))
            .unwrap_or(Value::Null),
        (Value::Json(serde_json::Value::Array(items)), _) => index
            .and_then(|i| items.get(i))
            .map_or(Value::Null, json_value),
        (Value::Json(serde_json::Value::Object(map)), key) => {
            map.get(key).map_or(Value::Null, json_value)
        }
        _ => Value::Null,
    }
}

fn length(len: usize) -> Value {
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

/// Converts a JSON value read from a document into a field value.
///
/// Scalars become their [`Value`] counterpart; arrays and objects stay JSON.
pub fn json_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::Json(other.clone()),
    }
}

/// Renders a value as a SQL literal for a recorded statement.
pub(crate) fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(_) | Value::Float(_) => value.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::List(items) => format!("ARRAY[{}]", literal_list(items)),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

pub(crate) fn literal_list(values: &[Value]) -> String {
    values.iter().map(literal).collect::<Vec<_>>().join(", ")
}

fn quoted(ident: &str) -> String {
    format!("\"{ident}\"")
}

/// Renders the SQL column expression a path stands for.
pub fn column_sql(registry: &ModelRegistry, meta: &ModelMeta, path: &str) -> String {
    let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();
    segments_sql(registry, meta, &segments)
}

fn segments_sql(registry: &ModelRegistry, meta: &ModelMeta, segments: &[&str]) -> String {
    let Some((head, rest)) = segments.split_first() else {
        return String::new();
    };
    let Some(field) = field_of(meta, head) else {
        return format!("{}.{}", quoted(&meta.db_table), quoted(head));
    };
    if let Some((_, target_meta)) = hop(registry, meta, field, rest.first()) {
        return segments_sql(registry, target_meta, rest);
    }
    let column = format!("{}.{}", quoted(&meta.db_table), quoted(&field.attname));
    let json = matches!(
        field.field_type,
        FieldType::JsonField | FieldType::HStoreField
    );
    if json && rest.len() > 1 {
        let keys: Vec<String> = rest.iter().map(|s| (*s).to_string()).collect();
        return format!("({column} #> ARRAY['{}'])", keys.join("', '"));
    }
    rest.iter().fold(column, |sql, segment| match *segment {
        "len" => format!("coalesce(array_length({sql}, 1), 0)"),
        "year" | "month" | "day" => format!("EXTRACT({} FROM {sql})", segment.to_uppercase()),
        s if s.parse::<usize>().is_ok() && !json => {
            let index = s.parse::<usize>().unwrap_or(0) + 1;
            format!("{sql}[{index}]")
        }
        key => format!("({sql} -> '{key}')"),
    })
}

/// Renders the joins the given paths need to reach related tables.
///
/// Nullable foreign keys join with `LEFT OUTER JOIN`, others with `INNER JOIN`.
pub fn join_sql<'p>(
    registry: &ModelRegistry,
    meta: &ModelMeta,
    paths: impl IntoIterator<Item = &'p str>,
) -> String {
    let mut joins = Vec::new();
    for path in paths {
        let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();
        collect_joins(registry, meta, &segments, &mut joins);
    }
    joins.concat()
}

fn collect_joins(registry: &ModelRegistry, meta: &ModelMeta, segments: &[&str], joins: &mut Vec<String>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(field) = field_of(meta, head) else {
        return;
    };
    let Some((_, target_meta)) = hop(registry, meta, field, rest.first()) else {
        return;
    };
    let kind = if field.null { "LEFT OUTER JOIN" } else { "INNER JOIN" };
    let join = format!(
        " {kind} {} ON ({}.{} = {}.{})",
        quoted(&target_meta.db_table),
        quoted(&meta.db_table),
        quoted(&field.attname),
        quoted(&target_meta.db_table),
        quoted(target_meta.pk_field().map_or("id", |f| f.attname.as_str())),
    );
    if !joins.contains(&join) {
        joins.push(join);
    }
    collect_joins(registry, target_meta, rest, joins);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_array() {
        let skills = Value::from(vec!["python", "rust"]);
        assert_eq!(transform(skills.clone(), "len"), Value::Int(2));
        assert_eq!(transform(skills.clone(), "0"), Value::from("python"));
        assert_eq!(transform(skills, "5"), Value::Null);
    }

    #[test]
    fn test_transform_json() {
        let info = Value::Json(serde_json::json!({
            "contact": {"work": {"phone": "555"}},
            "languages": [{"name": "French", "level": 7}]
        }));
        let work = transform(transform(info.clone(), "contact"), "work");
        assert_eq!(transform(work, "phone"), Value::from("555"));
        let languages = transform(info.clone(), "languages");
        assert_eq!(transform(languages.clone(), "len"), Value::Int(1));
        assert_eq!(transform(transform(languages, "0"), "level"), Value::Int(7));
        assert_eq!(transform(info, "websites"), Value::Null);
    }

    #[test]
    fn test_literal() {
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::from("O'Hara")), "'O''Hara'");
        assert_eq!(literal(&Value::Int(3)), "3");
        assert_eq!(literal(&Value::Bool(true)), "TRUE");
        assert_eq!(literal(&Value::from(vec!["a", "b"])), "ARRAY['a', 'b']");
    }

    #[test]
    fn test_json_value() {
        assert_eq!(json_value(&serde_json::json!(3)), Value::Int(3));
        assert_eq!(json_value(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(json_value(&serde_json::json!(null)), Value::Null);
        assert_eq!(
            json_value(&serde_json::json!(["a"])),
            Value::Json(serde_json::json!(["a"]))
        );
    }
}
