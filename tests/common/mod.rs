#![allow(dead_code)]

use std::sync::Arc;

use memovirt::{AttributeMap, Column, DataType, MemoryStore, SqlDialect, Value};

pub const TABLE: &str = "people";

pub fn full_name(attrs: &AttributeMap) -> Value {
    match (attrs.get("first"), attrs.get("last")) {
        (Some(Value::Text(first)), Some(Value::Text(last))) => {
            Value::Text(format!("{} {}", first, last))
        }
        _ => Value::Null,
    }
}

/// Fixed cut-off year so the result depends on the record alone.
pub fn age_bracket(attrs: &AttributeMap) -> Value {
    match attrs.get("birthYear").and_then(Value::as_i64) {
        Some(year) if year <= 2008 => Value::from("adult"),
        Some(_) => Value::from("minor"),
        None => Value::Null,
    }
}

pub fn person(first: &str, last: &str, birth_year: i64) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    attrs.insert("first".into(), first.into());
    attrs.insert("last".into(), last.into());
    attrs.insert("birthYear".into(), birth_year.into());
    attrs
}

pub fn base_columns() -> Vec<Column> {
    vec![
        Column::text("first"),
        Column::text("last"),
        Column::new("birthYear", DataType::Integer),
    ]
}

/// `people` table with the base columns plus `extra`.
pub async fn people_store(dialect: SqlDialect, extra: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::with_dialect(dialect));
    let mut columns = base_columns();
    columns.extend(extra.iter().map(|name| Column::text(*name)));
    store.create_table(TABLE, columns).await.unwrap();
    store
}
