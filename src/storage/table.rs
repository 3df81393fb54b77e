use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::engine::StoredRecord;
use crate::core::{AttributeMap, Column, DbError, KEY_COLUMN, RecordKey, Result, Schema, Value};

type Row = Vec<Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: BTreeMap<RecordKey, Row>,
    next_key: u64,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Result<Self> {
        let name = name.into();
        if schema.has_column(KEY_COLUMN) {
            return Err(DbError::ConstraintViolation(format!(
                "Column '{}' of table '{}' is reserved for the record key",
                KEY_COLUMN, name
            )));
        }
        Ok(Self {
            name,
            schema,
            rows: BTreeMap::new(),
            next_key: 1,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn insert(&mut self, attributes: &AttributeMap) -> Result<RecordKey> {
        let mut row = vec![Value::Null; self.schema.column_count()];
        self.apply(&mut row, attributes)?;
        self.validate_row(&row)?;

        let key = RecordKey(self.next_key);
        self.next_key += 1;
        self.rows.insert(key, row);
        Ok(key)
    }

    /// Partial update: only the named attributes change.
    pub fn update(&mut self, key: RecordKey, attributes: &AttributeMap) -> Result<bool> {
        let Some(current) = self.rows.get(&key) else {
            return Ok(false);
        };
        let mut row = current.clone();
        self.apply(&mut row, attributes)?;
        self.validate_row(&row)?;
        self.rows.insert(key, row);
        Ok(true)
    }

    pub fn delete(&mut self, key: RecordKey) -> bool {
        self.rows.remove(&key).is_some()
    }

    pub fn get(&self, key: RecordKey) -> Option<StoredRecord> {
        self.rows.get(&key).map(|row| self.to_record(key, row))
    }

    /// Rows in key order, starting after `after` when given.
    pub fn scan_from(&self, after: Option<RecordKey>) -> impl Iterator<Item = StoredRecord> + '_ {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.rows
            .range((lower, Bound::Unbounded))
            .map(|(key, row)| self.to_record(*key, row))
    }

    pub fn scan(&self) -> impl Iterator<Item = StoredRecord> + '_ {
        self.scan_from(None)
    }

    /// Appends a nullable column; existing rows get NULL.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if column.name == KEY_COLUMN {
            return Err(DbError::ConstraintViolation(format!(
                "Column '{}' is reserved for the record key",
                KEY_COLUMN
            )));
        }
        if !column.nullable {
            return Err(DbError::ConstraintViolation(format!(
                "Added column '{}' must be nullable",
                column.name
            )));
        }
        self.schema.push_column(column)?;
        for row in self.rows.values_mut() {
            row.push(Value::Null);
        }
        Ok(())
    }

    fn apply(&self, row: &mut Row, attributes: &AttributeMap) -> Result<()> {
        for (name, value) in attributes {
            if name == KEY_COLUMN {
                continue;
            }
            let idx = self
                .schema
                .find_column_index(name)
                .ok_or_else(|| DbError::ColumnNotFound(name.clone(), self.name.clone()))?;
            row[idx] = value.clone();
        }
        Ok(())
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        for (column, value) in self.schema.columns().iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn to_record(&self, key: RecordKey, row: &Row) -> StoredRecord {
        let attributes = self
            .schema
            .columns()
            .iter()
            .zip(row.iter())
            .map(|(column, value)| (column.name.clone(), value.clone()))
            .collect();
        StoredRecord { key, attributes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn people() -> Table {
        Table::new(
            "people",
            Schema::new(vec![
                Column::text("first"),
                Column::text("last"),
                Column::new("birth_year", DataType::Integer),
            ]),
        )
        .unwrap()
    }

    fn attrs(pairs: &[(&str, Value)]) -> AttributeMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = people();
        let key = table.insert(&attrs(&[("first", "Ann".into())])).unwrap();

        let record = table.get(key).unwrap();
        assert_eq!(record.attributes["first"], Value::from("Ann"));
        assert_eq!(record.attributes["last"], Value::Null);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let mut table = people();
        let err = table.insert(&attrs(&[("nick", "A".into())])).unwrap_err();
        assert!(matches!(err, DbError::ColumnNotFound(..)));
    }

    #[test]
    fn test_type_checked() {
        let mut table = people();
        assert!(table.insert(&attrs(&[("birth_year", "2000".into())])).is_err());
    }

    #[test]
    fn test_partial_update_keeps_other_columns() {
        let mut table = people();
        let key = table
            .insert(&attrs(&[("first", "Ann".into()), ("last", "Lee".into())]))
            .unwrap();
        assert!(table.update(key, &attrs(&[("last", "Li".into())])).unwrap());

        let record = table.get(key).unwrap();
        assert_eq!(record.attributes["first"], Value::from("Ann"));
        assert_eq!(record.attributes["last"], Value::from("Li"));
        assert!(!table.update(RecordKey(99), &AttributeMap::new()).unwrap());
    }

    #[test]
    fn test_add_column_backfills_null() {
        let mut table = people();
        let key = table.insert(&attrs(&[("first", "Ann".into())])).unwrap();
        table.add_column(Column::text("virtual_cache")).unwrap();

        assert_eq!(table.get(key).unwrap().attributes["virtual_cache"], Value::Null);
        assert!(table.add_column(Column::text("virtual_cache")).is_err());
        assert!(table.add_column(Column::text("id")).is_err());
    }

    #[test]
    fn test_scan_from_is_exclusive() {
        let mut table = people();
        for _ in 0..5 {
            table.insert(&AttributeMap::new()).unwrap();
        }
        let keys: Vec<u64> = table.scan_from(Some(RecordKey(2))).map(|r| r.key.0).collect();
        assert_eq!(keys, vec![3, 4, 5]);
    }
}
