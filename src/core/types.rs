use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DataType, DbError, Result, Value};

/// Named-field attribute set of one record, ordered by field name.
pub type AttributeMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Text)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column_index(name).is_some()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Appends a column. Fails if the name is taken.
    pub fn push_column(&mut self, column: Column) -> Result<usize> {
        if self.has_column(&column.name) {
            return Err(DbError::ConstraintViolation(format!(
                "Column '{}' already exists",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(self.columns.len() - 1)
    }
}

/// Name under which the surrogate key is visible to expressions.
pub const KEY_COLUMN: &str = "id";

/// Surrogate key assigned by the record store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(pub u64);

impl RecordKey {
    pub fn as_value(&self) -> Value {
        Value::Integer(self.0 as i64)
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
