use async_trait::async_trait;

use crate::core::{AttributeMap, RecordKey, Result, Value};
use crate::query::{Criteria, RowSource, SqlDialect};

/// One persisted row as seen through the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordKey,
    pub attributes: AttributeMap,
}

impl RowSource for StoredRecord {
    fn key(&self) -> Option<RecordKey> {
        Some(self.key)
    }

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Record store the virtual attribute engine persists through.
///
/// Implementations operate on a named-field model: every write carries the
/// attributes to set by name, and criteria may contain engine-native SQL
/// fragments in the store's [`SqlDialect`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Dialect used for raw criteria fragments and generated expressions
    fn dialect(&self) -> SqlDialect;

    /// Insert a row, returning its assigned key
    async fn insert(&self, table: &str, attributes: AttributeMap) -> Result<RecordKey>;

    /// Update the listed attributes of one row. `false` if the key is unknown.
    async fn update_by_key(
        &self,
        table: &str,
        key: RecordKey,
        attributes: AttributeMap,
    ) -> Result<bool>;

    /// Update the listed attributes of every row matching `criteria`
    async fn update_all(
        &self,
        table: &str,
        attributes: AttributeMap,
        criteria: &Criteria,
    ) -> Result<usize>;

    async fn delete_by_key(&self, table: &str, key: RecordKey) -> Result<bool>;

    async fn find_by_key(&self, table: &str, key: RecordKey) -> Result<Option<StoredRecord>>;

    /// All rows matching `criteria`, in its order (key order otherwise)
    async fn find_all(&self, table: &str, criteria: &Criteria) -> Result<Vec<StoredRecord>>;

    async fn count(&self, table: &str, criteria: &Criteria) -> Result<usize>;

    /// Up to `limit` matching rows with a key greater than `after`, in key
    /// order. Used for batched iteration.
    async fn fetch_batch(
        &self,
        table: &str,
        criteria: &Criteria,
        after: Option<RecordKey>,
        limit: usize,
    ) -> Result<Vec<StoredRecord>>;

    /// Schema introspection; may answer from a cached schema description
    async fn has_column(&self, table: &str, column: &str) -> Result<bool>;

    /// Add a nullable text column to the table
    async fn add_text_column(&self, table: &str, column: &str) -> Result<()>;

    /// Drop any cached schema description of `table`
    async fn refresh_schema(&self, table: &str) -> Result<()>;
}
