use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::engine::{RecordStore, StoredRecord};
use super::table::Table;
use crate::core::{AttributeMap, Column, DbError, RecordKey, Result, Schema, Value};
use crate::query::{Criteria, Evaluator, SqlDialect};

/// Operation counters of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub inserts: usize,
    pub key_updates: usize,
    pub bulk_updates: usize,
    pub deletes: usize,
    pub finds: usize,
    pub counts: usize,
    pub batch_reads: usize,
    pub schema_loads: usize,
    pub columns_added: usize,
}

#[derive(Default)]
struct Counters {
    inserts: AtomicUsize,
    key_updates: AtomicUsize,
    bulk_updates: AtomicUsize,
    deletes: AtomicUsize,
    finds: AtomicUsize,
    counts: AtomicUsize,
    batch_reads: AtomicUsize,
    schema_loads: AtomicUsize,
    columns_added: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StoreStats {
        StoreStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            key_updates: self.key_updates.load(Ordering::Relaxed),
            bulk_updates: self.bulk_updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            finds: self.finds.load(Ordering::Relaxed),
            counts: self.counts.load(Ordering::Relaxed),
            batch_reads: self.batch_reads.load(Ordering::Relaxed),
            schema_loads: self.schema_loads.load(Ordering::Relaxed),
            columns_added: self.columns_added.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.inserts,
            &self.key_updates,
            &self.bulk_updates,
            &self.deletes,
            &self.finds,
            &self.counts,
            &self.batch_reads,
            &self.schema_loads,
            &self.columns_added,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// In-memory [`RecordStore`].
///
/// Criteria fragments are parsed in the configured dialect and evaluated per
/// row, so SQL produced for MySQL, PostgreSQL or SQLite runs against the same
/// data. Column introspection answers from a per-table schema cache that is
/// only rebuilt by [`RecordStore::refresh_schema`] or table creation, which
/// mirrors how database adapters cache table descriptions.
///
/// `LIKE` ignores case under MySQL and SQLite, as their default collations
/// do. `=` and ordering always compare case-sensitively.
pub struct MemoryStore {
    dialect: SqlDialect,
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
    schema_cache: Mutex<HashMap<String, Schema>>,
    counters: Counters,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_dialect(SqlDialect::default())
    }

    pub fn with_dialect(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            tables: RwLock::new(HashMap::new()),
            schema_cache: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub async fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(name) {
            return Err(DbError::TableExists(name.to_string()));
        }
        let table = Table::new(name, Schema::new(columns))?;
        tables.insert(name.to_string(), Arc::new(RwLock::new(table)));
        self.schema_cache.lock()?.remove(name);
        debug!(table = name, "table created");
        Ok(())
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let handle = self.table(table).await?;
        let guard = handle.read().await;
        Ok(guard.row_count())
    }

    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    async fn table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.dialect.clone())
    }

    fn select(
        evaluator: &Evaluator,
        rows: impl Iterator<Item = StoredRecord>,
        criteria: &Criteria,
    ) -> Result<Vec<StoredRecord>> {
        let mut selected = Vec::new();
        for row in rows {
            let keep = match criteria.condition() {
                Some(condition) => evaluator.matches(condition, &row)?,
                None => true,
            };
            if keep {
                selected.push(row);
            }
        }
        Ok(selected)
    }

    fn sort(
        evaluator: &Evaluator,
        rows: Vec<StoredRecord>,
        criteria: &Criteria,
    ) -> Result<Vec<StoredRecord>> {
        if criteria.orders().is_empty() {
            return Ok(rows);
        }

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let sort_keys = criteria
                .orders()
                .iter()
                .map(|order| evaluator.evaluate_fragment(&order.fragment, &row))
                .collect::<Result<Vec<Value>>>()?;
            keyed.push((sort_keys, row));
        }

        keyed.sort_by(|(left, lrow), (right, rrow)| {
            for ((l, r), order) in left.iter().zip(right.iter()).zip(criteria.orders()) {
                let ord = l.compare(r).unwrap_or(CmpOrdering::Equal);
                let ord = if order.descending { ord.reverse() } else { ord };
                if ord != CmpOrdering::Equal {
                    return ord;
                }
            }
            lrow.key.cmp(&rrow.key)
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn dialect(&self) -> SqlDialect {
        self.dialect.clone()
    }

    async fn insert(&self, table: &str, attributes: AttributeMap) -> Result<RecordKey> {
        Counters::bump(&self.counters.inserts);
        let handle = self.table(table).await?;
        let mut guard = handle.write().await;
        guard.insert(&attributes)
    }

    async fn update_by_key(
        &self,
        table: &str,
        key: RecordKey,
        attributes: AttributeMap,
    ) -> Result<bool> {
        Counters::bump(&self.counters.key_updates);
        let handle = self.table(table).await?;
        let mut guard = handle.write().await;
        guard.update(key, &attributes)
    }

    async fn update_all(
        &self,
        table: &str,
        attributes: AttributeMap,
        criteria: &Criteria,
    ) -> Result<usize> {
        Counters::bump(&self.counters.bulk_updates);
        let handle = self.table(table).await?;
        let mut guard = handle.write().await;

        let evaluator = self.evaluator();
        let targets: Vec<RecordKey> = Self::select(&evaluator, guard.scan(), criteria)?
            .into_iter()
            .map(|row| row.key)
            .collect();
        for key in &targets {
            guard.update(*key, &attributes)?;
        }
        debug!(table, rows = targets.len(), "bulk update applied");
        Ok(targets.len())
    }

    async fn delete_by_key(&self, table: &str, key: RecordKey) -> Result<bool> {
        Counters::bump(&self.counters.deletes);
        let handle = self.table(table).await?;
        let mut guard = handle.write().await;
        Ok(guard.delete(key))
    }

    async fn find_by_key(&self, table: &str, key: RecordKey) -> Result<Option<StoredRecord>> {
        Counters::bump(&self.counters.finds);
        let handle = self.table(table).await?;
        let guard = handle.read().await;
        Ok(guard.get(key))
    }

    async fn find_all(&self, table: &str, criteria: &Criteria) -> Result<Vec<StoredRecord>> {
        Counters::bump(&self.counters.finds);
        let handle = self.table(table).await?;
        let guard = handle.read().await;

        let evaluator = self.evaluator();
        let rows = Self::select(&evaluator, guard.scan(), criteria)?;
        Self::sort(&evaluator, rows, criteria)
    }

    async fn count(&self, table: &str, criteria: &Criteria) -> Result<usize> {
        Counters::bump(&self.counters.counts);
        let handle = self.table(table).await?;
        let guard = handle.read().await;
        Ok(Self::select(&self.evaluator(), guard.scan(), criteria)?.len())
    }

    async fn fetch_batch(
        &self,
        table: &str,
        criteria: &Criteria,
        after: Option<RecordKey>,
        limit: usize,
    ) -> Result<Vec<StoredRecord>> {
        Counters::bump(&self.counters.batch_reads);
        let handle = self.table(table).await?;
        let guard = handle.read().await;

        let evaluator = self.evaluator();
        let mut batch = Vec::with_capacity(limit);
        for row in guard.scan_from(after) {
            if batch.len() >= limit {
                break;
            }
            let keep = match criteria.condition() {
                Some(condition) => evaluator.matches(condition, &row)?,
                None => true,
            };
            if keep {
                batch.push(row);
            }
        }
        Ok(batch)
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let cached = self
            .schema_cache
            .lock()?
            .get(table)
            .map(|schema| schema.has_column(column));
        if let Some(found) = cached {
            return Ok(found);
        }

        Counters::bump(&self.counters.schema_loads);
        let handle = self.table(table).await?;
        let schema = handle.read().await.schema().clone();
        let found = schema.has_column(column);
        self.schema_cache.lock()?.insert(table.to_string(), schema);
        Ok(found)
    }

    async fn add_text_column(&self, table: &str, column: &str) -> Result<()> {
        Counters::bump(&self.counters.columns_added);
        let handle = self.table(table).await?;
        handle.write().await.add_column(Column::text(column))?;
        debug!(table, column, "text column added");
        Ok(())
    }

    async fn refresh_schema(&self, table: &str) -> Result<()> {
        self.schema_cache.lock()?.remove(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::query::{BinaryOp, JoinOperator, SqlFragment, Expr};

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table(
                "people",
                vec![Column::text("name"), Column::new("age", DataType::Integer)],
            )
            .await
            .unwrap();
        for (name, age) in [("Cy", 40i64), ("Ann", 30), ("Bo", 17)] {
            let mut attrs = AttributeMap::new();
            attrs.insert("name".into(), name.into());
            attrs.insert("age".into(), age.into());
            store.insert("people", attrs).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_raw_criteria_filter() {
        let store = store().await;
        let adults = store
            .find_all("people", &Criteria::raw("age >= 18"))
            .await
            .unwrap();
        assert_eq!(adults.len(), 2);
        assert_eq!(store.count("people", &Criteria::raw("name LIKE 'A%'")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_order_by() {
        let store = store().await;
        let mut criteria = Criteria::new();
        criteria.order_by(SqlFragment::Typed(Expr::column("name")), false);
        let names: Vec<Value> = store
            .find_all("people", &criteria)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.attributes["name"].clone())
            .collect();
        assert_eq!(names, vec!["Ann".into(), "Bo".into(), "Cy".into()]);
    }

    #[tokio::test]
    async fn test_bulk_update_counts_matches() {
        let store = store().await;
        let mut criteria = Criteria::new();
        criteria.add_compare("age", BinaryOp::Lt, 35i64, JoinOperator::And);

        let mut attrs = AttributeMap::new();
        attrs.insert("age".into(), 50i64.into());
        assert_eq!(store.update_all("people", attrs, &criteria).await.unwrap(), 2);
        assert_eq!(store.count("people", &Criteria::raw("age = 50")).await.unwrap(), 2);
        assert_eq!(store.stats().bulk_updates, 1);
    }

    #[tokio::test]
    async fn test_fetch_batch_pages_by_key() {
        let store = store().await;
        let first = store.fetch_batch("people", &Criteria::new(), None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = store
            .fetch_batch("people", &Criteria::new(), Some(first[1].key), 2)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(store.stats().batch_reads, 2);
    }

    #[tokio::test]
    async fn test_schema_cache_is_stale_until_refreshed() {
        let store = store().await;
        assert!(!store.has_column("people", "virtual_cache").await.unwrap());

        store.add_text_column("people", "virtual_cache").await.unwrap();
        assert!(!store.has_column("people", "virtual_cache").await.unwrap());

        store.refresh_schema("people").await.unwrap();
        assert!(store.has_column("people", "virtual_cache").await.unwrap());
        assert_eq!(store.stats().schema_loads, 2);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let store = MemoryStore::new();
        let err = store.count("nope", &Criteria::new()).await.unwrap_err();
        assert!(matches!(err, DbError::TableNotFound(_)));
    }
}
