use std::sync::Arc;

use tracing::{Instrument, Level, event, info_span};

use super::hooks::AfterBulkUpdate;
use super::model::VirtualModel;
use super::record::Record;
use super::search::VirtualSearch;
use super::sweeper::{SweepReport, Sweeper};
use crate::config::CacheStrategy;
use crate::core::{AttributeMap, DbError, RecordKey, Result};
use crate::query::{Criteria, SqlDialect};
use crate::storage::RecordStore;

/// Binds a [`VirtualModel`] to a [`RecordStore`] and keeps the persisted
/// search cache in step with every write that goes through it.
///
/// Single-record writes recompute all virtual attributes and merge their
/// persisted form into the outgoing attributes. Bulk and multi-key updates
/// skip the per-row recompute and are gated by the model's hooks instead.
pub struct Repository {
    store: Arc<dyn RecordStore>,
    model: Arc<VirtualModel>,
    dialect: SqlDialect,
}

impl Repository {
    /// Resolves the store's dialect and, for `Shadowed`, checks that every
    /// shadow column exists.
    pub async fn open(store: Arc<dyn RecordStore>, model: Arc<VirtualModel>) -> Result<Self> {
        let table = model.table();
        match model.strategy() {
            CacheStrategy::Shadowed => {
                for field in model.persisted_fields() {
                    if !store.has_column(table, &field).await? {
                        return Err(DbError::Configuration(format!(
                            "Shadow column '{}' is missing from table '{}'",
                            field, table
                        )));
                    }
                }
            }
            CacheStrategy::Packed => {
                let field = model.codec().field();
                if !store.has_column(table, field).await? {
                    event!(
                        Level::WARN,
                        table = %table,
                        column = %field,
                        "packed cache column missing; a resync will create it"
                    );
                }
            }
        }

        let dialect = store.dialect();
        event!(Level::DEBUG, table = %table, dialect = %dialect, "virtual repository opened");
        Ok(Self {
            store,
            model,
            dialect,
        })
    }

    pub fn model(&self) -> &Arc<VirtualModel> {
        &self.model
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn dialect(&self) -> &SqlDialect {
        &self.dialect
    }

    pub fn new_record(&self) -> Record {
        Record::new(&self.model)
    }

    pub async fn create(&self, record: &mut Record) -> Result<RecordKey> {
        if let Some(key) = record.key() {
            return Err(DbError::InvalidArgument(format!(
                "record {} of '{}' is already persisted",
                key,
                self.model.table()
            )));
        }

        record.recompute_all();
        let key = self
            .store
            .insert(self.model.table(), record.attributes().clone())
            .await?;
        record.set_key(key);
        event!(Level::DEBUG, table = %self.model.table(), key = %key, "record created");
        Ok(key)
    }

    /// Writes every attribute of a persisted record. `false` when the row no
    /// longer exists.
    pub async fn update(&self, record: &mut Record) -> Result<bool> {
        let key = self.require_key(record)?;
        record.recompute_all();
        let updated = self
            .store
            .update_by_key(self.model.table(), key, record.attributes().clone())
            .await?;
        event!(Level::DEBUG, table = %self.model.table(), key = %key, updated, "record updated");
        Ok(updated)
    }

    /// Creates new records, updates persisted ones.
    pub async fn save(&self, record: &mut Record) -> Result<RecordKey> {
        match record.key() {
            None => self.create(record).await,
            Some(key) => {
                if !self.update(record).await? {
                    return Err(DbError::ExecutionError(format!(
                        "record {} of '{}' no longer exists",
                        key,
                        self.model.table()
                    )));
                }
                Ok(key)
            }
        }
    }

    /// Writes only the named attributes, plus the whole persisted cache.
    ///
    /// Naming one shadow field is enough to persist all of them; virtual
    /// names are covered by the cache and skipped.
    pub async fn save_attributes(&self, record: &mut Record, names: &[&str]) -> Result<bool> {
        let key = self.require_key(record)?;
        let persisted = record.recompute_all();

        let mut outgoing = AttributeMap::new();
        for name in names {
            if self.model.has(name) || self.model.is_persisted_field(name) {
                continue;
            }
            let value = record.attributes().get(*name).cloned().ok_or_else(|| {
                DbError::InvalidArgument(format!("'{}' is not an attribute of the record", name))
            })?;
            outgoing.insert(name.to_string(), value);
        }
        outgoing.extend(persisted);

        self.store
            .update_by_key(self.model.table(), key, outgoing)
            .await
    }

    /// Updates every row matching `criteria` without recomputing.
    ///
    /// Rejected unless a `before_bulk_update` hook lets it through; afterwards
    /// the `after_bulk_update` hook runs, by default one sweep over
    /// `criteria`.
    pub async fn update_all(&self, attributes: AttributeMap, criteria: &Criteria) -> Result<usize> {
        let span = info_span!(
            "virtuals.bulk_update",
            table = %self.model.table(),
            criteria = %criteria
        );

        async move {
            self.model.hooks().check_bulk_update(criteria)?;

            let affected = self
                .store
                .update_all(self.model.table(), attributes, criteria)
                .await?;
            event!(Level::INFO, affected, "bulk update applied");

            match &self.model.hooks().after_bulk_update {
                AfterBulkUpdate::Resync => {
                    let report = self.resync(Some(criteria)).await?;
                    event!(Level::DEBUG, saved = report.saved, "bulk update resynced");
                }
                AfterBulkUpdate::Skip => {
                    event!(Level::WARN, "bulk update left virtual caches unsynchronized");
                }
                AfterBulkUpdate::Custom(hook) => hook(criteria)?,
            }
            Ok(affected)
        }
        .instrument(span)
        .await
    }

    /// Multi-key update; gated and resynced like [`update_all`](Self::update_all).
    pub async fn update_by_keys(&self, keys: &[RecordKey], attributes: AttributeMap) -> Result<usize> {
        self.update_all(attributes, &Criteria::keys(keys.to_vec()))
            .await
    }

    pub async fn find(&self, key: RecordKey) -> Result<Option<Record>> {
        Ok(self
            .store
            .find_by_key(self.model.table(), key)
            .await?
            .map(|stored| Record::from_stored(&self.model, stored)))
    }

    pub async fn find_all(&self, criteria: &Criteria) -> Result<Vec<Record>> {
        let rows = self.store.find_all(self.model.table(), criteria).await?;
        Ok(rows
            .into_iter()
            .map(|stored| Record::from_stored(&self.model, stored))
            .collect())
    }

    pub async fn delete(&self, record: &Record) -> Result<bool> {
        let key = self.require_key(record)?;
        self.store.delete_by_key(self.model.table(), key).await
    }

    /// Empty search scope over this repository's model and dialect.
    pub fn search(&self) -> VirtualSearch {
        VirtualSearch::new(Arc::clone(&self.model), self.dialect.clone())
    }

    pub fn sweeper(&self) -> Sweeper<'_> {
        Sweeper::new(self)
    }

    pub async fn resync(&self, filter: Option<&Criteria>) -> Result<SweepReport> {
        self.sweeper().resync(filter).await
    }

    fn require_key(&self, record: &Record) -> Result<RecordKey> {
        record.key().ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "record of '{}' has not been persisted yet",
                self.model.table()
            ))
        })
    }
}
