use serde::Serialize;
use tracing::{Instrument, Level, event, info_span};

use super::lifecycle::Repository;
use super::record::Record;
use crate::config::CacheStrategy;
use crate::core::{Result, Value};
use crate::query::Criteria;
use crate::storage::StoredRecord;

/// Outcome of one resync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Rows matching the filter when the sweep started
    pub matched: usize,
    /// Batch reads issued
    pub batches: usize,
    /// Cache-only saves performed
    pub saved: usize,
    /// Rows whose persisted cache actually differed
    pub changed: usize,
}

/// Re-derives and re-persists the search cache of many records.
///
/// One store round-trip per record: meant for maintenance after a compute
/// rule changes or an attribute is added. Batches are processed in key order
/// and sequentially. A failure stops the sweep; rows saved before it stay
/// saved, and running again is safe.
pub struct Sweeper<'a> {
    repository: &'a Repository,
    batch_size: usize,
}

impl<'a> Sweeper<'a> {
    pub fn new(repository: &'a Repository) -> Self {
        Self {
            repository,
            batch_size: repository.model().config().sweep_batch_size,
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub async fn resync(&self, filter: Option<&Criteria>) -> Result<SweepReport> {
        let model = self.repository.model();
        let span = info_span!(
            "virtuals.sweep",
            table = %model.table(),
            strategy = ?model.strategy(),
            batch_size = self.batch_size
        );

        async move {
            if model.strategy() == CacheStrategy::Packed {
                self.ensure_cache_column().await?;
            }

            let store = self.repository.store();
            let table = model.table();
            let criteria = filter.cloned().unwrap_or_default();

            let matched = store.count(table, &criteria).await?;
            let mut report = SweepReport {
                matched,
                ..SweepReport::default()
            };

            let mut after = None;
            for _ in 0..matched.div_ceil(self.batch_size) {
                let batch = store
                    .fetch_batch(table, &criteria, after, self.batch_size)
                    .await?;
                report.batches += 1;
                let Some(last) = batch.last() else {
                    break;
                };
                after = Some(last.key);

                for stored in batch {
                    let (saved, changed) = self.save_cache(stored).await?;
                    report.saved += usize::from(saved);
                    report.changed += usize::from(changed);
                }
                event!(
                    Level::DEBUG,
                    batch = report.batches,
                    saved = report.saved,
                    "sweep batch persisted"
                );
            }

            event!(
                Level::INFO,
                matched = report.matched,
                saved = report.saved,
                changed = report.changed,
                "sweep finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn ensure_cache_column(&self) -> Result<()> {
        let store = self.repository.store();
        let model = self.repository.model();
        let field = model.codec().field();

        if !store.has_column(model.table(), field).await? {
            store.add_text_column(model.table(), field).await?;
            store.refresh_schema(model.table()).await?;
            event!(Level::INFO, column = %field, "packed cache column created");
        }
        Ok(())
    }

    /// Cache-only save of one row. Returns (saved, changed).
    async fn save_cache(&self, stored: StoredRecord) -> Result<(bool, bool)> {
        let model = self.repository.model();
        let fields = model.persisted_fields();
        let before: Vec<Value> = fields
            .iter()
            .map(|field| stored.attributes.get(field).cloned().unwrap_or_default())
            .collect();

        let key = stored.key;
        let mut record = Record::from_stored(model, stored);
        let saved = match model.strategy() {
            CacheStrategy::Packed => {
                let persisted = record.recompute_all();
                self.repository
                    .store()
                    .update_by_key(model.table(), key, persisted)
                    .await?
            }
            CacheStrategy::Shadowed => {
                let first: Vec<&str> = fields.first().map(String::as_str).into_iter().collect();
                self.repository.save_attributes(&mut record, &first).await?
            }
        };

        let changed = fields
            .iter()
            .zip(before)
            .any(|(field, old)| record.attributes().get(field).cloned().unwrap_or_default() != old);
        Ok((saved, changed))
    }
}
