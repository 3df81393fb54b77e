use std::fmt;
use std::sync::Arc;

use crate::core::{AttributeMap, DbError, Result, Value};
use crate::query::Criteria;

pub type BeforeGetFn = Arc<dyn Fn(&str, &AttributeMap) + Send + Sync>;
pub type WriteRejectedFn = Arc<dyn Fn(&str, &Value) -> Result<()> + Send + Sync>;
pub type BulkUpdateFn = Arc<dyn Fn(&Criteria) -> Result<()> + Send + Sync>;

/// What runs after an accepted bulk or multi-key update.
#[derive(Clone, Default)]
pub enum AfterBulkUpdate {
    /// One consistency sweep scoped to the update criteria
    #[default]
    Resync,
    /// Leave the cache as the bulk write left it
    Skip,
    Custom(BulkUpdateFn),
}

impl fmt::Debug for AfterBulkUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resync => write!(f, "Resync"),
            Self::Skip => write!(f, "Skip"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Replaceable extension points of a virtual model.
///
/// Defaults reject: read-only writes fail with
/// [`DbError::ReadOnlyWriteRejected`] and bulk updates fail with
/// [`DbError::BulkMutationRejected`] until a `before_bulk_update` handler is
/// installed that lets them through.
#[derive(Clone, Default)]
pub struct VirtualHooks {
    pub before_get: Option<BeforeGetFn>,
    pub on_write_rejected: Option<WriteRejectedFn>,
    pub before_bulk_update: Option<BulkUpdateFn>,
    pub after_bulk_update: AfterBulkUpdate,
}

impl VirtualHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the attribute name and the record's attributes before a
    /// read-only recompute.
    pub fn before_get<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &AttributeMap) + Send + Sync + 'static,
    {
        self.before_get = Some(Arc::new(hook));
        self
    }

    /// Replaces the read-only write rejection. Returning `Ok` ignores the
    /// write silently.
    pub fn on_write_rejected<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.on_write_rejected = Some(Arc::new(hook));
        self
    }

    pub fn before_bulk_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Criteria) -> Result<()> + Send + Sync + 'static,
    {
        self.before_bulk_update = Some(Arc::new(hook));
        self
    }

    /// Shorthand for a `before_bulk_update` handler accepting everything.
    pub fn allow_bulk_update(self) -> Self {
        self.before_bulk_update(|_| Ok(()))
    }

    pub fn after_bulk_update(mut self, after: AfterBulkUpdate) -> Self {
        self.after_bulk_update = after;
        self
    }

    pub(crate) fn notify_before_get(&self, name: &str, attributes: &AttributeMap) {
        if let Some(hook) = &self.before_get {
            hook(name, attributes);
        }
    }

    pub(crate) fn reject_write(&self, name: &str, value: &Value) -> Result<()> {
        match &self.on_write_rejected {
            Some(hook) => hook(name, value),
            None => Err(DbError::ReadOnlyWriteRejected {
                attribute: name.to_string(),
            }),
        }
    }

    pub(crate) fn check_bulk_update(&self, criteria: &Criteria) -> Result<()> {
        match &self.before_bulk_update {
            Some(hook) => hook(criteria),
            None => Err(DbError::BulkMutationRejected(format!(
                "bulk update {} would leave virtual caches stale; install a before_bulk_update handler to allow it",
                criteria
            ))),
        }
    }
}

impl fmt::Debug for VirtualHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualHooks")
            .field("before_get", &self.before_get.is_some())
            .field("on_write_rejected", &self.on_write_rejected.is_some())
            .field("before_bulk_update", &self.before_bulk_update.is_some())
            .field("after_bulk_update", &self.after_bulk_update)
            .finish()
    }
}
