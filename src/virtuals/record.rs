use std::sync::Arc;

use super::engine::{AttributeEngine, Mode};
use super::model::VirtualModel;
use crate::core::{AttributeMap, RecordKey, Result, Value};
use crate::storage::StoredRecord;

/// Attribute gateway of a record with virtual attributes.
pub trait AttributeAccess {
    fn is_virtual(&self, name: &str) -> bool;

    /// Virtual names go through the engine, everything else reads the
    /// record's attributes (`Null` when absent).
    fn get(&mut self, name: &str) -> Value;

    fn set(&mut self, name: &str, value: Value) -> Result<()>;
}

/// A record of a virtual model: plain attributes plus its attribute engine.
#[derive(Debug, Clone)]
pub struct Record {
    key: Option<RecordKey>,
    attributes: AttributeMap,
    engine: AttributeEngine,
}

impl Record {
    pub fn new(model: &Arc<VirtualModel>) -> Self {
        Self::from_attributes(model, AttributeMap::new())
    }

    /// A new, unsaved record. Virtual names in `attributes` are not applied.
    pub fn from_attributes(model: &Arc<VirtualModel>, attributes: AttributeMap) -> Self {
        Self {
            key: None,
            attributes,
            engine: AttributeEngine::new(Arc::clone(model)),
        }
    }

    pub(crate) fn from_stored(model: &Arc<VirtualModel>, stored: StoredRecord) -> Self {
        let mut engine = AttributeEngine::new(Arc::clone(model));
        engine.seed_from_persisted(&stored.attributes);
        Self {
            key: Some(stored.key),
            attributes: stored.attributes,
            engine,
        }
    }

    /// Sets a plain attribute directly, bypassing the engine.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn key(&self) -> Option<RecordKey> {
        self.key
    }

    pub(crate) fn set_key(&mut self, key: RecordKey) {
        self.key = Some(key);
    }

    pub fn is_new(&self) -> bool {
        self.key.is_none()
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn engine(&self) -> &AttributeEngine {
        &self.engine
    }

    pub fn mode(&self) -> Mode {
        self.engine.mode()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.engine.set_mode(mode);
    }

    /// Recomputes all virtual attributes for a write and returns the
    /// persisted fields; the record's attributes carry them afterwards.
    pub(crate) fn recompute_all(&mut self) -> AttributeMap {
        self.engine.recompute_all(&mut self.attributes)
    }
}

impl AttributeAccess for Record {
    fn is_virtual(&self, name: &str) -> bool {
        self.engine.has(name)
    }

    fn get(&mut self, name: &str) -> Value {
        self.engine.read(name, &self.attributes)
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        self.engine.write(name, value, &mut self.attributes)
    }
}
