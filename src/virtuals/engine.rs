use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use super::model::VirtualModel;
use crate::config::CacheStrategy;
use crate::core::{AttributeMap, Result, Value};

/// Per-record access mode of virtual attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Reads recompute, writes are rejected
    #[default]
    ReadOnly,
    /// Reads return the stored value, writes are stored verbatim
    Writable,
}

/// Last computed or assigned value of every declared attribute, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VirtualValues {
    entries: Vec<(String, Value)>,
}

impl VirtualValues {
    fn for_model(model: &VirtualModel) -> Self {
        Self {
            entries: model
                .names()
                .map(|name| (name.to_string(), Value::Null))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set_at(&mut self, idx: usize, value: Value) {
        self.entries[idx].1 = value;
    }
}

/// Computed-value store and read/write interception of one record.
///
/// Names the model does not declare pass straight through to the record's
/// attribute map.
#[derive(Debug, Clone)]
pub struct AttributeEngine {
    model: Arc<VirtualModel>,
    values: VirtualValues,
    assigned: Vec<bool>,
    mode: Mode,
}

impl AttributeEngine {
    pub fn new(model: Arc<VirtualModel>) -> Self {
        let mode = if model.config().writable {
            Mode::Writable
        } else {
            Mode::ReadOnly
        };
        let values = VirtualValues::for_model(&model);
        let assigned = vec![false; values.len()];
        Self {
            model,
            values,
            assigned,
            mode,
        }
    }

    pub fn model(&self) -> &Arc<VirtualModel> {
        &self.model
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switching back to read-only forgets explicit assignments.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::ReadOnly {
            self.assigned.iter_mut().for_each(|flag| *flag = false);
        }
        self.mode = mode;
    }

    pub fn has(&self, name: &str) -> bool {
        self.model.has(name)
    }

    pub fn values(&self) -> &VirtualValues {
        &self.values
    }

    /// Stored value without recomputation
    pub fn stored(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn read(&mut self, name: &str, attributes: &AttributeMap) -> Value {
        let Some(idx) = self.model.position(name) else {
            return attributes.get(name).cloned().unwrap_or_default();
        };

        match self.mode {
            Mode::Writable => self.values.entries[idx].1.clone(),
            Mode::ReadOnly => {
                self.model.hooks().notify_before_get(name, attributes);
                let value = self.model.attributes()[idx].compute(attributes);
                self.values.set_at(idx, value.clone());
                value
            }
        }
    }

    pub fn write(&mut self, name: &str, value: Value, attributes: &mut AttributeMap) -> Result<()> {
        let Some(idx) = self.model.position(name) else {
            attributes.insert(name.to_string(), value);
            return Ok(());
        };

        match self.mode {
            Mode::ReadOnly => self.model.hooks().reject_write(name, &value),
            Mode::Writable => {
                self.values.set_at(idx, value);
                self.assigned[idx] = true;
                Ok(())
            }
        }
    }

    /// Computes every declared attribute and writes the persisted form into
    /// `attributes`. Returns just the persisted fields.
    ///
    /// The persisted form always carries the fresh computation. In writable
    /// mode explicitly assigned in-memory values are kept; everything else is
    /// refreshed.
    pub fn recompute_all(&mut self, attributes: &mut AttributeMap) -> AttributeMap {
        let fresh: Vec<Value> = self
            .model
            .attributes()
            .iter()
            .map(|attr| attr.compute(attributes))
            .collect();

        for (idx, value) in fresh.iter().enumerate() {
            if self.mode == Mode::ReadOnly || !self.assigned[idx] {
                self.values.set_at(idx, value.clone());
            }
        }

        let mut persisted = AttributeMap::new();
        match self.model.strategy() {
            CacheStrategy::Packed => {
                let codec = self.model.codec();
                let packed = codec.encode(
                    self.model
                        .attributes()
                        .iter()
                        .zip(fresh.iter())
                        .map(|(attr, value)| (attr.name.as_str(), value)),
                );
                persisted.insert(codec.field().to_string(), Value::Text(packed));
            }
            CacheStrategy::Shadowed => {
                for (attr, value) in self.model.attributes().iter().zip(fresh) {
                    persisted.insert(attr.persisted_name.clone(), value);
                }
            }
        }

        event!(
            Level::DEBUG,
            table = %self.model.table(),
            fields = persisted.len(),
            "virtual attributes recomputed"
        );
        attributes.extend(persisted.clone());
        persisted
    }

    /// Seeds the store from a loaded record's persisted cache. Packed entries
    /// come back as text; an empty entry is `Null`.
    pub fn seed_from_persisted(&mut self, attributes: &AttributeMap) {
        match self.model.strategy() {
            CacheStrategy::Packed => {
                let codec = self.model.codec();
                let Some(Value::Text(packed)) = attributes.get(codec.field()) else {
                    return;
                };
                for (name, text) in codec.decode(packed) {
                    if let Some(idx) = self.model.position(&name) {
                        let value = if text.is_empty() {
                            Value::Null
                        } else {
                            Value::Text(text)
                        };
                        self.values.set_at(idx, value);
                    }
                }
            }
            CacheStrategy::Shadowed => {
                for (idx, attr) in self.model.attributes().iter().enumerate() {
                    if let Some(value) = attributes.get(&attr.persisted_name) {
                        self.values.set_at(idx, value.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::VirtualConfig;
    use crate::core::DbError;
    use crate::virtuals::VirtualHooks;

    fn full_name(attrs: &AttributeMap) -> Value {
        match (attrs.get("first"), attrs.get("last")) {
            (Some(Value::Text(first)), Some(Value::Text(last))) => {
                Value::Text(format!("{} {}", first, last))
            }
            _ => Value::Null,
        }
    }

    fn model(config: VirtualConfig) -> Arc<VirtualModel> {
        VirtualModel::builder("people", config)
            .attribute_with("fullName", full_name)
            .build()
            .unwrap()
    }

    fn ann_lee() -> AttributeMap {
        let mut attrs = AttributeMap::new();
        attrs.insert("first".into(), "Ann".into());
        attrs.insert("last".into(), "Lee".into());
        attrs
    }

    #[test]
    fn test_starts_all_null() {
        let engine = AttributeEngine::new(model(VirtualConfig::packed()));
        assert_eq!(engine.stored("fullName"), Some(&Value::Null));
        assert_eq!(engine.mode(), Mode::ReadOnly);
    }

    #[test]
    fn test_read_only_read_recomputes() {
        let mut engine = AttributeEngine::new(model(VirtualConfig::packed()));
        let mut attrs = ann_lee();
        assert_eq!(engine.read("fullName", &attrs), Value::from("Ann Lee"));

        attrs.insert("last".into(), "Li".into());
        assert_eq!(engine.read("fullName", &attrs), Value::from("Ann Li"));
        assert_eq!(engine.stored("fullName"), Some(&Value::from("Ann Li")));
    }

    #[test]
    fn test_read_only_write_rejected_and_unchanged() {
        let mut engine = AttributeEngine::new(model(VirtualConfig::packed()));
        let mut attrs = ann_lee();
        engine.read("fullName", &attrs);

        let err = engine
            .write("fullName", "X".into(), &mut attrs)
            .unwrap_err();
        assert!(matches!(err, DbError::ReadOnlyWriteRejected { .. }));
        assert_eq!(engine.stored("fullName"), Some(&Value::from("Ann Lee")));
    }

    #[test]
    fn test_writable_round_trip() {
        let mut engine = AttributeEngine::new(model(VirtualConfig::packed().writable(true)));
        let mut attrs = ann_lee();
        engine.write("fullName", "X".into(), &mut attrs).unwrap();
        assert_eq!(engine.read("fullName", &attrs), Value::from("X"));
    }

    #[test]
    fn test_undeclared_names_pass_through() {
        let mut engine = AttributeEngine::new(model(VirtualConfig::packed()));
        let mut attrs = ann_lee();
        engine.write("nick", "A".into(), &mut attrs).unwrap();
        assert_eq!(attrs["nick"], Value::from("A"));
        assert_eq!(engine.read("nick", &attrs), Value::from("A"));
        assert_eq!(engine.read("missing", &attrs), Value::Null);
    }

    #[test]
    fn test_recompute_packed_keeps_assignment_in_memory() {
        let mut engine = AttributeEngine::new(model(VirtualConfig::packed().writable(true)));
        let mut attrs = ann_lee();
        engine.write("fullName", "X".into(), &mut attrs).unwrap();

        let persisted = engine.recompute_all(&mut attrs);
        assert_eq!(persisted["virtual_cache"], Value::from(",fullName:Ann Lee,"));
        assert_eq!(attrs["virtual_cache"], Value::from(",fullName:Ann Lee,"));
        assert_eq!(engine.read("fullName", &attrs), Value::from("X"));
    }

    #[test]
    fn test_recompute_shadowed_refreshes_every_field() {
        let mut engine = AttributeEngine::new(model(VirtualConfig::shadowed()));
        let mut attrs = ann_lee();
        attrs.insert("_fullName".into(), "stale".into());

        let persisted = engine.recompute_all(&mut attrs);
        assert_eq!(persisted.len(), 1);
        assert_eq!(attrs["_fullName"], Value::from("Ann Lee"));
        assert_eq!(engine.stored("fullName"), Some(&Value::from("Ann Lee")));
    }

    #[test]
    fn test_seed_from_persisted() {
        let mut packed = AttributeEngine::new(model(VirtualConfig::packed().writable(true)));
        let mut attrs = ann_lee();
        attrs.insert("virtual_cache".into(), ",fullName:Old Name,".into());
        packed.seed_from_persisted(&attrs);
        assert_eq!(packed.read("fullName", &attrs), Value::from("Old Name"));

        let mut shadowed = AttributeEngine::new(model(VirtualConfig::shadowed().writable(true)));
        attrs.insert("_fullName".into(), "Shadow".into());
        shadowed.seed_from_persisted(&attrs);
        assert_eq!(shadowed.read("fullName", &attrs), Value::from("Shadow"));
    }

    #[test]
    fn test_before_get_hook_runs_on_read_only_reads() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let model = VirtualModel::builder("people", VirtualConfig::packed())
            .attribute_with("fullName", full_name)
            .hooks(VirtualHooks::new().before_get(move |name, _| {
                sink.lock().unwrap().push(name.to_string());
            }))
            .build()
            .unwrap();

        let mut engine = AttributeEngine::new(model);
        let attrs = ann_lee();
        engine.read("fullName", &attrs);
        engine.read("first", &attrs);
        engine.set_mode(Mode::Writable);
        engine.read("fullName", &attrs);

        assert_eq!(*seen.lock().unwrap(), vec!["fullName".to_string()]);
    }
}
