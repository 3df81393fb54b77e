use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::codec::CacheCodec;
use super::hooks::VirtualHooks;
use super::naming::NameMapper;
use super::registry::{ComputeFn, ComputeRegistry};
use crate::config::{CacheStrategy, VirtualConfig, is_identifier};
use crate::core::{AttributeMap, DbError, Result, Value};

/// One declared virtual attribute with its resolved names and compute function.
#[derive(Clone)]
pub struct VirtualAttribute {
    pub name: String,
    pub method_name: String,
    pub persisted_name: String,
    compute: ComputeFn,
}

impl VirtualAttribute {
    pub fn compute(&self, attributes: &AttributeMap) -> Value {
        (self.compute)(attributes)
    }
}

impl fmt::Debug for VirtualAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualAttribute")
            .field("name", &self.name)
            .field("method_name", &self.method_name)
            .field("persisted_name", &self.persisted_name)
            .finish()
    }
}

/// Validated virtual attribute declaration of one record type.
///
/// Built once per type through [`VirtualModel::builder`] and shared by every
/// record of that type. Building resolves every declared name to a compute
/// function, so instances never look anything up by name at runtime.
#[derive(Debug)]
pub struct VirtualModel {
    table: String,
    config: VirtualConfig,
    mapper: NameMapper,
    codec: CacheCodec,
    attributes: Vec<VirtualAttribute>,
    hooks: VirtualHooks,
}

impl VirtualModel {
    pub fn builder(table: impl Into<String>, config: VirtualConfig) -> VirtualModelBuilder {
        VirtualModelBuilder {
            table: table.into(),
            config,
            names: Vec::new(),
            registry: ComputeRegistry::new(),
            hooks: VirtualHooks::default(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn config(&self) -> &VirtualConfig {
        &self.config
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.config.strategy
    }

    pub fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    pub fn codec(&self) -> &CacheCodec {
        &self.codec
    }

    pub fn hooks(&self) -> &VirtualHooks {
        &self.hooks
    }

    /// Declared attributes in declaration order
    pub fn attributes(&self) -> &[VirtualAttribute] {
        &self.attributes
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|attr| attr.name.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&VirtualAttribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Finds an attribute by virtual name, or for `Shadowed` by its shadow
    /// field alias.
    pub fn resolve(&self, name: &str) -> Option<&VirtualAttribute> {
        self.attribute(name).or_else(|| match self.strategy() {
            CacheStrategy::Shadowed => self
                .mapper
                .to_virtual_name(name)
                .and_then(|virtual_name| self.attribute(&virtual_name)),
            CacheStrategy::Packed => None,
        })
    }

    /// Store fields holding the search cache: the packed field, or one shadow
    /// field per attribute.
    pub fn persisted_fields(&self) -> Vec<String> {
        match self.strategy() {
            CacheStrategy::Packed => vec![self.codec.field().to_string()],
            CacheStrategy::Shadowed => self
                .attributes
                .iter()
                .map(|attr| attr.persisted_name.clone())
                .collect(),
        }
    }

    pub fn is_persisted_field(&self, field: &str) -> bool {
        match self.strategy() {
            CacheStrategy::Packed => field == self.codec.field(),
            CacheStrategy::Shadowed => self.attributes.iter().any(|attr| attr.persisted_name == field),
        }
    }
}

pub struct VirtualModelBuilder {
    table: String,
    config: VirtualConfig,
    names: Vec<String>,
    registry: ComputeRegistry,
    hooks: VirtualHooks,
}

impl VirtualModelBuilder {
    /// Declares a virtual attribute. Its compute function is registered
    /// separately under the mapped method name.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Registers a compute function under an explicit method name, e.g.
    /// `virtualFullName`.
    pub fn compute<F>(mut self, method: impl Into<String>, function: F) -> Self
    where
        F: Fn(&AttributeMap) -> Value + Send + Sync + 'static,
    {
        self.registry.register(method, function);
        self
    }

    /// Declares an attribute and registers its compute function in one step.
    pub fn attribute_with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&AttributeMap) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let method = NameMapper::new(&self.config).compute_method_name(&name);
        self.registry.register(method, function);
        self.names.push(name);
        self
    }

    pub fn hooks(mut self, hooks: VirtualHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<Arc<VirtualModel>> {
        self.config.validate()?;
        if !is_identifier(&self.table) {
            return Err(DbError::Configuration(format!(
                "Table name '{}' is not a plain identifier",
                self.table
            )));
        }

        let mapper = NameMapper::new(&self.config);
        let empty = AttributeMap::new();
        let mut seen = HashSet::new();
        let mut attributes = Vec::with_capacity(self.names.len());

        for name in &self.names {
            if !is_identifier(name) {
                return Err(DbError::Configuration(format!(
                    "Virtual attribute name '{}' is not a plain identifier",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(DbError::Configuration(format!(
                    "Virtual attribute '{}' declared twice",
                    name
                )));
            }

            let method_name = mapper.compute_method_name(name);
            let compute = self.registry.get(&method_name).ok_or_else(|| {
                DbError::Configuration(format!(
                    "No compute function '{}' registered for virtual attribute '{}' of '{}'",
                    method_name, name, self.table
                ))
            })?;
            // initialization call; whatever it returns is accepted
            let _ = compute(&empty);

            let persisted_name = mapper.to_persisted_name(name);
            if self.config.strategy == CacheStrategy::Shadowed && !is_identifier(&persisted_name) {
                return Err(DbError::Configuration(format!(
                    "Shadow field '{}' is not a plain identifier",
                    persisted_name
                )));
            }

            attributes.push(VirtualAttribute {
                name: name.clone(),
                method_name,
                persisted_name,
                compute,
            });
        }

        let codec = CacheCodec::new(&self.config, self.names.clone());
        debug!(
            table = %self.table,
            strategy = ?self.config.strategy,
            attributes = attributes.len(),
            "virtual model built"
        );

        Ok(Arc::new(VirtualModel {
            table: self.table,
            config: self.config,
            mapper,
            codec,
            attributes,
            hooks: self.hooks,
        }))
    }
}
