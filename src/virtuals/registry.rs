use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{AttributeMap, Value};

/// Pure function deriving one virtual value from a record's own attributes.
/// `Value::Null` means "not computable".
pub type ComputeFn = Arc<dyn Fn(&AttributeMap) -> Value + Send + Sync>;

/// Compute functions keyed by compute method name.
#[derive(Clone, Default)]
pub struct ComputeRegistry {
    functions: HashMap<String, ComputeFn>,
}

impl ComputeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` under `method`, replacing any earlier entry.
    pub fn register<F>(&mut self, method: impl Into<String>, function: F)
    where
        F: Fn(&AttributeMap) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(method.into(), Arc::new(function));
    }

    pub fn get(&self, method: &str) -> Option<ComputeFn> {
        self.functions.get(method).cloned()
    }
}

impl fmt::Debug for ComputeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.functions.keys().collect();
        methods.sort();
        f.debug_struct("ComputeRegistry")
            .field("methods", &methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_call() {
        let mut registry = ComputeRegistry::new();
        registry.register("virtualUpper", |attrs: &AttributeMap| {
            attrs
                .get("name")
                .and_then(Value::as_str)
                .map(|s| Value::Text(s.to_uppercase()))
                .unwrap_or(Value::Null)
        });

        let mut attrs = AttributeMap::new();
        attrs.insert("name".into(), "ann".into());

        let compute = registry.get("virtualUpper").unwrap();
        assert_eq!(compute(&attrs), Value::from("ANN"));
        assert!(registry.get("virtualLower").is_none());

        registry.register("virtualUpper", |_: &AttributeMap| Value::from("replaced"));
        assert_eq!(registry.get("virtualUpper").unwrap()(&attrs), Value::from("replaced"));
    }
}
