use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result};

/// How computed values are persisted for search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// All values packed into one text field: `,name1:value1,name2:value2,`
    #[default]
    Packed,
    /// One prefixed shadow field per virtual attribute.
    Shadowed,
}

/// Virtual attribute configuration of one record type
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    /// Persistence strategy for the search cache
    pub strategy: CacheStrategy,

    /// Prefix joined to the capitalized attribute name to form the compute
    /// method name. Empty means the method is named like the attribute.
    pub compute_prefix: String,

    /// Prefix of shadow fields (`Shadowed` only)
    pub shadow_prefix: String,

    /// Name of the packed field (`Packed` only)
    pub cache_field: String,

    /// Separator between packed entries
    pub column_separator: char,

    /// Separator between a packed name and its value
    pub value_separator: char,

    /// Rows per batch read during a resync sweep
    pub sweep_batch_size: usize,

    /// Whether new records start in writable mode
    pub writable: bool,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::Packed,
            compute_prefix: "virtual".to_string(),
            shadow_prefix: "_".to_string(),
            cache_field: "virtual_cache".to_string(),
            column_separator: ',',
            value_separator: ':',
            sweep_batch_size: 100,
            writable: false,
        }
    }
}

impl VirtualConfig {
    pub fn new(strategy: CacheStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn packed() -> Self {
        Self::new(CacheStrategy::Packed)
    }

    pub fn shadowed() -> Self {
        Self::new(CacheStrategy::Shadowed)
    }

    /// Set the compute method prefix
    pub fn compute_prefix(mut self, prefix: &str) -> Self {
        self.compute_prefix = prefix.to_string();
        self
    }

    /// Set the shadow field prefix
    pub fn shadow_prefix(mut self, prefix: &str) -> Self {
        self.shadow_prefix = prefix.to_string();
        self
    }

    /// Set the packed field name
    pub fn cache_field(mut self, field: &str) -> Self {
        self.cache_field = field.to_string();
        self
    }

    /// Set both packed separators
    pub fn separators(mut self, column: char, value: char) -> Self {
        self.column_separator = column;
        self.value_separator = value;
        self
    }

    /// Set the sweep batch size
    pub fn sweep_batch_size(mut self, size: usize) -> Self {
        self.sweep_batch_size = size;
        self
    }

    /// Start new records in writable mode
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Parse from a JSON document
    ///
    /// # Examples
    ///
    /// ```
    /// use memovirt::{CacheStrategy, VirtualConfig};
    ///
    /// let config = VirtualConfig::from_json(r#"{ "strategy": "shadowed", "shadow_prefix": "s_" }"#).unwrap();
    /// assert_eq!(config.strategy, CacheStrategy::Shadowed);
    /// assert_eq!(config.sweep_batch_size, 100);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbError::Configuration(format!("Invalid virtual config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.column_separator == self.value_separator {
            return Err(DbError::Configuration(format!(
                "Packed separators must differ, both are '{}'",
                self.column_separator
            )));
        }
        for sep in [self.column_separator, self.value_separator] {
            if matches!(sep, '\\' | '\'') {
                return Err(DbError::Configuration(format!(
                    "Packed separator '{}' would need escaping in SQL literals",
                    sep
                )));
            }
        }
        if self.sweep_batch_size == 0 {
            return Err(DbError::Configuration(
                "Sweep batch size must be positive".into(),
            ));
        }
        match self.strategy {
            CacheStrategy::Packed if !is_identifier(&self.cache_field) => {
                Err(DbError::Configuration(format!(
                    "Cache field '{}' is not a plain identifier",
                    self.cache_field
                )))
            }
            CacheStrategy::Shadowed if self.shadow_prefix.is_empty() => Err(
                DbError::Configuration("Shadow prefix must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the only names rendered into generated SQL.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
