use crate::config::{CacheStrategy, VirtualConfig};

/// Maps virtual attribute names to compute method names and to their
/// persisted representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMapper {
    strategy: CacheStrategy,
    compute_prefix: String,
    shadow_prefix: String,
}

impl NameMapper {
    pub fn new(config: &VirtualConfig) -> Self {
        Self {
            strategy: config.strategy,
            compute_prefix: config.compute_prefix.clone(),
            shadow_prefix: config.shadow_prefix.clone(),
        }
    }

    /// `fullName` with prefix `virtual` becomes `virtualFullName`.
    pub fn compute_method_name(&self, name: &str) -> String {
        if self.compute_prefix.is_empty() {
            return name.to_string();
        }

        let mut chars = name.chars();
        let mut method = self.compute_prefix.clone();
        if let Some(first) = chars.next() {
            method.extend(first.to_uppercase());
            method.push_str(chars.as_str());
        }
        method
    }

    /// Shadow field name for `Shadowed`, the packed entry key for `Packed`.
    pub fn to_persisted_name(&self, name: &str) -> String {
        match self.strategy {
            CacheStrategy::Packed => name.to_string(),
            CacheStrategy::Shadowed => format!("{}{}", self.shadow_prefix, name),
        }
    }

    /// Inverse of [`to_persisted_name`](Self::to_persisted_name). `None` when
    /// the shadow prefix is not a leading substring.
    pub fn to_virtual_name(&self, persisted: &str) -> Option<String> {
        match self.strategy {
            CacheStrategy::Packed => Some(persisted.to_string()),
            CacheStrategy::Shadowed => persisted
                .strip_prefix(self.shadow_prefix.as_str())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_method_name() {
        let mapper = NameMapper::new(&VirtualConfig::default());
        assert_eq!(mapper.compute_method_name("fullName"), "virtualFullName");
        assert_eq!(mapper.compute_method_name("age_bracket"), "virtualAge_bracket");

        let bare = NameMapper::new(&VirtualConfig::default().compute_prefix(""));
        assert_eq!(bare.compute_method_name("fullName"), "fullName");
    }

    #[test]
    fn test_shadow_names() {
        let mapper = NameMapper::new(&VirtualConfig::shadowed());
        assert_eq!(mapper.to_persisted_name("fullName"), "_fullName");
        assert_eq!(mapper.to_virtual_name("_fullName").as_deref(), Some("fullName"));
        assert_eq!(mapper.to_virtual_name("fullName"), None);
        assert_eq!(mapper.to_virtual_name("_"), None);
    }

    #[test]
    fn test_custom_shadow_prefix() {
        let mapper = NameMapper::new(&VirtualConfig::shadowed().shadow_prefix("v_"));
        assert_eq!(mapper.to_persisted_name("rank"), "v_rank");
        assert_eq!(mapper.to_virtual_name("v_rank").as_deref(), Some("rank"));
        assert_eq!(mapper.to_virtual_name("_rank"), None);
    }

    #[test]
    fn test_packed_key_is_name() {
        let mapper = NameMapper::new(&VirtualConfig::packed());
        assert_eq!(mapper.to_persisted_name("fullName"), "fullName");
        assert_eq!(mapper.to_virtual_name("fullName").as_deref(), Some("fullName"));
    }
}
