//! Relation engine configuration

use heck::ToUpperCamelCase;

/// Environment variable overriding [`RelationConfig::pivot_prefix`]
pub const PIVOT_PREFIX_ENV: &str = "ELIF_RELATIONS_PIVOT_PREFIX";

/// Environment variable overriding [`RelationConfig::pivot_attribute`]
pub const PIVOT_ATTRIBUTE_ENV: &str = "ELIF_RELATIONS_PIVOT_ATTRIBUTE";

/// Rule used to derive a model name from a discriminator value that has no
/// registered alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphFallback {
    /// `blog_post` resolves to `BlogPost`
    #[default]
    UpperCamel,
    /// The stored value is used as the model name unchanged
    Verbatim,
}

impl MorphFallback {
    /// Derive a model name from a stored discriminator value
    pub fn derive(self, discriminator: &str) -> String {
        match self {
            MorphFallback::UpperCamel => discriminator.to_upper_camel_case(),
            MorphFallback::Verbatim => discriminator.to_string(),
        }
    }
}

/// Configuration shared by every relation resolved through a registry
#[derive(Debug, Clone, PartialEq)]
pub struct RelationConfig {
    /// Prefix namespacing pivot columns inside a joined row
    pub pivot_prefix: String,
    /// Name under which hydrated records expose their pivot record
    pub pivot_attribute: String,
    /// Default for `with_timestamps` on new pivot configurations
    pub pivot_timestamps: bool,
    /// Fallback rule for unaliased discriminator values
    pub morph_fallback: MorphFallback,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            pivot_prefix: "pivot__".to_string(),
            pivot_attribute: "pivot".to_string(),
            pivot_timestamps: false,
            morph_fallback: MorphFallback::UpperCamel,
        }
    }
}

impl RelationConfig {
    /// Defaults overridden by `ELIF_RELATIONS_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(prefix) = std::env::var(PIVOT_PREFIX_ENV) {
            if !prefix.is_empty() {
                config.pivot_prefix = prefix;
            }
        }
        if let Ok(attribute) = std::env::var(PIVOT_ATTRIBUTE_ENV) {
            if !attribute.is_empty() {
                config.pivot_attribute = attribute;
            }
        }
        config
    }

    pub fn with_pivot_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pivot_prefix = prefix.into();
        self
    }

    pub fn with_pivot_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.pivot_attribute = attribute.into();
        self
    }

    pub fn with_pivot_timestamps(mut self, enabled: bool) -> Self {
        self.pivot_timestamps = enabled;
        self
    }

    pub fn with_morph_fallback(mut self, fallback: MorphFallback) -> Self {
        self.morph_fallback = fallback;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_config_default() {
        let config = RelationConfig::default();
        assert_eq!(config.pivot_prefix, "pivot__");
        assert_eq!(config.pivot_attribute, "pivot");
        assert!(!config.pivot_timestamps);
        assert_eq!(config.morph_fallback, MorphFallback::UpperCamel);
    }

    #[test]
    fn test_morph_fallback_derivation() {
        assert_eq!(MorphFallback::UpperCamel.derive("blog_post"), "BlogPost");
        assert_eq!(MorphFallback::UpperCamel.derive("Video"), "Video");
        assert_eq!(MorphFallback::Verbatim.derive("blog_post"), "blog_post");
    }

    #[test]
    fn test_builder_setters() {
        let config = RelationConfig::default()
            .with_pivot_prefix("__p_")
            .with_pivot_attribute("membership")
            .with_pivot_timestamps(true)
            .with_morph_fallback(MorphFallback::Verbatim);
        assert_eq!(config.pivot_prefix, "__p_");
        assert_eq!(config.pivot_attribute, "membership");
        assert!(config.pivot_timestamps);
        assert_eq!(config.morph_fallback, MorphFallback::Verbatim);
    }

    // only test touching these variables
    #[test]
    fn test_from_env_overrides_non_empty_values() {
        std::env::set_var(PIVOT_PREFIX_ENV, "jt_");
        std::env::set_var(PIVOT_ATTRIBUTE_ENV, "");
        let config = RelationConfig::from_env();
        std::env::remove_var(PIVOT_PREFIX_ENV);
        std::env::remove_var(PIVOT_ATTRIBUTE_ENV);

        assert_eq!(config.pivot_prefix, "jt_");
        assert_eq!(config.pivot_attribute, "pivot");
    }
}
