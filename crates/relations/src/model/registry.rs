//! Model Registry - model lookup and the polymorphic alias map
//!
//! Built once, validated, then shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::info::ModelInfo;
use crate::config::RelationConfig;
use crate::error::{RelationError, RelationResult};
use crate::relations::metadata::{RelationDescriptor, RelationKind};

/// Registered models plus discriminator aliases
#[derive(Debug)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelInfo>>,
    /// discriminator value -> model name
    morph_map: IndexMap<String, String>,
    config: RelationConfig,
}

/// Collects models and aliases before validation
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    models: Vec<ModelInfo>,
    morph_map: IndexMap<String, String>,
    config: RelationConfig,
}

impl ModelRegistryBuilder {
    pub fn config(mut self, config: RelationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: ModelInfo) -> Self {
        self.models.push(model);
        self
    }

    /// Map a stored discriminator value to a registered model name
    pub fn morph_alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.morph_map.insert(alias.into(), model.into());
        self
    }

    /// Validate every model and relation, then freeze the registry
    pub fn build(self) -> RelationResult<Arc<ModelRegistry>> {
        let mut models = HashMap::new();
        let mut morph_map = self.morph_map;

        for model in self.models {
            if models.contains_key(&model.name) {
                return Err(RelationError::Configuration(format!(
                    "model '{}' is registered twice",
                    model.name
                )));
            }
            if let Some(alias) = &model.morph_alias {
                morph_map
                    .entry(alias.clone())
                    .or_insert_with(|| model.name.clone());
            }
            models.insert(model.name.clone(), Arc::new(model));
        }

        for (alias, target) in &morph_map {
            if !models.contains_key(target) {
                return Err(RelationError::Configuration(format!(
                    "morph alias '{}' points at unregistered model '{}'",
                    alias, target
                )));
            }
        }

        for model in models.values() {
            for descriptor in model.relations.values() {
                descriptor.validate()?;
                validate_targets(&models, descriptor)?;
            }
        }

        debug!(models = models.len(), aliases = morph_map.len(), "model registry built");

        Ok(Arc::new(ModelRegistry {
            models,
            morph_map,
            config: self.config,
        }))
    }
}

fn validate_targets(
    models: &HashMap<String, Arc<ModelInfo>>,
    descriptor: &RelationDescriptor,
) -> RelationResult<()> {
    let unknown = |name: &str| {
        RelationError::Configuration(format!(
            "relation '{}' on '{}' references unregistered model '{}'",
            descriptor.name, descriptor.owner_model, name
        ))
    };

    if descriptor.kind != RelationKind::MorphTo && !models.contains_key(&descriptor.target_model) {
        return Err(unknown(&descriptor.target_model));
    }
    if let Some(through) = &descriptor.through {
        if !models.contains_key(&through.model) {
            return Err(unknown(&through.model));
        }
    }
    Ok(())
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    pub fn model(&self, name: &str) -> RelationResult<Arc<ModelInfo>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| RelationError::UnknownModel(name.to_string()))
    }

    /// Relation descriptor declared on `model`
    pub fn descriptor(&self, model: &str, relation: &str) -> RelationResult<&RelationDescriptor> {
        self.models
            .get(model)
            .and_then(|info| info.descriptor(relation))
            .ok_or_else(|| RelationError::UnknownRelation {
                model: model.to_string(),
                relation: relation.to_string(),
            })
    }

    /// Resolve a stored discriminator to a model: registered alias first,
    /// then the configured fallback derivation.
    pub fn resolve_morph_type(&self, discriminator: &str) -> RelationResult<Arc<ModelInfo>> {
        if let Some(name) = self.morph_map.get(discriminator) {
            return self.model(name);
        }
        let derived = self.config.morph_fallback.derive(discriminator);
        self.models
            .get(&derived)
            .cloned()
            .ok_or_else(|| RelationError::UnknownModel(discriminator.to_string()))
    }

    /// Discriminator written when a record of `model` becomes a polymorphic
    /// target: its first registered alias, else the model name.
    pub fn morph_type_of(&self, model: &ModelInfo) -> String {
        self.morph_map
            .iter()
            .find(|(_, target)| **target == model.name)
            .map(|(alias, _)| alias.clone())
            .unwrap_or_else(|| model.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MorphFallback;
    use crate::relations::metadata::{PolymorphicConfig, ThroughConfig};

    fn registry(fallback: MorphFallback) -> Arc<ModelRegistry> {
        ModelRegistry::builder()
            .config(RelationConfig::default().with_morph_fallback(fallback))
            .model(ModelInfo::new("Post", "posts").with_morph_alias("post"))
            .model(ModelInfo::new("BlogVideo", "videos"))
            .model(
                ModelInfo::new("Image", "images")
                    .relation(RelationDescriptor::morph_to("imageable", PolymorphicConfig::new("imageable"))),
            )
            .morph_alias("clip", "BlogVideo")
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_morph_type_alias_then_fallback() {
        let upper = registry(MorphFallback::UpperCamel);
        assert_eq!(upper.resolve_morph_type("post").unwrap().name, "Post");
        assert_eq!(upper.resolve_morph_type("clip").unwrap().name, "BlogVideo");
        assert_eq!(upper.resolve_morph_type("blog_video").unwrap().name, "BlogVideo");
        assert_eq!(
            upper.resolve_morph_type("podcast").unwrap_err(),
            RelationError::UnknownModel("podcast".to_string())
        );

        let verbatim = registry(MorphFallback::Verbatim);
        assert!(verbatim.resolve_morph_type("blog_video").is_err());
        assert_eq!(verbatim.resolve_morph_type("BlogVideo").unwrap().name, "BlogVideo");
    }

    #[test]
    fn test_morph_type_of_prefers_alias() {
        let registry = registry(MorphFallback::UpperCamel);
        let post = registry.model("Post").unwrap();
        let image = registry.model("Image").unwrap();
        assert_eq!(registry.morph_type_of(&post), "post");
        assert_eq!(registry.morph_type_of(&image), "Image");
    }

    #[test]
    fn test_descriptor_lookup() {
        let registry = registry(MorphFallback::UpperCamel);
        let descriptor = registry.descriptor("Image", "imageable").unwrap();
        assert_eq!(descriptor.owner_model, "Image");
        assert!(matches!(
            registry.descriptor("Image", "missing"),
            Err(RelationError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_build_rejects_unknown_targets() {
        let result = ModelRegistry::builder()
            .model(ModelInfo::new("Country", "countries").relation(RelationDescriptor::has_many_through(
                "posts",
                "Post",
                ThroughConfig::new("User", "country_id"),
                "user_id",
            )))
            .model(ModelInfo::new("Post", "posts"))
            .build();
        assert!(matches!(result, Err(RelationError::Configuration(_))));
    }
}
