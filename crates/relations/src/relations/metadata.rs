//! Relationship Metadata System - Core metadata definitions for relationships

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelationError, RelationResult};
use crate::query::Operator;

/// Defines the kind of association between two models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// One-to-one, foreign key on the target
    HasOne,
    /// Inverse one-to-one / many-to-one, foreign key on the owner
    BelongsTo,
    /// One-to-many, foreign key on the target
    HasMany,
    /// One-to-many through an intermediate model
    HasManyThrough,
    /// Many-to-many through a pivot table
    BelongsToMany,
    /// Polymorphic one-to-one, owning side
    MorphOne,
    /// Polymorphic one-to-many, owning side
    MorphMany,
    /// Polymorphic inverse, target model chosen by a stored discriminator
    MorphTo,
}

impl RelationKind {
    /// Returns true if this kind is polymorphic
    pub fn is_polymorphic(self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany | Self::MorphTo)
    }

    /// Returns true if this kind resolves to a collection
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::HasMany | Self::HasManyThrough | Self::BelongsToMany | Self::MorphMany
        )
    }

    /// Returns true if this kind requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::BelongsToMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasOne => "has_one",
            Self::BelongsTo => "belongs_to",
            Self::HasMany => "has_many",
            Self::HasManyThrough => "has_many_through",
            Self::BelongsToMany => "belongs_to_many",
            Self::MorphOne => "morph_one",
            Self::MorphMany => "morph_many",
            Self::MorphTo => "morph_to",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraint on pivot rows applied to every resolving query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotConstraint {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

/// Pivot table configuration for many-to-many relationships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotConfig {
    /// Name of the pivot table
    pub table: String,
    /// Pivot column referencing the owner
    pub local_key: String,
    /// Pivot column referencing the target
    pub foreign_key: String,
    /// Extra pivot columns projected alongside the keys
    pub additional_columns: Vec<String>,
    /// Whether attach stamps `created_at`/`updated_at`; `None` defers to the
    /// registry configuration
    pub with_timestamps: Option<bool>,
    pub constraints: Vec<PivotConstraint>,
}

impl PivotConfig {
    pub fn new(table: impl Into<String>, local_key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            additional_columns: Vec::new(),
            with_timestamps: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.additional_columns
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = Some(enabled);
        self
    }

    pub fn where_pivot(mut self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.constraints.push(PivotConstraint {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Validate the pivot configuration
    pub fn validate(&self) -> RelationResult<()> {
        if self.table.is_empty() {
            return Err(RelationError::Configuration(
                "pivot table name cannot be empty".to_string(),
            ));
        }
        if self.local_key.is_empty() || self.foreign_key.is_empty() {
            return Err(RelationError::Configuration(format!(
                "pivot table '{}' requires both key columns",
                self.table
            )));
        }
        if self.local_key == self.foreign_key {
            return Err(RelationError::Configuration(format!(
                "pivot table '{}' uses '{}' for both keys",
                self.table, self.local_key
            )));
        }
        Ok(())
    }
}

/// Intermediate model for has-many-through relationships.
///
/// `owner.local_key = through.first_key` and
/// `through.local_key = target.foreign_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughConfig {
    /// Registered name of the intermediate model
    pub model: String,
    /// Column on the intermediate model referencing the owner
    pub first_key: String,
    /// Column on the intermediate model referenced by the target
    pub local_key: String,
}

impl ThroughConfig {
    pub fn new(model: impl Into<String>, first_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            first_key: first_key.into(),
            local_key: "id".to_string(),
        }
    }

    pub fn with_local_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = local_key.into();
        self
    }
}

/// Polymorphic configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicConfig {
    /// Morph name, e.g. "imageable"
    pub name: String,
    /// Discriminator column, e.g. "imageable_type"
    pub type_column: String,
    /// Key column, e.g. "imageable_id"
    pub id_column: String,
    /// Discriminator stored by the owning side. Defaults to the owner's
    /// registered morph alias.
    pub type_value: Option<String>,
}

impl PolymorphicConfig {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            type_column: format!("{}_type", name),
            id_column: format!("{}_id", name),
            name,
            type_value: None,
        }
    }

    pub fn with_columns(mut self, type_column: impl Into<String>, id_column: impl Into<String>) -> Self {
        self.type_column = type_column.into();
        self.id_column = id_column.into();
        self
    }

    pub fn with_type_value(mut self, type_value: impl Into<String>) -> Self {
        self.type_value = Some(type_value.into());
        self
    }

    /// Validate the polymorphic configuration
    pub fn validate(&self) -> RelationResult<()> {
        if self.type_column.is_empty() || self.id_column.is_empty() {
            return Err(RelationError::Configuration(format!(
                "polymorphic relation '{}' requires type and id columns",
                self.name
            )));
        }
        Ok(())
    }
}

/// Target attribute projected onto the owner instead of being nested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundAttribute {
    /// Attribute read from the related record
    pub source: String,
    /// Attribute written on the owner
    pub name: String,
}

/// Describes one association declared on an owner model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Relation name, also the key of the owner's relation cache
    pub name: String,
    pub kind: RelationKind,
    /// Declaring model; filled in when the descriptor is added to a model
    pub owner_model: String,
    /// Target model; empty for `MorphTo`
    pub target_model: String,
    /// Key on the owner side of the match, or on the target for `BelongsTo`
    pub local_key: String,
    /// Key on the target side of the match, or on the owner for `BelongsTo`
    pub foreign_key: String,
    pub pivot: Option<PivotConfig>,
    pub through: Option<ThroughConfig>,
    pub morph: Option<PolymorphicConfig>,
    pub bindings: Vec<BoundAttribute>,
}

impl RelationDescriptor {
    fn base(name: &str, kind: RelationKind, target: &str, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            owner_model: String::new(),
            target_model: target.to_string(),
            local_key: "id".to_string(),
            foreign_key: foreign_key.to_string(),
            pivot: None,
            through: None,
            morph: None,
            bindings: Vec::new(),
        }
    }

    /// `target.foreign_key = owner.id`
    pub fn has_one(name: &str, target: &str, foreign_key: &str) -> Self {
        Self::base(name, RelationKind::HasOne, target, foreign_key)
    }

    /// `owner.foreign_key = target.id`
    pub fn belongs_to(name: &str, target: &str, foreign_key: &str) -> Self {
        Self::base(name, RelationKind::BelongsTo, target, foreign_key)
    }

    /// `target.foreign_key = owner.id`, many rows
    pub fn has_many(name: &str, target: &str, foreign_key: &str) -> Self {
        Self::base(name, RelationKind::HasMany, target, foreign_key)
    }

    /// `target.foreign_key = through.local_key` and
    /// `through.first_key = owner.id`
    pub fn has_many_through(name: &str, target: &str, through: ThroughConfig, foreign_key: &str) -> Self {
        let mut descriptor = Self::base(name, RelationKind::HasManyThrough, target, foreign_key);
        descriptor.through = Some(through);
        descriptor
    }

    /// Many-to-many through `pivot`; `foreign_key` is the target's key
    /// referenced by the pivot table
    pub fn belongs_to_many(name: &str, target: &str, pivot: PivotConfig) -> Self {
        let mut descriptor = Self::base(name, RelationKind::BelongsToMany, target, "id");
        descriptor.pivot = Some(pivot);
        descriptor
    }

    pub fn morph_one(name: &str, target: &str, morph: PolymorphicConfig) -> Self {
        let mut descriptor = Self::base(name, RelationKind::MorphOne, target, &morph.id_column);
        descriptor.morph = Some(morph);
        descriptor
    }

    pub fn morph_many(name: &str, target: &str, morph: PolymorphicConfig) -> Self {
        let mut descriptor = Self::base(name, RelationKind::MorphMany, target, &morph.id_column);
        descriptor.morph = Some(morph);
        descriptor
    }

    /// Inverse polymorphic relation; the target model is read per owner
    pub fn morph_to(name: &str, morph: PolymorphicConfig) -> Self {
        let mut descriptor = Self::base(name, RelationKind::MorphTo, "", &morph.id_column);
        descriptor.morph = Some(morph);
        descriptor
    }

    pub fn with_local_key(mut self, local_key: &str) -> Self {
        self.local_key = local_key.to_string();
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: &str) -> Self {
        self.foreign_key = foreign_key.to_string();
        self
    }

    /// Project `source` from the related record onto the owner as `name`
    pub fn bind(mut self, source: &str, name: &str) -> Self {
        self.bindings.push(BoundAttribute {
            source: source.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub(crate) fn with_owner(mut self, owner: &str) -> Self {
        self.owner_model = owner.to_string();
        self
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub(crate) fn pivot_config(&self) -> RelationResult<&PivotConfig> {
        self.pivot.as_ref().ok_or_else(|| self.missing_config("pivot"))
    }

    pub(crate) fn through_config(&self) -> RelationResult<&ThroughConfig> {
        self.through.as_ref().ok_or_else(|| self.missing_config("through"))
    }

    pub(crate) fn morph_config(&self) -> RelationResult<&PolymorphicConfig> {
        self.morph.as_ref().ok_or_else(|| self.missing_config("polymorphic"))
    }

    fn missing_config(&self, what: &str) -> RelationError {
        RelationError::Configuration(format!(
            "relation '{}' of kind {} requires {} configuration",
            self.name, self.kind, what
        ))
    }

    /// Validate the descriptor for consistency
    pub fn validate(&self) -> RelationResult<()> {
        if self.name.is_empty() {
            return Err(RelationError::Configuration(
                "relation name cannot be empty".to_string(),
            ));
        }

        match self.kind {
            RelationKind::BelongsToMany => self.pivot_config()?.validate()?,
            RelationKind::HasManyThrough => {
                self.through_config()?;
            }
            kind if kind.is_polymorphic() => self.morph_config()?.validate()?,
            _ => {}
        }

        if self.kind != RelationKind::MorphTo && self.target_model.is_empty() {
            return Err(RelationError::Configuration(format!(
                "relation '{}' has no target model",
                self.name
            )));
        }

        if self.has_bindings() && self.kind.is_collection() {
            return Err(RelationError::Configuration(format!(
                "relation '{}' of kind {} cannot bind attributes",
                self.name, self.kind
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_kind_properties() {
        assert!(RelationKind::MorphTo.is_polymorphic());
        assert!(!RelationKind::BelongsTo.is_polymorphic());
        assert!(RelationKind::HasManyThrough.is_collection());
        assert!(!RelationKind::MorphOne.is_collection());
        assert!(RelationKind::BelongsToMany.requires_pivot());
        assert_eq!(RelationKind::BelongsToMany.to_string(), "belongs_to_many");
    }

    #[test]
    fn test_polymorphic_defaults() {
        let morph = PolymorphicConfig::new("imageable");
        assert_eq!(morph.type_column, "imageable_type");
        assert_eq!(morph.id_column, "imageable_id");

        let descriptor = RelationDescriptor::morph_many("images", "Image", morph);
        assert_eq!(descriptor.foreign_key, "imageable_id");
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_kind_specific_config() {
        let mut descriptor = RelationDescriptor::belongs_to_many(
            "roles",
            "Role",
            PivotConfig::new("role_user", "user_id", "role_id"),
        );
        assert!(descriptor.validate().is_ok());

        descriptor.pivot = None;
        assert!(matches!(
            descriptor.validate(),
            Err(RelationError::Configuration(_))
        ));

        let same_keys = PivotConfig::new("role_user", "id", "id");
        assert!(same_keys.validate().is_err());
    }

    #[test]
    fn test_bindings_rejected_on_collections() {
        let descriptor = RelationDescriptor::has_many("posts", "Post", "user_id").bind("title", "post_title");
        assert!(descriptor.validate().is_err());

        let descriptor = RelationDescriptor::has_one("profile", "Profile", "user_id").bind("bio", "profile_bio");
        assert!(descriptor.validate().is_ok());
    }
}
