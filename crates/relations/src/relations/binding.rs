//! Attribute binding: projecting related attributes onto the owner

use serde_json::Value;

use super::metadata::BoundAttribute;
use crate::error::{RelationError, RelationResult};
use crate::model::Record;

/// Fail when a bound name is already an ordinary attribute of `owner`
pub(crate) fn check_bindings(owner: &Record, bindings: &[BoundAttribute]) -> RelationResult<()> {
    for binding in bindings {
        if owner.get(&binding.name).is_some() && !owner.is_bound(&binding.name) {
            return Err(RelationError::BindingConflict {
                attribute: binding.name.clone(),
            });
        }
    }
    Ok(())
}

/// Write each bound attribute of `related` onto `owner`; a missing related
/// record binds nulls. Callers run [`check_bindings`] first.
pub(crate) fn write_bindings(owner: &mut Record, bindings: &[BoundAttribute], related: Option<&Record>) {
    for binding in bindings {
        let value = related
            .and_then(|record| record.get(&binding.source))
            .cloned()
            .unwrap_or(Value::Null);
        owner.bind_attribute(&binding.name, value);
    }
}

/// Check then write, so a conflict leaves the owner untouched
pub(crate) fn bind_related(
    owner: &mut Record,
    bindings: &[BoundAttribute],
    related: Option<&Record>,
) -> RelationResult<()> {
    check_bindings(owner, bindings)?;
    write_bindings(owner, bindings, related);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::row_from_json;
    use crate::model::ModelInfo;
    use serde_json::json;
    use std::sync::Arc;

    fn bindings() -> Vec<BoundAttribute> {
        vec![
            BoundAttribute {
                source: "bio".to_string(),
                name: "profile_bio".to_string(),
            },
            BoundAttribute {
                source: "id".to_string(),
                name: "name".to_string(),
            },
        ]
    }

    #[test]
    fn test_conflict_detected_before_any_write() {
        let user_model = Arc::new(ModelInfo::new("User", "users"));
        let profile_model = Arc::new(ModelInfo::new("Profile", "profiles"));
        let mut user = Record::from_row(user_model, row_from_json(json!({"id": 1, "name": "ada"})));
        let profile = Record::from_row(profile_model, row_from_json(json!({"id": 5, "bio": "hi"})));

        let err = bind_related(&mut user, &bindings(), Some(&profile)).unwrap_err();
        assert_eq!(
            err,
            RelationError::BindingConflict {
                attribute: "name".to_string()
            }
        );
        assert!(user.get("profile_bio").is_none());
        assert_eq!(user.get("name"), Some(&json!("ada")));
    }

    #[test]
    fn test_rebinding_is_allowed() {
        let user_model = Arc::new(ModelInfo::new("User", "users"));
        let mut user = Record::from_row(user_model, row_from_json(json!({"id": 1})));
        let only_bio = &bindings()[..1];

        bind_related(&mut user, only_bio, None).unwrap();
        assert_eq!(user.get("profile_bio"), Some(&Value::Null));
        bind_related(&mut user, only_bio, None).unwrap();
        assert!(user.is_bound("profile_bio"));
    }
}
