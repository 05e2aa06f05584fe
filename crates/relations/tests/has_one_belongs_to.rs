mod common;

use common::{all, find, row, seeded, registry};
use elif_relations::{LoadOptions, RelationError, RelationValue};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_has_one_lazy_returns_match_with_owner_snapshot() {
    let db = seeded().await;
    let registry = registry();
    let mut user = find(&db, &registry, "User", 1).await;

    let value = user.load(&db, &registry, "profile", &LoadOptions::new()).await.unwrap();

    let profile = value.as_one().expect("user 1 has a profile");
    assert_eq!(profile.get("bio"), Some(&json!("analyst")));
    assert_eq!(profile.owner().unwrap().get("name"), Some(&json!("ada")));
    assert_eq!(user.related_one("profile").unwrap().get("id"), Some(&json!(1)));
    assert_eq!(db.statement_count().await, 1);
}

#[tokio::test]
async fn test_has_one_lazy_without_match_is_empty() {
    let db = seeded().await;
    let registry = registry();
    let mut user = find(&db, &registry, "User", 2).await;

    let value = user.load(&db, &registry, "profile", &LoadOptions::new()).await.unwrap();

    assert_eq!(value, RelationValue::Empty);
    assert!(user.related("profile").is_some());
}

#[tokio::test]
async fn test_has_one_eager_uses_single_query() {
    let db = seeded().await;
    let registry = registry();
    let mut users = all(&db, &registry, "User").await;

    let relation = users[0].relation(&registry, "profile").unwrap();
    relation.eager_load(&db, &mut users, &LoadOptions::new()).await.unwrap();

    let statements = db.statements().await;
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("profiles.user_id IN (1, 2, 3, 4)"));

    let bios: Vec<_> = users
        .iter()
        .map(|user| user.related_one("profile").map(|p| p.value("bio")))
        .collect();
    assert_eq!(bios, vec![Some(json!("analyst")), None, Some(json!("poet")), None]);
    assert_eq!(users[2].related_one("profile").unwrap().owner().unwrap().value("id"), json!(3));
}

#[tokio::test]
async fn test_bound_attributes_land_on_owner_and_are_not_persisted() {
    let db = seeded().await;
    let registry = registry();
    let mut users = all(&db, &registry, "User").await;

    let relation = users[0].relation(&registry, "profile_summary").unwrap();
    relation.eager_load(&db, &mut users, &LoadOptions::new()).await.unwrap();

    assert_eq!(users[0].get("profile_bio"), Some(&json!("analyst")));
    assert!(users[0].is_bound("profile_bio"));
    assert_eq!(users[1].get("profile_bio"), Some(&json!(null)));
    assert!(users[0].related("profile_summary").is_none());

    users[0].set_attribute("name", "ada lovelace");
    users[0].save(&db).await.unwrap();
    let stored = db.table_rows("users").await;
    assert_eq!(stored[0], row(json!({"id": 1, "name": "ada lovelace", "country_id": 1})));
}

#[tokio::test]
async fn test_binding_conflict_leaves_owner_untouched() {
    let db = seeded().await;
    let registry = registry();
    let mut user = find(&db, &registry, "User", 1).await;
    user.set_attribute("profile_bio", "mine");

    let err = user
        .load(&db, &registry, "profile_summary", &LoadOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RelationError::BindingConflict {
            attribute: "profile_bio".to_string()
        }
    );
    assert_eq!(user.get("profile_bio"), Some(&json!("mine")));
}

#[tokio::test]
async fn test_eager_binding_conflict_leaves_whole_batch_untouched() {
    let db = seeded().await;
    let registry = registry();
    let mut users = all(&db, &registry, "User").await;
    users[2].set_attribute("profile_bio", "own");

    let relation = users[0].relation(&registry, "profile_summary").unwrap();
    let err = relation
        .eager_load(&db, &mut users, &LoadOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RelationError::BindingConflict {
            attribute: "profile_bio".to_string()
        }
    );
    assert!(users[0].get("profile_bio").is_none());
    assert!(!users[0].is_bound("profile_bio"));
    assert!(users[1].get("profile_bio").is_none());
    assert_eq!(users[2].get("profile_bio"), Some(&json!("own")));
}

#[tokio::test]
async fn test_belongs_to_eager_resolves_parent() {
    let db = seeded().await;
    let registry = registry();
    let mut posts = all(&db, &registry, "Post").await;

    let relation = posts[0].relation(&registry, "author").unwrap();
    relation.eager_load(&db, &mut posts, &LoadOptions::new()).await.unwrap();

    assert_eq!(db.statement_count().await, 1);
    let authors: Vec<_> = posts
        .iter()
        .map(|post| post.related_one("author").unwrap().value("name"))
        .collect();
    assert_eq!(authors, vec![json!("ada"), json!("ada"), json!("bob"), json!("cy")]);
}

#[tokio::test]
async fn test_belongs_to_with_null_key_issues_no_query() {
    let db = seeded().await;
    let registry = registry();
    let mut user = find(&db, &registry, "User", 4).await;

    let value = user.load(&db, &registry, "country", &LoadOptions::new()).await.unwrap();

    assert_eq!(value, RelationValue::Empty);
    assert_eq!(db.statement_count().await, 0);
}

#[tokio::test]
async fn test_belongs_to_associate_and_dissociate() {
    let db = seeded().await;
    let registry = registry();
    let mut user = find(&db, &registry, "User", 4).await;
    let portugal = find(&db, &registry, "Country", 2).await;
    let relation = user.relation(&registry, "country").unwrap();

    relation.associate(&db, &mut user, &portugal).await.unwrap();
    assert_eq!(user.get("country_id"), Some(&json!(2)));
    assert_eq!(user.related_one("country").unwrap().value("name"), json!("Portugal"));
    assert_eq!(db.table_rows("users").await[3].get("country_id"), Some(&json!(2)));

    relation.dissociate(&db, &mut user).await.unwrap();
    assert_eq!(user.get("country_id"), Some(&json!(null)));
    assert!(user.related("country").is_none());
    assert_eq!(db.table_rows("users").await[3].get("country_id"), Some(&json!(null)));
}

#[tokio::test]
async fn test_has_one_save_fills_foreign_key() {
    let db = seeded().await;
    let registry = registry();
    let mut user = find(&db, &registry, "User", 2).await;
    let relation = user.relation(&registry, "profile").unwrap();

    let profile = relation
        .save(&db, &mut user, row(json!({"bio": "builder"})))
        .await
        .unwrap();

    assert_eq!(profile.get("user_id"), Some(&json!(2)));
    assert_eq!(profile.get("id"), Some(&json!(3)));
    let value = user.load(&db, &registry, "profile", &LoadOptions::new()).await.unwrap();
    assert_eq!(value.as_one().unwrap().value("bio"), json!("builder"));
}

#[tokio::test]
async fn test_belongs_to_cannot_make() {
    let db = seeded().await;
    let registry = registry();
    let user = find(&db, &registry, "User", 1).await;

    let err = user
        .relation(&registry, "country")
        .unwrap()
        .make(&user, row(json!({"name": "Atlantis"})))
        .unwrap_err();

    assert!(err.is_unsupported());
}
