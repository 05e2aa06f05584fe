mod common;

use common::{all, find, ids, registry, row, seeded};
use elif_relations::{query_filter, LoadOptions, Operator, QueryExecutor, Record, RelationError, RelationValue};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_morph_one_matches_key_and_discriminator() {
    let db = seeded().await;
    let registry = registry();
    let mut ada = find(&db, &registry, "User", 1).await;
    let mut bob = find(&db, &registry, "User", 2).await;

    let avatar = ada.load(&db, &registry, "avatar", &LoadOptions::new()).await.unwrap();
    assert_eq!(avatar.as_one().unwrap().value("url"), json!("ada.png"));
    assert_eq!(avatar.as_one().unwrap().owner().unwrap().value("name"), json!("ada"));

    let none = bob.load(&db, &registry, "avatar", &LoadOptions::new()).await.unwrap();
    assert_eq!(none, RelationValue::Empty);
}

#[tokio::test]
async fn test_morph_many_eager_keeps_types_apart() {
    let db = seeded().await;
    let registry = registry();
    let mut posts = all(&db, &registry, "Post").await;

    let relation = posts[0].relation(&registry, "images").unwrap();
    relation.eager_load(&db, &mut posts, &LoadOptions::new()).await.unwrap();

    let statements = db.statements().await;
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("'post'"));
    // user 1's avatar shares imageable_id 1 with post 1
    assert_eq!(ids(posts[0].related_many("images")), vec![json!(1)]);
    assert!(posts[1].related_many("images").is_empty());
    assert!(posts[2].related_many("images").is_empty());
    assert_eq!(ids(posts[3].related_many("images")), vec![json!(2)]);
}

#[tokio::test]
async fn test_morph_one_has_filters_owners() {
    let db = seeded().await;
    let registry = registry();
    let user = find(&db, &registry, "User", 1).await;
    let relation = user.relation(&registry, "avatar").unwrap();

    let query = relation.has(Operator::GreaterThanOrEqual, 1).unwrap();
    let rows = db.fetch_all(&query).await.unwrap();

    assert_eq!(rows.iter().map(|r| r["id"].clone()).collect::<Vec<_>>(), vec![json!(1), json!(3)]);
}

#[tokio::test]
async fn test_unsupported_existence_filters_on_polymorphic_kinds() {
    let db = seeded().await;
    let registry = registry();
    let user = find(&db, &registry, "User", 1).await;
    let post = find(&db, &registry, "Post", 1).await;
    let cond = query_filter(|q| q.where_eq("images.url", "a.png"));

    let avatar = user.relation(&registry, "avatar").unwrap();
    assert!(avatar.has_where(&cond).unwrap_err().is_unsupported());

    let images = post.relation(&registry, "images").unwrap();
    assert!(images.has(Operator::GreaterThan, 0).unwrap_err().is_unsupported());
    assert!(images.has_where(&cond).unwrap_err().is_unsupported());
    assert_eq!(images.relation_count(&db, &post, None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_morph_many_save_stamps_discriminator() {
    let db = seeded().await;
    let registry = registry();
    let mut post = find(&db, &registry, "Post", 3).await;
    let relation = post.relation(&registry, "images").unwrap();

    let image = relation.save(&db, &mut post, row(json!({"url": "c.png"}))).await.unwrap();

    assert_eq!(image.get("id"), Some(&json!(5)));
    assert_eq!(image.get("imageable_type"), Some(&json!("post")));
    assert_eq!(image.get("imageable_id"), Some(&json!(3)));
    let value = post.load(&db, &registry, "images", &LoadOptions::new()).await.unwrap();
    assert_eq!(ids(value.as_many()), vec![json!(5)]);
}

#[tokio::test]
async fn test_morph_to_eager_issues_one_query_per_type() {
    let db = seeded().await;
    let registry = registry();
    let mut images = all(&db, &registry, "Image").await;

    let relation = images[0].relation(&registry, "imageable").unwrap();
    relation.eager_load(&db, &mut images, &LoadOptions::new()).await.unwrap();

    let statements = db.statements().await;
    assert_eq!(statements.len(), 2);
    assert!(statements[0].contains("posts.id IN (1, 4)"));
    assert!(statements[1].contains("users.id IN (1, 3)"));

    let parents: Vec<_> = images
        .iter()
        .map(|image| {
            let parent = image.related_one("imageable").unwrap();
            (parent.model_name().to_string(), parent.value("id"))
        })
        .collect();
    assert_eq!(
        parents,
        vec![
            ("Post".to_string(), json!(1)),
            ("Post".to_string(), json!(4)),
            ("User".to_string(), json!(1)),
            ("User".to_string(), json!(3)),
        ]
    );
}

#[tokio::test]
async fn test_morph_to_eager_single_type_is_one_query() {
    let db = seeded().await;
    let registry = registry();
    let mut images: Vec<Record> = all(&db, &registry, "Image").await.into_iter().take(2).collect();

    let relation = images[0].relation(&registry, "imageable").unwrap();
    relation.eager_load(&db, &mut images, &LoadOptions::new()).await.unwrap();

    assert_eq!(db.statement_count().await, 1);
    assert_eq!(images[1].related_one("imageable").unwrap().value("title"), json!("verse"));
}

#[tokio::test]
async fn test_morph_to_dangling_reference_is_integrity_fault() {
    let db = seeded().await;
    let registry = registry();
    let mut image = find(&db, &registry, "Image", 1).await;
    image.set_attribute("imageable_id", 99);

    let err = image
        .load(&db, &registry, "imageable", &LoadOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RelationError::RecordNotFound {
            model: "Post".to_string(),
            key: "99".to_string()
        }
    );
    assert!(err.is_integrity_fault());
    assert!(image.related("imageable").is_none());
}

#[tokio::test]
async fn test_morph_to_eager_dangling_reference_leaves_batch_untouched() {
    let db = seeded().await;
    let registry = registry();
    let mut images = all(&db, &registry, "Image").await;
    images[3].set_attribute("imageable_id", 42);

    let relation = images[0].relation(&registry, "imageable").unwrap();
    let err = relation
        .eager_load(&db, &mut images, &LoadOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_integrity_fault());
    assert!(images.iter().all(|image| image.related("imageable").is_none()));
}

#[tokio::test]
async fn test_morph_to_without_discriminator_is_empty() {
    let db = seeded().await;
    let registry = registry();
    let model = registry.model("Image").unwrap();
    let mut orphan = Record::with_attributes(model, row(json!({"imageable_type": null, "imageable_id": 1})));

    let value = orphan.load(&db, &registry, "imageable", &LoadOptions::new()).await.unwrap();

    assert_eq!(value, RelationValue::Empty);
    assert_eq!(db.statement_count().await, 0);
}

#[tokio::test]
async fn test_morph_to_unknown_discriminator() {
    let db = seeded().await;
    let registry = registry();
    let mut image = find(&db, &registry, "Image", 1).await;
    image.set_attribute("imageable_type", "planet");

    let err = image
        .load(&db, &registry, "imageable", &LoadOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RelationError::UnknownModel(_)));
    assert_eq!(db.statement_count().await, 0);
}

#[tokio::test]
async fn test_morph_to_falls_back_to_model_name() {
    let db = seeded().await;
    let registry = registry();
    let mut image = find(&db, &registry, "Image", 3).await;
    image.set_attribute("imageable_type", "user");

    let value = image.load(&db, &registry, "imageable", &LoadOptions::new()).await.unwrap();

    let user = value.as_one().unwrap();
    assert_eq!(user.model_name(), "User");
    assert_eq!(user.value("name"), json!("ada"));
}

#[tokio::test]
async fn test_morph_to_associate_and_dissociate() {
    let db = seeded().await;
    let registry = registry();
    let mut image = find(&db, &registry, "Image", 1).await;
    let dee = find(&db, &registry, "User", 4).await;
    let relation = image.relation(&registry, "imageable").unwrap();

    relation.associate(&db, &mut image, &dee).await.unwrap();
    let stored = db.table_rows("images").await;
    assert_eq!(stored[0]["imageable_type"], json!("User"));
    assert_eq!(stored[0]["imageable_id"], json!(4));
    assert_eq!(image.related_one("imageable").unwrap().value("name"), json!("dee"));

    relation.dissociate(&db, &mut image).await.unwrap();
    let stored = db.table_rows("images").await;
    assert_eq!(stored[0]["imageable_type"], json!(null));
    assert_eq!(stored[0]["imageable_id"], json!(null));
    assert!(image.related("imageable").is_none());
}

#[tokio::test]
async fn test_morph_to_has_no_aggregates() {
    let db = seeded().await;
    let registry = registry();
    let image = find(&db, &registry, "Image", 1).await;
    let relation = image.relation(&registry, "imageable").unwrap();

    let err = relation.relation_count(&db, &image, None).await.unwrap_err();
    assert!(err.is_unsupported());
    assert!(relation.has(Operator::GreaterThan, 0).unwrap_err().is_unsupported());
    assert_eq!(db.statement_count().await, 0);
}
