//! Shared fixture: a small blog schema seeded into the in-memory backend

#![allow(dead_code)]

use std::sync::Arc;

use elif_relations::{
    row_from_json, MemoryDatabase, ModelInfo, ModelRegistry, PivotConfig, PolymorphicConfig,
    Query, QueryExecutor, Record, RelationDescriptor, Row, ThroughConfig,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn row(value: Value) -> Row {
    row_from_json(value)
}

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values.into_iter().map(row_from_json).collect()
}

pub fn user_model() -> ModelInfo {
    ModelInfo::new("User", "users")
        .relation(RelationDescriptor::has_one("profile", "Profile", "user_id"))
        .relation(RelationDescriptor::has_one("profile_summary", "Profile", "user_id").bind("bio", "profile_bio"))
        .relation(RelationDescriptor::has_many("posts", "Post", "user_id"))
        .relation(RelationDescriptor::belongs_to("country", "Country", "country_id"))
        .relation(RelationDescriptor::belongs_to_many(
            "roles",
            "Role",
            PivotConfig::new("role_user", "user_id", "role_id").with_columns(&["level"]),
        ))
        .relation(RelationDescriptor::morph_one("avatar", "Image", PolymorphicConfig::new("imageable")))
}

pub fn models() -> Vec<ModelInfo> {
    vec![
        user_model(),
        ModelInfo::new("Profile", "profiles").relation(RelationDescriptor::belongs_to("user", "User", "user_id")),
        ModelInfo::new("Post", "posts")
            .with_morph_alias("post")
            .relation(RelationDescriptor::belongs_to("author", "User", "user_id"))
            .relation(RelationDescriptor::has_many("comments", "Comment", "post_id"))
            .relation(RelationDescriptor::morph_many("images", "Image", PolymorphicConfig::new("imageable")))
            .relation(RelationDescriptor::belongs_to_many(
                "tags",
                "Tag",
                PivotConfig::new("post_tag", "post_id", "tag_id"),
            )),
        ModelInfo::new("Comment", "comments").relation(RelationDescriptor::belongs_to("post", "Post", "post_id")),
        ModelInfo::new("Country", "countries")
            .relation(RelationDescriptor::has_many("users", "User", "country_id"))
            .relation(RelationDescriptor::has_many_through(
                "posts",
                "Post",
                ThroughConfig::new("User", "country_id"),
                "user_id",
            )),
        ModelInfo::new("Role", "roles"),
        ModelInfo::new("Image", "images")
            .relation(RelationDescriptor::morph_to("imageable", PolymorphicConfig::new("imageable"))),
        ModelInfo::new("Tag", "tags"),
    ]
}

pub fn registry() -> Arc<ModelRegistry> {
    models()
        .into_iter()
        .fold(ModelRegistry::builder(), |builder, model| builder.model(model))
        .build()
        .expect("fixture registry is valid")
}

pub async fn seeded() -> MemoryDatabase {
    init_tracing();
    let db = MemoryDatabase::new();
    db.seed(
        "countries",
        rows(vec![
            json!({"id": 1, "name": "New Zealand"}),
            json!({"id": 2, "name": "Portugal"}),
            json!({"id": 3, "name": "Iceland"}),
        ]),
    )
    .await;
    db.seed(
        "users",
        rows(vec![
            json!({"id": 1, "name": "ada", "country_id": 1}),
            json!({"id": 2, "name": "bob", "country_id": 1}),
            json!({"id": 3, "name": "cy", "country_id": 2}),
            json!({"id": 4, "name": "dee", "country_id": null}),
        ]),
    )
    .await;
    db.seed(
        "profiles",
        rows(vec![
            json!({"id": 1, "user_id": 1, "bio": "analyst"}),
            json!({"id": 2, "user_id": 3, "bio": "poet"}),
        ]),
    )
    .await;
    db.seed(
        "posts",
        rows(vec![
            json!({"id": 1, "user_id": 1, "title": "hello", "views": 10}),
            json!({"id": 2, "user_id": 1, "title": "again", "views": 30}),
            json!({"id": 3, "user_id": 2, "title": "notes", "views": 5}),
            json!({"id": 4, "user_id": 3, "title": "verse", "views": 7}),
        ]),
    )
    .await;
    db.seed(
        "comments",
        rows(vec![
            json!({"id": 1, "post_id": 1, "body": "first"}),
            json!({"id": 2, "post_id": 1, "body": "second"}),
            json!({"id": 3, "post_id": 4, "body": "lovely"}),
        ]),
    )
    .await;
    db.seed(
        "roles",
        rows(vec![
            json!({"id": 1, "name": "admin"}),
            json!({"id": 2, "name": "editor"}),
            json!({"id": 3, "name": "viewer"}),
            json!({"id": 4, "name": "guest"}),
        ]),
    )
    .await;
    db.seed(
        "role_user",
        rows(vec![
            json!({"user_id": 1, "role_id": 2, "level": 1}),
            json!({"user_id": 1, "role_id": 4, "level": 2}),
            json!({"user_id": 2, "role_id": 1, "level": 9}),
        ]),
    )
    .await;
    db.seed(
        "images",
        rows(vec![
            json!({"id": 1, "imageable_type": "post", "imageable_id": 1, "url": "a.png"}),
            json!({"id": 2, "imageable_type": "post", "imageable_id": 4, "url": "b.png"}),
            json!({"id": 3, "imageable_type": "User", "imageable_id": 1, "url": "ada.png"}),
            json!({"id": 4, "imageable_type": "User", "imageable_id": 3, "url": "cy.png"}),
        ]),
    )
    .await;
    db.seed("tags", rows(vec![json!({"id": 1, "name": "rust"}), json!({"id": 2, "name": "sql"})]))
        .await;
    db.seed(
        "post_tag",
        rows(vec![
            json!({"post_id": 1, "tag_id": 1}),
            json!({"post_id": 1, "tag_id": 2}),
            json!({"post_id": 3, "tag_id": 2}),
        ]),
    )
    .await;
    db
}

/// Every row of `model`'s table ordered by primary key, with the statement
/// log cleared afterwards
pub async fn all(db: &MemoryDatabase, registry: &Arc<ModelRegistry>, model: &str) -> Vec<Record> {
    let info = registry.model(model).expect("model is registered");
    let query = Query::table(&info.table).order_by(&info.qualified_key());
    let rows = db.fetch_all(&query).await.expect("fixture query succeeds");
    db.clear_log().await;
    rows.into_iter().map(|row| Record::from_row(info.clone(), row)).collect()
}

pub async fn find(db: &MemoryDatabase, registry: &Arc<ModelRegistry>, model: &str, id: i64) -> Record {
    all(db, registry, model)
        .await
        .into_iter()
        .find(|record| record.get("id") == Some(&json!(id)))
        .expect("fixture record exists")
}

/// Primary keys of `records`, in order
pub fn ids(records: &[Record]) -> Vec<Value> {
    records.iter().map(|record| record.value("id")).collect()
}
