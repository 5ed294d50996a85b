//! End-to-end scenarios against an in-memory SQLite database.

use rowbind::Dialect;
use rowbind::prelude::*;
use rowbind_sqlite::{SqliteConnection, TableDef};

fn person() -> ModelDescriptor {
    ModelDescriptor::builder("person")
        .table("people")
        .column("name", SqlType::Text)
        .column("age", SqlType::BigInt)
        .validate_field("age", Rule::required())
        .revisioned()
        .build()
}

fn sqlite_db() -> Database<SqliteConnection> {
    Database::with_config(EngineConfig::default().dialect(Dialect::Sqlite))
}

async fn setup() -> (Database<SqliteConnection>, SqliteConnection) {
    let db = sqlite_db();
    let descriptor = db.define(person()).expect("define person");
    let conn = SqliteConnection::memory()
        .await
        .expect("open database")
        .with_table(TableDef::from_descriptor(&descriptor))
        .await
        .expect("create people");
    db.register_client("default", conn.clone())
        .expect("register client");
    (db, conn)
}

#[tokio::test]
async fn scenario_a_insert_and_missing_lookup() {
    let (db, conn) = setup().await;
    assert!(conn.table_rows("people").await.unwrap().is_empty());
    let people = db.model("person").unwrap();

    let jim = people
        .save(&Record::new().with("name", "Jim").with("age", 25))
        .await
        .unwrap();
    assert_eq!(jim.id(), Some(&Value::BigInt(1)));
    assert_eq!(jim.get("revision"), Some(&Value::BigInt(1)));
    assert_eq!(jim.get("name"), Some(&Value::from("Jim")));

    let err = people.get(1000).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn scenario_b_missing_required_field() {
    let (db, conn) = setup().await;
    let people = db.model("person").unwrap();

    let guard = Predicate::new().eq("name", "Jim");
    let err = people
        .save_where(&Record::new().with("name", "Jim"), &guard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(err.status_code(), 403);
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "age");
    assert_eq!(errors[0].failed_rules, vec!["required".to_string()]);
    assert!(conn.table_rows("people").await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_c_stale_copy_conflicts() {
    let (db, _conn) = setup().await;
    let people = db.model("person").unwrap();
    people
        .save(&Record::new().with("name", "Jim").with("age", 25))
        .await
        .unwrap();

    let mut p1 = people.get(1).await.unwrap();
    let mut p2 = people.get(1).await.unwrap();

    p1.set("age", 26);
    let saved = people.save(&p1).await.unwrap();
    assert_eq!(saved.get("revision"), Some(&Value::BigInt(2)));

    p2.set("age", 30);
    let err = people.save(&p2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.status_code(), 409);

    let stored = people.get(1).await.unwrap();
    assert_eq!(stored.get("age"), Some(&Value::BigInt(26)));
}

#[tokio::test]
async fn scenario_d_range_predicate() {
    let (db, _conn) = setup().await;
    let people = db.model("person").unwrap();
    for (name, age) in [("Jim", 25), ("Kim", 32), ("Tim", 32)] {
        people
            .save(&Record::new().with("name", name).with("age", age))
            .await
            .unwrap();
    }

    let predicate = Predicate::from_json(json!({"age": {"gt": 20, "lt": 32}})).unwrap();
    let found = people.all(&predicate).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name"), Some(&Value::from("Jim")));

    let in_list = Predicate::from_json(json!({"name": ["Kim", "Tim"]})).unwrap();
    assert_eq!(people.all(&in_list).await.unwrap().len(), 2);
}

#[tokio::test]
async fn scenario_e_nested_include() {
    let db = sqlite_db();
    let user = db
        .define(
            ModelDescriptor::builder("user")
                .column("name", SqlType::Text)
                .has_many("posts", "post")
                .build(),
        )
        .unwrap();
    let post = db
        .define(
            ModelDescriptor::builder("post")
                .column("title", SqlType::Text)
                .column("userId", SqlType::BigInt)
                .has_many("comments", "comment")
                .build(),
        )
        .unwrap();
    let comment = db
        .define(
            ModelDescriptor::builder("comment")
                .column("body", SqlType::Text)
                .column("postId", SqlType::BigInt)
                .build(),
        )
        .unwrap();
    let conn = SqliteConnection::memory().await.unwrap();
    for descriptor in [&user, &post, &comment] {
        conn.create_table(&TableDef::from_descriptor(descriptor))
            .await
            .unwrap();
    }
    db.register_client("default", conn.clone()).unwrap();

    let users = db.model("user").unwrap();
    let posts = db.model("post").unwrap();
    let comments = db.model("comment").unwrap();

    let ann = users.save(&Record::new().with("name", "Ann")).await.unwrap();
    let ann_id = ann.id().cloned().unwrap();
    let first = posts
        .save(&Record::new().with("title", "first").with("userId", ann_id.clone()))
        .await
        .unwrap();
    posts
        .save(&Record::new().with("title", "second").with("userId", ann_id.clone()))
        .await
        .unwrap();
    for body in ["nice", "agreed"] {
        comments
            .save(
                &Record::new()
                    .with("body", body)
                    .with("postId", first.id().cloned().unwrap()),
            )
            .await
            .unwrap();
    }

    conn.clear_statements();
    let options = QueryOptions::new().include(Include::from_json(&json!({"posts": "comments"})).unwrap());
    let loaded = users.get_with(ann_id, &options).await.unwrap();

    let loaded_posts = loaded.related_many("posts").unwrap();
    assert_eq!(loaded_posts.len(), 2);
    let by_title = |title: &str| {
        loaded_posts
            .iter()
            .find(|p| p.get("title") == Some(&Value::from(title)))
            .unwrap()
    };
    assert_eq!(by_title("first").related_many("comments").unwrap().len(), 2);
    assert_eq!(by_title("second").related_many("comments").unwrap().len(), 0);

    // One for the user, one per included relation.
    assert_eq!(conn.statement_count("SELECT"), 3);
}
