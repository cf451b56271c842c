//! Integration tests for saving, validating and decoding records.

#![allow(missing_docs)]

mod common;

use arbor_orm::{Entity, NotFound, Primitive, Record, UsageError, ValidationErrors, Value};
use chrono::{DateTime, Utc};
use common::{Member, Post, User, assert_sql_contains, post, setup, user};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn insert_takes_back_generated_key_and_timestamps() {
    let (db, log) = setup().await;

    let mut record = Record::of::<User>();
    record.set("name", "Ada");
    assert!(!record.exists());
    assert!(record.is_dirty());

    db.save(&mut record).await.unwrap();

    assert!(record.exists());
    assert!(!record.is_dirty());
    assert_eq!(record.get_as::<i64>("id").unwrap(), 1);
    assert!(record.get_as::<bool>("active").unwrap());
    let created: DateTime<Utc> = record.get_as("created_at").unwrap();
    let updated: DateTime<Utc> = record.get_as("updated_at").unwrap();
    assert_eq!(created, updated);
    assert_sql_contains(&log.all()[0], &["INSERT INTO users", "RETURNING *"]);
}

#[tokio::test]
async fn update_writes_only_changed_columns() {
    let (db, log) = setup().await;
    let id = user(&db, "Ada").await;
    let mut record = db.find::<User>(id).await.unwrap().unwrap();
    let created = record.get("created_at").cloned();
    log.clear();

    record.set("name", "Ada Lovelace");
    assert_eq!(record.dirty_columns().collect::<Vec<_>>(), vec!["name"]);
    db.save(&mut record).await.unwrap();

    let statements = log.all();
    assert_eq!(statements.len(), 1);
    assert_sql_contains(&statements[0], &["UPDATE users SET name = ?, updated_at = ?", "id = ?"]);
    assert_eq!(record.get("created_at").cloned(), created);

    let stored = db.find::<User>(id).await.unwrap().unwrap();
    assert_eq!(stored.get_as::<String>("name").unwrap(), "Ada Lovelace");
}

#[tokio::test]
async fn saving_a_clean_record_does_nothing() {
    let (db, log) = setup().await;
    let id = user(&db, "Ada").await;
    let mut record = db.find::<User>(id).await.unwrap().unwrap();
    log.clear();

    record.set("name", "Ada");
    assert!(!record.is_dirty());
    db.save(&mut record).await.unwrap();

    assert!(log.all().is_empty());
}

#[tokio::test]
async fn validation_failures_block_the_write() {
    let (db, log) = setup().await;

    let mut member = Record::of::<Member>();
    member.set("name", "A");
    member.set("age", 12);
    let err = db.save(&mut member).await.unwrap_err();

    let errors = err.downcast_ref::<ValidationErrors>().unwrap();
    assert_eq!(errors.get("name"), Some(&["must be at least 2 characters".to_string()][..]));
    assert_eq!(errors.get("age"), Some(&["must be at least 18".to_string()][..]));
    assert!(!member.exists());
    assert!(log.all().is_empty());

    member.set("name", "Ann");
    member.set("age", 30);
    db.save(&mut member).await.unwrap();
    assert!(member.exists());
}

#[tokio::test]
async fn transforms_run_on_assignment() {
    let (db, _) = setup().await;

    let mut member = Record::of::<Member>();
    member.set("name", "Ann");
    member.set("email", "  Ann@Example.COM ");
    db.save(&mut member).await.unwrap();

    let stored = db.query::<Member>().first_or_fail().await.unwrap();
    assert_eq!(stored.get_as::<String>("email").unwrap(), "ann@example.com");
}

#[tokio::test]
async fn typed_entities_round_trip() {
    let (db, _) = setup().await;
    let ada = User {
        id: None,
        name: "Ada".to_string(),
        email: Some("ada@example.com".to_string()),
        active: false,
    };

    let record = db.create(&ada).await.unwrap();
    let id: i64 = record.get_as("id").unwrap();
    let stored: User = db.find::<User>(id).await.unwrap().unwrap().decode().unwrap();

    assert_eq!(stored, User { id: Some(1), ..ada });
}

#[tokio::test]
async fn find_or_create_is_idempotent() {
    let (db, _) = setup().await;

    let first = db
        .find_or_create::<User>(
            vec![("email", "ada@example.com".into())],
            vec![("name", "Ada".into())],
        )
        .await
        .unwrap();
    let second = db
        .find_or_create::<User>(
            vec![("email", "ada@example.com".into())],
            vec![("name", "Someone else".into())],
        )
        .await
        .unwrap();

    assert_eq!(first.key(), second.key());
    assert_eq!(second.get_as::<String>("name").unwrap(), "Ada");
    assert_eq!(db.query::<User>().count().await.unwrap(), 1);
}

fn rows(people: &[(&str, &str)]) -> Vec<Vec<(&'static str, Value)>> {
    people
        .iter()
        .map(|(name, email)| vec![("name", Value::from(*name)), ("email", Value::from(*email))])
        .collect()
}

#[tokio::test]
async fn bulk_insert_and_upsert() {
    let (db, _) = setup().await;

    let inserted = db
        .insert_many::<User>(rows(&[("Ada", "ada@example.com"), ("Bob", "bob@example.com")]))
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    db.upsert_many::<User>(
        rows(&[("Ada L.", "ada@example.com"), ("Cy", "cy@example.com")]),
        &["email"],
        &["name"],
    )
    .await
    .unwrap();

    assert_eq!(db.query::<User>().count().await.unwrap(), 3);
    let ada = db.query::<User>().r#where("email", "ada@example.com").first_or_fail().await.unwrap();
    assert_eq!(ada.get_as::<String>("name").unwrap(), "Ada L.");
    assert!(ada.get_as::<Option<DateTime<Utc>>>("created_at").unwrap().is_some());

    assert_eq!(db.insert_many::<User>(Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn bulk_insert_keeps_columns_from_every_row() {
    let (db, _) = setup().await;

    let inserted = db
        .insert_many::<User>(vec![
            vec![("name", Value::from("Ada"))],
            vec![("name", Value::from("Bob")), ("email", Value::from("bob@example.com"))],
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let bob = db.query::<User>().r#where("name", "Bob").first_or_fail().await.unwrap();
    assert_eq!(bob.get_as::<Option<String>>("email").unwrap().as_deref(), Some("bob@example.com"));
    let ada = db.query::<User>().r#where("name", "Ada").first_or_fail().await.unwrap();
    assert_eq!(ada.get("email"), Some(&Primitive::Null));
}

#[tokio::test]
async fn save_many_is_all_or_nothing() {
    let (db, _) = setup().await;

    let members = |names: &[&str]| -> Vec<Record> {
        names
            .iter()
            .map(|name| {
                let mut member = Record::of::<Member>();
                member.set("name", *name);
                member
            })
            .collect()
    };

    assert!(db.save_many(&mut members(&["Ann", "B"])).await.is_err());
    assert_eq!(db.query::<Member>().count().await.unwrap(), 0);

    db.save_many(&mut members(&["Ann", "Bea"])).await.unwrap();
    assert_eq!(db.query::<Member>().count().await.unwrap(), 2);
}

#[tokio::test]
async fn missing_rows_and_keys() {
    let (db, _) = setup().await;

    let err = db.query::<User>().r#where("name", "nobody").first_or_fail().await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<NotFound>(),
        Some(&NotFound {
            table: "users".to_string()
        })
    );

    let mut unsaved = Record::of::<User>();
    let err = db.force_delete(&mut unsaved).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<UsageError>(),
        Some(UsageError::MissingPrimaryKey { .. })
    ));
}

#[tokio::test]
async fn engine_errors_propagate() {
    let (db, _) = setup().await;
    user(&db, "Ada").await;

    // duplicate email violates the unique index
    let mut duplicate = Record::of::<User>();
    duplicate.set("name", "Other");
    duplicate.set("email", "ada@example.com");
    assert!(db.save(&mut duplicate).await.is_err());
    assert!(!duplicate.exists());

    assert!(db.select("SELECT * FROM missing_table", Vec::new()).await.is_err());
}

#[test]
fn entity_values_follow_declaration_order() {
    let draft = Post {
        id: None,
        user_id: Some(7),
        title: "Hello".to_string(),
        published: true,
    };
    let columns: Vec<&str> = draft.to_values().into_iter().map(|(column, _)| column).collect();
    assert_eq!(columns, vec!["id", "user_id", "title", "published"]);

    let record = Record::from_entity(&draft);
    assert_eq!(record.get("published"), Some(&Primitive::Integer(1)));
    assert_eq!(record.get("id"), Some(&Primitive::Null));
}

#[tokio::test]
async fn query_updates_return_affected_rows() {
    let (db, _) = setup().await;
    post(&db, None, "a", false).await;
    post(&db, None, "b", false).await;

    let affected = db
        .query::<Post>()
        .r#where("title", "a")
        .update(vec![("title", "A".into()), ("published", true.into())])
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert!(db.query::<Post>().r#where("title", "A").r#where("published", true).exists().await.unwrap());
}
