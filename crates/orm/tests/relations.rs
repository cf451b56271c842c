//! Integration tests for relationship loading.

#![allow(missing_docs)]

mod common;

use arbor_orm::{Db, Loaded, Operator, Record};
use common::{Comment, Log, Node, Post, Role, User, post, setup, user};
use pretty_assertions::assert_eq;

struct Fixture {
    db: Db,
    log: Log,
    ada: i64,
    bob: i64,
    first: i64,
}

async fn fixture() -> Fixture {
    let (db, log) = setup().await;
    let ada = user(&db, "Ada").await;
    let bob = user(&db, "Bob").await;
    let first = post(&db, Some(ada), "First", true).await;
    post(&db, Some(ada), "Second", false).await;
    post(&db, Some(bob), "Third", true).await;
    post(&db, None, "Orphan", false).await;

    for body in ["nice", "agreed"] {
        let mut comment = Record::of::<Comment>();
        comment.set("post_id", first);
        comment.set("body", body);
        db.save(&mut comment).await.unwrap();
    }

    for name in ["admin", "editor"] {
        let mut role = Record::of::<Role>();
        role.set("name", name);
        db.save(&mut role).await.unwrap();
    }
    db.execute(
        "INSERT INTO role_user (user_id, role_id) VALUES (?, 1), (?, 2), (?, 2)",
        vec![ada.into(), ada.into(), bob.into()],
    )
    .await
    .unwrap();

    log.clear();
    Fixture { db, log, ada, bob, first }
}

fn titles(loaded: Option<&Loaded>) -> Vec<String> {
    loaded
        .map(Loaded::records)
        .unwrap_or_default()
        .into_iter()
        .map(|record| record.get_as::<String>("title").unwrap())
        .collect()
}

#[tokio::test]
async fn eager_loading_uses_one_query_per_relation() {
    let f = fixture().await;

    let users = f.db.query::<User>().include("posts").order_by_asc("id").fetch_all().await.unwrap();

    let selects = f.log.selects();
    assert_eq!(selects.len(), 2);
    assert!(selects[1].contains("WHERE posts.user_id IN (?, ?) AND posts.deleted_at IS NULL"));
    assert_eq!(titles(users[0].relation("posts")), vec!["First", "Second"]);
    assert_eq!(titles(users[1].relation("posts")), vec!["Third"]);
}

#[tokio::test]
async fn eager_and_lazy_loading_agree() {
    let f = fixture().await;

    let eager = f.db.query::<User>().include("posts").include("roles").fetch_all().await.unwrap();
    let mut lazy = f.db.query::<User>().fetch_all().await.unwrap();

    for (eager, lazy) in eager.iter().zip(lazy.iter_mut()) {
        for name in ["posts", "roles"] {
            let loaded = lazy.related(&f.db, name).await.unwrap().clone();
            assert_eq!(eager.relation(name), Some(&loaded));
        }
    }
}

#[tokio::test]
async fn lazy_loading_is_memoized() {
    let f = fixture().await;
    let mut ada = f.db.query::<User>().find(f.ada).await.unwrap().unwrap();
    f.log.clear();

    let first = ada.related(&f.db, "posts").await.unwrap().records().len();
    let second = ada.related(&f.db, "posts").await.unwrap().records().len();

    assert_eq!((first, second), (2, 2));
    assert_eq!(f.log.selects().len(), 1);

    ada.unset_relation("posts");
    ada.related(&f.db, "posts").await.unwrap();
    assert_eq!(f.log.selects().len(), 2);
}

#[tokio::test]
async fn already_loaded_relations_are_not_reloaded() {
    let f = fixture().await;
    let mut users = f.db.query::<User>().include("posts").fetch_all().await.unwrap();
    f.log.clear();

    users[0].related(&f.db, "posts").await.unwrap();
    assert!(f.log.selects().is_empty());
}

#[tokio::test]
async fn many_to_many_strips_pivot_alias() {
    let f = fixture().await;

    let users = f.db.query::<User>().include("roles").order_by_asc("id").fetch_all().await.unwrap();

    let roles = users[0].relation("roles").unwrap().records();
    let names: Vec<String> = roles.iter().map(|r| r.get_as("name").unwrap()).collect();
    assert_eq!(names, vec!["admin", "editor"]);
    assert!(roles.iter().all(|r| r.get("pivot_user_id").is_none()));

    let bob: Vec<Role> = users[1]
        .relation("roles")
        .unwrap()
        .records()
        .into_iter()
        .map(|r| r.decode().unwrap())
        .collect();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].name, "editor");
    assert_eq!(users[1].get_as::<i64>("id").unwrap(), f.bob);
}

#[tokio::test]
async fn null_owner_key_loads_nothing() {
    let f = fixture().await;

    let posts = f.db.query::<Post>().include("author").order_by_asc("id").fetch_all().await.unwrap();
    let orphan = posts.last().unwrap();
    assert_eq!(orphan.relation("author"), Some(&Loaded::One(None)));

    let mut orphan = orphan.clone();
    orphan.unset_relation("author");
    f.log.clear();
    assert!(orphan.related(&f.db, "author").await.unwrap().one().is_none());
    assert!(f.log.selects().is_empty());
}

#[tokio::test]
async fn belongs_to_and_has_one() {
    let f = fixture().await;
    f.db.execute("INSERT INTO profiles (user_id, bio) VALUES (?, 'mathematician')", vec![f.ada.into()])
        .await
        .unwrap();

    let mut first = f.db.query::<Post>().find(f.first).await.unwrap().unwrap();
    let author = first.related(&f.db, "author").await.unwrap().one().cloned().unwrap();
    assert_eq!(author.get_as::<String>("name").unwrap(), "Ada");

    let users = f.db.query::<User>().include("profile").order_by_asc("id").fetch_all().await.unwrap();
    let bio = users[0].relation("profile").and_then(Loaded::one).map(|p| p.get_as::<String>("bio").unwrap());
    assert_eq!(bio.as_deref(), Some("mathematician"));
    assert_eq!(users[1].relation("profile"), Some(&Loaded::One(None)));
}

#[tokio::test]
async fn unknown_includes_are_skipped() {
    let f = fixture().await;

    let users = f.db.query::<User>().include("followers").include("posts").fetch_all().await.unwrap();

    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| !u.relation_loaded("followers")));
    assert!(users.iter().all(|u| u.relation_loaded("posts")));
}

#[tokio::test]
async fn lazy_loading_an_unknown_relation_fails() {
    let f = fixture().await;
    let mut ada = f.db.query::<User>().find(f.ada).await.unwrap().unwrap();
    assert!(ada.related(&f.db, "followers").await.is_err());
}

#[tokio::test]
async fn nested_includes_load_each_level_once() {
    let f = fixture().await;

    let users = f
        .db
        .query::<User>()
        .include("posts.comments")
        .order_by_asc("id")
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(f.log.selects().len(), 3);
    let posts = users[0].relation("posts").unwrap().records();
    let bodies: Vec<String> = posts[0]
        .relation("comments")
        .unwrap()
        .records()
        .iter()
        .map(|c| c.get_as("body").unwrap())
        .collect();
    assert_eq!(bodies, vec!["nice", "agreed"]);
    assert!(posts.iter().all(|p| p.relation_loaded("comments")));
}

#[tokio::test]
async fn soft_deleted_related_rows_are_hidden() {
    let f = fixture().await;
    let mut first = f.db.query::<Post>().find(f.first).await.unwrap().unwrap();
    f.db.delete(&mut first).await.unwrap();

    let mut ada = f.db.query::<User>().find(f.ada).await.unwrap().unwrap();
    let posts = ada.related(&f.db, "posts").await.unwrap();
    assert_eq!(titles(Some(posts)), vec!["Second"]);
}

async fn node(db: &Db, parent: Option<i64>, name: &str) -> i64 {
    let mut record = Record::of::<Node>();
    record.set("parent_id", parent);
    record.set("name", name);
    db.save(&mut record).await.unwrap();
    record.get_as("id").unwrap()
}

fn ids(records: &[Record]) -> Vec<i64> {
    records.iter().map(|r| r.get_as("id").unwrap()).collect()
}

#[tokio::test]
async fn self_referencing_existence_filters() {
    let (db, _) = setup().await;
    let root = node(&db, None, "root").await;
    let branch = node(&db, Some(root), "branch").await;
    let leaf = node(&db, Some(branch), "leaf").await;
    let pruned = node(&db, Some(leaf), "pruned").await;
    let mut record = db.find::<Node>(pruned).await.unwrap().unwrap();
    db.delete(&mut record).await.unwrap();

    let parents = db.query::<Node>().has("children").unwrap().order_by_asc("id").fetch_all().await.unwrap();
    assert_eq!(ids(&parents), vec![root, branch]);

    let childless = db.query::<Node>().doesnt_have("children").unwrap().fetch_all().await.unwrap();
    assert_eq!(ids(&childless), vec![leaf]);

    let named = db
        .query::<Node>()
        .where_has("children", |q| q.r#where("name", "leaf"))
        .unwrap()
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&named), vec![branch]);

    let grandparents = db
        .query::<Node>()
        .where_has("children", |q| q.has("children").unwrap())
        .unwrap()
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&grandparents), vec![root]);

    let counted = db.query::<Node>().has_count("children", Operator::Gte, 1).unwrap().count().await.unwrap();
    assert_eq!(counted, 2);

    let rooted = db.query::<Node>().has("parent").unwrap().order_by_asc("id").fetch_all().await.unwrap();
    assert_eq!(ids(&rooted), vec![branch, leaf]);
}
