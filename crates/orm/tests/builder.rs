//! Integration tests for SQL compiled by the query builder.
//!
//! Tests the public API as users would interact with it.

#![allow(missing_docs)]

mod common;

use arbor_orm::{Join, Operator, Primitive, UsageError, Value};
use common::{Node, Post, Product, User, assert_sql_contains, offline};
use pretty_assertions::assert_eq;

fn text(value: &str) -> Primitive {
    Primitive::Text(value.to_string())
}

#[test]
fn conjunction_of_equality_membership_and_range() {
    let query = offline()
        .query::<Product>()
        .r#where("active", true)
        .where_in("category", ["A", "B"])
        .where_between("price", 10, 50);

    assert_eq!(
        query.to_sql(),
        "SELECT * FROM products WHERE active = ? AND category IN (?, ?) AND price BETWEEN ? AND ?"
    );
    assert_eq!(
        query.get_bindings(),
        vec![
            Primitive::Integer(1),
            text("A"),
            text("B"),
            Primitive::Integer(10),
            Primitive::Integer(50),
        ]
    );
}

#[test]
fn raw_projection_bindings_come_first() {
    let query = offline()
        .table("orders")
        .select(["id"])
        .select_raw("price * ? AS taxed", [1.2])
        .r#where("status", "paid")
        .or_where_null("refunded_at")
        .where_op("total", Operator::Gt, 100);

    assert_eq!(
        query.to_sql(),
        "SELECT id, price * ? AS taxed FROM orders WHERE status = ? OR refunded_at IS NULL AND total > ?"
    );
    assert_eq!(
        query.get_bindings(),
        vec![Primitive::Real(1.2), text("paid"), Primitive::Integer(100)]
    );
}

#[test]
fn grouping_ordering_and_paging() {
    let query = offline()
        .table("orders")
        .select(["status"])
        .select_raw("COUNT(*) AS n", Vec::<Value>::new())
        .group_by(["status"])
        .order_by_desc("n")
        .order_by_raw("status COLLATE NOCASE")
        .limit(10)
        .offset(20);

    assert_eq!(
        query.to_sql(),
        "SELECT status, COUNT(*) AS n FROM orders GROUP BY status \
         ORDER BY n DESC, status COLLATE NOCASE LIMIT 10 OFFSET 20"
    );
    assert!(query.get_bindings().is_empty());
}

#[test]
fn offset_without_limit() {
    let sql = offline().table("orders").skip(5).to_sql();
    assert_eq!(sql, "SELECT * FROM orders LIMIT -1 OFFSET 5");
}

#[test]
fn oversized_paging_is_clamped_to_the_engine_range() {
    let sql = offline().table("orders").take(u64::MAX).skip(u64::MAX).to_sql();
    assert_eq!(sql, "SELECT * FROM orders LIMIT 9223372036854775807 OFFSET 9223372036854775807");
}

#[test]
fn nested_groups_are_parenthesized() {
    let query = offline()
        .table("orders")
        .r#where("region", "eu")
        .where_group(|q| q.r#where("status", "paid").or_where_op("total", Operator::Gte, 500));

    assert_eq!(query.to_sql(), "SELECT * FROM orders WHERE region = ? AND (status = ? OR total >= ?)");
    assert_eq!(query.get_bindings(), vec![text("eu"), text("paid"), Primitive::Integer(500)]);
}

#[test]
fn empty_groups_are_dropped() {
    let query = offline().table("orders").r#where("region", "eu").where_group(|q| q);
    assert_eq!(query.to_sql(), "SELECT * FROM orders WHERE region = ?");

    let query = offline().table("orders").or_where_group(|q| q.where_group(|q| q));
    assert_eq!(query.to_sql(), "SELECT * FROM orders");
}

#[test]
fn empty_membership_list() {
    let query = offline().table("orders").where_in("id", Vec::<i64>::new());
    assert_eq!(query.to_sql(), "SELECT * FROM orders WHERE id IN ()");
    assert!(query.get_bindings().is_empty());
}

#[test]
fn negated_predicates() {
    let query = offline()
        .table("orders")
        .where_not_in("status", ["void"])
        .where_not_between("total", 1, 5)
        .where_not_null("paid_at")
        .where_op("note", Operator::NotLike, "%test%");

    assert_eq!(
        query.to_sql(),
        "SELECT * FROM orders WHERE status NOT IN (?) AND total NOT BETWEEN ? AND ? \
         AND paid_at IS NOT NULL AND note NOT LIKE ?"
    );
    assert_eq!(query.get_bindings().len(), 4);
}

#[test]
fn raw_condition_is_verbatim() {
    let query = offline()
        .table("orders")
        .where_raw("total > discount * ?", [2])
        .or_where_raw("LENGTH(note) = 0", Vec::<Value>::new());

    assert_eq!(query.to_sql(), "SELECT * FROM orders WHERE total > discount * ? OR LENGTH(note) = 0");
    assert_eq!(query.get_bindings(), vec![Primitive::Integer(2)]);
}

#[test]
fn joins_render_in_order() {
    let query = offline()
        .table("posts")
        .select(["posts.title", "u.name"])
        .join(Join::left("users", "u.id", "posts.user_id").alias("u"))
        .join(Join::inner("comments", "comments.post_id", "posts.id"))
        .with_trashed();

    assert_sql_contains(
        &query.to_sql(),
        &[
            "SELECT posts.title, u.name FROM posts",
            "LEFT JOIN users AS u ON u.id = posts.user_id",
            "INNER JOIN comments ON comments.post_id = posts.id",
        ],
    );
}

#[test]
fn values_are_encoded_as_bindings() {
    let at = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap();
    let query = offline()
        .table("events")
        .r#where("occurred_at", at)
        .r#where("tags", Value::list(["a", "b"]))
        .r#where("missing", Option::<i64>::None);

    assert_eq!(
        query.get_bindings(),
        vec![text("2024-01-02T03:04:05Z"), text(r#"["a","b"]"#), Primitive::Null]
    );
}

#[test]
fn has_relation() {
    let sql = offline().query::<User>().has("posts").unwrap().to_sql();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE EXISTS \
         (SELECT * FROM posts WHERE posts.user_id = users.id AND posts.deleted_at IS NULL)"
    );
}

#[test]
fn where_has_places_constraints_before_related_scope() {
    let query = offline()
        .query::<User>()
        .r#where("active", true)
        .where_has("posts", |q| q.r#where("published", true))
        .unwrap();

    assert_eq!(
        query.to_sql(),
        "SELECT * FROM users WHERE active = ? AND EXISTS (SELECT * FROM posts \
         WHERE posts.user_id = users.id AND published = ? AND posts.deleted_at IS NULL)"
    );
    assert_eq!(query.get_bindings(), vec![Primitive::Integer(1), Primitive::Integer(1)]);
}

#[test]
fn has_count_binds_threshold_last() {
    let query = offline()
        .query::<User>()
        .where_has_count("posts", Operator::Gte, 2, |q| q.r#where("published", true))
        .unwrap();

    assert_eq!(
        query.to_sql(),
        "SELECT * FROM users WHERE (SELECT COUNT(*) FROM posts WHERE posts.user_id = users.id \
         AND published = ? AND posts.deleted_at IS NULL) >= ?"
    );
    assert_eq!(query.get_bindings(), vec![Primitive::Integer(1), Primitive::Integer(2)]);
}

#[test]
fn doesnt_have_through_pivot() {
    let sql = offline().query::<User>().doesnt_have("roles").unwrap().to_sql();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE NOT EXISTS (SELECT * FROM roles \
         INNER JOIN role_user ON role_user.role_id = roles.id WHERE role_user.user_id = users.id)"
    );
}

#[test]
fn belongs_to_existence() {
    let sql = offline().query::<Post>().has("author").unwrap().to_sql();
    assert_eq!(
        sql,
        "SELECT * FROM posts WHERE EXISTS (SELECT * FROM users WHERE users.id = posts.user_id) \
         AND posts.deleted_at IS NULL"
    );
}

#[test]
fn self_referencing_existence_aliases_the_related_table() {
    let sql = offline().query::<Node>().has("children").unwrap().to_sql();
    assert_eq!(
        sql,
        "SELECT * FROM nodes WHERE EXISTS (SELECT * FROM nodes AS related_nodes \
         WHERE related_nodes.parent_id = nodes.id AND related_nodes.deleted_at IS NULL) \
         AND nodes.deleted_at IS NULL"
    );
}

#[test]
fn nested_self_references_correlate_with_their_parent() {
    let sql = offline().query::<Node>().where_has("children", |q| q.has("children").unwrap()).unwrap().to_sql();
    assert_eq!(
        sql,
        "SELECT * FROM nodes WHERE EXISTS (SELECT * FROM nodes AS related_nodes \
         WHERE related_nodes.parent_id = nodes.id \
         AND EXISTS (SELECT * FROM nodes WHERE nodes.parent_id = related_nodes.id \
         AND nodes.deleted_at IS NULL) \
         AND related_nodes.deleted_at IS NULL) \
         AND nodes.deleted_at IS NULL"
    );
}

#[test]
fn unknown_relation_is_a_usage_error() {
    let err = offline().query::<User>().has("followers").unwrap_err();
    assert_eq!(
        err.downcast_ref::<UsageError>(),
        Some(&UsageError::UnknownRelation {
            table: "users".to_string(),
            relation: "followers".to_string(),
        })
    );
}

#[test]
fn compiling_twice_is_stable() {
    let query = offline().query::<Post>().r#where("published", true).order_by_asc("id").take(3);
    assert_eq!(query.compile(), query.compile());
}
