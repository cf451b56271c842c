//! Active-record ORM for SQL databases.
//!
//! Provides a fluent query builder, records with dirty tracking, declarative
//! relationships with eager and lazy loading, soft deletes, timestamps and
//! scoped transactions. Statements are executed through an
//! [`arbor_sql::Connection`].
//!
//! # Quick Start
//!
//! ## Define an Entity
//!
//! ```ignore
//! use arbor_orm::{Capability, entity};
//!
//! entity! {
//!     table = "posts",
//!     capabilities = [Capability::timestamps(), Capability::soft_deletes()],
//!     #[derive(Debug, Clone)]
//!     pub struct Post {
//!         pub id: Option<i64>,
//!         pub user_id: i64,
//!         pub title: String,
//!         pub published: bool,
//!     }
//! }
//! ```
//!
//! ## Register Relationships
//!
//! ```ignore
//! let registry = Registry::new()
//!     .relation::<User>("posts", Relation::has_many::<Post>("user_id", "id"))
//!     .relation::<Post>("author", Relation::belongs_to::<User>("user_id", "id"));
//!
//! let db = Db::new(SqliteEngine::in_memory()?, registry);
//! ```
//!
//! ## Query
//!
//! ```ignore
//! let users = db
//!     .query::<User>()
//!     .r#where("active", true)
//!     .where_has("posts", |q| q.r#where("published", true))?
//!     .include("posts")
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .fetch_all()
//!     .await?;
//!
//! for user in &users {
//!     let posts = user.relation("posts").map(Loaded::records).unwrap_or_default();
//! }
//! ```
//!
//! ## Records
//!
//! ```ignore
//! let mut post = Record::of::<Post>();
//! post.set("user_id", 1);
//! post.set("title", "Hello");
//! db.save(&mut post).await?;          // INSERT ... RETURNING *
//!
//! post.set("title", "Hello, world");
//! db.save(&mut post).await?;          // UPDATE posts SET title = ? ... WHERE id = ?
//!
//! db.delete(&mut post).await?;        // soft delete: sets deleted_at
//! db.restore(&mut post).await?;
//!
//! let typed: Post = post.decode()?;
//! ```
//!
//! ## Upserts
//!
//! ```ignore
//! db.upsert_many::<User>(
//!     vec![vec![("email", "a@example.com".into()), ("name", "Ann".into())]],
//!     &["email"],
//!     &["name"],
//! )
//! .await?;
//! // INSERT INTO "users" ("email", "name", ...) VALUES (?, ?, ...)
//! //     ON CONFLICT ("email") DO UPDATE SET "name" = "excluded"."name", ...
//! ```
//!
//! ## Custom Types
//!
//! ```ignore
//! impl FetchValue for UserId {
//!     fn decode(value: &Primitive) -> anyhow::Result<Self> {
//!         let id: String = FetchValue::decode(value)?;
//!         Ok(UserId(id))
//!     }
//! }
//! ```

#![forbid(unsafe_code)]

mod builder;
mod condition;
mod db;
mod delete;
mod entity;
mod error;
mod insert;
mod join;
mod loader;
mod paginate;
mod persist;
mod query;
mod record;
mod relation;
mod schema;
mod scope;
mod transaction;
mod update;
mod validation;
mod value;

// Re-export engine types used in bindings, rows and custom conversions.
pub use arbor_sql::{Connection, Field, Primitive, Row, SqliteEngine};

pub use self::builder::{Direction, OrderSpec, QueryBuilder};
pub use self::condition::{Condition, Joiner, Operator, Subquery};
pub use self::db::Db;
pub use self::delete::DeleteBuilder;
pub use self::entity::{Entity, FetchValue, Model};
pub use self::error::{NotFound, UsageError};
pub use self::insert::InsertBuilder;
pub use self::join::{Join, JoinKind};
pub use self::paginate::Page;
pub use self::query::Statement;
pub use self::record::{Loaded, Record};
pub use self::relation::{Pivot, Registry, Relation, RelationKind};
pub use self::schema::Schema;
pub use self::scope::{Capability, Trashed};
pub use self::update::UpdateBuilder;
pub use self::validation::{Rule, ValidationErrors, Validator};
pub use self::value::{Json, Value, encode};

// Re-exports for `entity!` macro use only.
#[doc(hidden)]
pub mod __private {
    pub use anyhow::Result;
}
