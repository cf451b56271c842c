#![doc = include_str!("../README.md")]

//! # SQL Execution Boundary
//!
//! This crate defines the narrow interface the ORM consumes from a SQL
//! engine, and the primitive value and row types that cross it.

#![forbid(unsafe_code)]

mod connection;
pub mod sqlite;
mod types;

pub use self::connection::{Backend, Connection, FromEnv, FutureResult};
pub use self::sqlite::{ConnectOptions, SqliteEngine};
pub use self::types::{Field, Primitive, Row};
