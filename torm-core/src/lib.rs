//! A validating, query-building client for ToonStore document servers.
//!
//! This crate is the core of the torm project and provides:
//!
//! - **Documents and models** ([`document`]) - Untyped documents and the typed [`Model`](document::Model) trait
//! - **Schema validation** ([`schema`]) - Field rules checked locally before every write
//! - **Query building** ([`query`]) - Filter clauses, sorting and client-side re-evaluation
//! - **Transport abstraction** ([`transport`]) - The server endpoints torm depends on
//! - **Collections** ([`collection`]) - The validating CRUD gateway and chainable queries
//! - **Client** ([`client`]) - Entry point binding a transport to collections and migrations
//! - **Migrations** ([`migrate`]) - Ordered, reversible steps with server-side applied state
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use torm::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: Option<String>,
//!     pub name: String,
//! }
//!
//! impl Model for User {
//!     fn collection_name() -> &'static str {
//!         "users"
//!     }
//! }
//!
//! let users = client.typed::<User>();
//! let alice = users.create(&User { id: None, name: "Alice".into() }).await?;
//! ```

pub mod client;
pub mod collection;
pub mod document;
pub mod error;
pub mod migrate;
pub mod query;
pub mod schema;
pub mod transport;

#[cfg(test)]
mod testing;
