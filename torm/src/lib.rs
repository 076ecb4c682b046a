//! Main torm crate: a validating, query-building client for ToonStore document servers.
//!
//! This crate is the primary entry point for users of torm. It re-exports the core types from
//! the sub-crates and provides access to the available transports.
//!
//! # Features
//!
//! - **Local validation** - Schemas are checked before any request leaves the process
//! - **Chainable queries** - Filters, sort and paging compiled to the server's query endpoint, with
//!   results re-checked on the client
//! - **Typed models** - Serde types mapped to collections through [`document::Model`]
//! - **Migrations** - Ordered, reversible steps whose applied state lives on the server
//!
//! # Quick Start
//!
//! ```ignore
//! use torm::{prelude::*, memory::InMemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> TormResult<()> {
//!     let client = TormClient::new(InMemoryTransport::builder().build().await?);
//!
//!     let users = client.model(
//!         "Users",
//!         Schema::new()
//!             .field("name", FieldRule::string().required().min_length(3))
//!             .field("email", FieldRule::string().email())
//!             .field("age", FieldRule::integer().min(13.0).max(120.0)),
//!     );
//!
//!     users.create(into_document(json!({"name": "Alice", "email": "alice@example.com", "age": 30}))?).await?;
//!
//!     let adults = users
//!         .query()
//!         .filter("age", Operator::Gte, 18)
//!         .sort("name", SortOrder::Asc)
//!         .limit(10)
//!         .execute()
//!         .await?;
//!
//!     println!("{adults:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Migrations
//!
//! ```ignore
//! use torm::prelude::*;
//!
//! struct CreateUsers;
//!
//! #[async_trait]
//! impl MigrationAction for CreateUsers {
//!     async fn run(&self, op: &MigrateOp<'_>) -> TormResult<()> {
//!         op.collection("users").create(into_document(json!({"id": "admin", "name": "admin"}))?).await?;
//!         Ok(())
//!     }
//! }
//!
//! let mut migrations = client.migrations();
//! migrations.register(
//!     "001",
//!     "create_users",
//!     CreateUsers,
//!     action_fn(|op| Box::pin(async move {
//!         op.collection("users").delete("admin").await?;
//!         Ok(())
//!     })),
//! )?;
//!
//! println!("applied: {:?}", migrations.migrate().await?);
//! for (id, status) in migrations.status().await {
//!     println!("{id}: {status}");
//! }
//! ```
//!
//! # Transports
//!
//! - [`memory`] - In-process stand-in server for development and testing
//! - [`http`] - The ToonStore HTTP API (requires the `http` feature, on by default)

pub mod prelude;

pub use torm_core::{client, collection, document, error, migrate, query, schema, transport};

// Re-exported for building documents and implementing actions
pub use async_trait::async_trait;
pub use serde_json;

/// In-memory transport implementations.
pub mod memory {
    pub use torm_memory::{InMemoryTransport, InMemoryTransportBuilder};
}

/// HTTP transport implementations.
///
/// This module is only available when the `http` feature is enabled.
#[cfg(feature = "http")]
pub mod http {
    pub use torm_http::{HttpTransport, HttpTransportBuilder, transport::DEFAULT_BASE_URL};

    use torm_core::{client::TormClient, error::TormResult, transport::TransportBuilder};

    /// Connects a client to the server at `base_url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`TormError::Initialization`](torm_core::error::TormError::Initialization) if the
    /// URL is invalid.
    pub async fn connect(base_url: &str) -> TormResult<TormClient<HttpTransport>> {
        Ok(TormClient::new(HttpTransport::builder().base_url(base_url).build().await?))
    }

    /// Connects a client configured from `TORM_URL` and `TORM_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`TormError::Initialization`](torm_core::error::TormError::Initialization) if the
    /// configured URL is invalid.
    pub async fn connect_from_env() -> TormResult<TormClient<HttpTransport>> {
        Ok(TormClient::new(HttpTransportBuilder::from_env().build().await?))
    }
}
