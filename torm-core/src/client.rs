//! The entry point binding a transport to collections and migrations.
//!
//! # Example
//!
//! ```ignore
//! use torm::prelude::*;
//! use torm::http::HttpTransport;
//!
//! let client = TormClient::new(HttpTransport::builder().base_url("http://localhost:3001").build().await?);
//! let users = client.model("User", Schema::new().field("name", FieldRule::string().required()));
//! let count = users.count().await?;
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::{
    collection::{Collection, TypedCollection},
    document::Model,
    error::TormResult,
    migrate::MigrationTracker,
    schema::Schema,
    transport::{HealthStatus, Transport},
};

/// A client for one ToonStore server.
///
/// Cheap to clone; clones share the transport.
///
/// # Type Parameters
///
/// * `T` - The transport implementation
#[derive(Debug)]
pub struct TormClient<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Clone for TormClient<T> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone() }
    }
}

impl<T: Transport> TormClient<T> {
    /// Creates a client that owns `transport`.
    ///
    /// Use [`TormClient::from_shared`] when the transport is also used elsewhere.
    pub fn new(transport: T) -> Self {
        Self { transport: Arc::new(transport) }
    }

    /// Creates a client over a transport that is already shared.
    pub fn from_shared(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Returns the transport, for calls the client does not wrap such as raw keys.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets an untyped collection with the given name and no schema.
    pub fn collection(&self, name: impl Into<String>) -> Collection<'_, T> {
        Collection::new(name, &*self.transport)
    }

    /// Defines a model: a collection named after `name` in lowercase, validated by `schema`.
    pub fn model(&self, name: &str, schema: Schema) -> Collection<'_, T> {
        self.collection(name.to_lowercase()).with_schema(schema)
    }

    /// Gets a typed collection for `M`, using its collection name and schema.
    pub fn typed<M: Model>(&self) -> TypedCollection<'_, T, M> {
        TypedCollection::new(&*self.transport)
    }

    /// Creates an empty migration tracker bound to this client's server.
    pub fn migrations(&self) -> MigrationTracker<T> {
        MigrationTracker::new(self.transport.clone())
    }

    /// Probes the server's health endpoint.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the server cannot be reached.
    pub async fn health(&self) -> TormResult<HealthStatus> {
        self.transport.health().await
    }

    /// Returns the server's self-description.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the server cannot be reached.
    pub async fn info(&self) -> TormResult<Value> {
        self.transport.info().await
    }
}
