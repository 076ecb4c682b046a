//! Transport abstraction for the remote document store.
//!
//! The ToonStore server is an external collaborator: torm only needs its document endpoints, its
//! query endpoint, a raw key/value endpoint and a health probe. [`Transport`] captures exactly
//! that surface so the gateway, query builder and migration tracker can run against an HTTP
//! server (`torm-http`) or an in-process stand-in (`torm-memory`).
//!
//! # Traits
//!
//! - [`Transport`]: one async method per server endpoint
//! - [`TransportBuilder`]: factory trait for creating transport instances
//!
//! # Examples
//!
//! ```ignore
//! use torm::transport::{Transport, TransportBuilder};
//! use torm::memory::InMemoryTransport;
//!
//! let transport = InMemoryTransport::builder().build().await?;
//! let created = transport.create_document("users", document).await?;
//! let found = transport.find_document("users", "users:1").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt::Debug, sync::Arc};

use crate::{document::Document, error::TormResult, query::Query};

/// Abstract interface to a ToonStore server.
///
/// Implementations translate each call into one request and map every failure (transport or
/// non-success status) to [`TormError::Gateway`](crate::error::TormError::Gateway). Each call
/// is a single round trip; none of them retry.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Stores a new document and returns it as stored, including server-assigned fields.
    ///
    /// `POST /api/{collection}` with `{data}`.
    async fn create_document(&self, collection: &str, data: Document) -> TormResult<Document>;

    /// Returns every document in a collection.
    ///
    /// `GET /api/{collection}`.
    async fn find_documents(&self, collection: &str) -> TormResult<Vec<Document>>;

    /// Returns a single document, or `None` when the server answers 404.
    ///
    /// `GET /api/{collection}/{id}`.
    async fn find_document(&self, collection: &str, id: &str) -> TormResult<Option<Document>>;

    /// Sends a compiled query and returns the server's candidate documents.
    ///
    /// `POST /api/{collection}/query`. The caller re-filters the result; implementations may
    /// filter partially or not at all.
    async fn query_documents(&self, collection: &str, query: &Query) -> TormResult<Vec<Document>>;

    /// Writes `data` to an existing document and returns the stored result.
    ///
    /// `PUT /api/{collection}/{id}` with `{data}`.
    async fn update_document(&self, collection: &str, id: &str, data: Document) -> TormResult<Document>;

    /// Deletes a document, returning the server's `success` flag.
    ///
    /// `DELETE /api/{collection}/{id}`.
    async fn delete_document(&self, collection: &str, id: &str) -> TormResult<bool>;

    /// Returns the number of documents in a collection.
    ///
    /// `GET /api/{collection}/count`.
    async fn count_documents(&self, collection: &str) -> TormResult<u64>;

    /// Reads a raw key, returning `None` if it does not exist.
    ///
    /// `GET /api/keys/{key}`.
    async fn get_key(&self, key: &str) -> TormResult<Option<String>>;

    /// Writes a raw key.
    ///
    /// `PUT /api/keys/{key}` with `{value}`.
    async fn set_key(&self, key: &str, value: String) -> TormResult<()>;

    /// Probes the server.
    ///
    /// `GET /health`.
    async fn health(&self) -> TormResult<HealthStatus>;

    /// Returns the server's self-description.
    ///
    /// `GET /`.
    async fn info(&self) -> TormResult<Value>;
}

macro_rules! forward_transport {
    ($($wrapper:ty),* $(,)?) => {$(
        #[async_trait]
        impl<T> Transport for $wrapper
        where
            T: Transport + ?Sized,
        {
            async fn create_document(&self, collection: &str, data: Document) -> TormResult<Document> {
                (**self).create_document(collection, data).await
            }

            async fn find_documents(&self, collection: &str) -> TormResult<Vec<Document>> {
                (**self).find_documents(collection).await
            }

            async fn find_document(&self, collection: &str, id: &str) -> TormResult<Option<Document>> {
                (**self).find_document(collection, id).await
            }

            async fn query_documents(&self, collection: &str, query: &Query) -> TormResult<Vec<Document>> {
                (**self).query_documents(collection, query).await
            }

            async fn update_document(&self, collection: &str, id: &str, data: Document) -> TormResult<Document> {
                (**self).update_document(collection, id, data).await
            }

            async fn delete_document(&self, collection: &str, id: &str) -> TormResult<bool> {
                (**self).delete_document(collection, id).await
            }

            async fn count_documents(&self, collection: &str) -> TormResult<u64> {
                (**self).count_documents(collection).await
            }

            async fn get_key(&self, key: &str) -> TormResult<Option<String>> {
                (**self).get_key(key).await
            }

            async fn set_key(&self, key: &str, value: String) -> TormResult<()> {
                (**self).set_key(key, value).await
            }

            async fn health(&self) -> TormResult<HealthStatus> {
                (**self).health().await
            }

            async fn info(&self) -> TormResult<Value> {
                (**self).info().await
            }
        }
    )*};
}

forward_transport!(&T, Arc<T>, Box<T>);

/// Factory trait for constructing transports from configuration.
#[async_trait]
pub trait TransportBuilder: Send {
    /// The transport produced by this builder.
    type Transport: Transport;

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TormError::Initialization`](crate::error::TormError::Initialization) if the
    /// configuration is unusable.
    async fn build(self) -> TormResult<Self::Transport>;
}

/// The body of a health probe response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Any additional fields the server reported (e.g. `database`).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl HealthStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into(), details: Map::new() }
    }

    /// True if the server reported `ok` or `healthy`.
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "healthy")
    }
}
