//! In-process stand-in for a ToonStore server.
//!
//! Documents are kept per collection in insertion order, raw keys in a flat map, all behind
//! async-aware read-write locks.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use torm_core::{
    document::{Document, ID_FIELD, document_id},
    error::{TormError, TormResult},
    query::Query,
    transport::{HealthStatus, Transport, TransportBuilder},
};

use crate::evaluator::{DocumentEvaluator, sort_documents};

type CollectionMap = HashMap<String, Vec<Document>>;
type KeyMap = HashMap<String, String>;

/// Which parts of a query the stand-in server applies itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ServerOptions {
    filtering: bool,
    sorting: bool,
    paging: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { filtering: true, sorting: true, paging: true }
    }
}

/// Thread-safe in-memory implementation of [`Transport`].
///
/// Clones share the same data. New documents without a string `id` get one of the form
/// `{collection}:{uuid}`. Updates merge the given fields into the stored document.
///
/// # Example
///
/// ```ignore
/// use torm_memory::InMemoryTransport;
/// use torm_core::client::TormClient;
///
/// let client = TormClient::new(InMemoryTransport::new());
/// let users = client.collection("users");
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryTransport {
    collections: Arc<RwLock<CollectionMap>>,
    keys: Arc<RwLock<KeyMap>>,
    options: ServerOptions,
}

impl InMemoryTransport {
    /// Creates an empty store that evaluates queries fully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for configuring how much of a query the store applies.
    pub fn builder() -> InMemoryTransportBuilder {
        InMemoryTransportBuilder::default()
    }

    fn not_found(operation: &str, collection: &str, id: &str) -> TormError {
        TormError::gateway_status(operation, 404, format!("Document {collection}/{id} not found"))
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn create_document(&self, collection: &str, mut data: Document) -> TormResult<Document> {
        let id = match document_id(&data) {
            Some(id) => id.to_string(),
            None => {
                let id = format!("{collection}:{}", Uuid::new_v4());
                data.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();

        if documents.iter().any(|doc| document_id(doc) == Some(id.as_str())) {
            return Err(TormError::gateway_status(
                "create",
                409,
                format!("Document {collection}/{id} already exists"),
            ));
        }

        debug!(collection, id = %id, "stored document");
        documents.push(data.clone());

        Ok(data)
    }

    async fn find_documents(&self, collection: &str) -> TormResult<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_document(&self, collection: &str, id: &str) -> TormResult<Option<Document>> {
        let collections = self.collections.read().await;

        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|doc| document_id(doc) == Some(id)))
            .cloned())
    }

    async fn query_documents(&self, collection: &str, query: &Query) -> TormResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let documents = match collections.get(collection) {
            Some(documents) => documents,
            None => return Ok(vec![]),
        };

        let mut candidates = if self.options.filtering {
            DocumentEvaluator::filter_documents(documents, &query.filters)
        } else {
            documents.clone()
        };

        if let (true, Some(sort)) = (self.options.sorting, &query.sort) {
            sort_documents(&mut candidates, sort);
        }

        if !self.options.paging {
            return Ok(candidates);
        }

        Ok(candidates
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn update_document(&self, collection: &str, id: &str, data: Document) -> TormResult<Document> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.iter_mut().find(|doc| document_id(doc) == Some(id)))
            .ok_or_else(|| Self::not_found("update", collection, id))?;

        document.extend(data);
        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        Ok(document.clone())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> TormResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(false);
        };

        let before = documents.len();
        documents.retain(|doc| document_id(doc) != Some(id));

        Ok(documents.len() < before)
    }

    async fn count_documents(&self, collection: &str) -> TormResult<u64> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, |documents| documents.len() as u64))
    }

    async fn get_key(&self, key: &str) -> TormResult<Option<String>> {
        Ok(self.keys.read().await.get(key).cloned())
    }

    async fn set_key(&self, key: &str, value: String) -> TormResult<()> {
        self.keys.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn health(&self) -> TormResult<HealthStatus> {
        let mut status = HealthStatus::new("ok");
        status.details.insert("database".into(), json!("connected"));
        Ok(status)
    }

    async fn info(&self) -> TormResult<Value> {
        let collections = self.collections.read().await;
        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();

        Ok(json!({
            "name": "ToonStore (in-memory)",
            "version": env!("CARGO_PKG_VERSION"),
            "status": "running",
            "collections": names,
        }))
    }
}

/// Builder for [`InMemoryTransport`] instances.
///
/// By default the store applies filters, sort, `skip` and `limit` like a complete server. Each
/// can be switched off to act like a server that answers more loosely.
///
/// # Example
///
/// ```ignore
/// use torm_memory::InMemoryTransport;
/// use torm_core::transport::TransportBuilder;
///
/// let naive = InMemoryTransport::builder().server_filtering(false).build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTransportBuilder {
    options: ServerOptions,
}

impl InMemoryTransportBuilder {
    /// Whether query filters are applied before answering.
    pub fn server_filtering(mut self, enabled: bool) -> Self {
        self.options.filtering = enabled;
        self
    }

    /// Whether the query sort is applied before answering.
    pub fn server_sorting(mut self, enabled: bool) -> Self {
        self.options.sorting = enabled;
        self
    }

    /// Whether `skip` and `limit` are applied before answering.
    pub fn server_paging(mut self, enabled: bool) -> Self {
        self.options.paging = enabled;
        self
    }
}

#[async_trait]
impl TransportBuilder for InMemoryTransportBuilder {
    type Transport = InMemoryTransport;

    async fn build(self) -> TormResult<Self::Transport> {
        Ok(InMemoryTransport { options: self.options, ..InMemoryTransport::default() })
    }
}
