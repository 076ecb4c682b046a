//! A scripted transport for unit tests.
//!
//! Stores documents and keys in plain maps, records every call, and never filters query
//! results, so the client-side re-filter is the only thing narrowing them.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    document::{Document, ID_FIELD},
    error::{TormError, TormResult},
    query::Query,
    transport::{HealthStatus, Transport},
};

#[derive(Debug, Default)]
pub(crate) struct StubTransport {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    keys: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    queries: Mutex<Vec<Query>>,
    pub fail_key_reads: AtomicBool,
    pub fail_key_writes: AtomicBool,
    pub offline: AtomicBool,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(collection: &str, documents: Vec<Value>) -> Self {
        let stub = Self::new();
        stub.collections.lock().unwrap().insert(
            collection.to_string(),
            documents
                .into_iter()
                .map(|value| value.as_object().cloned().unwrap())
                .collect(),
        );
        stub
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<Query> {
        self.queries.lock().unwrap().last().cloned()
    }

    pub fn key(&self, key: &str) -> Option<String> {
        self.keys.lock().unwrap().get(key).cloned()
    }

    pub fn put_key(&self, key: &str, value: &str) {
        self.keys.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn record(&self, operation: &str, target: &str) -> TormResult<()> {
        self.calls.lock().unwrap().push(format!("{operation} {target}"));

        if self.offline.load(Ordering::SeqCst) {
            return Err(TormError::gateway(operation, "connection refused"));
        }

        Ok(())
    }

    fn position(documents: &[Document], id: &str) -> Option<usize> {
        documents
            .iter()
            .position(|d| d.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn create_document(&self, collection: &str, mut data: Document) -> TormResult<Document> {
        self.record("create", collection)?;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        if !data.contains_key(ID_FIELD) {
            data.insert(ID_FIELD.into(), json!(format!("{collection}:{}", documents.len() + 1)));
        }
        documents.push(data.clone());
        Ok(data)
    }

    async fn find_documents(&self, collection: &str) -> TormResult<Vec<Document>> {
        self.record("find", collection)?;
        Ok(self.collections.lock().unwrap().get(collection).cloned().unwrap_or_default())
    }

    async fn find_document(&self, collection: &str, id: &str) -> TormResult<Option<Document>> {
        self.record("find_by_id", collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|documents| Self::position(documents, id).map(|i| documents[i].clone())))
    }

    async fn query_documents(&self, collection: &str, query: &Query) -> TormResult<Vec<Document>> {
        self.record("query", collection)?;
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.collections.lock().unwrap().get(collection).cloned().unwrap_or_default())
    }

    async fn update_document(&self, collection: &str, id: &str, data: Document) -> TormResult<Document> {
        self.record("update", collection)?;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        let index = Self::position(documents, id)
            .ok_or_else(|| TormError::gateway_status("update", 404, "Document not found"))?;
        documents[index].extend(data);
        Ok(documents[index].clone())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> TormResult<bool> {
        self.record("delete", collection)?;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        Ok(match Self::position(documents, id) {
            Some(index) => {
                documents.remove(index);
                true
            }
            None => false,
        })
    }

    async fn count_documents(&self, collection: &str) -> TormResult<u64> {
        self.record("count", collection)?;
        Ok(self.collections.lock().unwrap().get(collection).map_or(0, |d| d.len() as u64))
    }

    async fn get_key(&self, key: &str) -> TormResult<Option<String>> {
        self.record("get_key", key)?;
        if self.fail_key_reads.load(Ordering::SeqCst) {
            return Err(TormError::gateway_status("get_key", 500, "internal error"));
        }
        Ok(self.key(key))
    }

    async fn set_key(&self, key: &str, value: String) -> TormResult<()> {
        self.record("set_key", key)?;
        if self.fail_key_writes.load(Ordering::SeqCst) {
            return Err(TormError::gateway_status("set_key", 500, "internal error"));
        }
        self.keys.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn health(&self) -> TormResult<HealthStatus> {
        self.record("health", "/health")?;
        Ok(HealthStatus::new("ok"))
    }

    async fn info(&self) -> TormResult<Value> {
        self.record("info", "/")?;
        Ok(json!({"name": "stub"}))
    }
}
