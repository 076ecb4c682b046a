//! Collection handles: the validating CRUD gateway and its chainable query.
//!
//! # Collection Types
//!
//! - [`Collection`] - Untyped collection working on [`Document`]s
//! - [`CollectionQuery`] - Chainable query bound to a collection
//! - [`TypedCollection`] - Type-safe collection for a specific [`Model`]
//!
//! Writes are validated against the attached [`Schema`] before any request is sent: `create`
//! validates the full document, `update` only the fields it carries.
//!
//! # Example
//!
//! ```ignore
//! use torm::prelude::*;
//!
//! let users = client.collection("users").with_schema(
//!     Schema::new()
//!         .field("name", FieldRule::string().required().min_length(3))
//!         .field("age", FieldRule::integer().min(13.0).max(120.0)),
//! );
//!
//! let alice = users.create(into_document(json!({ "name": "Alice", "age": 30 }))?).await?;
//! let adults = users.query().filter("age", Operator::Gte, 18).sort_by("age").execute().await?;
//! ```

use serde_json::Value;
use std::{marker::PhantomData, sync::Arc};
use tracing::debug;

use crate::{
    document::{Document, DocumentExt, Model},
    error::TormResult,
    query::{FilterClause, Operator, Query, QueryBuilder, SortOrder},
    schema::Schema,
    transport::Transport,
};

/// An untyped collection with a reference to a transport.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the transport reference
/// * `T` - The transport type; may be a trait object
#[derive(Debug)]
pub struct Collection<'a, T: Transport + ?Sized> {
    name: String,
    schema: Option<Arc<Schema>>,
    validate: bool,
    transport: &'a T,
}

impl<T: Transport + ?Sized> Clone for Collection<'_, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            schema: self.schema.clone(),
            validate: self.validate,
            transport: self.transport,
        }
    }
}

impl<'a, T: Transport + ?Sized> Collection<'a, T> {
    /// Creates a collection handle without a schema.
    pub fn new(name: impl Into<String>, transport: &'a T) -> Self {
        Self { name: name.into(), schema: None, validate: true, transport }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attached schema, if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// Attaches a schema that writes are validated against.
    pub fn with_schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Disables validation on this handle, even if a schema is attached.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Validates a document against the attached schema, if validation is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`TormError::Validation`](crate::error::TormError::Validation) for the first
    /// failing field.
    pub fn validate(&self, data: &Document, partial: bool) -> TormResult<()> {
        match &self.schema {
            Some(schema) if self.validate => Ok(schema.validate(data, partial)?),
            _ => Ok(()),
        }
    }

    /// Validates and stores a new document.
    ///
    /// Returns the stored document: the request data with the server's answer merged over it, so
    /// server-assigned fields such as `id` are present.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any request is made, or a gateway error if the
    /// server call fails.
    pub async fn create(&self, data: Document) -> TormResult<Document> {
        self.validate(&data, false)?;
        debug!(collection = %self.name, "creating document");

        let stored = self.transport.create_document(&self.name, data.clone()).await?;
        let mut merged = data;
        merged.extend(stored);
        Ok(merged)
    }

    /// Returns every document in the collection.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the server call fails.
    pub async fn find(&self) -> TormResult<Vec<Document>> {
        debug!(collection = %self.name, "listing documents");
        self.transport.find_documents(&self.name).await
    }

    /// Looks up a single document by id.
    ///
    /// # Returns
    ///
    /// `Ok(Some(document))` if found, `Ok(None)` if the server reports it missing.
    ///
    /// # Errors
    ///
    /// Returns a gateway error for any other failure.
    pub async fn find_by_id(&self, id: &str) -> TormResult<Option<Document>> {
        debug!(collection = %self.name, id, "finding document");
        self.transport.find_document(&self.name, id).await
    }

    /// Validates the given fields (partially) and writes them to an existing document.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any request is made, or a gateway error if the
    /// server call fails.
    pub async fn update(&self, id: &str, data: Document) -> TormResult<Document> {
        self.validate(&data, true)?;
        debug!(collection = %self.name, id, "updating document");
        self.transport.update_document(&self.name, id, data).await
    }

    /// Deletes a document, returning whether the server reported success.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the server call fails.
    pub async fn delete(&self, id: &str) -> TormResult<bool> {
        debug!(collection = %self.name, id, "deleting document");
        self.transport.delete_document(&self.name, id).await
    }

    /// Returns the number of documents in the collection.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the server call fails.
    pub async fn count(&self) -> TormResult<u64> {
        self.transport.count_documents(&self.name).await
    }

    /// Starts a chainable query on this collection.
    pub fn query(&self) -> CollectionQuery<'a, T> {
        CollectionQuery {
            collection: self.name.clone(),
            transport: self.transport,
            builder: QueryBuilder::new(),
        }
    }
}

/// A query under construction, bound to the collection that created it.
///
/// Filters accumulate and are ANDed; `sort`, `limit` and `skip` overwrite earlier calls. The
/// server's answer is re-filtered and re-sorted locally by [`execute`](Self::execute).
#[derive(Debug)]
pub struct CollectionQuery<'a, T: Transport + ?Sized> {
    collection: String,
    transport: &'a T,
    builder: QueryBuilder,
}

impl<'a, T: Transport + ?Sized> CollectionQuery<'a, T> {
    /// Adds a filter clause. Clauses are combined with AND.
    ///
    /// # Arguments
    ///
    /// * `field` - The top-level document field to test
    /// * `operator` - How the field is compared
    /// * `value` - The value to compare against
    pub fn filter(mut self, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.builder = self.builder.filter(field, operator, value);
        self
    }

    /// Adds an equality clause.
    ///
    /// Shorthand for `filter(field, Operator::Eq, value)`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.builder = self.builder.where_eq(field, value);
        self
    }

    /// Adds a prebuilt clause, such as one from [`crate::query::Filter`].
    pub fn clause(mut self, clause: FilterClause) -> Self {
        self.builder = self.builder.clause(clause);
        self
    }

    /// Sorts the results by one field.
    ///
    /// Only one sort applies; a later call replaces an earlier one.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.builder = self.builder.sort(field, order);
        self
    }

    /// Sorts ascending by `field`.
    pub fn sort_by(self, field: impl Into<String>) -> Self {
        self.sort(field, SortOrder::default())
    }

    /// Asks the server for at most `limit` documents.
    ///
    /// Paging is left to the server and is not re-applied to the answer.
    pub fn limit(mut self, limit: usize) -> Self {
        self.builder = self.builder.limit(limit);
        self
    }

    /// Asks the server to skip the first `skip` matching documents.
    pub fn skip(mut self, skip: usize) -> Self {
        self.builder = self.builder.skip(skip);
        self
    }

    /// Returns the query as it will be sent.
    pub fn compile(&self) -> Query {
        self.builder.clone().build()
    }

    /// Sends the query and re-applies its filters and sort to the result.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the server call fails, or the first operator error raised
    /// while re-filtering.
    pub async fn execute(&self) -> TormResult<Vec<Document>> {
        let query = self.compile();
        let candidates = self.transport.query_documents(&self.collection, &query).await?;
        debug!(
            collection = %self.collection,
            filters = query.filters.len(),
            candidates = candidates.len(),
            "query returned"
        );

        query.apply_local(candidates)
    }

    /// Executes the query and deserializes each result into `M`.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus deserialization failures.
    pub async fn execute_as<M: Model>(&self) -> TormResult<Vec<M>> {
        self.execute().await?.into_iter().map(M::from_document).collect()
    }

    /// Returns the number of documents [`execute`](Self::execute) yields.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute).
    pub async fn count(&self) -> TormResult<usize> {
        Ok(self.execute().await?.len())
    }
}

/// A collection of a specific [`Model`] type.
///
/// Uses the model's collection name and schema, converting through serde at the boundary.
#[derive(Debug)]
pub struct TypedCollection<'a, T: Transport + ?Sized, M: Model> {
    inner: Collection<'a, T>,
    _marker: PhantomData<M>,
}

impl<'a, T: Transport + ?Sized, M: Model> TypedCollection<'a, T, M> {
    /// Creates the collection handle for `M`.
    ///
    /// Uses [`Model::collection_name`] and validates with [`Model::schema`] when it is set.
    pub fn new(transport: &'a T) -> Self {
        let mut inner = Collection::new(M::collection_name(), transport);
        if let Some(schema) = M::schema() {
            inner = inner.with_schema(schema);
        }

        Self { inner, _marker: PhantomData }
    }

    /// Returns the name of the underlying collection.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Returns the untyped collection underneath.
    pub fn untyped(&self) -> &Collection<'a, T> {
        &self.inner
    }

    /// Turns off local validation for writes made through this handle.
    pub fn without_validation(mut self) -> Self {
        self.inner = self.inner.without_validation();
        self
    }

    /// Validates and stores a model, returning it with server-assigned fields filled in.
    ///
    /// # Errors
    ///
    /// Returns a serialization, validation or gateway error.
    pub async fn create(&self, model: &M) -> TormResult<M> {
        M::from_document(self.inner.create(model.to_document()?).await?)
    }

    /// Fetches every document in the collection as `M`.
    ///
    /// # Errors
    ///
    /// Returns a gateway error, or a serialization error if a document does not fit `M`.
    pub async fn find(&self) -> TormResult<Vec<M>> {
        self.inner.find().await?.into_iter().map(M::from_document).collect()
    }

    /// Fetches one document by id, or `None` if the server has no such document.
    ///
    /// # Errors
    ///
    /// Returns a gateway error, or a serialization error if the document does not fit `M`.
    pub async fn find_by_id(&self, id: &str) -> TormResult<Option<M>> {
        self.inner.find_by_id(id).await?.map(M::from_document).transpose()
    }

    /// Writes the serialized model to an existing document.
    ///
    /// # Errors
    ///
    /// Returns a serialization, validation or gateway error.
    pub async fn update(&self, id: &str, model: &M) -> TormResult<M> {
        M::from_document(self.inner.update(id, model.to_document()?).await?)
    }

    /// Deletes one document by id, returning the server's success flag.
    pub async fn delete(&self, id: &str) -> TormResult<bool> {
        self.inner.delete(id).await
    }

    /// Returns the number of documents the server holds for this collection.
    pub async fn count(&self) -> TormResult<u64> {
        self.inner.count().await
    }

    /// Starts a query; finish it with [`CollectionQuery::execute_as`].
    pub fn query(&self) -> CollectionQuery<'a, T> {
        self.inner.query()
    }
}
