//! Convenient re-exports of commonly used types from torm.
//!
//! ```ignore
//! use torm::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client, collections and chainable queries
//! - Documents, models and schemas
//! - Transports and their builders
//! - Migration tools
//! - Error types, plus `json!` and `BoxFuture` for writing documents and actions

pub use torm_core::{
    client::TormClient,
    collection::{Collection, CollectionQuery, TypedCollection},
    document::{Document, DocumentExt, ID_FIELD, Model, document_id, into_document},
    schema::{FieldRule, FieldType, Schema},
    query::{Filter, FilterClause, Operator, Query, QueryBuilder, Sort, SortOrder},
    transport::{HealthStatus, Transport, TransportBuilder},
    migrate::{AppliedMigration, MigrateOp, Migration, MigrationAction, MigrationStatus, MigrationTracker, action_fn},
    error::{MigrationDirection, TormError, TormResult, ValidationError, ValidationErrorKind},
};

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
pub use serde_json::json;
