//! In-memory ToonStore transport for torm.
//!
//! This crate provides a thread-safe, in-process implementation of the `Transport` trait. It
//! behaves like a ToonStore server (server-assigned ids, 404 on missing documents, raw keys)
//! and is meant for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Server-side queries** - Lenient filtering, sorting and paging, each of which can be disabled
//! - **Raw keys** - Backs the migration tracker's applied-set
//!
//! # Quick Start
//!
//! ```ignore
//! use torm::prelude::*;
//! use torm::memory::InMemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> TormResult<()> {
//!     let client = TormClient::new(InMemoryTransport::builder().build().await?);
//!     let users = client.collection("users");
//!
//!     let alice = users.create(into_document(json!({"name": "Alice"}))?).await?;
//!     assert!(users.find_by_id(document_id(&alice).unwrap()).await?.is_some());
//!
//!     Ok(())
//! }
//! ```

mod evaluator;
pub mod transport;

pub use transport::{InMemoryTransport, InMemoryTransportBuilder};
