//! Document representation and typed model support.
//!
//! Documents travel over the wire as JSON objects, so the untyped representation is simply a
//! [`serde_json::Map`]. Typed models implement [`Model`] and convert to and from [`Document`]
//! through serde.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, from_value, to_value};

use crate::{
    error::{TormError, TormResult},
    schema::Schema,
};

/// An untyped document: a mapping from field name to JSON value.
pub type Document = Map<String, Value>;

/// The implicit identity field of every stored document.
pub const ID_FIELD: &str = "id";

/// Returns the identity of a document, if it carries a string `id`.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Converts a JSON value into a [`Document`], failing if it is not an object.
pub fn into_document(value: Value) -> TormResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TormError::Serialization(format!(
            "expected a JSON object, found {}",
            kind_name(&other)
        ))),
    }
}

/// Returns a short name for the kind of a JSON value, used in error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// A typed document stored in a named collection.
///
/// # Example
///
/// ```ignore
/// use torm::prelude::*;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub id: Option<String>,
///     pub name: String,
///     pub age: i64,
/// }
///
/// impl Model for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
///
///     fn schema() -> Option<Schema> {
///         Some(Schema::new().field("name", FieldRule::string().required().min_length(3)))
///     }
/// }
/// ```
pub trait Model: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns the name of the collection this model is stored in.
    fn collection_name() -> &'static str;

    /// Returns the schema documents of this model are validated against before writes.
    fn schema() -> Option<Schema> {
        None
    }
}

/// Extension trait converting models to and from untyped documents.
///
/// Automatically implemented for every [`Model`].
pub trait DocumentExt: Model {
    /// Serializes this model into a [`Document`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not serialize to an object.
    fn to_document(&self) -> TormResult<Document>;

    /// Deserializes a model from a [`Document`].
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the model's shape.
    fn from_document(document: Document) -> TormResult<Self>;
}

impl<M: Model> DocumentExt for M {
    fn to_document(&self) -> TormResult<Document> {
        into_document(to_value(self)?)
    }

    fn from_document(document: Document) -> TormResult<Self> {
        Ok(from_value(Value::Object(document))?)
    }
}
