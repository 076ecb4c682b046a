//! Request and response bodies of the ToonStore HTTP API.
//!
//! Success bodies are decoded leniently: a missing key takes its empty value (`data` → `{}`,
//! `documents` → `[]`, `success` → `false`, `count` → `0`). The server reports some failures
//! with a success status and an `error` key, which [`WireBody::error`] exposes.

use serde::{Deserialize, Serialize};

use torm_core::document::Document;

/// A decoded response body that may carry a server-reported error.
pub(crate) trait WireBody {
    fn error(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DataRequest<'a> {
    pub data: &'a Document,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValueRequest<'a> {
    pub value: &'a str,
}

/// Body of create and update responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DataResponse {
    #[serde(default)]
    pub data: Document,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for DataResponse {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Body of listing and query responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for DocumentsResponse {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Body of delete responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for SuccessResponse {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Body of key write responses. An explicit `"success": false` counts as a failed write.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct KeyWriteResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for KeyWriteResponse {
    fn error(&self) -> Option<&str> {
        match (self.error.as_deref(), self.success) {
            (Some(cause), _) => Some(cause),
            (None, Some(false)) => Some("write not acknowledged"),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CountResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for CountResponse {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ValueResponse {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for ValueResponse {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Body of non-success responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
}

impl WireBody for Document {}
