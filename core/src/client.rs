//! Stateless Microsoft Graph request builder and response parser.
//!
//! # Design
//! `GraphClient` holds only a `base_url` (service root plus API version)
//! and carries no mutable state between calls. Each operation is split into
//! a `build_*` method that produces an `HttpRequest` and a `parse_*` method
//! that consumes an `HttpResponse`. The caller's `Transport` executes the
//! round-trip in between, keeping this layer deterministic.
//!
//! Bodies are untyped `serde_json::Value` documents: the shape of each
//! resource is owned by its mapping table, not by a DTO.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ReconcileError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// One page of an OData collection response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ODataPage {
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Synchronous, stateless request builder for Microsoft Graph collections.
#[derive(Debug, Clone)]
pub struct GraphClient {
    base_url: String,
}

impl GraphClient {
    /// `base_url` includes the API version, e.g. `https://graph.microsoft.com/v1.0`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection.trim_matches('/'))
    }

    fn item_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{id}", self.collection_url(collection))
    }

    pub fn build_list(&self, collection: &str) -> HttpRequest {
        get(self.collection_url(collection))
    }

    /// Follow an `@odata.nextLink`, which is already an absolute URL.
    pub fn build_next_page(&self, next_link: &str) -> HttpRequest {
        get(next_link.to_string())
    }

    pub fn build_get(&self, collection: &str, id: &str) -> HttpRequest {
        get(self.item_url(collection, id))
    }

    pub fn build_create(&self, collection: &str, body: &Value) -> Result<HttpRequest, ReconcileError> {
        with_json_body(HttpMethod::Post, self.collection_url(collection), body)
    }

    pub fn build_update(&self, collection: &str, id: &str, body: &Value) -> Result<HttpRequest, ReconcileError> {
        with_json_body(HttpMethod::Patch, self.item_url(collection, id), body)
    }

    pub fn build_delete(&self, collection: &str, id: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            path: self.item_url(collection, id),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn parse_list(&self, response: HttpResponse) -> Result<ODataPage, ReconcileError> {
        check_status(&response, &[200])?;
        serde_json::from_str(&response.body).map_err(|e| ReconcileError::Deserialization(e.to_string()))
    }

    pub fn parse_get(&self, response: HttpResponse) -> Result<Value, ReconcileError> {
        check_status(&response, &[200])?;
        parse_object(&response.body)
    }

    pub fn parse_create(&self, response: HttpResponse) -> Result<Value, ReconcileError> {
        check_status(&response, &[200, 201])?;
        parse_object(&response.body)
    }

    /// Graph answers a `PATCH` with 204, or with 200 and the updated entity.
    pub fn parse_update(&self, response: HttpResponse) -> Result<(), ReconcileError> {
        check_status(&response, &[200, 204])
    }

    pub fn parse_delete(&self, response: HttpResponse) -> Result<(), ReconcileError> {
        check_status(&response, &[200, 204])
    }
}

fn get(path: String) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        path,
        headers: vec![("accept".to_string(), "application/json".to_string())],
        body: None,
    }
}

fn with_json_body(method: HttpMethod, path: String, body: &Value) -> Result<HttpRequest, ReconcileError> {
    let body = serde_json::to_string(body).map_err(|e| ReconcileError::Serialization(e.to_string()))?;
    Ok(HttpRequest {
        method,
        path,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Some(body),
    })
}

fn parse_object(body: &str) -> Result<Value, ReconcileError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ReconcileError::Deserialization(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ReconcileError::Deserialization(
            "expected a JSON object in the response body".to_string(),
        ))
    }
}

/// Map unexpected status codes to a `TransportError`, decoding the Graph
/// error envelope when the body carries one.
fn check_status(response: &HttpResponse, expected: &[u16]) -> Result<(), ReconcileError> {
    if expected.contains(&response.status) {
        return Ok(());
    }
    let (code, message) = match serde_json::from_str::<ODataError>(&response.body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (format!("HttpStatus{}", response.status), response.body.clone()),
    };
    Err(TransportError {
        status: response.status,
        code,
        message,
    }
    .into())
}
