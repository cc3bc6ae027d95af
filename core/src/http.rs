//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe Graph requests and responses as plain data. The
//! core builds `HttpRequest` values and parses `HttpResponse` values; the
//! `Transport` implementation supplied by the host performs the actual
//! round-trip, including authentication, throttling and connection reuse.
//! Keeping that behind one trait lets tests swap in the in-memory directory
//! without touching the reconciliation code.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ReconcileError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `GraphClient::build_*` methods. `path` is the absolute URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
///
/// Produced by a `Transport`, then passed to `GraphClient::parse_*`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Executes requests against the directory service.
///
/// Implementations return `Ok` for every response that arrived, whatever
/// its status; only failures to obtain a response are `Err` (normally
/// `ReconcileError::Network`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ReconcileError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ReconcileError> {
        (**self).execute(request).await
    }
}
