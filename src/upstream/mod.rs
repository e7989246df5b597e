//! # Upstream
//!
//! Boundary to the courier network's pickup-point search API. The gateway
//! only ever needs one capability from it: an authenticated request against a
//! path, answered with a status and a JSON body. Credential acquisition and
//! refresh live behind [`UpstreamClient`] implementations.

pub mod http;
pub mod mapping;

pub use http::HttpUpstreamClient;
pub use mapping::{map_points, search_request};

use crate::core::error::UpstreamError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

/// Method, query string and optional JSON body of one upstream request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// What came back. A non-success status is data here, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub ok: bool,
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn success(body: Value) -> Self {
        Self {
            ok: true,
            status: 200,
            body,
        }
    }

    pub fn failure(status: u16) -> Self {
        Self {
            ok: false,
            status,
            body: Value::Null,
        }
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn authenticated_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
