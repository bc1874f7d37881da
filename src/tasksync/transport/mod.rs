//! # Transport Layer
//!
//! The HTTP client itself lives outside this crate. The [`Transport`] trait is
//! the seam the read path needs from it: build a request for an endpoint,
//! execute it, hand back the raw response. [`decode_body`] turns a response
//! into a typed value.
//!
//! ## Implementations
//!
//! - [`memory::InMemoryTransport`]: canned responses and a request log, for
//!   testing clients without a network.
//!
//! Production transports wrap whatever HTTP stack the application already
//! uses and only need to implement [`Transport::base_url`] and
//! [`Transport::execute`].

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub user_agent: Option<String>,
}

impl Request {
    /// First value of query parameter `key`, if present.
    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying `value` as its JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Base that endpoint paths are resolved against. Must end with `/` for
    /// relative paths to nest under it.
    fn base_url(&self) -> &Url;

    /// Value for the `User-Agent` header of every request, if any.
    fn user_agent(&self) -> Option<&str> {
        None
    }

    /// Builds a request for `path` with the given query parameters.
    fn new_request(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<Request> {
        let mut url = self
            .base_url()
            .join(path)
            .map_err(|e| SyncError::Transport(format!("invalid endpoint {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(Request {
            method,
            url,
            user_agent: self.user_agent().map(str::to_string),
        })
    }

    /// Sends `request` and returns whatever the server answered.
    async fn execute(&self, request: Request) -> Result<Response>;
}

/// Decodes a JSON response body. Non-success statuses are reported as
/// [`SyncError::Status`] without looking at the body's shape.
pub fn decode_body<T: DeserializeOwned>(response: &Response) -> Result<T> {
    if !response.is_success() {
        return Err(SyncError::Status {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }
    Ok(serde_json::from_slice(&response.body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        name: String,
    }

    #[test]
    fn decodes_success_body() {
        let response = Response::json(&json!({ "name": "x" }));
        let payload: Payload = decode_body(&response).unwrap();
        assert_eq!(payload.name, "x");
    }

    #[test]
    fn non_success_status_is_a_status_error() {
        let response = Response::new(404, "not found");
        let err = decode_body::<Payload>(&response).unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 404, ref body } if body == "not found"));
        assert!(err.is_transport());
    }

    #[test]
    fn malformed_body_is_a_decoding_error() {
        let response = Response::new(200, "{not json");
        let err = decode_body::<Payload>(&response).unwrap_err();
        assert!(matches!(err, SyncError::Decoding(_)));
    }
}
