//! Inbound response model.

use http::StatusCode;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

use crate::request::{Headers, Params, Request};

/// A gateway response as received from the transport.
///
/// The JSON body is decoded on first access and cached for the lifetime of the
/// response. Whether a response is an error depends only on its payload, never
/// on the HTTP status code.
#[derive(Debug, Clone)]
pub struct Response {
    request: Arc<Request>,
    body: String,
    http_status_code: StatusCode,
    headers: Headers,
    decoded_body: OnceLock<Params>,
}

impl Response {
    pub fn new(
        request: Arc<Request>,
        body: impl Into<String>,
        http_status_code: StatusCode,
        headers: Headers,
    ) -> Self {
        Self {
            request,
            body: body.into(),
            http_status_code,
            headers,
            decoded_body: OnceLock::new(),
        }
    }

    /// The request that produced this response.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn http_status_code(&self) -> StatusCode {
        self.http_status_code
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body decoded as a JSON object.
    ///
    /// Bodies that are empty, malformed, or not a JSON object decode to an empty
    /// mapping; the raw text stays available through [`Response::body`].
    pub fn decoded_body(&self) -> &Params {
        self.decoded_body.get_or_init(|| decode(&self.body))
    }

    pub fn into_decoded_body(self) -> Params {
        self.decoded_body
            .into_inner()
            .unwrap_or_else(|| decode(&self.body))
    }

    /// `true` when the decoded body carries a non-null `error` entry.
    pub fn is_error(&self) -> bool {
        self.decoded_body()
            .get("error")
            .is_some_and(|error| !error.is_null())
    }

    /// JSON snapshot of the exchange, used by debug observers.
    ///
    /// Request parameters are left out; they may hold card data.
    pub fn snapshot(&self) -> Value {
        json!({
            "request": {
                "method": self.request.method(),
                "endpoint": self.request.endpoint().map(|url| url.as_str()),
            },
            "http_status_code": self.http_status_code.as_u16(),
            "headers": self.headers,
            "body": self.body,
        })
    }
}

fn decode(body: &str) -> Params {
    if body.trim().is_empty() {
        return Params::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!(kind = json_kind(&other), "Response body is not a JSON object");
            Params::new()
        }
        Err(err) => {
            tracing::debug!(error = %err, "Response body is not valid JSON");
            Params::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
