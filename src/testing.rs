//! In-memory transport for pipeline tests.

use async_trait::async_trait;
use http::StatusCode;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::environment::CertificateBundle;
use crate::error::TransportError;
use crate::request::{Headers, HttpMethod, Params};
use crate::transport::{RawResponse, Transport, TransportRequest};

/// A request as seen by [`FakeTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: Url,
    pub method: HttpMethod,
    pub body: Params,
    pub headers: Headers,
    pub timeout: Duration,
    pub verify_peer: bool,
    pub certs: CertificateBundle,
}

/// Replays queued replies in order and records every call.
#[derive(Debug, Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_json(self, status: u16, body: serde_json::Value) -> Self {
        let raw = RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            Headers::from([("content-type".to_string(), "application/json".to_string())]),
            body.to_string(),
        );
        self.replies.lock().unwrap().push_back(Ok(raw));
        self
    }

    pub fn reply_err(self, err: TransportError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: TransportRequest<'_>) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: request.url.clone(),
            method: request.method,
            body: request.body.clone(),
            headers: request.headers.clone(),
            timeout: request.timeout,
            verify_peer: request.verify_peer,
            certs: request.certs.clone(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no reply queued for FakeTransport")
    }
}
