//! The pluggable HTTP seam.
//!
//! A [`Transport`] performs exactly one exchange: it sends the request over
//! mutual TLS and hands back status, headers and body untouched. Status codes
//! are not interpreted here; only failures below HTTP (DNS, TLS, connection,
//! timeout) become a [`TransportError`].
//!
//! [`ReqwestTransport`] is the default implementation. Any other type that
//! implements the trait, including test fakes, can be handed to
//! [`SipayClient::with_transport`](crate::client::SipayClient::with_transport).

use async_trait::async_trait;
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::environment::CertificateBundle;
use crate::error::{TransportError, TransportErrorKind};
use crate::request::{Headers, HttpMethod, Params};

mod reqwest_transport;

pub use reqwest_transport::*;

/// Fixed upper bound for establishing a connection, independent of the total timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a transport needs for one exchange.
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    pub url: &'a Url,
    pub method: HttpMethod,
    /// JSON body. Ignored for `GET`.
    pub body: &'a Params,
    pub headers: &'a Headers,
    /// Total request timeout.
    pub timeout: Duration,
    /// When `false` the peer certificate is not verified; the client
    /// certificate is still presented.
    pub verify_peer: bool,
    pub certs: &'a CertificateBundle,
}

/// Sends a single request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest<'_>) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: TransportRequest<'_>) -> Result<RawResponse, TransportError> {
        self.as_ref().send(request).await
    }
}

/// Status, headers and body of the final HTTP response of an exchange.
///
/// Header names are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    status: StatusCode,
    headers: Headers,
    body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Parses a wire dump: one or more header blocks followed by the body.
    ///
    /// [`ReqwestTransport`] never needs this. It is for custom transports
    /// whose underlying client hands back the raw bytes of the exchange
    /// (a curl handle with header output enabled, a recorded fixture).
    ///
    /// The body is whatever follows the last blank line. Of the header blocks
    /// before it (interim `100 Continue` or redirect responses), only the last
    /// one is kept. Both parts are trimmed.
    pub fn from_raw(raw: &str) -> Result<Self, TransportError> {
        let (head, body) = raw.rsplit_once("\r\n\r\n").unwrap_or(("", raw));
        let block = head.rsplit("\r\n\r\n").next().unwrap_or_default().trim();

        let mut lines = block.lines();
        let status_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or_else(|| {
                TransportError::new(TransportErrorKind::Protocol, "response has no status line")
            })?;
        let status = parse_status_line(status_line)?;

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        Ok(Self::new(status, headers, body.trim()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, Headers, String) {
        (self.status, self.headers, self.body)
    }
}

/// `HTTP/1.1 200 OK` -> `200`.
fn parse_status_line(line: &str) -> Result<StatusCode, TransportError> {
    let invalid = || {
        TransportError::new(
            TransportErrorKind::Protocol,
            format!("invalid status line {line:?}"),
        )
    };
    let mut parts = line.split_whitespace();
    let version = parts.next().ok_or_else(invalid)?;
    if !version.starts_with("HTTP/") {
        return Err(invalid());
    }
    let code = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(invalid)?;
    StatusCode::from_u16(code).map_err(|_| invalid())
}
