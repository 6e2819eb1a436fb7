//! Default [`Transport`] built on `reqwest` with rustls.
//!
//! Client identity and peer verification are fixed when a `reqwest::Client` is
//! built, so one client is kept per (certificate bundle, verify-peer) pair and
//! reused across calls. Certificates are read from disk on first use.

use async_trait::async_trait;
use dashmap::DashMap;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::path::Path;

use super::{CONNECT_TIMEOUT, RawResponse, Transport, TransportRequest};
use crate::environment::CertificateBundle;
use crate::error::{TransportError, TransportErrorKind};
use crate::request::{Headers, HttpMethod};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    certs: CertificateBundle,
    verify_peer: bool,
}

/// Mutual-TLS HTTP transport.
#[derive(Debug)]
pub struct ReqwestTransport {
    clients: DashMap<ClientKey, reqwest::Client>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    async fn client(
        &self,
        certs: &CertificateBundle,
        verify_peer: bool,
    ) -> Result<reqwest::Client, TransportError> {
        let key = ClientKey {
            certs: certs.clone(),
            verify_peer,
        };
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }
        let client = build_client(certs, verify_peer).await?;
        tracing::debug!(
            cert = %certs.cert.display(),
            verify_peer,
            "Built mutual-TLS HTTP client"
        );
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest<'_>) -> Result<RawResponse, TransportError> {
        let client = self.client(request.certs, request.verify_peer).await?;

        let mut builder = client
            .request(request.method.into(), request.url.clone())
            .headers(header_map(request.headers)?)
            .timeout(request.timeout);
        if request.method != HttpMethod::Get {
            builder = builder.json(request.body);
        }

        let response = builder.send().await.map_err(from_reqwest)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect::<Headers>();
        let body = response.text().await.map_err(from_reqwest)?;

        Ok(RawResponse::new(status, headers, body.trim()))
    }
}

async fn build_client(
    certs: &CertificateBundle,
    verify_peer: bool,
) -> Result<reqwest::Client, TransportError> {
    let mut identity_pem = read_pem(&certs.cert).await?;
    identity_pem.push(b'\n');
    identity_pem.extend(read_pem(&certs.key).await?);
    let identity = reqwest::Identity::from_pem(&identity_pem).map_err(|e| {
        TransportError::with_source(
            TransportErrorKind::Certificate,
            format!("invalid client certificate or key {}", certs.cert.display()),
            e,
        )
    })?;
    let ca_pem = read_pem(&certs.ca_bundle).await?;
    let ca_bundle = reqwest::Certificate::from_pem(&ca_pem).map_err(|e| {
        TransportError::with_source(
            TransportErrorKind::Certificate,
            format!("invalid CA bundle {}", certs.ca_bundle.display()),
            e,
        )
    })?;

    reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(ca_bundle)
        .identity(identity)
        .danger_accept_invalid_certs(!verify_peer)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| {
            TransportError::with_source(TransportErrorKind::Tls, "failed to build TLS client", e)
        })
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    tokio::fs::read(path).await.map_err(|e| {
        TransportError::with_source(
            TransportErrorKind::Certificate,
            format!("failed to read {}", path.display()),
            e,
        )
    })
}

fn header_map(headers: &Headers) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransportError::with_source(
                TransportErrorKind::Request,
                format!("invalid header name {name:?}"),
                e,
            )
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::with_source(
                TransportErrorKind::Request,
                format!("invalid value for header {name}"),
                e,
            )
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_builder() || err.is_request() {
        TransportErrorKind::Request
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Protocol
    };
    TransportError::with_source(kind, error_chain(&err), err)
}

/// `reqwest` keeps the useful part of a failure (refused, handshake alert) in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Params;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture_certs() -> CertificateBundle {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/certs");
        CertificateBundle {
            cert: dir.join("client.pem"),
            key: dir.join("client.key"),
            ca_bundle: dir.join("ca.pem"),
        }
    }

    fn json_headers() -> Headers {
        Headers::from([("Content-Type".to_string(), "application/json".to_string())])
    }

    #[tokio::test]
    async fn test_post_sends_json_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"resource": "payments", "amount": "100"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-gateway", "sipay")
                    .set_body_string("  {\"idrequest\":\"abc123\"}\n"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/api/v1/auth", mock_server.uri())).unwrap();
        let body = json!({"resource": "payments", "amount": "100"})
            .as_object()
            .cloned()
            .unwrap();
        let headers = json_headers();
        let certs = fixture_certs();

        let transport = ReqwestTransport::new();
        let response = transport
            .send(TransportRequest {
                url: &url,
                method: HttpMethod::Post,
                body: &body,
                headers: &headers,
                timeout: Duration::from_secs(5),
                verify_peer: true,
                certs: &certs,
            })
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers().get("x-gateway").unwrap(), "sipay");
        assert_eq!(response.body(), "{\"idrequest\":\"abc123\"}");
    }

    #[tokio::test]
    async fn test_get_sends_no_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tokenizations/storages/card-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!(
            "{}/api/v1/tokenizations/storages/card-1",
            mock_server.uri()
        ))
        .unwrap();
        let body = json!({"ignored": true}).as_object().cloned().unwrap();
        let headers = json_headers();
        let certs = fixture_certs();

        ReqwestTransport::new()
            .send(TransportRequest {
                url: &url,
                method: HttpMethod::Get,
                body: &body,
                headers: &headers,
                timeout: Duration::from_secs(5),
                verify_peer: false,
                certs: &certs,
            })
            .await
            .unwrap();

        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_a_transport_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("{\"error\":{\"code\":1}}"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&mock_server.uri()).unwrap();
        let body = Params::new();
        let headers = Headers::new();
        let certs = fixture_certs();

        let response = ReqwestTransport::new()
            .send(TransportRequest {
                url: &url,
                method: HttpMethod::Delete,
                body: &body,
                headers: &headers,
                timeout: Duration::from_secs(5),
                verify_peer: true,
                certs: &certs,
            })
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), "{\"error\":{\"code\":1}}");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_kind() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&mock_server.uri()).unwrap();
        let body = Params::new();
        let headers = Headers::new();
        let certs = fixture_certs();

        let err = ReqwestTransport::new()
            .send(TransportRequest {
                url: &url,
                method: HttpMethod::Post,
                body: &body,
                headers: &headers,
                timeout: Duration::from_millis(100),
                verify_peer: true,
                certs: &certs,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_connect_kind() {
        // Bind and drop a listener to get a local port with nothing behind it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/api/v1/auth")).unwrap();
        let body = Params::new();
        let headers = Headers::new();
        let certs = fixture_certs();

        let err = ReqwestTransport::new()
            .send(TransportRequest {
                url: &url,
                method: HttpMethod::Post,
                body: &body,
                headers: &headers,
                timeout: Duration::from_secs(5),
                verify_peer: true,
                certs: &certs,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Connect);
    }

    #[tokio::test]
    async fn test_missing_certificate_fails_before_sending() {
        let mock_server = MockServer::start().await;
        let url = Url::parse(&mock_server.uri()).unwrap();
        let body = Params::new();
        let headers = Headers::new();
        let mut certs = fixture_certs();
        certs.key = PathBuf::from("/nonexistent/client.key");

        let err = ReqwestTransport::new()
            .send(TransportRequest {
                url: &url,
                method: HttpMethod::Post,
                body: &body,
                headers: &headers,
                timeout: Duration::from_secs(5),
                verify_peer: true,
                certs: &certs,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Certificate);
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixture_identity_and_ca_accepted_by_rustls() {
        let certs = fixture_certs();
        for verify_peer in [true, false] {
            if let Err(err) = build_client(&certs, verify_peer).await {
                panic!("fixture certificates rejected (verify_peer={verify_peer}): {err}");
            }
        }
    }

    #[tokio::test]
    async fn test_clients_are_cached_per_bundle_and_verify_flag() {
        let transport = ReqwestTransport::new();
        let certs = fixture_certs();
        transport.client(&certs, true).await.unwrap();
        transport.client(&certs, true).await.unwrap();
        assert_eq!(transport.clients.len(), 1);
        transport.client(&certs, false).await.unwrap();
        assert_eq!(transport.clients.len(), 2);
    }

    #[test]
    fn test_invalid_header_is_a_request_error() {
        let headers = Headers::from([("X-Bad".to_string(), "line\nbreak".to_string())]);
        let err = header_map(&headers).unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Request);
    }
}
