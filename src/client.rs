//! Gateway client: turns a [`Request`] into a [`Response`] over a [`Transport`].
//!
//! The client owns the environment, the mutual-TLS certificate bundle resolved
//! for it, and the transport. None of these change after construction, so a
//! client can be shared across tasks behind an `Arc`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sipay_rs::client::SipayClient;
//!
//! let client = SipayClient::try_new("sandbox", "/etc/sipay/certs").unwrap();
//! ```
//!
//! ## Outcome of a call
//!
//! - transport failure: [`SipayError::Transport`], no response is built;
//! - body with an `error` object: [`SipayError::Response`], whatever the status code;
//! - anything else: `Ok(Response)`, whatever the status code.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::environment::{CertificateBundle, Environment};
use crate::error::{ConfigError, ResponseError, SipayError};
use crate::observer::ResponseObserver;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{ReqwestTransport, Transport, TransportRequest};

/// A client bound to one Sipay environment.
#[derive(Clone)]
pub struct SipayClient {
    environment: Environment,
    certs: CertificateBundle,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    observer: Option<Arc<dyn ResponseObserver>>,
}

impl fmt::Debug for SipayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipayClient")
            .field("environment", &self.environment)
            .field("certs", &self.certs)
            .field("timeout", &self.timeout)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl SipayClient {
    /// Total timeout applied to every request unless overridden.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a client for `environment` using [`ReqwestTransport`].
    ///
    /// Certificates are resolved under `cert_dir`; they are read on the first request.
    pub fn new(environment: Environment, cert_dir: impl AsRef<Path>) -> Self {
        Self {
            environment,
            certs: environment.certificate_bundle(cert_dir),
            transport: Arc::new(ReqwestTransport::new()),
            timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            observer: None,
        }
    }

    /// Parses `environment` (case-insensitive) and creates a client for it.
    ///
    /// Fails with [`ConfigError::InvalidEnvironment`] for anything other than
    /// `SANDBOX`, `STAGING` or `LIVE`.
    pub fn try_new(environment: &str, cert_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let environment = environment.parse::<Environment>()?;
        Ok(Self::new(environment, cert_dir))
    }

    /// Replaces the default transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the total timeout for all future requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Installs a hook that sees every received response.
    pub fn with_observer(mut self, observer: Arc<dyn ResponseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn certs(&self) -> &CertificateBundle {
        &self.certs
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `request` and classifies the result.
    ///
    /// `Content-Type: application/json` is always set, replacing any
    /// caller-supplied value. `verify_peer` is handed to the transport as is.
    #[instrument(
        name = "sipay.client.send_request",
        skip_all,
        fields(
            method = request.method(),
            url = request.endpoint().map(|url| url.as_str()).unwrap_or_default(),
            verify_peer = verify_peer,
        )
    )]
    pub async fn send_request(
        &self,
        mut request: Request,
        verify_peer: bool,
    ) -> Result<Response, SipayError> {
        request.set_headers([("Content-Type", "application/json")]);
        let method = request.validate_method()?;
        let url = request.url()?.clone();
        let body = request.body();

        let raw = self
            .transport
            .send(TransportRequest {
                url: &url,
                method,
                body: &body,
                headers: request.headers(),
                timeout: self.timeout,
                verify_peer,
                certs: &self.certs,
            })
            .await
            .inspect_err(|err| {
                tracing::error!(kind = %err.kind(), error = %err, "Gateway request failed");
            })?;

        let (status, headers, raw_body) = raw.into_parts();
        let response = Response::new(Arc::new(request), raw_body, status, headers);
        if let Some(observer) = &self.observer {
            observer.on_response(&response);
        }

        if response.is_error() {
            let err = ResponseError::from_response(response);
            tracing::warn!(
                kind = %err.kind(),
                code = err.code(),
                status = err.http_status_code().as_u16(),
                "Gateway returned an error payload"
            );
            return Err(err.into());
        }

        tracing::debug!(status = status.as_u16(), "Gateway request completed");
        Ok(response)
    }
}
