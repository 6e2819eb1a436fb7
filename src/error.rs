//! Error taxonomy of the Sipay client.
//!
//! Two tiers are kept apart:
//!
//! - [`SipayError`] is what public calls fail with: configuration problems,
//!   requests rejected before sending, transport failures below HTTP, and
//!   gateway responses whose payload carries an `error` object.
//! - Business-level "no token granted" answers from `/auth` are *not* errors;
//!   see [`crate::auth::Authenticator`].
//!
//! Payload classification ([`ErrorPayload::classify`]) is a pure function of the
//! decoded body and ignores the HTTP status code entirely.

use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use crate::request::Params;
use crate::response::Response;

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum SipayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    RequestValidation(#[from] RequestValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Response(Box<ResponseError>),
}

impl From<ResponseError> for SipayError {
    fn from(value: ResponseError) -> Self {
        SipayError::Response(Box::new(value))
    }
}

/// Invalid or missing construction parameter. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment {0:?}: expected SANDBOX, STAGING or LIVE")]
    InvalidEnvironment(String),
    #[error("Required {0:?} key not supplied in config")]
    MissingField(&'static str),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: String,
        #[source]
        source: url::ParseError,
    },
}

/// A request that cannot be sent as built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestValidationError {
    #[error("HTTP method not specified")]
    MissingMethod,
    #[error("Invalid HTTP method specified: {0}")]
    InvalidMethod(String),
    #[error("Request endpoint not specified")]
    MissingEndpoint,
}

/// Native failure category reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// DNS resolution, refused or reset connection.
    Connect,
    /// Connect or total request timeout elapsed.
    Timeout,
    /// TLS handshake or peer verification failure.
    Tls,
    /// Client certificate, key or CA bundle could not be loaded.
    Certificate,
    /// The request could not be built (bad header, body encoding).
    Request,
    /// The response body could not be read.
    Body,
    /// The peer answered with something that is not HTTP.
    Protocol,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Certificate => "certificate",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

/// Failure below the HTTP layer. HTTP status codes never produce this error.
#[derive(Debug, thiserror::Error)]
#[error("Transport error ({kind}): {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: TransportErrorKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Transport-native failure code.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Class of a payload error, decided from `error.code` and `error.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseErrorKind {
    /// `code == 10` or `200 <= code <= 299`.
    Authorization,
    /// `type == "OAuthException"`.
    Authentication,
    Other,
}

impl fmt::Display for ResponseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseErrorKind::Authorization => "Authorization",
            ResponseErrorKind::Authentication => "Authentication",
            ResponseErrorKind::Other => "Other",
        };
        f.write_str(s)
    }
}

/// Classified contents of a gateway `error` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: ResponseErrorKind,
    pub code: Option<i64>,
    pub message: String,
    pub subcode: Option<i64>,
    pub error_type: Option<String>,
}

impl ErrorPayload {
    pub const UNKNOWN_MESSAGE: &'static str = "Unknown error.";

    /// Classifies a decoded response body.
    ///
    /// A body without `error.code` but with a top-level `code` is read as if it
    /// were nested under `error`. Precedence: authorization codes, then
    /// `OAuthException`, then everything else.
    pub fn classify(body: &Params) -> ErrorPayload {
        let body = normalize(body);
        let error = body.get("error").and_then(Value::as_object);
        let field = |key: &str| error.and_then(|e| e.get(key)).filter(|v| !v.is_null());

        let code = field("code").and_then(as_code);
        let message = field("message")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Self::UNKNOWN_MESSAGE.to_string());
        let subcode = field("error_subcode").and_then(as_code);
        let error_type = field("type").and_then(Value::as_str).map(str::to_string);

        let kind = match (code, error_type.as_deref()) {
            (Some(10), _) | (Some(200..=299), _) => ResponseErrorKind::Authorization,
            (_, Some("OAuthException")) => ResponseErrorKind::Authentication,
            _ => ResponseErrorKind::Other,
        };

        ErrorPayload {
            kind,
            code,
            message,
            subcode,
            error_type,
        }
    }
}

/// Wraps a flat `{"code": ..}` body as `{"error": {"code": ..}}`.
fn normalize(body: &Params) -> Cow<'_, Params> {
    let nested_code = body
        .get("error")
        .and_then(Value::as_object)
        .and_then(|e| e.get("code"))
        .is_some_and(|c| !c.is_null());
    let top_code = body.get("code").is_some_and(|c| !c.is_null());
    if !nested_code && top_code {
        let mut wrapped = Params::new();
        wrapped.insert("error".to_string(), Value::Object(body.clone()));
        Cow::Owned(wrapped)
    } else {
        Cow::Borrowed(body)
    }
}

/// Gateway codes arrive both as numbers and as numeric strings.
fn as_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A response received intact whose payload signals an error.
#[derive(Debug)]
pub struct ResponseError {
    payload: ErrorPayload,
    response: Response,
}

impl ResponseError {
    /// Classifies `response` and takes ownership of it.
    pub fn from_response(response: Response) -> Self {
        let payload = ErrorPayload::classify(response.decoded_body());
        Self { payload, response }
    }

    pub fn kind(&self) -> ResponseErrorKind {
        self.payload.kind
    }

    pub fn payload(&self) -> &ErrorPayload {
        &self.payload
    }

    pub fn code(&self) -> Option<i64> {
        self.payload.code
    }

    pub fn message(&self) -> &str {
        &self.payload.message
    }

    pub fn http_status_code(&self) -> http::StatusCode {
        self.response.http_status_code()
    }

    /// `error.error_subcode`, or `-1` when absent.
    pub fn sub_error_code(&self) -> i64 {
        self.payload.subcode.unwrap_or(-1)
    }

    /// `error.type`, or an empty string when absent.
    pub fn error_type(&self) -> &str {
        self.payload.error_type.as_deref().unwrap_or("")
    }

    pub fn raw_response(&self) -> &str {
        self.response.body()
    }

    pub fn response_data(&self) -> &Params {
        self.response.decoded_body()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.payload.kind)?;
        if let Some(code) = self.payload.code {
            write!(f, " {code}")?;
        }
        write!(
            f,
            " (HTTP {}): {}",
            self.http_status_code().as_u16(),
            self.payload.message
        )
    }
}

impl std::error::Error for ResponseError {}
