//! First leg of every authenticated operation: `POST <auth base>/auth`.
//!
//! The gateway answers with a short-lived id (`idrequest`, `idstorage`,
//! `idrefund` or `idcancelation`) that the operation call must carry. When it
//! declines, the answer is an `error` object instead; that answer is returned
//! to the caller as data, not raised. Transport failures and malformed
//! requests still fail the call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

use crate::client::SipayClient;
use crate::error::{ConfigError, ErrorPayload, SipayError};
use crate::request::{Params, Request};

/// Id granted by `/auth`, named after the response key carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    IdStorage,
    IdRequest,
    IdRefund,
    IdCancelation,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::IdStorage => "idstorage",
            TokenKind::IdRequest => "idrequest",
            TokenKind::IdRefund => "idrefund",
            TokenKind::IdCancelation => "idcancelation",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded body of an `/auth` answer, granted or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthPayload(Params);

impl AuthPayload {
    pub fn new(params: Params) -> Self {
        Self(params)
    }

    /// The granted id of the given kind, exactly as the gateway sent it.
    ///
    /// Any non-null value counts as granted, including an empty string.
    pub fn token(&self, kind: TokenKind) -> Option<&Value> {
        self.0.get(kind.as_str()).filter(|id| !id.is_null())
    }

    pub fn is_granted(&self, kind: TokenKind) -> bool {
        self.token(kind).is_some()
    }

    /// The classified `error` object, when the gateway declined.
    pub fn error(&self) -> Option<ErrorPayload> {
        self.0
            .get("error")
            .filter(|error| !error.is_null())
            .map(|_| ErrorPayload::classify(&self.0))
    }

    pub fn as_params(&self) -> &Params {
        &self.0
    }

    pub fn into_params(self) -> Params {
        self.0
    }
}

impl From<Params> for AuthPayload {
    fn from(value: Params) -> Self {
        Self(value)
    }
}

/// Defaults merged under every auth config; caller values win.
fn auth_defaults() -> Params {
    let mut defaults = Params::new();
    defaults.insert("authtype".to_string(), Value::from("sslclient"));
    defaults.insert("api.notpage".to_string(), Value::from(""));
    defaults.insert("api.notmode".to_string(), Value::from("sync"));
    defaults
}

/// Requests operation ids from the `/auth` endpoint of the client's environment.
#[derive(Debug, Clone)]
pub struct Authenticator {
    client: Arc<SipayClient>,
    auth_url: Url,
}

impl Authenticator {
    pub fn try_new(client: Arc<SipayClient>) -> Result<Self, ConfigError> {
        let base = client.environment().auth_url();
        let auth_url = Url::parse(&format!("{base}/auth")).map_err(|e| ConfigError::UrlParse {
            context: format!("Failed to construct {base}/auth URL"),
            source: e,
        })?;
        Ok(Self { client, auth_url })
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    /// Posts `config` (over the defaults) to `/auth` with peer verification on.
    ///
    /// A declined authentication is returned as `Ok` with the gateway's error
    /// payload; check [`AuthPayload::token`] for the expected id.
    #[instrument(
        name = "sipay.auth.request_authentication",
        skip_all,
        fields(resource = config.get("resource").and_then(|v| v.as_str()).unwrap_or_default())
    )]
    pub async fn request_authentication(&self, config: Params) -> Result<AuthPayload, SipayError> {
        let mut params = auth_defaults();
        params.extend(config);

        let request = Request::post(self.auth_url.clone(), params);
        match self.client.send_request(request, true).await {
            Ok(response) => Ok(AuthPayload(response.into_decoded_body())),
            Err(SipayError::Response(err)) => {
                tracing::warn!(
                    kind = %err.kind(),
                    code = err.code(),
                    message = err.message(),
                    "Authentication declined"
                );
                Ok(AuthPayload(err.into_response().into_decoded_body()))
            }
            Err(err) => Err(err),
        }
    }
}
