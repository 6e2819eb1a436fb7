//! Deployment targets of the Sipay gateway.
//!
//! Each [`Environment`] selects two base URLs (the `/auth` endpoint lives on a
//! dedicated port, operations on the default one) and the mutual-TLS identity
//! presented to the gateway. The values live in a static table keyed by the
//! environment variant; nothing here is mutable after startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// A Sipay deployment target.
///
/// Parsing is case-insensitive; anything other than `SANDBOX`, `STAGING` or `LIVE`
/// is rejected with [`ConfigError::InvalidEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Environment {
    Sandbox,
    Staging,
    Live,
}

/// Static per-environment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentProfile {
    /// Base URL for operation endpoints (`/payments`, `/refunds`, ...).
    pub api_url: &'static str,
    /// Base URL for the `/auth` endpoint.
    pub auth_url: &'static str,
    /// Client certificate, relative to the certificate directory.
    pub cert: &'static str,
    /// Client private key, relative to the certificate directory.
    pub key: &'static str,
    /// CA bundle used to validate the gateway, relative to the certificate directory.
    pub ca_bundle: &'static str,
}

const SANDBOX: EnvironmentProfile = EnvironmentProfile {
    api_url: "https://sandbox.sipayecommerce.sipay.es/api/v1",
    auth_url: "https://sandbox.sipayecommerce.sipay.es:10010/api/v1",
    cert: "sandbox/E-Commerce.cliente.LAVANAPP_1.pem",
    key: "sandbox/E-Commerce.cliente.LAVANAPP.privkey.pem",
    ca_bundle: "sandbox/CA_Sipay_DEV.pem",
};

const STAGING: EnvironmentProfile = EnvironmentProfile {
    api_url: "https://f23.sipayecommerce.sipay.es/api/v1",
    auth_url: "https://f23.sipayecommerce.sipay.es:10010/api/v1",
    cert: "staging/E-Commerce.cliente.LAVANAPP.pem",
    key: "staging/E-Commerce.cliente.LAVANAPP.privkey.pem",
    ca_bundle: "staging/CA_Sipay_SHA256.pem",
};

const LIVE: EnvironmentProfile = EnvironmentProfile {
    api_url: "https://sipayecommerce.sipay.es/api/v1",
    auth_url: "https://sipayecommerce.sipay.es:10010/api/v1",
    cert: "live/E-Commerce.cliente.LAVANAPP_1.pem",
    key: "live/E-Commerce.cliente.LAVANAPP.privkey.pem",
    ca_bundle: "live/CA_Sipay_SHA256.pem",
};

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Sandbox, Environment::Staging, Environment::Live];

    /// Returns the static settings for this environment.
    pub fn profile(&self) -> &'static EnvironmentProfile {
        match self {
            Environment::Sandbox => &SANDBOX,
            Environment::Staging => &STAGING,
            Environment::Live => &LIVE,
        }
    }

    pub fn api_url(&self) -> &'static str {
        self.profile().api_url
    }

    pub fn auth_url(&self) -> &'static str {
        self.profile().auth_url
    }

    /// Resolves the mutual-TLS identity for this environment under `cert_dir`.
    pub fn certificate_bundle(&self, cert_dir: impl AsRef<Path>) -> CertificateBundle {
        let profile = self.profile();
        let cert_dir = cert_dir.as_ref();
        CertificateBundle {
            cert: cert_dir.join(profile.cert),
            key: cert_dir.join(profile.key),
            ca_bundle: cert_dir.join(profile.ca_bundle),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "SANDBOX",
            Environment::Staging => "STAGING",
            Environment::Live => "LIVE",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SANDBOX" => Ok(Environment::Sandbox),
            "STAGING" => Ok(Environment::Staging),
            "LIVE" => Ok(Environment::Live),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Environment> for String {
    fn from(value: Environment) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client certificate, private key and CA bundle used for mutual TLS.
///
/// Resolved once per [`SipayClient`](crate::client::SipayClient) and shared by
/// the authentication and operation calls it makes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateBundle {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca_bundle: PathBuf,
}
