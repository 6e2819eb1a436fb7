//! JSON configuration for the `sipay` binary and for embedders that prefer a file.
//!
//! String values may be literals or references to environment variables, so
//! merchant credentials can stay out of the file:
//!
//! ```json
//! {
//!   "environment": "sandbox",
//!   "merchant_id": "$SIPAY_MERCHANT_ID",
//!   "merchant_name": "${SIPAY_MERCHANT_NAME}",
//!   "cert_dir": "/etc/sipay/certs"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::client::SipayClient;
use crate::environment::Environment;
use crate::error::ConfigError;
use crate::observer::SnapshotFile;
use crate::sipay::{Sipay, SipayOptions};

/// A value given either literally or as `$VAR` / `${VAR}`, resolved while deserializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if `s` is `$VAR` or `${VAR}`.
    fn env_var_name(s: &str) -> Option<&str> {
        if let Some(name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(name)
        } else {
            s.strip_prefix('$').filter(|name| {
                !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            })
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = match Self::env_var_name(&s) {
            Some(name) => std::env::var(name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{name}' not found (referenced as '{s}')"
                ))
            })?,
            None => s,
        };
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Everything needed to build a [`Sipay`] façade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipayConfig {
    environment: LiteralOrEnv<Environment>,
    merchant_id: LiteralOrEnv<String>,
    merchant_name: LiteralOrEnv<String>,
    #[serde(default = "config_defaults::default_currency")]
    currency: LiteralOrEnv<String>,
    #[serde(default = "config_defaults::default_lang")]
    lang: LiteralOrEnv<String>,
    #[serde(default = "config_defaults::default_api_key")]
    api_key: LiteralOrEnv<String>,
    #[serde(default = "config_defaults::default_cert_dir")]
    cert_dir: LiteralOrEnv<PathBuf>,
    #[serde(default = "config_defaults::default_timeout_secs")]
    timeout_secs: u64,
    /// Peer verification for operation calls.
    #[serde(default)]
    verify_peer: bool,
    /// When set, the last response is written here as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot_path: Option<LiteralOrEnv<PathBuf>>,
}

pub mod config_defaults {
    use std::env;
    use std::path::PathBuf;

    use super::LiteralOrEnv;
    use crate::sipay::{DEFAULT_API_KEY, DEFAULT_CURRENCY, DEFAULT_LANG};

    pub const DEFAULT_CERT_DIR: &str = "certs";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub fn default_currency() -> LiteralOrEnv<String> {
        LiteralOrEnv::from_literal(DEFAULT_CURRENCY.to_string())
    }

    pub fn default_lang() -> LiteralOrEnv<String> {
        LiteralOrEnv::from_literal(DEFAULT_LANG.to_string())
    }

    pub fn default_api_key() -> LiteralOrEnv<String> {
        LiteralOrEnv::from_literal(DEFAULT_API_KEY.to_string())
    }

    /// `$SIPAY_CERT_DIR`, then `certs`.
    pub fn default_cert_dir() -> LiteralOrEnv<PathBuf> {
        let dir = env::var_os("SIPAY_CERT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_DIR));
        LiteralOrEnv::from_literal(dir)
    }

    pub fn default_timeout_secs() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }
}

impl SipayConfig {
    /// Reads and parses a JSON config file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn environment(&self) -> Environment {
        *self.environment
    }

    pub fn cert_dir(&self) -> &Path {
        self.cert_dir.inner()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_ref().map(|path| path.inner().as_path())
    }

    /// A client with the configured timeout and, if any, the snapshot observer.
    pub fn client(&self) -> SipayClient {
        let client =
            SipayClient::new(self.environment(), self.cert_dir()).with_timeout(self.timeout());
        match self.snapshot_path() {
            Some(path) => client.with_observer(Arc::new(SnapshotFile::new(path))),
            None => client,
        }
    }

    pub fn options(&self) -> SipayOptions {
        SipayOptions::new(self.merchant_id.inner(), self.merchant_name.inner())
            .with_currency(self.currency.inner())
            .with_lang(self.lang.inner())
            .with_api_key(self.api_key.inner())
            .with_verify_peer(self.verify_peer)
    }

    /// Builds the façade; fails when the merchant id or name is empty.
    pub fn sipay(&self) -> Result<Sipay, ConfigError> {
        Sipay::new(self.client(), self.options())
    }
}
