//! Rust client for the Sipay ecommerce payment gateway.
//!
//! Sipay operations (card storage, payments, refunds, cancelations) are
//! two-step: the merchant first asks the `/auth` endpoint for a short-lived id,
//! then calls the operation endpoint carrying that id. Both legs run over
//! HTTPS with mutual TLS, using a per-environment client certificate.
//!
//! # Modules
//!
//! - [`environment`] - Deployment targets (sandbox, staging, live) with their URLs and certificates.
//! - [`request`] / [`response`] - Request model and lazily decoded responses.
//! - [`error`] - Error taxonomy and classification of gateway error payloads.
//! - [`transport`] - The [`Transport`](transport::Transport) seam and its reqwest implementation.
//! - [`client`] - [`SipayClient`], which sends one request and classifies the answer.
//! - [`auth`] - The `/auth` leg; declined authentications are returned as data.
//! - [`sipay`] - The [`Sipay`] façade exposing every gateway operation.
//! - [`observer`] - Debug hooks that see every response.
//! - [`config`] - JSON configuration with `$ENV` indirection.
//! - [`util`] - Logging setup for the `sipay` binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use sipay_rs::{CardLookup, Sipay, SipayClient, SipayOptions};
//!
//! # async fn run() -> Result<(), sipay_rs::SipayError> {
//! let client = SipayClient::try_new("sandbox", "/etc/sipay/certs")?;
//! let sipay = Sipay::new(client, SipayOptions::new("merchant-1", "Shop"))?;
//! let card = sipay
//!     .card(CardLookup {
//!         card_index: "card-7".into(),
//!         id_storage: "st-1".into(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod observer;
pub mod request;
pub mod response;
pub mod sipay;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testing;

pub use auth::{AuthPayload, Authenticator, TokenKind};
pub use client::SipayClient;
pub use config::SipayConfig;
pub use environment::{CertificateBundle, Environment};
pub use error::{
    ConfigError, ErrorPayload, RequestValidationError, ResponseError, ResponseErrorKind,
    SipayError, TransportError, TransportErrorKind,
};
pub use observer::{ResponseObserver, SnapshotFile};
pub use request::{Headers, HttpMethod, Params, Request};
pub use response::Response;
pub use sipay::{
    Cancelation, CardLookup, DeleteCard, Outcome, Payment, Refund, RefundById, Sipay,
    SipayOptions, StoreCard, TokenizationPayment, TokenizationRefund,
};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportRequest};
