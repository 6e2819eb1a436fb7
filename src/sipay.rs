//! Operation façade over [`Authenticator`] and [`SipayClient`].
//!
//! Every operation except the card lookup is a two-leg flow:
//!
//! 1. `POST /auth` naming the target resource (peer always verified);
//! 2. if the expected id was granted, the operation call itself, carrying it.
//!
//! When the id is missing the `/auth` answer is handed back untouched as
//! [`Outcome::Rejected`]. Transport failures and payload errors on the
//! operation call are returned as [`SipayError`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use sipay_rs::client::SipayClient;
//! use sipay_rs::sipay::{Payment, Sipay, SipayOptions};
//!
//! # async fn run() -> Result<(), sipay_rs::error::SipayError> {
//! let client = SipayClient::try_new("sandbox", "/etc/sipay/certs")?;
//! let sipay = Sipay::new(client, SipayOptions::new("merchant-1", "Shop"))?;
//! let outcome = sipay
//!     .payment(Payment {
//!         amount: "100".into(),
//!         ticket: "order-42".into(),
//!         pan: "4548812049400004".into(),
//!         expiration: "2212".into(),
//!         cardholder_name: "Jane Doe".into(),
//!         cvv: "123".into(),
//!     })
//!     .await?;
//! println!("{}", serde_json::Value::Object(outcome.into_body()));
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

use crate::auth::{AuthPayload, Authenticator, TokenKind};
use crate::client::SipayClient;
use crate::error::{ConfigError, SipayError};
use crate::request::{HttpMethod, Params, Request};

pub const DEFAULT_CURRENCY: &str = "978";
pub const DEFAULT_LANG: &str = "0";
pub const DEFAULT_API_KEY: &str = "123456789";

const AUTH_TYPE: &str = "sslclient";

/// Gateway operation family, appended to the operation base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    TokenizationStorages,
    TokenizationPayments,
    TokenizationRefunds,
    Payments,
    Refunds,
    RefundsById,
    Cancelations,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::TokenizationStorages => "tokenizations/storages",
            Resource::TokenizationPayments => "tokenizations/payments",
            Resource::TokenizationRefunds => "tokenizations/refunds",
            Resource::Payments => "payments",
            Resource::Refunds => "refunds",
            Resource::RefundsById => "refundsbyid",
            Resource::Cancelations => "cancelations",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn force_slash_prefix(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn params<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Params {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::from(value)))
        .collect()
}

/// Merchant identity and defaults sent with every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipayOptions {
    pub merchant_id: String,
    pub merchant_name: String,
    pub currency: String,
    pub lang: String,
    pub api_key: String,
    /// Peer verification for operation calls. `/auth` always verifies.
    pub verify_peer: bool,
}

impl SipayOptions {
    pub fn new(merchant_id: impl Into<String>, merchant_name: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            merchant_name: merchant_name.into(),
            currency: DEFAULT_CURRENCY.to_string(),
            lang: DEFAULT_LANG.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            verify_peer: false,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_verify_peer(mut self, verify_peer: bool) -> Self {
        self.verify_peer = verify_peer;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.merchant_id.trim().is_empty() {
            return Err(ConfigError::MissingField("merchantid"));
        }
        if self.merchant_name.trim().is_empty() {
            return Err(ConfigError::MissingField("merchantname"));
        }
        Ok(())
    }
}

/// Result of an operation that went through `/auth`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// Decoded body of the operation call.
    Completed(Params),
    /// `/auth` did not grant the expected id; its answer, unchanged.
    Rejected(AuthPayload),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn body(&self) -> &Params {
        match self {
            Outcome::Completed(body) => body,
            Outcome::Rejected(payload) => payload.as_params(),
        }
    }

    pub fn into_body(self) -> Params {
        match self {
            Outcome::Completed(body) => body,
            Outcome::Rejected(payload) => payload.into_params(),
        }
    }
}

/// Card to store in the gateway vault.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct StoreCard {
    #[arg(long)]
    pub pan: String,
    /// Expiration as `YYMM`.
    #[arg(long)]
    pub expiration: String,
    #[arg(long)]
    pub cardholder_name: String,
    /// Merchant-side token naming the stored card.
    #[arg(long)]
    pub card_index: String,
    /// Order placed alongside the storage, if any.
    #[arg(long, default_value = "")]
    #[serde(default)]
    pub order_id: String,
    /// Ticket used for the verification charge when no order is given.
    #[arg(long, default_value = "")]
    #[serde(default)]
    pub card_id: String,
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct DeleteCard {
    #[arg(long)]
    pub card_index: String,
}

/// Lookup of a stored card. Carries an `idstorage` obtained beforehand.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct CardLookup {
    #[arg(long)]
    pub card_index: String,
    #[arg(long)]
    pub id_storage: String,
}

/// Charge against a stored card.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct TokenizationPayment {
    #[arg(long)]
    pub card_index: String,
    /// Amount in minor units.
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub ticket: String,
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct TokenizationRefund {
    #[arg(long)]
    pub card_index: String,
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub ticket: String,
    #[arg(long)]
    pub transaction_id: String,
}

/// Charge against a card that is not stored.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Payment {
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub ticket: String,
    #[arg(long)]
    pub pan: String,
    #[arg(long)]
    pub expiration: String,
    #[arg(long)]
    pub cardholder_name: String,
    #[arg(long)]
    pub cvv: String,
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Refund {
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub ticket: String,
    #[arg(long)]
    pub pan: String,
    #[arg(long)]
    pub expiration: String,
    #[arg(long)]
    pub transaction_id: String,
}

/// Refund of an earlier transaction, referenced by its id.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct RefundById {
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub ticket: String,
    #[arg(long)]
    pub transaction_id: String,
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Cancelation {
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub ticket: String,
    #[arg(long)]
    pub transaction_id: String,
}

/// One authorized operation: what to ask `/auth` for and where to send the result.
struct Operation {
    auth_resource: Resource,
    auth_config: Params,
    token: TokenKind,
    method: HttpMethod,
    target: Resource,
    /// Key under which the granted id is sent to `target`.
    id_field: &'static str,
}

/// Entry point for card storage, payments, refunds and cancelations.
#[derive(Debug, Clone)]
pub struct Sipay {
    client: Arc<SipayClient>,
    authenticator: Authenticator,
    options: SipayOptions,
}

impl Sipay {
    /// Fails with [`ConfigError::MissingField`] when the merchant id or name is empty.
    pub fn new(client: SipayClient, options: SipayOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let client = Arc::new(client);
        let authenticator = Authenticator::try_new(client.clone())?;
        Ok(Self {
            client,
            authenticator,
            options,
        })
    }

    pub fn client(&self) -> &SipayClient {
        &self.client
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn options(&self) -> &SipayOptions {
        &self.options
    }

    /// `<operation base URL>/<path>`.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let url = format!(
            "{}{}",
            self.client.environment().api_url(),
            force_slash_prefix(path)
        );
        Url::parse(&url).map_err(|e| ConfigError::UrlParse {
            context: format!("Failed to construct {url} URL"),
            source: e,
        })
    }

    /// Requests an id from `/auth`, merchant defaults merged under `config`.
    pub async fn authenticate(&self, config: Params) -> Result<AuthPayload, SipayError> {
        let mut merged = params([
            ("merchantid", self.options.merchant_id.as_str()),
            ("lang", self.options.lang.as_str()),
            ("currency", self.options.currency.as_str()),
        ]);
        merged.extend(config);
        self.authenticator.request_authentication(merged).await
    }

    #[instrument(name = "sipay.store_card", skip_all)]
    pub async fn store_card(&self, card: StoreCard) -> Result<Outcome, SipayError> {
        let (checkmode, ticket) = if card.order_id.is_empty() {
            ("mode1", card.card_id.as_str())
        } else {
            ("", card.order_id.as_str())
        };
        self.authorized(self.storage_operation(HttpMethod::Post), {
            params([
                ("apikey", self.options.api_key.as_str()),
                ("authtype", AUTH_TYPE),
                ("lang", self.options.lang.as_str()),
                ("merchantid", self.options.merchant_id.as_str()),
                ("merchantname", self.options.merchant_name.as_str()),
                ("pan", card.pan.as_str()),
                ("expiration", card.expiration.as_str()),
                ("cardholdername", card.cardholder_name.as_str()),
                ("cardindex", card.card_index.as_str()),
                ("tokenizations.checkmode", checkmode),
                ("tokenizations.ticket", ticket),
            ])
        })
        .await
    }

    #[instrument(name = "sipay.delete_card", skip_all)]
    pub async fn delete_card(&self, card: DeleteCard) -> Result<Outcome, SipayError> {
        self.authorized(self.storage_operation(HttpMethod::Delete), {
            params([
                ("apikey", self.options.api_key.as_str()),
                ("authtype", AUTH_TYPE),
                ("lang", self.options.lang.as_str()),
                ("merchantid", self.options.merchant_id.as_str()),
                ("merchantname", self.options.merchant_name.as_str()),
                ("cardindex", card.card_index.as_str()),
            ])
        })
        .await
    }

    /// Looks up a stored card. No `/auth` round-trip: the gateway reads the
    /// `idstorage` supplied by the caller from the request headers.
    #[instrument(name = "sipay.card", skip_all)]
    pub async fn card(&self, lookup: CardLookup) -> Result<Params, SipayError> {
        let path = format!(
            "{}{}",
            Resource::TokenizationStorages,
            force_slash_prefix(&lookup.card_index)
        );
        let mut request = Request::get(self.endpoint(&path)?);
        request.set_headers([
            ("Accept", "application/json"),
            ("X-Sipay-API-v1-idstorage", lookup.id_storage.as_str()),
            ("X-Sipay-API-v1-merchantid", self.options.merchant_id.as_str()),
            ("X-Sipay-API-v1-merchantname", self.options.merchant_name.as_str()),
            ("X-Sipay-API-v1-authtype", AUTH_TYPE),
            ("X-Sipay-API-v1-lang", self.options.lang.as_str()),
        ]);
        let response = self
            .client
            .send_request(request, self.options.verify_peer)
            .await?;
        Ok(response.into_decoded_body())
    }

    #[instrument(name = "sipay.tokenization_payment", skip_all)]
    pub async fn tokenization_payment(
        &self,
        payment: TokenizationPayment,
    ) -> Result<Outcome, SipayError> {
        let operation = Operation {
            auth_resource: Resource::TokenizationPayments,
            auth_config: params([
                ("ticket", payment.ticket.as_str()),
                ("amount", payment.amount.as_str()),
                ("api.notpage", ""),
                ("api.notmode", ""),
                ("api.dstpage", ""),
                ("reference", ""),
            ]),
            token: TokenKind::IdRequest,
            method: HttpMethod::Post,
            target: Resource::TokenizationPayments,
            id_field: "idrequest",
        };
        self.authorized(operation, {
            let mut data = self.merchant_params();
            data.extend(params([
                ("cardindex", payment.card_index.as_str()),
                ("amount", payment.amount.as_str()),
                ("ticket", payment.ticket.as_str()),
                ("reference", ""),
            ]));
            data
        })
        .await
    }

    /// Refund against a stored card. The granted `idrefund` travels as `idrequest`.
    #[instrument(name = "sipay.tokenization_refund", skip_all)]
    pub async fn tokenization_refund(
        &self,
        refund: TokenizationRefund,
    ) -> Result<Outcome, SipayError> {
        let operation = Operation {
            auth_resource: Resource::TokenizationRefunds,
            auth_config: params([
                ("ticket", refund.ticket.as_str()),
                ("amount", refund.amount.as_str()),
                ("api.notpage", ""),
                ("api.notmode", ""),
                ("reference", ""),
            ]),
            token: TokenKind::IdRefund,
            method: HttpMethod::Post,
            target: Resource::TokenizationRefunds,
            id_field: "idrequest",
        };
        self.authorized(operation, {
            let mut data = self.merchant_params();
            data.extend(params([
                ("cardindex", refund.card_index.as_str()),
                ("amount", refund.amount.as_str()),
                ("ticket", refund.ticket.as_str()),
                ("reference", ""),
                ("transaction_id", refund.transaction_id.as_str()),
            ]));
            data
        })
        .await
    }

    #[instrument(name = "sipay.payment", skip_all)]
    pub async fn payment(&self, payment: Payment) -> Result<Outcome, SipayError> {
        let operation = Operation {
            auth_resource: Resource::Payments,
            auth_config: params([
                ("ticket", payment.ticket.as_str()),
                ("amount", payment.amount.as_str()),
                ("api.notpage", ""),
                ("api.notmode", ""),
                ("api.dstpage", ""),
                ("reference", ""),
            ]),
            token: TokenKind::IdRequest,
            method: HttpMethod::Post,
            target: Resource::Payments,
            id_field: "idrequest",
        };
        self.authorized(operation, {
            let mut data = self.merchant_params();
            data.extend(params([
                ("amount", payment.amount.as_str()),
                ("ticket", payment.ticket.as_str()),
                ("pan", payment.pan.as_str()),
                ("expiration", payment.expiration.as_str()),
                ("cardholdername", payment.cardholder_name.as_str()),
                ("cvv", payment.cvv.as_str()),
                ("reference", ""),
                ("customfield1", ""),
                ("customfield2", ""),
            ]));
            data
        })
        .await
    }

    #[instrument(name = "sipay.refund", skip_all)]
    pub async fn refund(&self, refund: Refund) -> Result<Outcome, SipayError> {
        let operation = Operation {
            auth_resource: Resource::Refunds,
            auth_config: self.refund_auth_config(&refund.ticket, &refund.amount),
            token: TokenKind::IdRefund,
            method: HttpMethod::Post,
            target: Resource::Refunds,
            id_field: "idrefund",
        };
        self.authorized(operation, {
            let mut data = self.merchant_params();
            data.extend(params([
                ("amount", refund.amount.as_str()),
                ("ticket", refund.ticket.as_str()),
                ("pan", refund.pan.as_str()),
                ("expiration", refund.expiration.as_str()),
                ("transaction_id", refund.transaction_id.as_str()),
            ]));
            data
        })
        .await
    }

    /// Authenticates against `refunds`, then posts to `refundsbyid`.
    #[instrument(name = "sipay.refund_by_id", skip_all)]
    pub async fn refund_by_id(&self, refund: RefundById) -> Result<Outcome, SipayError> {
        let operation = Operation {
            auth_resource: Resource::Refunds,
            auth_config: self.refund_auth_config(&refund.ticket, &refund.amount),
            token: TokenKind::IdRefund,
            method: HttpMethod::Post,
            target: Resource::RefundsById,
            id_field: "idrequest",
        };
        self.authorized(operation, {
            let mut data = self.merchant_params();
            data.extend(params([
                ("amount", refund.amount.as_str()),
                ("ticket", refund.ticket.as_str()),
                ("idoriginalrequest", refund.transaction_id.as_str()),
            ]));
            data
        })
        .await
    }

    #[instrument(name = "sipay.cancelation", skip_all)]
    pub async fn cancelation(&self, cancelation: Cancelation) -> Result<Outcome, SipayError> {
        let operation = Operation {
            auth_resource: Resource::Cancelations,
            auth_config: params([
                ("apikey", self.options.api_key.as_str()),
                ("ticket", cancelation.ticket.as_str()),
                ("amount", cancelation.amount.as_str()),
                ("api.notpage", ""),
                ("api.notmode", ""),
            ]),
            token: TokenKind::IdCancelation,
            method: HttpMethod::Post,
            target: Resource::Cancelations,
            id_field: "idcancelation",
        };
        self.authorized(operation, {
            params([
                ("authtype", AUTH_TYPE),
                ("merchantid", self.options.merchant_id.as_str()),
                ("merchantname", self.options.merchant_name.as_str()),
                ("transactionid", cancelation.transaction_id.as_str()),
            ])
        })
        .await
    }

    fn storage_operation(&self, method: HttpMethod) -> Operation {
        Operation {
            auth_resource: Resource::TokenizationStorages,
            auth_config: params([
                ("apikey", self.options.api_key.as_str()),
                ("ticket", ""),
                ("amount", ""),
            ]),
            token: TokenKind::IdStorage,
            method,
            target: Resource::TokenizationStorages,
            id_field: "idstorage",
        }
    }

    fn refund_auth_config(&self, ticket: &str, amount: &str) -> Params {
        params([
            ("apikey", self.options.api_key.as_str()),
            ("ticket", ticket),
            ("amount", amount),
            ("api.notpage", ""),
            ("api.notmode", ""),
            ("api.dstpage", ""),
            ("reference", ""),
        ])
    }

    fn merchant_params(&self) -> Params {
        params([
            ("authtype", AUTH_TYPE),
            ("lang", self.options.lang.as_str()),
            ("currency", self.options.currency.as_str()),
            ("merchantid", self.options.merchant_id.as_str()),
            ("merchantname", self.options.merchant_name.as_str()),
        ])
    }

    /// Runs `/auth`, then sends `data` plus the granted id, forwarded as sent.
    async fn authorized(
        &self,
        operation: Operation,
        mut data: Params,
    ) -> Result<Outcome, SipayError> {
        let Operation {
            auth_resource,
            mut auth_config,
            token,
            method,
            target,
            id_field,
        } = operation;
        auth_config.insert("resource".to_string(), Value::from(auth_resource.as_str()));

        let payload = self.authenticate(auth_config).await?;
        let Some(id) = payload.token(token) else {
            tracing::info!(
                resource = %auth_resource,
                token = %token,
                "No id granted, skipping operation call"
            );
            return Ok(Outcome::Rejected(payload));
        };

        data.insert(id_field.to_string(), id.clone());
        let endpoint = self.endpoint(target.as_str())?;
        let request = Request::new(method.as_str(), Some(endpoint), data);
        let response = self
            .client
            .send_request(request, self.options.verify_peer)
            .await?;
        Ok(Outcome::Completed(response.into_decoded_body()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResponseErrorKind, TransportError};
    use crate::testing::FakeTransport;
    use serde_json::json;

    fn sipay(transport: Arc<FakeTransport>) -> Sipay {
        let client = SipayClient::try_new("sandbox", "certs")
            .unwrap()
            .with_transport(transport);
        Sipay::new(client, SipayOptions::new("merchant-1", "Lavanapp")).unwrap()
    }

    fn object(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn payment() -> Payment {
        Payment {
            amount: "100".into(),
            ticket: "order-42".into(),
            pan: "4548812049400004".into(),
            expiration: "2212".into(),
            cardholder_name: "Jane Doe".into(),
            cvv: "123".into(),
        }
    }

    #[test]
    fn test_merchant_identity_required() {
        let client = SipayClient::try_new("sandbox", "certs").unwrap();
        let err = Sipay::new(client.clone(), SipayOptions::new("", "Lavanapp")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("merchantid")));
        let err = Sipay::new(client, SipayOptions::new("merchant-1", " ")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("merchantname")));
    }

    #[test]
    fn test_endpoint_forces_slash_prefix() {
        let sipay = sipay(Arc::new(FakeTransport::new()));
        assert_eq!(
            sipay.endpoint("payments").unwrap().as_str(),
            "https://sandbox.sipayecommerce.sipay.es/api/v1/payments"
        );
        assert_eq!(
            sipay.endpoint("/refundsbyid").unwrap().as_str(),
            "https://sandbox.sipayecommerce.sipay.es/api/v1/refundsbyid"
        );
    }

    #[tokio::test]
    async fn test_payment_posts_granted_idrequest() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idrequest": "abc123"}))
                .reply_json(200, json!({"result": 0, "transaction_id": "tx-1"})),
        );
        let outcome = sipay(transport.clone()).payment(payment()).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Completed(object(json!({"result": 0, "transaction_id": "tx-1"})))
        );

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);

        let auth = &calls[0];
        assert!(auth.verify_peer);
        assert_eq!(auth.method, HttpMethod::Post);
        assert_eq!(
            auth.body,
            object(json!({
                "authtype": "sslclient",
                "api.notpage": "",
                "api.notmode": "",
                "api.dstpage": "",
                "merchantid": "merchant-1",
                "lang": "0",
                "currency": "978",
                "resource": "payments",
                "ticket": "order-42",
                "amount": "100",
                "reference": "",
            }))
        );

        let operation = &calls[1];
        assert!(!operation.verify_peer);
        assert_eq!(operation.method, HttpMethod::Post);
        assert_eq!(
            operation.url.as_str(),
            "https://sandbox.sipayecommerce.sipay.es/api/v1/payments"
        );
        assert_eq!(operation.body["idrequest"], "abc123");
        assert_eq!(operation.body["merchantname"], "Lavanapp");
        assert_eq!(operation.body["cardholdername"], "Jane Doe");
        assert_eq!(operation.body["cvv"], "123");
        assert_eq!(operation.body["customfield2"], "");
    }

    #[tokio::test]
    async fn test_declined_auth_returned_unchanged() {
        let declined = json!({"error": {"code": 5, "message": "declined"}});
        let transport = Arc::new(FakeTransport::new().reply_json(200, declined.clone()));

        let outcome = sipay(transport.clone()).payment(payment()).await.unwrap();
        assert!(!outcome.is_completed());
        assert_eq!(outcome.into_body(), object(declined));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_granted_id_still_proceeds() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idrequest": ""}))
                .reply_json(200, json!({"result": 0})),
        );
        let outcome = sipay(transport.clone()).payment(payment()).await.unwrap();
        assert!(outcome.is_completed());

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].body["idrequest"], "");
    }

    #[tokio::test]
    async fn test_authentication_error_on_operation_call_is_raised() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idrequest": "abc123"}))
                .reply_json(200, json!({"error": {"code": 15, "type": "OAuthException"}})),
        );
        let err = sipay(transport).payment(payment()).await.unwrap_err();
        match err {
            SipayError::Response(e) => assert_eq!(e.kind(), ResponseErrorKind::Authentication),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_on_auth_is_raised() {
        let transport = Arc::new(FakeTransport::new().reply_err(TransportError::timeout(
            "Operation timed out after 60000 milliseconds",
        )));
        let err = sipay(transport.clone())
            .refund(Refund {
                amount: "100".into(),
                ticket: "order-42".into(),
                pan: "4548812049400004".into(),
                expiration: "2212".into(),
                transaction_id: "tx-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SipayError::Transport(_)));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_card_lookup_skips_auth() {
        let transport = Arc::new(FakeTransport::new().reply_json(200, json!({"pan": "454881******0004"})));
        let body = sipay(transport.clone())
            .card(CardLookup {
                card_index: "card-7".into(),
                id_storage: "st-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(body["pan"], "454881******0004");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.method, HttpMethod::Get);
        assert_eq!(
            call.url.as_str(),
            "https://sandbox.sipayecommerce.sipay.es/api/v1/tokenizations/storages/card-7"
        );
        assert!(call.body.is_empty());
        assert_eq!(call.headers["X-Sipay-API-v1-idstorage"], "st-1");
        assert_eq!(call.headers["X-Sipay-API-v1-merchantid"], "merchant-1");
        assert_eq!(call.headers["X-Sipay-API-v1-authtype"], "sslclient");
        assert_eq!(call.headers["Accept"], "application/json");
        assert_eq!(call.headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_store_card_checkmode_follows_order() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idstorage": "st-1"}))
                .reply_json(200, json!({"result": 0}))
                .reply_json(200, json!({"idstorage": "st-2"}))
                .reply_json(200, json!({"result": 0})),
        );
        let sipay = sipay(transport.clone());
        let card = StoreCard {
            pan: "4548812049400004".into(),
            expiration: "2212".into(),
            cardholder_name: "Jane Doe".into(),
            card_index: "card-7".into(),
            order_id: String::new(),
            card_id: "card-ticket".into(),
        };
        sipay.store_card(card.clone()).await.unwrap();
        sipay
            .store_card(StoreCard {
                order_id: "order-42".into(),
                ..card
            })
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].body["resource"], "tokenizations/storages");
        assert_eq!(calls[0].body["apikey"], DEFAULT_API_KEY);
        assert_eq!(
            calls[1].url.as_str(),
            "https://sandbox.sipayecommerce.sipay.es/api/v1/tokenizations/storages"
        );
        assert_eq!(calls[1].body["idstorage"], "st-1");
        assert_eq!(calls[1].body["tokenizations.checkmode"], "mode1");
        assert_eq!(calls[1].body["tokenizations.ticket"], "card-ticket");
        assert_eq!(calls[3].body["idstorage"], "st-2");
        assert_eq!(calls[3].body["tokenizations.checkmode"], "");
        assert_eq!(calls[3].body["tokenizations.ticket"], "order-42");
    }

    #[tokio::test]
    async fn test_delete_card_uses_delete() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idstorage": "st-1"}))
                .reply_json(200, json!({"result": 0})),
        );
        sipay(transport.clone())
            .delete_card(DeleteCard {
                card_index: "card-7".into(),
            })
            .await
            .unwrap();
        let calls = transport.calls();
        assert_eq!(calls[1].method, HttpMethod::Delete);
        assert_eq!(calls[1].body["cardindex"], "card-7");
        assert_eq!(calls[1].body["idstorage"], "st-1");
    }

    #[tokio::test]
    async fn test_refund_by_id_authenticates_against_refunds() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idrefund": 778}))
                .reply_json(200, json!({"result": 0})),
        );
        sipay(transport.clone())
            .refund_by_id(RefundById {
                amount: "50".into(),
                ticket: "order-42".into(),
                transaction_id: "tx-1".into(),
            })
            .await
            .unwrap();
        let calls = transport.calls();
        assert_eq!(calls[0].body["resource"], "refunds");
        assert_eq!(calls[0].body["apikey"], DEFAULT_API_KEY);
        assert_eq!(
            calls[1].url.as_str(),
            "https://sandbox.sipayecommerce.sipay.es/api/v1/refundsbyid"
        );
        assert_eq!(calls[1].body["idrequest"], 778);
        assert_eq!(calls[1].body["idoriginalrequest"], "tx-1");
        assert!(calls[1].body.get("idrefund").is_none());
    }

    #[tokio::test]
    async fn test_tokenization_refund_sends_idrefund_as_idrequest() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idrefund": "rf-1"}))
                .reply_json(200, json!({"result": 0})),
        );
        sipay(transport.clone())
            .tokenization_refund(TokenizationRefund {
                card_index: "card-7".into(),
                amount: "50".into(),
                ticket: "order-42".into(),
                transaction_id: "tx-1".into(),
            })
            .await
            .unwrap();
        let calls = transport.calls();
        assert_eq!(calls[0].body["resource"], "tokenizations/refunds");
        assert_eq!(calls[1].body["idrequest"], "rf-1");
        assert_eq!(calls[1].body["transaction_id"], "tx-1");
    }

    #[tokio::test]
    async fn test_cancelation_body() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idcancelation": "c-1"}))
                .reply_json(200, json!({"result": 0})),
        );
        sipay(transport.clone())
            .cancelation(Cancelation {
                amount: "100".into(),
                ticket: "order-42".into(),
                transaction_id: "tx-1".into(),
            })
            .await
            .unwrap();
        let calls = transport.calls();
        assert_eq!(
            calls[1].body,
            object(json!({
                "authtype": "sslclient",
                "merchantid": "merchant-1",
                "merchantname": "Lavanapp",
                "idcancelation": "c-1",
                "transactionid": "tx-1",
            }))
        );
    }

    #[tokio::test]
    async fn test_operation_verify_peer_is_configurable() {
        let transport = Arc::new(
            FakeTransport::new()
                .reply_json(200, json!({"idrequest": "abc123"}))
                .reply_json(200, json!({"result": 0})),
        );
        let client = SipayClient::try_new("live", "certs")
            .unwrap()
            .with_transport(transport.clone());
        let sipay = Sipay::new(
            client,
            SipayOptions::new("merchant-1", "Lavanapp")
                .with_currency("840")
                .with_verify_peer(true),
        )
        .unwrap();
        sipay
            .tokenization_payment(TokenizationPayment {
                card_index: "card-7".into(),
                amount: "100".into(),
                ticket: "order-42".into(),
            })
            .await
            .unwrap();

        let calls = transport.calls();
        assert!(calls.iter().all(|call| call.verify_peer));
        assert_eq!(calls[0].body["currency"], "840");
        assert_eq!(calls[1].body["currency"], "840");
        assert_eq!(
            calls[1].url.as_str(),
            "https://sipayecommerce.sipay.es/api/v1/tokenizations/payments"
        );
    }
}
