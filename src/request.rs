//! Outbound request model.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::RequestValidationError;

/// JSON parameters sent as the request body.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Request headers. Later writes to the same name replace earlier ones.
pub type Headers = BTreeMap<String, String>;

/// HTTP methods accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "DELETE")]
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = RequestValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" => Err(RequestValidationError::MissingMethod),
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(RequestValidationError::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for http::Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Delete => http::Method::DELETE,
        }
    }
}

/// A single gateway request.
///
/// Construction never fails: the method is stored as given (upper-cased) and is
/// only checked by [`Request::validate_method`] / [`Request::url`], right before
/// the request is handed to a transport.
#[derive(Clone, Default, Serialize)]
pub struct Request {
    method: String,
    endpoint: Option<Url>,
    headers: Headers,
    params: Params,
}

/// Parameter values are left out: they may hold card data.
impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Request {
    pub fn new(method: impl AsRef<str>, endpoint: Option<Url>, params: Params) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            endpoint,
            headers: Headers::new(),
            params,
        }
    }

    pub fn get(endpoint: Url) -> Self {
        Self::new(HttpMethod::Get.as_str(), Some(endpoint), Params::new())
    }

    pub fn post(endpoint: Url, params: Params) -> Self {
        Self::new(HttpMethod::Post.as_str(), Some(endpoint), params)
    }

    pub fn delete(endpoint: Url, params: Params) -> Self {
        Self::new(HttpMethod::Delete.as_str(), Some(endpoint), params)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_method(&mut self, method: impl AsRef<str>) {
        self.method = method.as_ref().to_ascii_uppercase();
    }

    /// Checks that the method is present and one of `GET`, `POST`, `DELETE`.
    pub fn validate_method(&self) -> Result<HttpMethod, RequestValidationError> {
        self.method.parse()
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    pub fn set_endpoint(&mut self, endpoint: Url) -> &mut Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Returns the URL to send this request to, validating the method first.
    pub fn url(&self) -> Result<&Url, RequestValidationError> {
        self.validate_method()?;
        self.endpoint
            .as_ref()
            .ok_or(RequestValidationError::MissingEndpoint)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Merges `headers` into the current set; incoming values win.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn set_params(&mut self, params: Params) -> &mut Self {
        self.params = params;
        self
    }

    /// Parameters to serialize as the JSON body. Always empty for `GET`.
    pub fn body(&self) -> Params {
        if self.method == HttpMethod::Get.as_str() {
            Params::new()
        } else {
            self.params.clone()
        }
    }
}
