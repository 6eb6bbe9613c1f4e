//! Minimal Twilio Chat v2 REST client.
//!
//! Requests use HTTP basic auth with the account SID and auth token. Write
//! calls send `application/x-www-form-urlencoded` bodies; responses are JSON.
//! Only the endpoints the provider manages are covered.

mod credential;
mod service;

pub use credential::{ChatCredential, CreateCredentialParams, UpdateCredentialParams};
pub use service::{
    ChatService, CreateServiceParams, NotificationParams, NotificationTemplate, ServiceLimits,
    ServiceNotifications, UpdateServiceParams,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Default Chat API host.
pub const DEFAULT_CHAT_BASE_URL: &str = "https://chat.twilio.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the Twilio REST API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[error("{message} (code {code}, status {status})")]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Twilio error code.
    #[serde(default)]
    pub code: i64,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Link to the error reference.
    #[serde(default)]
    pub more_info: Option<String>,
}

/// Errors returned by [`TwilioClient`].
#[derive(Debug, Error)]
pub enum TwilioError {
    /// The API answered with a non-success status.
    #[error("{0}")]
    Api(ApiError),
    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The request could not be sent.
    #[error("network error: {0}")]
    Network(String),
    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TwilioError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Form parameters. A key may repeat (e.g. `WebhookFilters`).
pub type FormParams = Vec<(String, String)>;

/// Authenticated client for the Chat v2 API.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    /// Create a client for the given account.
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, TwilioError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("twilio-chat-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different Chat API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The account this client acts on.
    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    /// The Chat API host in use.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TwilioError> {
        debug!(path = %path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &FormParams,
    ) -> Result<T, TwilioError> {
        debug!(path = %path, params = form.len(), "POST");
        let response = self
            .http
            .post(self.url(path))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;
        decode(response).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), TwilioError> {
        debug!(path = %path, "DELETE");
        let response = self
            .http
            .delete(self.url(path))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TwilioError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| TwilioError::Decode(e.to_string()))
}

async fn api_error(response: reqwest::Response) -> TwilioError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| ApiError {
        status,
        code: 0,
        message: if body.is_empty() {
            "empty error response".to_string()
        } else {
            body
        },
        more_info: None,
    });
    warn!(status = status, code = error.code, "Twilio API request failed");
    TwilioError::Api(error)
}

pub(crate) fn push_opt<T: ToString>(form: &mut FormParams, key: &str, value: &Option<T>) {
    if let Some(v) = value {
        form.push((key.to_string(), v.to_string()));
    }
}
