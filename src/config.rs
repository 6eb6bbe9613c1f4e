//! Provider configuration.
//!
//! Credentials come from the provider block first and the environment second.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::twilio::DEFAULT_CHAT_BASE_URL;

/// Environment variable holding the account SID.
pub const ACCOUNT_SID_ENV: &str = "TWILIO_ACCOUNT_SID";

/// Environment variable holding the auth token.
pub const AUTH_TOKEN_ENV: &str = "TWILIO_AUTH_TOKEN";

/// Raw provider configuration as sent by the host.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Twilio account SID (`AC...`).
    pub account_sid: Option<String>,
    /// Twilio auth token.
    pub auth_token: Option<String>,
    /// Chat API host, mainly for testing against a mock server.
    pub chat_base_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("chat_base_url", &self.chat_base_url)
            .finish()
    }
}

/// Configuration with credentials resolved and defaults applied.
#[derive(Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Twilio account SID.
    pub account_sid: String,
    /// Twilio auth token.
    pub auth_token: String,
    /// Chat API host.
    pub chat_base_url: String,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("chat_base_url", &self.chat_base_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Parse the host's JSON config. A null config is treated as empty.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Resolve credentials against the process environment.
    pub fn resolve(self) -> Result<ResolvedConfig, ProviderError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve credentials, looking up missing ones with `env`.
    pub fn resolve_with<F>(self, env: F) -> Result<ResolvedConfig, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_sid = non_empty(self.account_sid).or_else(|| non_empty(env(ACCOUNT_SID_ENV)));
        let auth_token = non_empty(self.auth_token).or_else(|| non_empty(env(AUTH_TOKEN_ENV)));

        let (Some(account_sid), Some(auth_token)) = (account_sid, auth_token) else {
            return Err(ProviderError::Configuration(
                "accountSid and authToken is required".to_string(),
            ));
        };

        Ok(ResolvedConfig {
            account_sid,
            auth_token,
            chat_base_url: non_empty(self.chat_base_url)
                .unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
