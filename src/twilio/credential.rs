//! Wire types mirror Twilio's JSON field and form parameter names.
#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{push_opt, FormParams, TwilioClient, TwilioError};

/// A push credential as returned by `GET /v2/Credentials/{sid}`.
/// Secrets are write-only and never come back.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatCredential {
    pub sid: Option<String>,
    pub account_sid: Option<String>,
    pub friendly_name: Option<String>,
    #[serde(rename = "type")]
    pub credential_type: Option<String>,
    pub sandbox: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCredentialParams {
    pub credential_type: String,
    pub friendly_name: Option<String>,
    pub secret: Option<String>,
}

impl CreateCredentialParams {
    pub fn to_form(&self) -> FormParams {
        let mut form = vec![("Type".to_string(), self.credential_type.clone())];
        push_opt(&mut form, "FriendlyName", &self.friendly_name);
        push_opt(&mut form, "Secret", &self.secret);
        form
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCredentialParams {
    pub friendly_name: Option<String>,
    pub secret: Option<String>,
}

impl UpdateCredentialParams {
    pub fn to_form(&self) -> FormParams {
        let mut form = FormParams::new();
        push_opt(&mut form, "FriendlyName", &self.friendly_name);
        push_opt(&mut form, "Secret", &self.secret);
        form
    }
}

impl TwilioClient {
    pub async fn create_credential(
        &self,
        params: &CreateCredentialParams,
    ) -> Result<ChatCredential, TwilioError> {
        self.post("Credentials", &params.to_form()).await
    }

    pub async fn fetch_credential(&self, sid: &str) -> Result<ChatCredential, TwilioError> {
        self.get(&format!("Credentials/{}", sid), &[]).await
    }

    pub async fn update_credential(
        &self,
        sid: &str,
        params: &UpdateCredentialParams,
    ) -> Result<ChatCredential, TwilioError> {
        self.post(&format!("Credentials/{}", sid), &params.to_form())
            .await
    }

    pub async fn delete_credential(&self, sid: &str) -> Result<(), TwilioError> {
        self.delete(&format!("Credentials/{}", sid)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_form_leads_with_type() {
        let params = CreateCredentialParams {
            credential_type: "fcm".to_string(),
            friendly_name: Some("android".to_string()),
            secret: Some("server-key".to_string()),
        };
        assert_eq!(
            params.to_form(),
            vec![
                ("Type".to_string(), "fcm".to_string()),
                ("FriendlyName".to_string(), "android".to_string()),
                ("Secret".to_string(), "server-key".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_form_only_set_fields() {
        let params = UpdateCredentialParams {
            secret: Some("rotated".to_string()),
            ..Default::default()
        };
        assert_eq!(
            params.to_form(),
            vec![("Secret".to_string(), "rotated".to_string())]
        );
        assert!(UpdateCredentialParams::default().to_form().is_empty());
    }

    #[test]
    fn test_credential_type_field_renamed() {
        let credential: ChatCredential = serde_json::from_str(
            r#"{"sid": "CR1", "type": "fcm", "friendly_name": "android", "date_created": "2020-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(credential.credential_type.as_deref(), Some("fcm"));
        assert!(credential.date_created.is_some());
        assert!(credential.url.is_none());
    }
}
