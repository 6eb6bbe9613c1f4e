//! `twilio_chat_fcm_credential`: a Firebase Cloud Messaging push credential.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ignore_not_found, require_id, ChatResource};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::state::{format_date, str_field, ResourceData};
use crate::twilio::{ChatCredential, CreateCredentialParams, TwilioClient, UpdateCredentialParams};

/// Resource type name.
pub const FCM_CREDENTIAL_TYPE: &str = "twilio_chat_fcm_credential";

const CREDENTIAL_TYPE: &str = "fcm";

/// Handler for `twilio_chat_fcm_credential`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FcmCredentialResource;

#[async_trait]
impl ChatResource for FcmCredentialResource {
    fn type_name(&self) -> &'static str {
        FCM_CREDENTIAL_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An FCM push credential for Twilio Chat")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("friendly_name", Attribute::required_string())
            .with_attribute(
                "secret",
                Attribute::required_string()
                    .sensitive()
                    .with_description("FCM server key. Write-only."),
            )
            .with_attribute("url", Attribute::computed_string())
            .with_attribute("date_created", Attribute::computed_string())
            .with_attribute("date_updated", Attribute::computed_string())
    }

    async fn create(&self, client: &TwilioClient, planned: &Value) -> Result<Value, ProviderError> {
        let params = CreateCredentialParams {
            credential_type: CREDENTIAL_TYPE.to_string(),
            friendly_name: str_field(planned, "friendly_name").map(String::from),
            secret: str_field(planned, "secret").map(String::from),
        };

        let created = client.create_credential(&params).await?;
        let sid = created.sid.ok_or_else(|| {
            ProviderError::Api("create credential response has no sid".to_string())
        })?;
        info!(sid = %sid, "Created FCM credential");

        let mut state = planned.as_object().cloned().unwrap_or_default();
        state.insert("id".to_string(), json!(sid));
        refresh(client, &sid, &Value::Object(state)).await
    }

    async fn read(&self, client: &TwilioClient, current: &Value) -> Result<Value, ProviderError> {
        let sid = require_id(current)?;
        match refresh(client, sid, current).await {
            Err(err) if err.is_not_found() => {
                warn!(sid = %sid, "FCM credential no longer exists");
                Ok(Value::Null)
            },
            other => other,
        }
    }

    async fn update(
        &self,
        client: &TwilioClient,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let data = ResourceData::new(Some(prior), planned);
        let sid = data
            .id()
            .ok_or_else(|| ProviderError::InvalidRequest("state has no id".to_string()))?;

        let mut params = UpdateCredentialParams::default();
        if data.has_change("friendly_name") {
            params.friendly_name = data.get_str("friendly_name").map(String::from);
        }
        if data.has_change("secret") {
            params.secret = data.get_str("secret").map(String::from);
        }

        let updated = client.update_credential(sid, &params).await?;
        info!(sid = %sid, "Updated FCM credential");

        let mut state = planned.as_object().cloned().unwrap_or_default();
        state.insert("id".to_string(), json!(sid));
        state.insert(
            "date_updated".to_string(),
            format_date(updated.date_updated.as_ref()),
        );
        refresh(client, sid, &Value::Object(state)).await
    }

    async fn delete(&self, client: &TwilioClient, current: &Value) -> Result<(), ProviderError> {
        let sid = require_id(current)?;
        ignore_not_found(client.delete_credential(sid).await.map_err(ProviderError::from))?;
        info!(sid = %sid, "Deleted FCM credential");
        Ok(())
    }

    async fn import(&self, client: &TwilioClient, id: &str) -> Result<Value, ProviderError> {
        refresh(client, id, &json!({ "id": id, "secret": null })).await
    }
}

async fn refresh(client: &TwilioClient, sid: &str, base: &Value) -> Result<Value, ProviderError> {
    let credential = client.fetch_credential(sid).await?;
    Ok(state_from_credential(&credential, base))
}

/// Twilio never returns the secret, so it is carried over from `base`.
fn state_from_credential(credential: &ChatCredential, base: &Value) -> Value {
    let mut state = base.as_object().cloned().unwrap_or_default();
    if let Some(sid) = &credential.sid {
        state.insert("id".to_string(), json!(sid));
    }
    state.insert(
        "friendly_name".to_string(),
        Value::from(credential.friendly_name.clone()),
    );
    state.insert("url".to_string(), Value::from(credential.url.clone()));
    state.insert(
        "date_created".to_string(),
        format_date(credential.date_created.as_ref()),
    );
    state.insert(
        "date_updated".to_string(),
        format_date(credential.date_updated.as_ref()),
    );
    Value::Object(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_schema_secret_is_sensitive() {
        let schema = FcmCredentialResource.schema();
        let secret = &schema.block.attributes["secret"];
        assert!(secret.flags.required);
        assert!(secret.flags.sensitive);
        assert_eq!(
            schema.computed_attributes(),
            vec!["date_created", "date_updated", "id", "url"]
        );
    }

    #[test]
    fn test_validate_requires_secret() {
        let diagnostics = FcmCredentialResource.validate(&json!({"friendly_name": "android"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("secret"));
    }

    #[test]
    fn test_state_keeps_secret() {
        let credential = ChatCredential {
            sid: Some("CR0001".to_string()),
            friendly_name: Some("android".to_string()),
            credential_type: Some("fcm".to_string()),
            url: Some("https://chat.twilio.com/v2/Credentials/CR0001".to_string()),
            date_created: Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let state = state_from_credential(
            &credential,
            &json!({"id": "CR0001", "friendly_name": "old", "secret": "server-key"}),
        );

        assert_eq!(state["friendly_name"], "android");
        assert_eq!(state["secret"], "server-key");
        assert_eq!(state["url"], "https://chat.twilio.com/v2/Credentials/CR0001");
        assert_eq!(state["date_created"], "2021-01-01T00:00:00Z");
        assert!(state["date_updated"].is_null());
    }
}
