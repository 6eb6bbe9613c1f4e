//! `twilio_chat_services`: lists the account's Chat services.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::ChatDataSource;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::state::format_date;
use crate::twilio::{ChatService, TwilioClient};

/// Data source type name.
pub const CHAT_SERVICES_TYPE: &str = "twilio_chat_services";

/// Only the first page is fetched.
const PAGE_SIZE: u32 = 50;

/// Handler for `twilio_chat_services`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatServicesDataSource;

#[async_trait]
impl ChatDataSource for ChatServicesDataSource {
    fn type_name(&self) -> &'static str {
        CHAT_SERVICES_TYPE
    }

    fn schema(&self) -> Schema {
        let service = AttributeType::object([
            ("sid", AttributeType::String),
            ("friendly_name", AttributeType::String),
            ("date_created", AttributeType::String),
        ]);

        Schema::v0()
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("The account SID"),
            )
            .with_attribute(
                "chat_services",
                Attribute::new(AttributeType::list(service), AttributeFlags::computed()),
            )
    }

    async fn read(&self, client: &TwilioClient, _config: &Value) -> Result<Value, ProviderError> {
        let services = client.list_services(PAGE_SIZE).await?;
        debug!(count = services.len(), "Listed chat services");

        Ok(json!({
            "id": client.account_sid(),
            "chat_services": services.iter().map(summary).collect::<Vec<_>>(),
        }))
    }
}

fn summary(service: &ChatService) -> Value {
    json!({
        "sid": service.sid,
        "friendly_name": service.friendly_name,
        "date_created": format_date(service.date_created.as_ref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_summary() {
        let service = ChatService {
            sid: Some("IS0001".to_string()),
            friendly_name: Some("support".to_string()),
            date_created: Some(Utc.with_ymd_and_hms(2020, 5, 4, 3, 2, 1).unwrap()),
            typing_indicator_timeout: Some(5),
            ..Default::default()
        };
        assert_eq!(
            summary(&service),
            json!({
                "sid": "IS0001",
                "friendly_name": "support",
                "date_created": "2020-05-04T03:02:01Z"
            })
        );
    }

    #[test]
    fn test_schema_is_computed() {
        let schema = ChatServicesDataSource.schema();
        assert_eq!(schema.computed_attributes(), vec!["chat_services", "id"]);
        assert!(ChatServicesDataSource.validate(&json!({})).is_empty());
    }
}
