//! Twilio Chat resources and data sources.
//!
//! Each handler maps between provider state and the Chat v2 REST API. The
//! provider looks handlers up by type name and passes in the configured
//! [`TwilioClient`].

mod fcm;
mod service;
mod services_data;

pub use fcm::{FcmCredentialResource, FCM_CREDENTIAL_TYPE};
pub use service::{ChatServiceResource, CHAT_SERVICE_TYPE, WEBHOOK_EVENTS};
pub use services_data::{ChatServicesDataSource, CHAT_SERVICES_TYPE};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::state::str_field;
use crate::twilio::TwilioClient;
use crate::validation;

/// A Twilio object managed through create/read/update/delete.
#[async_trait]
pub trait ChatResource: Send + Sync {
    /// The resource type name, e.g. `twilio_chat_service`.
    fn type_name(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// Validate resource configuration.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Create the object and return its refreshed state.
    async fn create(&self, client: &TwilioClient, planned: &Value) -> Result<Value, ProviderError>;

    /// Refresh state. Returns `Value::Null` when the object no longer exists.
    async fn read(&self, client: &TwilioClient, current: &Value) -> Result<Value, ProviderError>;

    /// Send changed attributes and return the refreshed state.
    async fn update(
        &self,
        client: &TwilioClient,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the object. Deleting an object that is already gone succeeds.
    async fn delete(&self, client: &TwilioClient, current: &Value) -> Result<(), ProviderError>;

    /// Build state for an existing object from its SID.
    async fn import(&self, client: &TwilioClient, id: &str) -> Result<Value, ProviderError>;
}

/// A read-only query against Twilio.
#[async_trait]
pub trait ChatDataSource: Send + Sync {
    /// The data source type name.
    fn type_name(&self) -> &'static str;

    /// The data source schema.
    fn schema(&self) -> Schema;

    /// Validate data source configuration.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Query Twilio and return the data source state.
    async fn read(&self, client: &TwilioClient, config: &Value) -> Result<Value, ProviderError>;
}

/// All resource handlers.
pub fn resources() -> Vec<Box<dyn ChatResource>> {
    vec![Box::new(ChatServiceResource), Box::new(FcmCredentialResource)]
}

/// All data source handlers.
pub fn data_sources() -> Vec<Box<dyn ChatDataSource>> {
    vec![Box::new(ChatServicesDataSource)]
}

/// The SID stored in `state`.
pub(crate) fn require_id(state: &Value) -> Result<&str, ProviderError> {
    str_field(state, "id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("state has no id".to_string()))
}

/// Treat a missing remote object as already deleted.
pub(crate) fn ignore_not_found(result: Result<(), ProviderError>) -> Result<(), ProviderError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}
