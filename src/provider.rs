//! The Twilio Chat provider: wires configuration, resources and data sources
//! into [`ProviderService`].

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::chat::{self, ChatDataSource, ChatResource};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::state;
use crate::twilio::{TwilioClient, DEFAULT_CHAT_BASE_URL};
use crate::types::{ImportedResource, PlanResult};
use crate::validation;
use crate::validators::{is_url_with_http_or_https, Validator};

/// Provider for Twilio Chat services and push credentials.
///
/// Resource and data source calls fail until [`ProviderService::configure`]
/// has succeeded.
pub struct TwilioProvider {
    client: RwLock<Option<Arc<TwilioClient>>>,
    resources: Vec<Box<dyn ChatResource>>,
    data_sources: Vec<Box<dyn ChatDataSource>>,
}

impl TwilioProvider {
    /// Create an unconfigured provider.
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            resources: chat::resources(),
            data_sources: chat::data_sources(),
        }
    }

    /// Schema of the provider block.
    pub fn config_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "account_sid",
                Attribute::optional_string()
                    .with_description("Twilio account SID. Defaults to $TWILIO_ACCOUNT_SID."),
            )
            .with_attribute(
                "auth_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Twilio auth token. Defaults to $TWILIO_AUTH_TOKEN."),
            )
            .with_attribute(
                "chat_base_url",
                Attribute::optional_string()
                    .with_default(Value::String(DEFAULT_CHAT_BASE_URL.to_string())),
            )
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn ChatResource, ProviderError> {
        self.resources
            .iter()
            .find(|r| r.type_name() == resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn ChatDataSource, ProviderError> {
        self.data_sources
            .iter()
            .find(|d| d.type_name() == data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    async fn client(&self) -> Result<Arc<TwilioClient>, ProviderError> {
        self.client.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }
}

impl Default for TwilioProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderService for TwilioProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(Self::config_schema());
        for resource in &self.resources {
            schema = schema.with_resource(resource.type_name(), resource.schema());
        }
        for data_source in &self.data_sources {
            schema = schema.with_data_source(data_source.type_name(), data_source.schema());
        }
        schema
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&Self::config_schema(), &config);
        if let Some(url) = config.get("chat_base_url").filter(|v| v.is_string()) {
            diagnostics.extend(is_url_with_http_or_https().validate(url, "chat_base_url"));
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = match ProviderConfig::from_value(&config)?.resolve() {
            Ok(resolved) => resolved,
            Err(ProviderError::Configuration(msg)) => return Ok(vec![Diagnostic::error(msg)]),
            Err(err) => return Err(err),
        };

        let client = TwilioClient::new(&resolved.account_sid, &resolved.auth_token)
            .map_err(|e| ProviderError::Configuration(e.to_string()))?
            .with_base_url(&resolved.chat_base_url);

        info!(
            account_sid = %resolved.account_sid,
            base_url = %resolved.chat_base_url,
            "Twilio client configured"
        );
        *self.client.write().await = Some(Arc::new(client));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        debug!("Dropping Twilio client");
        self.client.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resource(resource_type)?.validate(&config))
    }

    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let current = self.resource(resource_type)?.schema().version;
        if version < 0 || version as u64 > current {
            return Err(ProviderError::InvalidRequest(format!(
                "{} state version {} is newer than schema version {}",
                resource_type, version, current
            )));
        }
        Ok(state)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(state::plan(
            &resource.schema(),
            prior_state.as_ref(),
            &proposed_state,
        ))
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.create(&client, &planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.read(&client, &current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.update(&client, &prior_state, &planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.delete(&client, &current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        let state = resource.import(&client, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.data_source(data_source_type)?.validate(&config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let client = self.client().await?;
        data_source.read(&client, &config).await
    }
}
