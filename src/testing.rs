//! Test harness for driving the provider without a gRPC server.
//!
//! [`ProviderTester`] runs the same sequence the host does (plan, then
//! apply, then refresh) against any [`ProviderService`]. Pair it with a
//! mock HTTP server to exercise the Twilio calls end to end:
//!
//! ```ignore
//! use twilio_chat_provider::testing::ProviderTester;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn creates_a_service() {
//!     let server = wiremock::MockServer::start().await;
//!     let tester = ProviderTester::twilio(&server.uri()).await;
//!     let state = tester
//!         .apply_create("twilio_chat_service", json!({"friendly_name": "support"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["friendly_name"], "support");
//! }
//! ```

use serde_json::{json, Value};
use thiserror::Error;

use crate::error::ProviderError;
use crate::provider::TwilioProvider;
use crate::schema::{has_errors, Diagnostic};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Account SID used by [`ProviderTester::twilio`].
pub const TEST_ACCOUNT_SID: &str = "ACaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Auth token used by [`ProviderTester::twilio`].
pub const TEST_AUTH_TOKEN: &str = "test-auth-token";

/// Failure of a harness call.
#[derive(Debug, Error)]
pub enum TestError {
    /// The call returned error diagnostics.
    #[error("{}", render(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// The call itself failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.attribute {
            Some(attr) => format!("{} (at {})", d.summary, attr),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn check(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    if has_errors(&diagnostics) {
        Err(TestError::Diagnostics(
            diagnostics.into_iter().filter(Diagnostic::is_error).collect(),
        ))
    } else {
        Ok(())
    }
}

/// Wraps a provider and drives it the way the host would.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl ProviderTester<TwilioProvider> {
    /// A [`TwilioProvider`] configured with test credentials against `base_url`.
    ///
    /// # Panics
    ///
    /// Panics if configuration reports errors.
    pub async fn twilio(base_url: &str) -> Self {
        let tester = Self::new(TwilioProvider::new());
        if let Err(e) = tester
            .configure(json!({
                "account_sid": TEST_ACCOUNT_SID,
                "auth_token": TEST_AUTH_TOKEN,
                "chat_base_url": base_url,
            }))
            .await
        {
            panic!("test provider failed to configure: {}", e);
        }
        tester
    }
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        check(self.provider.configure(config).await?)
    }

    /// Validate a resource block, failing on error diagnostics.
    pub async fn validate_resource(&self, resource_type: &str, config: Value) -> Result<(), TestError> {
        check(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    /// Raw diagnostics for a resource block.
    pub async fn resource_diagnostics(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.provider
            .validate_resource_config(resource_type, config)
            .await
    }

    /// Plan a create.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed.clone(), proposed)
            .await
    }

    /// Plan an in-place change.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior: Value,
        proposed: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), proposed.clone(), proposed)
            .await
    }

    /// Plan a destroy.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), Value::Null, Value::Null)
            .await
    }

    /// Validate, plan and create.
    pub async fn apply_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        self.validate_resource(resource_type, config.clone()).await?;
        let plan = self.plan_create(resource_type, config).await?;
        Ok(self.provider.create(resource_type, plan.planned_state).await?)
    }

    /// Validate, plan and update `prior` towards `config`.
    pub async fn apply_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource(resource_type, config.clone()).await?;
        let plan = self
            .plan_update(resource_type, prior.clone(), config)
            .await?;
        Ok(self
            .provider
            .update(resource_type, prior, plan.planned_state)
            .await?)
    }

    /// Refresh state. `Value::Null` means the object is gone.
    pub async fn refresh(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Delete the object behind `state`.
    pub async fn destroy(&self, resource_type: &str, state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, state).await
    }

    /// Import an object by id.
    pub async fn import(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Validate and read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        check(
            self.provider
                .validate_data_source_config(data_source_type, config.clone())
                .await?,
        )?;
        Ok(self
            .provider
            .read_data_source(data_source_type, config)
            .await?)
    }
}

/// Assert the plan touches `path`.
///
/// # Panics
///
/// Panics if no change has that path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "expected a change to {:?}, got {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert the plan is empty.
///
/// # Panics
///
/// Panics if the plan has changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "expected no changes, got {:?}",
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert some error diagnostic is attached to `attribute`.
///
/// # Panics
///
/// Panics if none is.
pub fn assert_error_at(diagnostics: &[Diagnostic], attribute: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.attribute.as_deref() == Some(attribute)),
        "expected an error at {:?}, got {}",
        attribute,
        render(diagnostics)
    );
}

/// Assert some error summary contains `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "expected an error containing {:?}, got {}",
        substring,
        render(diagnostics)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{CHAT_SERVICE_TYPE, FCM_CREDENTIAL_TYPE};

    #[tokio::test]
    async fn test_configure_with_test_credentials() {
        let tester = ProviderTester::twilio("http://127.0.0.1:9").await;
        let metadata = tester.provider().metadata();
        assert_eq!(metadata.resources.len(), 2);
    }

    #[tokio::test]
    async fn test_validate_resource_reports_webhook_errors() {
        let tester = ProviderTester::new(TwilioProvider::new());
        let diagnostics = tester
            .resource_diagnostics(
                CHAT_SERVICE_TYPE,
                json!({
                    "friendly_name": "support",
                    "webhooks": [{"method": "PUT", "events": ["onMessageSend"]}]
                }),
            )
            .await
            .unwrap();
        assert_error_at(&diagnostics, "webhooks.0.method");

        let err = tester
            .validate_resource(FCM_CREDENTIAL_TYPE, json!({"friendly_name": "android"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("(at secret)"));
    }

    #[tokio::test]
    async fn test_plan_helpers() {
        let tester = ProviderTester::new(TwilioProvider::new());
        let plan = tester
            .plan_create(CHAT_SERVICE_TYPE, json!({"friendly_name": "support"}))
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "friendly_name");

        let prior = json!({"id": "IS1", "friendly_name": "support", "limits": []});
        let plan = tester
            .plan_update(CHAT_SERVICE_TYPE, prior.clone(), json!({"friendly_name": "support"}))
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state["id"], "IS1");

        let plan = tester.plan_delete(CHAT_SERVICE_TYPE, prior).await.unwrap();
        assert!(plan.planned_state.is_null());
        assert_plan_changes_attribute(&plan, "id");
    }

    #[test]
    fn test_error_rendering() {
        let diagnostics = vec![
            Diagnostic::error("missing").with_attribute("secret"),
            Diagnostic::warning("ignored"),
        ];
        assert_error_contains(&diagnostics, "missing");
        let err = check(diagnostics).unwrap_err();
        assert_eq!(err.to_string(), "missing (at secret)");
    }

    #[test]
    #[should_panic(expected = "expected an error at")]
    fn test_assert_error_at_fails() {
        assert_error_at(&[Diagnostic::warning("deprecated")], "friendly_name");
    }
}
