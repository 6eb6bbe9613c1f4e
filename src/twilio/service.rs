//! Wire types mirror Twilio's JSON field and form parameter names.
#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{push_opt, FormParams, TwilioClient, TwilioError};

/// A Chat service as returned by `GET /v2/Services/{sid}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatService {
    pub sid: Option<String>,
    pub account_sid: Option<String>,
    pub friendly_name: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
    pub default_service_role_sid: Option<String>,
    pub default_channel_role_sid: Option<String>,
    pub default_channel_creator_role_sid: Option<String>,
    pub read_status_enabled: Option<bool>,
    pub reachability_enabled: Option<bool>,
    pub typing_indicator_timeout: Option<i64>,
    pub consumption_report_interval: Option<i64>,
    pub limits: Option<ServiceLimits>,
    pub pre_webhook_url: Option<String>,
    pub post_webhook_url: Option<String>,
    pub webhook_method: Option<String>,
    pub webhook_filters: Option<Vec<String>>,
    pub pre_webhook_retry_count: Option<i64>,
    pub post_webhook_retry_count: Option<i64>,
    pub notifications: Option<ServiceNotifications>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceLimits {
    pub channel_members: Option<i64>,
    pub user_channels: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceNotifications {
    pub log_enabled: Option<bool>,
    pub new_message: Option<NotificationTemplate>,
    pub added_to_channel: Option<NotificationTemplate>,
    pub removed_from_channel: Option<NotificationTemplate>,
    pub invited_to_channel: Option<NotificationTemplate>,
}

/// Push notification settings for one chat event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationTemplate {
    pub enabled: Option<bool>,
    pub template: Option<String>,
    pub sound: Option<String>,
    pub badge_count_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicePage {
    #[serde(default)]
    services: Vec<ChatService>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateServiceParams {
    pub friendly_name: String,
}

impl CreateServiceParams {
    pub fn to_form(&self) -> FormParams {
        vec![("FriendlyName".to_string(), self.friendly_name.clone())]
    }
}

/// Notification fields of a service update. `badge_count_enabled` is only
/// accepted for the new-message template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationParams {
    pub enabled: Option<bool>,
    pub template: Option<String>,
    pub sound: Option<String>,
    pub badge_count_enabled: Option<bool>,
}

impl NotificationParams {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn push_form(&self, form: &mut FormParams, prefix: &str) {
        push_opt(form, &format!("{}.Enabled", prefix), &self.enabled);
        push_opt(form, &format!("{}.Template", prefix), &self.template);
        push_opt(form, &format!("{}.Sound", prefix), &self.sound);
        push_opt(
            form,
            &format!("{}.BadgeCountEnabled", prefix),
            &self.badge_count_enabled,
        );
    }
}

/// Partial update of a service. Fields left `None` are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateServiceParams {
    pub friendly_name: Option<String>,
    pub default_service_role_sid: Option<String>,
    pub default_channel_role_sid: Option<String>,
    pub default_channel_creator_role_sid: Option<String>,
    pub read_status_enabled: Option<bool>,
    pub reachability_enabled: Option<bool>,
    pub typing_indicator_timeout: Option<i64>,
    pub consumption_report_interval: Option<i64>,
    pub limits_channel_members: Option<i64>,
    pub limits_user_channels: Option<i64>,
    pub pre_webhook_url: Option<String>,
    pub post_webhook_url: Option<String>,
    pub webhook_method: Option<String>,
    pub webhook_filters: Option<Vec<String>>,
    pub pre_webhook_retry_count: Option<i64>,
    pub post_webhook_retry_count: Option<i64>,
    pub notifications_log_enabled: Option<bool>,
    pub notifications_new_message: NotificationParams,
    pub notifications_added_to_channel: NotificationParams,
    pub notifications_removed_from_channel: NotificationParams,
    pub notifications_invited_to_channel: NotificationParams,
}

impl UpdateServiceParams {
    /// True when no field would be sent.
    pub fn is_empty(&self) -> bool {
        self.to_form().is_empty()
    }

    pub fn to_form(&self) -> FormParams {
        let mut form = FormParams::new();
        push_opt(&mut form, "FriendlyName", &self.friendly_name);
        push_opt(&mut form, "DefaultServiceRoleSid", &self.default_service_role_sid);
        push_opt(&mut form, "DefaultChannelRoleSid", &self.default_channel_role_sid);
        push_opt(
            &mut form,
            "DefaultChannelCreatorRoleSid",
            &self.default_channel_creator_role_sid,
        );
        push_opt(&mut form, "ReadStatusEnabled", &self.read_status_enabled);
        push_opt(&mut form, "ReachabilityEnabled", &self.reachability_enabled);
        push_opt(&mut form, "TypingIndicatorTimeout", &self.typing_indicator_timeout);
        push_opt(
            &mut form,
            "ConsumptionReportInterval",
            &self.consumption_report_interval,
        );
        push_opt(&mut form, "Limits.ChannelMembers", &self.limits_channel_members);
        push_opt(&mut form, "Limits.UserChannels", &self.limits_user_channels);
        push_opt(&mut form, "PreWebhookUrl", &self.pre_webhook_url);
        push_opt(&mut form, "PostWebhookUrl", &self.post_webhook_url);
        push_opt(&mut form, "WebhookMethod", &self.webhook_method);
        if let Some(filters) = &self.webhook_filters {
            for filter in filters {
                form.push(("WebhookFilters".to_string(), filter.clone()));
            }
        }
        push_opt(&mut form, "PreWebhookRetryCount", &self.pre_webhook_retry_count);
        push_opt(&mut form, "PostWebhookRetryCount", &self.post_webhook_retry_count);
        push_opt(&mut form, "Notifications.LogEnabled", &self.notifications_log_enabled);
        self.notifications_new_message
            .push_form(&mut form, "Notifications.NewMessage");
        self.notifications_added_to_channel
            .push_form(&mut form, "Notifications.AddedToChannel");
        self.notifications_removed_from_channel
            .push_form(&mut form, "Notifications.RemovedFromChannel");
        self.notifications_invited_to_channel
            .push_form(&mut form, "Notifications.InvitedToChannel");
        form
    }
}

impl TwilioClient {
    pub async fn create_service(
        &self,
        params: &CreateServiceParams,
    ) -> Result<ChatService, TwilioError> {
        self.post("Services", &params.to_form()).await
    }

    pub async fn fetch_service(&self, sid: &str) -> Result<ChatService, TwilioError> {
        self.get(&format!("Services/{}", sid), &[]).await
    }

    pub async fn update_service(
        &self,
        sid: &str,
        params: &UpdateServiceParams,
    ) -> Result<ChatService, TwilioError> {
        self.post(&format!("Services/{}", sid), &params.to_form())
            .await
    }

    pub async fn delete_service(&self, sid: &str) -> Result<(), TwilioError> {
        self.delete(&format!("Services/{}", sid)).await
    }

    /// Fetch the first page of services. No further pages are followed.
    pub async fn list_services(&self, page_size: u32) -> Result<Vec<ChatService>, TwilioError> {
        let page: ServicePage = self
            .get("Services", &[("PageSize", page_size.to_string())])
            .await?;
        Ok(page.services)
    }
}
