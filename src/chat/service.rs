//! `twilio_chat_service`: a Programmable Chat service and its grouped settings.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::{ignore_not_found, require_id, ChatResource};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::state::{
    first_item, format_date, has_items, insert_opt, list_of_one, str_field, BlockItem,
    ResourceData,
};
use crate::twilio::{
    ChatService, CreateServiceParams, NotificationParams, NotificationTemplate, TwilioClient,
    UpdateServiceParams,
};
use crate::validation;
use crate::validators::{
    is_url_with_http_or_https, list_of_match_string, list_of_unique_strings, string_in_slice,
    Validator,
};

/// Resource type name.
pub const CHAT_SERVICE_TYPE: &str = "twilio_chat_service";

/// Event names accepted in `webhooks.events`.
pub const WEBHOOK_EVENTS: [&str; 23] = [
    "onMessageSend",
    "onMessageUpdate",
    "onMessageRemove",
    "onMediaMessageSend",
    "onChannelAdd",
    "onChannelUpdate",
    "onChannelDestroy",
    "onMemberAdd",
    "onMemberUpdate",
    "onMemberRemove",
    "onUserUpdate",
    "onMessageSent",
    "onMessageUpdated",
    "onMessageRemoved",
    "onMediaMessageSent",
    "onChannelAdded",
    "onChannelUpdated",
    "onChannelDestroyed",
    "onMemberAdded",
    "onMemberUpdated",
    "onMemberRemoved",
    "onUserAdded",
    "onUserUpdated",
];

const WEBHOOK_METHODS: [&str; 2] = ["GET", "POST"];

/// Push notification templates, and whether each carries a badge count flag.
const TEMPLATES: [(&str, bool); 4] = [
    ("new_message", true),
    ("added_to_channel", false),
    ("removed_from_channel", false),
    ("invited_to_channel", false),
];

type BlockReader = fn(&ChatService) -> Map<String, Value>;

/// Grouped settings in state order, with the reader that rebuilds each from
/// a fetched service.
const BLOCKS: [(&str, BlockReader); 5] = [
    ("roles", roles_item),
    ("limits", limits_item),
    ("additional_settings", additional_settings_item),
    ("webhooks", webhooks_item),
    ("notifications", notifications_item),
];

/// Handler for `twilio_chat_service`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatServiceResource;

#[async_trait]
impl ChatResource for ChatServiceResource {
    fn type_name(&self) -> &'static str {
        CHAT_SERVICE_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Twilio Programmable Chat service")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Service SID (IS...)"),
            )
            .with_attribute("friendly_name", Attribute::required_string())
            .with_attribute("date_created", Attribute::computed_string())
            .with_attribute("date_updated", Attribute::computed_string())
            .with_block(
                "roles",
                NestedBlock::list_of_one(
                    Block::new()
                        .with_attribute("default_service_role", Attribute::optional_string())
                        .with_attribute("default_channel_role", Attribute::optional_string())
                        .with_attribute(
                            "default_channel_creator_role",
                            Attribute::optional_string(),
                        ),
                ),
            )
            .with_block(
                "limits",
                NestedBlock::list_of_one(
                    Block::new()
                        .with_attribute("channel_members", Attribute::optional_int64())
                        .with_attribute("user_channels", Attribute::optional_int64()),
                ),
            )
            .with_block(
                "additional_settings",
                NestedBlock::list_of_one(
                    Block::new()
                        .with_attribute("reachability_enabled", Attribute::optional_bool())
                        .with_attribute("read_status_enabled", Attribute::optional_bool())
                        .with_attribute("consumption_report_interval", Attribute::optional_int64())
                        .with_attribute("typing_indicator_timeout", Attribute::optional_int64())
                        .with_attribute("pre_webhook_retry_count", Attribute::optional_int64())
                        .with_attribute("post_webhook_retry_count", Attribute::optional_int64()),
                ),
            )
            .with_block(
                "webhooks",
                NestedBlock::list_of_one(
                    Block::new()
                        .with_attribute(
                            "events",
                            Attribute::optional_string_list()
                                .with_description("Chat events that trigger the webhooks"),
                        )
                        .with_attribute(
                            "method",
                            Attribute::optional_string().with_description("GET or POST"),
                        )
                        .with_attribute("pre_hook_url", Attribute::optional_string())
                        .with_attribute("post_hook_url", Attribute::optional_string()),
                ),
            )
            .with_block("notifications", notifications_block())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);

        let Some(webhooks) = first_item(config, "webhooks") else {
            return diagnostics;
        };

        let events = list_of_match_string(WEBHOOK_EVENTS);
        let unique = list_of_unique_strings();
        let method = string_in_slice(WEBHOOK_METHODS);
        let url = is_url_with_http_or_https();
        let checks: [(&str, &dyn Validator); 5] = [
            ("events", &events),
            ("events", &unique),
            ("method", &method),
            ("pre_hook_url", &url),
            ("post_hook_url", &url),
        ];

        for (key, validator) in checks {
            let path = format!("webhooks.0.{}", key);
            // Type errors are already reported by schema validation.
            let already_reported = diagnostics
                .iter()
                .any(|d| d.attribute.as_deref().is_some_and(|a| a.starts_with(&path)));
            if already_reported {
                continue;
            }
            if let Some(value) = webhooks.get(key).filter(|v| !v.is_null()) {
                diagnostics.extend(validator.validate(value, &path));
            }
        }

        diagnostics
    }

    async fn create(&self, client: &TwilioClient, planned: &Value) -> Result<Value, ProviderError> {
        let friendly_name = str_field(planned, "friendly_name").ok_or_else(|| {
            ProviderError::Validation("friendly_name is required".to_string())
        })?;

        let created = client
            .create_service(&CreateServiceParams {
                friendly_name: friendly_name.to_string(),
            })
            .await?;
        let sid = created
            .sid
            .ok_or_else(|| ProviderError::Api("create service response has no sid".to_string()))?;
        info!(sid = %sid, "Created chat service");

        let mut state = planned.as_object().cloned().unwrap_or_default();
        state.insert("id".to_string(), Value::String(sid.clone()));
        let state = Value::Object(state);

        // The create endpoint only takes FriendlyName; grouped settings follow.
        let mut params = update_params(&ResourceData::new(None, &state));
        params.friendly_name = None;
        if !params.is_empty() {
            debug!(sid = %sid, "Applying initial chat service settings");
            if let Err(err) = client.update_service(&sid, &params).await {
                // Without state the host cannot track the service, so remove it.
                warn!(
                    sid = %sid,
                    error = %err,
                    "Initial settings rejected, deleting chat service"
                );
                if let Err(cleanup) = client.delete_service(&sid).await {
                    error!(
                        sid = %sid,
                        error = %cleanup,
                        "Failed to delete chat service after create error"
                    );
                }
                return Err(err.into());
            }
        }

        refresh(client, &sid, &state, false).await
    }

    async fn read(&self, client: &TwilioClient, current: &Value) -> Result<Value, ProviderError> {
        let sid = require_id(current)?;
        match refresh(client, sid, current, false).await {
            Err(err) if err.is_not_found() => {
                warn!(sid = %sid, "Chat service no longer exists");
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

        let params = update_params(&data);
        debug!(sid = %sid, params = params.to_form().len(), "Updating chat service");
        let updated = client.update_service(sid, &params).await?;
        info!(sid = %sid, "Updated chat service");

        let mut state = planned.as_object().cloned().unwrap_or_default();
        state.insert("id".to_string(), json!(sid));
        state.insert(
            "date_updated".to_string(),
            format_date(updated.date_updated.as_ref()),
        );

        refresh(client, sid, &Value::Object(state), false).await
    }

    async fn delete(&self, client: &TwilioClient, current: &Value) -> Result<(), ProviderError> {
        let sid = require_id(current)?;
        ignore_not_found(client.delete_service(sid).await.map_err(ProviderError::from))?;
        info!(sid = %sid, "Deleted chat service");
        Ok(())
    }

    async fn import(&self, client: &TwilioClient, id: &str) -> Result<Value, ProviderError> {
        refresh(client, id, &json!({ "id": id }), true).await
    }
}

fn notifications_block() -> NestedBlock {
    let mut block = Block::new().with_attribute("log_enabled", Attribute::optional_bool());
    for (name, with_badge) in TEMPLATES {
        block = block.with_block(name, template_block(with_badge));
    }
    NestedBlock::list_of_one(block)
}

fn template_block(with_badge: bool) -> NestedBlock {
    let mut block = Block::new()
        .with_attribute("enabled", Attribute::optional_bool())
        .with_attribute("template", Attribute::optional_string())
        .with_attribute("sound", Attribute::optional_string());
    if with_badge {
        block = block.with_attribute("badge_count_enabled", Attribute::optional_bool());
    }
    NestedBlock::list_of_one(block)
}

async fn refresh(
    client: &TwilioClient,
    sid: &str,
    base: &Value,
    all_blocks: bool,
) -> Result<Value, ProviderError> {
    let service = client.fetch_service(sid).await?;
    Ok(state_from_service(&service, base, all_blocks))
}

/// Build state from a fetched service on top of `base`.
///
/// A grouped block is only written when `base` already holds it with an item,
/// unless `all_blocks` is set.
fn state_from_service(service: &ChatService, base: &Value, all_blocks: bool) -> Value {
    let mut state = base.as_object().cloned().unwrap_or_default();

    if let Some(sid) = &service.sid {
        state.insert("id".to_string(), json!(sid));
    }
    state.insert(
        "friendly_name".to_string(),
        Value::from(service.friendly_name.clone()),
    );
    state.insert(
        "date_created".to_string(),
        format_date(service.date_created.as_ref()),
    );
    state.insert(
        "date_updated".to_string(),
        format_date(service.date_updated.as_ref()),
    );

    for (name, reader) in BLOCKS {
        if all_blocks || has_items(base, name) {
            state.insert(name.to_string(), list_of_one(reader(service)));
        }
    }

    Value::Object(state)
}

fn roles_item(service: &ChatService) -> Map<String, Value> {
    let mut item = Map::new();
    insert_opt(&mut item, "default_service_role", service.default_service_role_sid.clone());
    insert_opt(&mut item, "default_channel_role", service.default_channel_role_sid.clone());
    insert_opt(
        &mut item,
        "default_channel_creator_role",
        service.default_channel_creator_role_sid.clone(),
    );
    item
}

fn limits_item(service: &ChatService) -> Map<String, Value> {
    let mut item = Map::new();
    if let Some(limits) = &service.limits {
        insert_opt(&mut item, "channel_members", limits.channel_members);
        insert_opt(&mut item, "user_channels", limits.user_channels);
    }
    item
}

fn additional_settings_item(service: &ChatService) -> Map<String, Value> {
    let mut item = Map::new();
    insert_opt(&mut item, "reachability_enabled", service.reachability_enabled);
    insert_opt(&mut item, "read_status_enabled", service.read_status_enabled);
    insert_opt(
        &mut item,
        "consumption_report_interval",
        service.consumption_report_interval,
    );
    insert_opt(&mut item, "typing_indicator_timeout", service.typing_indicator_timeout);
    insert_opt(&mut item, "pre_webhook_retry_count", service.pre_webhook_retry_count);
    insert_opt(&mut item, "post_webhook_retry_count", service.post_webhook_retry_count);
    item
}

fn webhooks_item(service: &ChatService) -> Map<String, Value> {
    let mut item = Map::new();
    insert_opt(&mut item, "events", service.webhook_filters.clone());
    insert_opt(&mut item, "method", service.webhook_method.clone());
    insert_opt(&mut item, "pre_hook_url", service.pre_webhook_url.clone());
    insert_opt(&mut item, "post_hook_url", service.post_webhook_url.clone());
    item
}

fn notifications_item(service: &ChatService) -> Map<String, Value> {
    let mut item = Map::new();
    let Some(notifications) = &service.notifications else {
        return item;
    };

    insert_opt(&mut item, "log_enabled", notifications.log_enabled);
    let templates = [
        &notifications.new_message,
        &notifications.added_to_channel,
        &notifications.removed_from_channel,
        &notifications.invited_to_channel,
    ];
    for ((name, with_badge), template) in TEMPLATES.into_iter().zip(templates) {
        if let Some(template) = template {
            item.insert(
                name.to_string(),
                list_of_one(template_item(template, with_badge)),
            );
        }
    }
    item
}

fn template_item(template: &NotificationTemplate, with_badge: bool) -> Map<String, Value> {
    let mut item = Map::new();
    insert_opt(&mut item, "enabled", template.enabled);
    insert_opt(&mut item, "template", template.template.clone());
    insert_opt(&mut item, "sound", template.sound.clone());
    if with_badge {
        insert_opt(&mut item, "badge_count_enabled", template.badge_count_enabled);
    }
    item
}

/// Collect the attributes that changed between prior and planned state.
///
/// A changed block contributes the attributes set in its item. A block that
/// was removed contributes nothing.
fn update_params(data: &ResourceData<'_>) -> UpdateServiceParams {
    let mut params = UpdateServiceParams::default();

    if data.has_change("friendly_name") {
        params.friendly_name = data.get_str("friendly_name").map(String::from);
    }

    if let Some(roles) = changed_block(data, "roles") {
        params.default_service_role_sid = roles.string("default_service_role");
        params.default_channel_role_sid = roles.string("default_channel_role");
        params.default_channel_creator_role_sid = roles.string("default_channel_creator_role");
    }

    if let Some(limits) = changed_block(data, "limits") {
        params.limits_channel_members = limits.int("channel_members");
        params.limits_user_channels = limits.int("user_channels");
    }

    if let Some(settings) = changed_block(data, "additional_settings") {
        params.reachability_enabled = settings.boolean("reachability_enabled");
        params.read_status_enabled = settings.boolean("read_status_enabled");
        params.consumption_report_interval = settings.int("consumption_report_interval");
        params.typing_indicator_timeout = settings.int("typing_indicator_timeout");
        params.pre_webhook_retry_count = settings.int("pre_webhook_retry_count");
        params.post_webhook_retry_count = settings.int("post_webhook_retry_count");
    }

    if let Some(webhooks) = changed_block(data, "webhooks") {
        params.webhook_filters = webhooks.strings("events");
        params.webhook_method = webhooks.string("method");
        params.pre_webhook_url = webhooks.string("pre_hook_url");
        params.post_webhook_url = webhooks.string("post_hook_url");
    }

    if let Some(notifications) = changed_block(data, "notifications") {
        params.notifications_log_enabled = notifications.boolean("log_enabled");
        params.notifications_new_message = template_params(notifications, "new_message", true);
        params.notifications_added_to_channel =
            template_params(notifications, "added_to_channel", false);
        params.notifications_removed_from_channel =
            template_params(notifications, "removed_from_channel", false);
        params.notifications_invited_to_channel =
            template_params(notifications, "invited_to_channel", false);
    }

    params
}

fn changed_block<'a>(data: &ResourceData<'a>, key: &str) -> Option<&'a Map<String, Value>> {
    if data.has_change(key) {
        data.block(key)
    } else {
        None
    }
}

fn template_params(
    notifications: &Map<String, Value>,
    name: &str,
    with_badge: bool,
) -> NotificationParams {
    let Some(template) = notifications.nested(name) else {
        return NotificationParams::default();
    };
    NotificationParams {
        enabled: template.boolean("enabled"),
        template: template.string("template"),
        sound: template.string("sound"),
        badge_count_enabled: if with_badge {
            template.boolean("badge_count_enabled")
        } else {
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::has_errors;
    use crate::twilio::{ServiceLimits, ServiceNotifications};
    use chrono::{TimeZone, Utc};

    fn fetched() -> ChatService {
        ChatService {
            sid: Some("IS0001".to_string()),
            friendly_name: Some("support".to_string()),
            date_created: Some(Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap()),
            date_updated: Some(Utc.with_ymd_and_hms(2021, 3, 2, 12, 0, 0).unwrap()),
            default_service_role_sid: Some("RL0001".to_string()),
            limits: Some(ServiceLimits {
                channel_members: Some(100),
                user_channels: Some(250),
            }),
            reachability_enabled: Some(false),
            webhook_method: Some("POST".to_string()),
            webhook_filters: Some(vec!["onMessageSent".to_string()]),
            notifications: Some(ServiceNotifications {
                log_enabled: Some(true),
                new_message: Some(NotificationTemplate {
                    enabled: Some(true),
                    badge_count_enabled: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_schema_shape() {
        let schema = ChatServiceResource.schema();
        assert_eq!(
            schema.computed_attributes(),
            vec!["date_created", "date_updated", "id"]
        );
        for block in ["roles", "limits", "additional_settings", "webhooks", "notifications"] {
            assert_eq!(schema.block.blocks[block].max_items, 1, "{}", block);
        }

        let notifications = &schema.block.blocks["notifications"].block;
        assert!(notifications.blocks["new_message"]
            .block
            .attributes
            .contains_key("badge_count_enabled"));
        assert!(!notifications.blocks["invited_to_channel"]
            .block
            .attributes
            .contains_key("badge_count_enabled"));
    }

    #[test]
    fn test_validate_webhooks() {
        let resource = ChatServiceResource;
        let ok = json!({
            "friendly_name": "support",
            "webhooks": [{
                "events": ["onMessageSent", "onUserAdded"],
                "method": "POST",
                "pre_hook_url": "https://hooks.example.com/pre"
            }]
        });
        assert!(resource.validate(&ok).is_empty());

        let bad = json!({
            "friendly_name": "support",
            "webhooks": [{
                "events": ["onMessageSent", "onBogus"],
                "method": "post",
                "post_hook_url": "ftp://hooks.example.com"
            }]
        });
        let diagnostics = resource.validate(&bad);
        assert!(has_errors(&diagnostics));
        let paths: Vec<&str> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(
            paths,
            vec!["webhooks.0.events", "webhooks.0.method", "webhooks.0.post_hook_url"]
        );
    }

    #[test]
    fn test_validate_duplicate_events() {
        let diagnostics = ChatServiceResource.validate(&json!({
            "friendly_name": "support",
            "webhooks": [{"events": ["onUserAdded", "onUserAdded"]}]
        }));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("duplicate"));
    }

    #[test]
    fn test_validate_type_error_reported_once() {
        let diagnostics = ChatServiceResource.validate(&json!({
            "friendly_name": "support",
            "webhooks": [{"events": "onUserAdded"}]
        }));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_update_params_only_changed() {
        let prior = json!({
            "id": "IS0001",
            "friendly_name": "support",
            "limits": [{"channel_members": 100}],
            "webhooks": [{"method": "GET"}]
        });
        let planned = json!({
            "id": "IS0001",
            "friendly_name": "support",
            "limits": [{"channel_members": 100}],
            "webhooks": [{"method": "POST", "events": ["onMessageSent"]}]
        });
        let params = update_params(&ResourceData::new(Some(&prior), &planned));

        assert_eq!(
            params,
            UpdateServiceParams {
                webhook_method: Some("POST".to_string()),
                webhook_filters: Some(vec!["onMessageSent".to_string()]),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_update_params_sends_only_present_keys() {
        let prior = json!({"friendly_name": "a"});
        let planned = json!({
            "friendly_name": "b",
            "additional_settings": [{"typing_indicator_timeout": 5, "read_status_enabled": null}]
        });
        let params = update_params(&ResourceData::new(Some(&prior), &planned));

        assert_eq!(params.friendly_name.as_deref(), Some("b"));
        assert_eq!(params.typing_indicator_timeout, Some(5));
        assert_eq!(params.read_status_enabled, None);
        assert_eq!(params.reachability_enabled, None);
    }

    #[test]
    fn test_update_params_removed_block_sends_nothing() {
        let prior = json!({"friendly_name": "a", "roles": [{"default_service_role": "RL1"}]});
        let planned = json!({"friendly_name": "a", "roles": []});
        let params = update_params(&ResourceData::new(Some(&prior), &planned));
        assert!(params.is_empty());
    }

    #[test]
    fn test_update_params_notifications() {
        let planned = json!({
            "friendly_name": "a",
            "notifications": [{
                "log_enabled": true,
                "new_message": [{"enabled": true, "badge_count_enabled": true}],
                "added_to_channel": [{"template": "${USER} joined", "badge_count_enabled": true}]
            }]
        });
        let params = update_params(&ResourceData::new(Some(&json!({"friendly_name": "a"})), &planned));

        assert_eq!(params.notifications_log_enabled, Some(true));
        assert_eq!(params.notifications_new_message.badge_count_enabled, Some(true));
        assert_eq!(
            params.notifications_added_to_channel.template.as_deref(),
            Some("${USER} joined")
        );
        assert_eq!(params.notifications_added_to_channel.badge_count_enabled, None);
        assert!(params.notifications_invited_to_channel.is_empty());
    }

    #[test]
    fn test_state_refreshes_only_tracked_blocks() {
        let base = json!({
            "id": "IS0001",
            "friendly_name": "old",
            "limits": [{"channel_members": 1}],
            "roles": []
        });
        let state = state_from_service(&fetched(), &base, false);

        assert_eq!(state["friendly_name"], "support");
        assert_eq!(state["date_created"], "2021-03-01T12:00:00Z");
        assert_eq!(state["date_updated"], "2021-03-02T12:00:00Z");
        assert_eq!(
            state["limits"],
            json!([{"channel_members": 100, "user_channels": 250}])
        );
        assert_eq!(state["roles"], json!([]));
        assert!(state.get("webhooks").is_none());
        assert!(state.get("notifications").is_none());
    }

    #[test]
    fn test_state_empty_block_becomes_empty_list() {
        let base = json!({"id": "IS0001", "webhooks": [{"method": "POST"}]});
        let service = ChatService {
            sid: Some("IS0001".to_string()),
            ..Default::default()
        };
        let state = state_from_service(&service, &base, false);
        assert_eq!(state["webhooks"], json!([]));
    }

    #[test]
    fn test_state_for_import_has_all_blocks() {
        let state = state_from_service(&fetched(), &json!({"id": "IS0001"}), true);

        assert_eq!(state["roles"], json!([{"default_service_role": "RL0001"}]));
        assert_eq!(state["additional_settings"], json!([{"reachability_enabled": false}]));
        assert_eq!(
            state["webhooks"],
            json!([{"events": ["onMessageSent"], "method": "POST"}])
        );
        assert_eq!(
            state["notifications"],
            json!([{
                "log_enabled": true,
                "new_message": [{"enabled": true, "badge_count_enabled": true}]
            }])
        );
    }
}
