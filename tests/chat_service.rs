use serde_json::{json, Value};
use twilio_chat_provider::testing::{
    assert_plan_changes_attribute, assert_plan_no_changes, ProviderTester, TestError,
    TEST_ACCOUNT_SID, TEST_AUTH_TOKEN,
};
use twilio_chat_provider::{ProviderError, ProviderService};
use wiremock::matchers::{basic_auth, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERVICE: &str = "twilio_chat_service";
const SID: &str = "IS00000000000000000000000000000001";

fn service_body(friendly_name: &str) -> Value {
    json!({
        "sid": SID,
        "account_sid": TEST_ACCOUNT_SID,
        "friendly_name": friendly_name,
        "date_created": "2021-03-01T12:00:00Z",
        "date_updated": "2021-03-02T12:00:00Z",
        "default_service_role_sid": "RL00000000000000000000000000000001",
        "default_channel_role_sid": "RL00000000000000000000000000000002",
        "default_channel_creator_role_sid": "RL00000000000000000000000000000003",
        "read_status_enabled": true,
        "reachability_enabled": false,
        "typing_indicator_timeout": 5,
        "consumption_report_interval": 10,
        "limits": {"channel_members": 100, "user_channels": 250},
        "pre_webhook_url": null,
        "post_webhook_url": null,
        "webhook_method": "POST",
        "webhook_filters": [],
        "pre_webhook_retry_count": 0,
        "post_webhook_retry_count": 0,
        "notifications": {
            "log_enabled": false,
            "new_message": {"enabled": false, "badge_count_enabled": false},
            "added_to_channel": {"enabled": false},
            "removed_from_channel": {"enabled": false},
            "invited_to_channel": {"enabled": false}
        },
        "url": format!("https://chat.twilio.com/v2/Services/{}", SID),
        "links": {}
    })
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "code": 20404,
        "message": format!("The requested resource /Services/{} was not found", SID),
        "more_info": "https://www.twilio.com/docs/errors/20404",
        "status": 404
    }))
}

async fn mount_fetch(server: &MockServer, friendly_name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/Services/{}", SID)))
        .and(basic_auth(TEST_ACCOUNT_SID, TEST_AUTH_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body(friendly_name)))
        .mount(server)
        .await;
}

/// Bodies of the POSTs sent to the service's own URL.
async fn update_bodies(server: &MockServer) -> Vec<String> {
    let service_path = format!("/v2/Services/{}", SID);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == service_path)
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

#[tokio::test]
async fn create_with_limits_applies_settings_after_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Services"))
        .and(basic_auth(TEST_ACCOUNT_SID, TEST_AUTH_TOKEN))
        .and(body_string_contains("FriendlyName=support"))
        .respond_with(ResponseTemplate::new(201).set_body_json(service_body("support")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body("support")))
        .expect(1)
        .mount(&server)
        .await;
    mount_fetch(&server, "support").await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .apply_create(
            SERVICE,
            json!({"friendly_name": "support", "limits": [{"channel_members": 100}]}),
        )
        .await
        .unwrap();

    assert_eq!(state["id"], SID);
    assert_eq!(state["friendly_name"], "support");
    assert_eq!(state["date_created"], "2021-03-01T12:00:00Z");
    assert_eq!(
        state["limits"],
        json!([{"channel_members": 100, "user_channels": 250}])
    );
    // Blocks absent from config stay out of state.
    assert!(state.get("roles").is_none());
    assert!(state.get("notifications").is_none());

    assert_eq!(update_bodies(&server).await, vec!["Limits.ChannelMembers=100"]);
}

#[tokio::test]
async fn created_service_plans_no_changes_for_same_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Services"))
        .respond_with(ResponseTemplate::new(201).set_body_json(service_body("support")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body("support")))
        .mount(&server)
        .await;
    mount_fetch(&server, "support").await;

    let config = json!({
        "friendly_name": "support",
        "limits": [{"channel_members": 100}],
        "webhooks": [{"method": "POST"}],
        "notifications": [{"new_message": [{"enabled": false}]}]
    });

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester.apply_create(SERVICE, config.clone()).await.unwrap();
    assert_eq!(state["webhooks"][0]["events"], json!([]));

    let plan = tester.plan_update(SERVICE, state, config).await.unwrap();
    assert_plan_no_changes(&plan);
}

#[tokio::test]
async fn rejected_initial_settings_delete_the_new_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Services"))
        .respond_with(ResponseTemplate::new(201).set_body_json(service_body("support")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 50200,
            "message": "Invalid role",
            "status": 400
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let err = tester
        .apply_create(
            SERVICE,
            json!({
                "friendly_name": "support",
                "roles": [{"default_service_role": "RL00000000000000000000000000000009"}]
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TestError::Provider(ProviderError::Api(_))));
    assert!(err.to_string().contains("Invalid role"));
    let deletes = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .count();
    assert_eq!(deletes, 1);
}

#[tokio::test]
async fn create_without_blocks_skips_settings_update() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Services"))
        .respond_with(ResponseTemplate::new(201).set_body_json(service_body("support")))
        .expect(1)
        .mount(&server)
        .await;
    mount_fetch(&server, "support").await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .apply_create(SERVICE, json!({"friendly_name": "support"}))
        .await
        .unwrap();

    assert_eq!(state["id"], SID);
    assert!(update_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn update_sends_only_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body("renamed")))
        .expect(1)
        .mount(&server)
        .await;
    mount_fetch(&server, "renamed").await;

    let prior = json!({
        "id": SID,
        "friendly_name": "support",
        "date_created": "2021-03-01T12:00:00Z",
        "date_updated": "2021-03-01T12:00:00Z",
        "limits": [{"channel_members": 100, "user_channels": 250}],
        "webhooks": [{"method": "POST", "events": ["onMessageSent"]}]
    });
    let config = json!({
        "friendly_name": "renamed",
        "limits": [{"channel_members": 100, "user_channels": 250}],
        "webhooks": [{"method": "POST", "events": ["onMessageSent", "onUserAdded"]}]
    });

    let tester = ProviderTester::twilio(&server.uri()).await;
    let plan = tester
        .plan_update(SERVICE, prior.clone(), config.clone())
        .await
        .unwrap();
    assert_plan_changes_attribute(&plan, "friendly_name");
    assert_plan_changes_attribute(&plan, "webhooks");
    assert_eq!(plan.changes.len(), 2);

    let state = tester.apply_update(SERVICE, prior, config).await.unwrap();
    assert_eq!(state["friendly_name"], "renamed");
    assert_eq!(state["date_updated"], "2021-03-02T12:00:00Z");

    let bodies = update_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert!(body.contains("FriendlyName=renamed"));
    assert!(body.contains("WebhookMethod=POST"));
    assert!(body.contains("WebhookFilters=onMessageSent&WebhookFilters=onUserAdded"));
    assert!(!body.contains("Limits."));
}

#[tokio::test]
async fn unchanged_config_plans_nothing() {
    let tester = ProviderTester::twilio("http://127.0.0.1:9").await;
    let prior = json!({
        "id": SID,
        "friendly_name": "support",
        "date_created": "2021-03-01T12:00:00Z",
        "date_updated": "2021-03-02T12:00:00Z",
        "limits": [],
        "roles": null
    });
    let plan = tester
        .plan_update(SERVICE, prior, json!({"friendly_name": "support"}))
        .await
        .unwrap();
    assert_plan_no_changes(&plan);
    assert_eq!(plan.planned_state["date_created"], "2021-03-01T12:00:00Z");
}

#[tokio::test]
async fn read_refreshes_only_configured_blocks() {
    let server = MockServer::start().await;
    mount_fetch(&server, "support").await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .refresh(
            SERVICE,
            json!({
                "id": SID,
                "friendly_name": "old",
                "roles": [{"default_service_role": "RL00000000000000000000000000000009"}],
                "limits": []
            }),
        )
        .await
        .unwrap();

    assert_eq!(state["friendly_name"], "support");
    assert_eq!(
        state["roles"][0]["default_service_role"],
        "RL00000000000000000000000000000001"
    );
    assert_eq!(state["roles"][0]["default_channel_creator_role"], "RL00000000000000000000000000000003");
    assert_eq!(state["limits"], json!([]));
    assert!(state.get("additional_settings").is_none());
}

#[tokio::test]
async fn read_of_deleted_service_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .refresh(SERVICE, json!({"id": SID, "friendly_name": "support"}))
        .await
        .unwrap();
    assert!(state.is_null());
}

#[tokio::test]
async fn delete_succeeds_when_already_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(not_found())
        .expect(1)
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    tester
        .destroy(SERVICE, json!({"id": SID, "friendly_name": "support"}))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_propagates_other_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/v2/Services/{}", SID)))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 20003,
            "message": "Authenticate",
            "status": 401
        })))
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let err = tester
        .destroy(SERVICE, json!({"id": SID}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::PermissionDenied(_)));
    assert!(err.to_string().contains("20003"));
}

#[tokio::test]
async fn import_populates_every_block() {
    let server = MockServer::start().await;
    mount_fetch(&server, "support").await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let imported = tester.import(SERVICE, SID).await.unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].resource_type, SERVICE);

    let state = &imported[0].state;
    assert_eq!(state["id"], SID);
    assert_eq!(state["friendly_name"], "support");
    assert_eq!(state["limits"][0]["user_channels"], 250);
    assert_eq!(state["additional_settings"][0]["typing_indicator_timeout"], 5);
    assert_eq!(state["webhooks"][0]["method"], "POST");
    assert!(state["webhooks"][0].get("pre_hook_url").is_none());
    let notifications = &state["notifications"][0];
    assert_eq!(notifications["log_enabled"], false);
    assert_eq!(notifications["new_message"][0]["badge_count_enabled"], false);
    assert!(notifications["added_to_channel"][0]
        .get("badge_count_enabled")
        .is_none());
}

#[tokio::test]
async fn invalid_webhook_settings_are_rejected() {
    let tester = ProviderTester::twilio("http://127.0.0.1:9").await;
    let diagnostics = tester
        .resource_diagnostics(
            SERVICE,
            json!({
                "friendly_name": "support",
                "webhooks": [{
                    "method": "PATCH",
                    "events": ["onMessageSent", "onMessageSent"],
                    "pre_hook_url": "ftp://hooks.example.com"
                }]
            }),
        )
        .await
        .unwrap();

    let attributes: Vec<_> = diagnostics
        .iter()
        .filter_map(|d| d.attribute.as_deref())
        .collect();
    assert!(attributes.contains(&"webhooks.0.method"));
    assert!(attributes.contains(&"webhooks.0.events"));
    assert!(attributes.contains(&"webhooks.0.pre_hook_url"));

    let err = tester
        .apply_create(
            SERVICE,
            json!({"friendly_name": "support", "webhooks": [{"events": ["onTypingStarted"]}]}),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("onTypingStarted"));
}

#[tokio::test]
async fn unconfigured_provider_rejects_crud() {
    let provider = twilio_chat_provider::TwilioProvider::new();
    let err = provider
        .create(SERVICE, json!({"friendly_name": "support"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Configuration(_)));
}
