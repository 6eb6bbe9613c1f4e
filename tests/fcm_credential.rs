use serde_json::{json, Value};
use twilio_chat_provider::testing::{assert_plan_changes_attribute, ProviderTester};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FCM: &str = "twilio_chat_fcm_credential";
const SID: &str = "CR00000000000000000000000000000001";

fn credential_body(friendly_name: &str, date_updated: &str) -> Value {
    json!({
        "sid": SID,
        "account_sid": "ACaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        "friendly_name": friendly_name,
        "type": "fcm",
        "sandbox": null,
        "date_created": "2022-06-01T08:30:00Z",
        "date_updated": date_updated,
        "url": format!("https://chat.twilio.com/v2/Credentials/{}", SID)
    })
}

async fn credential_posts(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

#[tokio::test]
async fn create_sends_fcm_type_and_keeps_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/Credentials"))
        .and(body_string_contains("Type=fcm"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(credential_body("android", "2022-06-01T08:30:00Z")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/Credentials/{}", SID)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(credential_body("android", "2022-06-01T08:30:00Z")),
        )
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .apply_create(FCM, json!({"friendly_name": "android", "secret": "server-key"}))
        .await
        .unwrap();

    assert_eq!(state["id"], SID);
    assert_eq!(state["secret"], "server-key");
    assert_eq!(state["date_created"], "2022-06-01T08:30:00Z");
    assert_eq!(
        state["url"],
        format!("https://chat.twilio.com/v2/Credentials/{}", SID)
    );

    assert_eq!(
        credential_posts(&server).await,
        vec!["Type=fcm&FriendlyName=android&Secret=server-key"]
    );
}

#[tokio::test]
async fn rotating_the_secret_sends_only_the_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/Credentials/{}", SID)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(credential_body("android", "2022-07-01T00:00:00Z")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/Credentials/{}", SID)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(credential_body("android", "2022-07-01T00:00:00Z")),
        )
        .mount(&server)
        .await;

    let prior = json!({
        "id": SID,
        "friendly_name": "android",
        "secret": "server-key",
        "url": format!("https://chat.twilio.com/v2/Credentials/{}", SID),
        "date_created": "2022-06-01T08:30:00Z",
        "date_updated": "2022-06-01T08:30:00Z"
    });
    let config = json!({"friendly_name": "android", "secret": "rotated-key"});

    let tester = ProviderTester::twilio(&server.uri()).await;
    let plan = tester
        .plan_update(FCM, prior.clone(), config.clone())
        .await
        .unwrap();
    assert_plan_changes_attribute(&plan, "secret");
    assert_eq!(plan.changes.len(), 1);

    let state = tester.apply_update(FCM, prior, config).await.unwrap();
    assert_eq!(state["secret"], "rotated-key");
    assert_eq!(state["date_updated"], "2022-07-01T00:00:00Z");
    assert_eq!(credential_posts(&server).await, vec!["Secret=rotated-key"]);
}

#[tokio::test]
async fn read_and_delete_tolerate_missing_credential() {
    let server = MockServer::start().await;
    let gone = ResponseTemplate::new(404).set_body_json(json!({
        "code": 20404,
        "message": "The requested resource was not found",
        "status": 404
    }));
    Mock::given(method("GET"))
        .and(path(format!("/v2/Credentials/{}", SID)))
        .respond_with(gone.clone())
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/v2/Credentials/{}", SID)))
        .respond_with(gone)
        .expect(1)
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = json!({"id": SID, "friendly_name": "android", "secret": "server-key"});
    assert!(tester.refresh(FCM, state.clone()).await.unwrap().is_null());
    tester.destroy(FCM, state).await.unwrap();
}

#[tokio::test]
async fn import_leaves_secret_unset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/Credentials/{}", SID)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(credential_body("android", "2022-06-01T08:30:00Z")),
        )
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let imported = tester.import(FCM, SID).await.unwrap();
    let state = &imported[0].state;
    assert_eq!(state["id"], SID);
    assert_eq!(state["friendly_name"], "android");
    assert!(state["secret"].is_null());
}
