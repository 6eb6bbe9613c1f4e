use serde_json::json;
use twilio_chat_provider::testing::{ProviderTester, TEST_ACCOUNT_SID};
use twilio_chat_provider::ProviderError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT_SERVICES: &str = "twilio_chat_services";

#[tokio::test]
async fn lists_services_for_the_account() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/Services"))
        .and(query_param("PageSize", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [
                {
                    "sid": "IS00000000000000000000000000000001",
                    "friendly_name": "support",
                    "date_created": "2021-03-01T12:00:00Z",
                    "limits": {"channel_members": 100, "user_channels": 250}
                },
                {
                    "sid": "IS00000000000000000000000000000002",
                    "friendly_name": "sales",
                    "date_created": "2021-04-01T09:15:30Z"
                }
            ],
            "meta": {"page": 0, "page_size": 50, "key": "services"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .read_data_source(CHAT_SERVICES, json!({}))
        .await
        .unwrap();

    assert_eq!(
        state,
        json!({
            "id": TEST_ACCOUNT_SID,
            "chat_services": [
                {
                    "sid": "IS00000000000000000000000000000001",
                    "friendly_name": "support",
                    "date_created": "2021-03-01T12:00:00Z"
                },
                {
                    "sid": "IS00000000000000000000000000000002",
                    "friendly_name": "sales",
                    "date_created": "2021-04-01T09:15:30Z"
                }
            ]
        })
    );
}

#[tokio::test]
async fn empty_account_yields_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/Services"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"services": [], "meta": {}})),
        )
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let state = tester
        .read_data_source(CHAT_SERVICES, json!({}))
        .await
        .unwrap();
    assert_eq!(state["chat_services"], json!([]));
}

#[tokio::test]
async fn throttling_surfaces_as_resource_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/Services"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "code": 20429,
            "message": "Too Many Requests",
            "status": 429
        })))
        .mount(&server)
        .await;

    let tester = ProviderTester::twilio(&server.uri()).await;
    let err = tester
        .read_data_source(CHAT_SERVICES, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        twilio_chat_provider::testing::TestError::Provider(ProviderError::ResourceExhausted(_))
    ));
}

#[tokio::test]
async fn unknown_data_source_is_rejected() {
    let tester = ProviderTester::twilio("http://127.0.0.1:9").await;
    let err = tester
        .read_data_source("twilio_chat_roles", json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("twilio_chat_roles"));
}
