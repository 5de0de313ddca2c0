//! FCM HTTP v1 adapter against a mock provider.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use donorcast_notifications::{
    AccessTokenSource, DeliveryOutcome, FcmConfig, FcmGateway, MessageContent, MessageData,
    NotificationError, PushGateway, PushMessage, ServiceAccountKey, ServiceAccountTokenSource,
    StaticTokenSource,
};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEND_PATH: &str = "/v1/projects/demo-project/messages:send";

fn gateway(server: &MockServer) -> FcmGateway {
    let config = FcmConfig::new("demo-project")
        .with_api_base(server.uri())
        .with_iid_base(server.uri())
        .with_timeout(Duration::from_secs(5))
        .with_multicast_concurrency(2);
    FcmGateway::new(config, Arc::new(StaticTokenSource::new("test-token"))).unwrap()
}

fn content() -> MessageContent {
    let mut data = MessageData::new();
    data.insert("screen".into(), "inbox".into());
    MessageContent::new("Hi", "Hello", data).unwrap()
}

#[tokio::test]
async fn send_to_token_returns_message_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "message": {
                "token": "device-1",
                "notification": {"title": "Hi", "body": "Hello"},
                "data": {"screen": "inbox"}
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "projects/demo-project/messages/42"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = gateway(&server)
        .send(&PushMessage::to_token("device-1", content()))
        .await
        .unwrap();
    assert_eq!(id, "projects/demo-project/messages/42");
}

#[tokio::test]
async fn send_to_topic_strips_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({"message": {"topic": "category_apos"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "m-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = gateway(&server)
        .send(&PushMessage::to_topic("/topics/category_apos", content()))
        .await
        .unwrap();
    assert_eq!(id, "m-1");
}

#[tokio::test]
async fn provider_error_becomes_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "status": "NOT_FOUND",
                "message": "Requested entity was not found.",
            }
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .send(&PushMessage::to_token("stale", content()))
        .await
        .unwrap_err();
    match err {
        NotificationError::Gateway(detail) => {
            assert_eq!(detail, "NOT_FOUND: Requested entity was not found.")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn multicast_outcomes_follow_token_order() {
    let server = MockServer::start().await;
    for token in ["t1", "t3", "t4"] {
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(body_partial_json(json!({"message": {"token": token}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": format!("m-{token}")}))
                    .set_delay(Duration::from_millis(if token == "t1" { 150 } else { 0 })),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({"message": {"token": "t2"}})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"status": "INVALID_ARGUMENT", "message": "bad token"}
        })))
        .mount(&server)
        .await;

    let tokens: Vec<String> = ["t1", "t2", "t3", "t4"].iter().map(|t| t.to_string()).collect();
    let outcomes = gateway(&server)
        .send_multicast(&tokens, &content())
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            DeliveryOutcome::Delivered {
                message_id: "m-t1".into()
            },
            DeliveryOutcome::Failed {
                error: "Push gateway error: INVALID_ARGUMENT: bad token".into()
            },
            DeliveryOutcome::Delivered {
                message_id: "m-t3".into()
            },
            DeliveryOutcome::Delivered {
                message_id: "m-t4".into()
            },
        ]
    );
}

#[tokio::test]
async fn topic_management_uses_instance_id_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchAdd"))
        .and(header("access_token_auth", "true"))
        .and(body_partial_json(json!({
            "to": "/topics/news",
            "registration_tokens": ["device-1"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{}]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchRemove"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [{"error": "NOT_FOUND"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let tokens = vec!["device-1".to_string()];
    gateway.subscribe(&tokens, "news").await.unwrap();
    // Per-token errors are reported but do not fail the call
    gateway.unsubscribe(&tokens, "news").await.unwrap();
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn unreadable_topic_management_body_is_logged() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchAdd"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    gateway(&server)
        .subscribe(&["device-1".to_string()], "news")
        .await
        .unwrap();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(
        output.contains("Unreadable topic management response"),
        "{output}"
    );
}

#[tokio::test]
async fn topic_management_http_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchAdd"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .subscribe(&["device-1".to_string()], "news")
        .await
        .unwrap_err();
    assert!(err.is_upstream());
}

#[tokio::test]
async fn service_account_token_is_exchanged_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.minted",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let key_file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        key_file.path(),
        json!({
            "type": "service_account",
            "project_id": "demo-project",
            "private_key_id": "kid-1",
            "private_key": pem.as_str(),
            "client_email": "push@demo-project.iam.gserviceaccount.com",
            "token_uri": format!("{}/token", server.uri())
        })
        .to_string(),
    )
    .unwrap();

    let key = ServiceAccountKey::from_file(key_file.path()).unwrap();
    assert_eq!(key.project_id.as_deref(), Some("demo-project"));
    let source = ServiceAccountTokenSource::new(key, reqwest::Client::new()).unwrap();

    assert_eq!(source.access_token().await.unwrap(), "ya29.minted");
    assert_eq!(source.access_token().await.unwrap(), "ya29.minted");
}

#[tokio::test]
async fn rejected_token_exchange_is_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let key = ServiceAccountKey::from_json(
        &json!({
            "private_key": pem.as_str(),
            "client_email": "push@demo-project.iam.gserviceaccount.com",
            "token_uri": format!("{}/token", server.uri())
        })
        .to_string(),
    )
    .unwrap();
    let source = ServiceAccountTokenSource::new(key, reqwest::Client::new()).unwrap();

    let err = source.access_token().await.unwrap_err();
    assert!(matches!(err, NotificationError::Gateway(_)));
}
