#![allow(clippy::unwrap_used)]
// Facade over a real `HttpConnection` against a wiremock server.

use std::time::Duration;

use obis_api::http::V3_ENDPOINT_PATH;
use obis_core::{Credentials, ErrorCode, IpadError, IpadService, ServiceConfig, SessionState};
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, timeout: Duration) -> ServiceConfig {
    let mut config = ServiceConfig::new(
        Url::parse(&server.uri()).unwrap(),
        Credentials {
            username: "u".into(),
            password: SecretString::from("p".to_owned()),
        },
    );
    config.timeout = timeout;
    config
}

#[tokio::test]
async fn slow_server_surfaces_as_a_retryable_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(V3_ENDPOINT_PATH))
        .and(body_partial_json(json!({ "method": "loginAsAnonymousUser" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": "1", "result": null }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    let svc = IpadService::from_config(&config(&server, Duration::from_millis(200))).unwrap();

    let err = svc
        .login("u", SecretString::from("p".to_owned()))
        .outcome()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IpadError::Transport {
            source: obis_api::Error::Timeout { .. }
        }
    ));
    assert_eq!(err.code(), ErrorCode::TransportFailure);
    assert!(err.is_retryable());
    assert_eq!(svc.session_state(), SessionState::Unauthenticated);
}
