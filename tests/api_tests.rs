mod session_support;

use oidc_session::api::{send_api_request, send_authorized_request};
use oidc_session::error::OidcError;
use oidc_session::session::LoginStatus;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use session_support::*;

#[tokio::test]
async fn anonymous_request_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(|req: &Request| {
            if req.headers.contains_key("authorization") {
                ResponseTemplate::new(400)
            } else {
                ResponseTemplate::new(401).set_body_string("Unauthorized")
            }
        })
        .expect(1)
        .mount(&server)
        .await;
    let config = session_config(&server);

    let err = send_api_request(&reqwest::Client::new(), &config.api_url, None)
        .await
        .unwrap_err();

    match err {
        OidcError::ApiRequestFailed { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "Unauthorized");
        }
        other => panic!("expected ApiRequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn session_request_carries_bearer_token() {
    let server = MockServer::start().await;
    mount_discovery(&server, 0).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .and(header("authorization", "Bearer stored-access"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;
    let store = store_with(Some(authorized_state(&server, 3600))).await;
    let service = start_service(&server, store);
    let LoginStatus::LoggedIn(session) = wait_logged_in(&service).await else {
        unreachable!()
    };

    let body = send_authorized_request(&session, service.client().http(), &service.config().api_url)
        .await
        .expect("api call");

    assert_eq!(body, "OK");
}

#[tokio::test]
async fn api_redirects_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "https://login.example.com/"),
        )
        .mount(&server)
        .await;
    let config = session_config(&server);
    let client = oidc_session::auth::OidcClient::new(&config).expect("client");

    let err = send_api_request(client.http(), &config.api_url, None)
        .await
        .unwrap_err();

    assert!(matches!(err, OidcError::ApiRequestFailed { status: 302, .. }));
}
