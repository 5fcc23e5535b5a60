//! Login, authenticated use, and session expiry against a mock backend with
//! a file-backed token store.

use std::sync::Arc;

use assert_matches::assert_matches;
use mailagent_api::{ApiClient, ApiError};
use mailagent_auth::{FileTokenStore, LoginRedirect, RecordingNavigator, TokenStore};
use mailagent_settings::ClientSettings;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct App {
    server: MockServer,
    api: ApiClient,
    tokens: Arc<FileTokenStore>,
    nav: Arc<RecordingNavigator>,
    _dir: tempfile::TempDir,
}

async fn app() -> App {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::in_dir(dir.path()));
    let nav = Arc::new(RecordingNavigator::new());
    let settings = ClientSettings {
        api_url: format!("{}/api", server.uri()),
        ..Default::default()
    };
    let api = ApiClient::from_settings(
        &settings,
        tokens.clone(),
        LoginRedirect::new(nav.clone(), settings.login_route.clone()),
    )
    .unwrap();
    App {
        server,
        api,
        tokens,
        nav,
        _dir: dir,
    }
}

#[tokio::test]
async fn login_persists_and_authorizes_later_calls() {
    let app = app().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "user": {"id": 1, "email": "ann@example.com"},
            "token": "jwt-file"
        })))
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/email-configs/"))
        .and(header("authorization", "Bearer jwt-file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&app.server)
        .await;

    let _ = app.api.auth().login("ann@example.com", "pw").await.unwrap();
    assert!(app.tokens.path().exists());
    let reopened = FileTokenStore::open(app.tokens.path());
    assert_eq!(reopened.token().as_deref(), Some("jwt-file"));
    assert_eq!(
        reopened.session().unwrap().user_email.as_deref(),
        Some("ann@example.com")
    );

    let configs = app.api.email_configs().list().await.unwrap();
    assert!(configs.is_empty());
}

#[tokio::test]
async fn expired_session_redirects_once_per_rejected_call() {
    let app = app().await;
    app.tokens.set_token("expired", None).unwrap();
    Mock::given(method("GET"))
        .and(path("/api/emails"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
        .expect(1)
        .mount(&app.server)
        .await;

    let err = app.api.emails().list(None, None, None).await.unwrap_err();

    assert_matches!(err, ApiError::Unauthorized);
    assert_eq!(app.nav.visits(), vec!["/login"]);
}

#[tokio::test]
async fn logged_out_calls_carry_no_credentials() {
    let app = app().await;
    Mock::given(method("GET"))
        .and(path("/api/health/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "online", "timestamp": 0})),
        )
        .mount(&app.server)
        .await;

    let status = app.api.health().await.unwrap();
    assert!(status.is_online());

    let received = app.server.received_requests().await.unwrap();
    assert!(!received[0].headers.contains_key("authorization"));
    assert_eq!(app.nav.count(), 0);
}
