//! Client against the real server over loopback HTTP

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::client::transport::REFRESH_PATH;
use crate::client::{AccountClient, ClientConfig, ClientError, HttpTransport, MemoryHintStore};
use crate::core::auth::{AuthService, BcryptHasher, JwtConfig, JwtService};
use crate::core::config::Config;
use crate::core::db::InMemoryUserStore;
use crate::core::server::build_router;

async fn spawn_server(jwt: JwtConfig) -> String {
    let config = Config::development(jwt);
    let service = AuthService::new(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(BcryptHasher::new(4)),
        JwtService::new(config.jwt.clone()),
    );
    let app = build_router(&config, service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn client(base_url: &str) -> (AccountClient, Arc<HttpTransport>) {
    let transport = Arc::new(HttpTransport::new(base_url).unwrap());
    let client = AccountClient::from_parts(
        transport.clone(),
        Arc::new(MemoryHintStore::new()),
        &ClientConfig::new(base_url),
    );
    (client, transport)
}

#[tokio::test]
async fn test_login_then_protected_request() {
    let base_url = spawn_server(JwtConfig::new("access", "refresh")).await;
    let (client, transport) = client(&base_url);

    client.register("alice", "wonder").await.unwrap();
    let username = client.login("alice", "wonder").await.unwrap();
    assert_eq!(username, "alice");

    let cookie = transport.cookie_header(REFRESH_PATH).unwrap();
    assert!(cookie.starts_with("refreshToken="));
    // Scoped to the auth routes
    assert!(transport.cookie_header("/api/me").is_none());

    let me = client.current_user().await.unwrap();
    assert_eq!(me.username, "alice");
    assert!(client.notifier().current().is_none());
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_and_cookie_rotated() {
    let base_url =
        spawn_server(JwtConfig::new("access", "refresh").access_ttl(ChronoDuration::seconds(1)))
            .await;
    let (client, transport) = client(&base_url);

    client.register("alice", "wonder").await.unwrap();
    client.login("alice", "wonder").await.unwrap();
    let first_token = client.tokens().access_token().unwrap();
    let first_cookie = transport.cookie_header(REFRESH_PATH).unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let me = client.current_user().await.unwrap();
    assert_eq!(me.username, "alice");

    let second_token = client.tokens().access_token().unwrap();
    let second_cookie = transport.cookie_header(REFRESH_PATH).unwrap();
    assert_ne!(first_token, second_token);
    assert_ne!(first_cookie, second_cookie);

    // The consumed cookie is no longer accepted
    let replay = reqwest::Client::new()
        .post(format!("{}{}", base_url, REFRESH_PATH))
        .header(reqwest::header::COOKIE, first_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let base_url = spawn_server(JwtConfig::new("access", "refresh")).await;
    let (client, _) = client(&base_url);

    client.register("alice", "wonder").await.unwrap();
    let err = client.register("alice", "pw1234").await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 409, .. }));

    // Original credentials still work
    client.login("alice", "wonder").await.unwrap();
    let err = client.login("alice", "pw1234").await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_logout_drops_refresh_cookie() {
    let base_url = spawn_server(JwtConfig::new("access", "refresh")).await;
    let (client, transport) = client(&base_url);

    client.register("alice", "wonder").await.unwrap();
    client.login("alice", "wonder").await.unwrap();
    assert!(transport.cookie_header(REFRESH_PATH).is_some());

    client.logout().await;

    assert!(!client.is_authenticated());
    assert!(transport.cookie_header(REFRESH_PATH).is_none());

    // Without a token or cookie the gateway gives up
    let err = client.current_user().await.unwrap_err();
    assert_eq!(err, ClientError::AuthenticationFailed);
}

#[tokio::test]
async fn test_initialize_restores_from_cookie() {
    let base_url = spawn_server(JwtConfig::new("access", "refresh")).await;
    let (client, transport) = client(&base_url);
    client.register("alice", "wonder").await.unwrap();
    client.login("alice", "wonder").await.unwrap();

    // Same cookie jar and hint, fresh in-memory token: a process restart
    let restarted = AccountClient::from_parts(
        transport,
        Arc::new(MemoryHintStore::with_hint("alice")),
        &ClientConfig::new(base_url.as_str()),
    );
    assert!(!restarted.is_authenticated());

    assert!(restarted.initialize().await);
    assert_eq!(restarted.current_user().await.unwrap().username, "alice");
}
