// tests/auth_manager_test.rs

use chrono::Local;
use czds_dl::auth::{AuthManager, AuthOutcome};
use czds_dl::client::ApiClient;
use czds_dl::config::AppConfig;
use czds_dl::config::token::{MemoryTokenCache, TokenCache};
use czds_dl::error::AppError;
use czds_dl::models::AccessToken;
use czds_dl::session::{self, SessionHandle};
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// 辅助函数：创建指向模拟服务器的 AuthManager
fn manager(server_url: &str, cache: Arc<MemoryTokenCache>) -> (AuthManager, SessionHandle) {
    let mut config = AppConfig::default();
    config.authenticate_url = format!("{}/api/authenticate", server_url);
    let config = Arc::new(config);
    let client = Arc::new(ApiClient::new(config.clone()).expect("Failed to create client"));
    let (publisher, handle) = session::channel();
    let auth = AuthManager::new(
        client,
        config.credentials.clone(),
        cache,
        config.auth.clone(),
        publisher,
    );
    (auth, handle)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_successful_authentication_publishes_and_caches_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/authenticate")
        .match_header("user-agent", "czds-dl/1.0 test")
        .match_header("accept", "application/json")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::json!({
            "username": "user@example.com",
            "password": "secret"
        })))
        .with_status(200)
        .with_body(r#"{"accessToken":"abc.def.ghi","message":"Authentication Successful"}"#)
        .expect(1)
        .create_async()
        .await;

    let cache = Arc::new(MemoryTokenCache::default());
    let (mut auth, handle) = manager(&server.url(), cache.clone());

    let outcome = auth.authenticate(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, AuthOutcome::Authenticated);
    assert!(handle.is_authenticated());
    assert_eq!(handle.snapshot().bearer(), Some("abc.def.ghi"));
    assert_eq!(cache.store_count(), 1);
    assert_eq!(cache.current().unwrap().value, "abc.def.ghi");
    assert!(auth.last_attempt().is_some());
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_valid_cached_token_skips_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/authenticate")
        .expect(0)
        .create_async()
        .await;

    let cached = AccessToken::issue("cached".into(), Local::now(), Duration::from_secs(3600));
    let cache = Arc::new(MemoryTokenCache::with_token(cached));
    let (mut auth, handle) = manager(&server.url(), cache.clone());

    let outcome = auth.authenticate(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, AuthOutcome::AlreadyValid);
    assert_eq!(handle.snapshot().bearer(), Some("cached"));
    assert_eq!(cache.store_count(), 0);
    assert!(auth.last_attempt().is_none());
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rate_limited_is_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/authenticate")
        .with_status(429)
        .create_async()
        .await;

    let cache = Arc::new(MemoryTokenCache::default());
    let (mut auth, handle) = manager(&server.url(), cache.clone());

    let outcome = auth.authenticate(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, AuthOutcome::RateLimited);
    assert!(!handle.is_authenticated());
    assert!(handle.snapshot().last_auth_attempt.is_some());
    assert_eq!(cache.store_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_credentials_are_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/authenticate")
        .with_status(401)
        .with_body(r#"{"message":"Invalid username or password"}"#)
        .create_async()
        .await;

    let (mut auth, handle) = manager(&server.url(), Arc::new(MemoryTokenCache::default()));

    let err = auth.authenticate(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, AppError::AuthRejected(status) if status.as_u16() == 401));
    assert!(err.is_fatal());
    assert!(!handle.is_authenticated());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_success_marker_is_contract_violation() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/authenticate")
        .with_status(200)
        .with_body(r#"{"accessToken":"abc","message":"Password expired"}"#)
        .create_async()
        .await;

    let cache = Arc::new(MemoryTokenCache::default());
    let (mut auth, handle) = manager(&server.url(), cache.clone());

    let err = auth.authenticate(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, AppError::AuthContract(ref msg) if msg == "Password expired"));
    assert!(!handle.is_authenticated());
    assert!(cache.load().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_attempt_waits_for_cooldown() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/authenticate")
        .with_status(429)
        .expect(2)
        .create_async()
        .await;

    let (mut auth, _handle) = manager(&server.url(), Arc::new(MemoryTokenCache::default()));
    let cancel = CancellationToken::new();

    auth.authenticate(&cancel).await.unwrap();
    let first = auth.last_attempt().unwrap();
    auth.authenticate(&cancel).await.unwrap();
    let second = auth.last_attempt().unwrap();

    // 测试配置的冷却时间为 50ms
    assert!((second - first).to_std().unwrap() >= Duration::from_millis(50));
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transport_failure_is_not_fatal() {
    // 绑定后立即释放端口，连接会被拒绝
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let cache = Arc::new(MemoryTokenCache::default());
    let (mut auth, handle) = manager(&format!("http://{}", addr), cache.clone());

    let outcome = auth.authenticate(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, AuthOutcome::TransportFailure);
    assert!(!handle.is_authenticated());
    assert!(auth.last_attempt().is_some());
    assert_eq!(cache.store_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stale_cached_token_is_renewed() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/authenticate")
        .with_status(200)
        .with_body(r#"{"accessToken":"fresh","message":"Authentication Successful"}"#)
        .expect(1)
        .create_async()
        .await;

    // 测试配置的有效期为 23 小时
    let issued = Local::now() - chrono::Duration::hours(24);
    let stale = AccessToken::issue("stale".into(), issued, Duration::from_secs(23 * 3600));
    let cache = Arc::new(MemoryTokenCache::with_token(stale));
    let (mut auth, handle) = manager(&server.url(), cache.clone());

    let outcome = auth.authenticate(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, AuthOutcome::Authenticated);
    assert_eq!(handle.snapshot().bearer(), Some("fresh"));
    assert_eq!(cache.current().unwrap().value, "fresh");
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_renewal_loop_authenticates_and_stops_on_cancel() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/authenticate")
        .with_status(200)
        .with_body(r#"{"accessToken":"renewed","message":"Authentication Successful"}"#)
        .expect(1)
        .create_async()
        .await;

    let issued = Local::now() - chrono::Duration::hours(30);
    let expired = AccessToken::issue("old".into(), issued, Duration::from_secs(23 * 3600));
    let (auth, mut handle) = manager(&server.url(), Arc::new(MemoryTokenCache::with_token(expired)));

    let cancel = CancellationToken::new();
    let task = tokio::spawn(auth.run(cancel.clone()));

    let bearer = tokio::time::timeout(Duration::from_secs(5), handle.wait_authenticated(&cancel))
        .await
        .expect("renewal loop should authenticate")
        .unwrap();
    assert_eq!(bearer, "renewed");

    // 续期间隔为 50ms，令牌仍有效时不应再次请求
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert!(result.is_ok());
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_renewal_loop_returns_fatal_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/authenticate")
        .with_status(403)
        .create_async()
        .await;

    let (auth, _handle) = manager(&server.url(), Arc::new(MemoryTokenCache::default()));
    let result = tokio::time::timeout(Duration::from_secs(5), auth.run(CancellationToken::new()))
        .await
        .expect("fatal error should end the loop");

    assert!(matches!(result, Err(AppError::AuthRejected(status)) if status.as_u16() == 403));
}
