//! Integration tests for the session lifecycle against a mock todo service

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tiko_todos_core::auth::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use tiko_todos_core::{
    ApiClient, ApiError, AuthError, MemoryTokenStore, RegistrationProfile, SessionManager,
    SessionStatus, TokenStore, ValidationError,
};

fn api_for(server: &ServerGuard) -> ApiClient {
    ApiClient::with_base_url(&format!("{}/api", server.url()), Duration::from_secs(5))
        .expect("Failed to build client")
}

/// Manager whose store already holds `access`/`refresh` from an earlier run
async fn restored_manager(
    server: &ServerGuard,
    access: &str,
    refresh: &str,
) -> (SessionManager, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    store.save(ACCESS_TOKEN_KEY, access).unwrap();
    store.save(REFRESH_TOKEN_KEY, refresh).unwrap();

    let manager = SessionManager::new(api_for(server), store.clone());
    let status = manager.restore().await.expect("Restore failed");
    assert_eq!(status, SessionStatus::Authenticated);
    (manager, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_refresh() {
    //* Given
    let mut server = Server::new_async().await;

    let verify_old = server
        .mock("GET", "/api/token/verify/")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/token/verify/")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .match_body(Matcher::Json(json!({"refresh": "R1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A2"}"#)
        .expect(1) // Exactly one refresh no matter how many callers
        .create_async()
        .await;

    let (manager, store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let handles = (0..8).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_valid_access_token().await })
    });
    let results = join_all(handles).await;

    //* Then
    refresh.assert_async().await;
    verify_old.assert_async().await;
    for result in results {
        let token = result.expect("Task panicked").expect("Token request failed");
        assert_eq!(token, "A2");
    }
    assert_eq!(manager.status().await, SessionStatus::Authenticated);
    assert_eq!(store.load(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A2"));
    assert_eq!(store.load(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failed_refresh() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/token/verify/")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(401)
        .with_body(r#"{"detail": "Token is invalid or expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let (manager, _store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let handles = (0..6).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_valid_access_token().await })
    });
    let results = join_all(handles).await;

    //* Then
    refresh.assert_async().await;
    for result in results {
        let outcome = result.expect("Task panicked");
        assert!(
            matches!(outcome, Err(AuthError::SessionExpired)),
            "unexpected outcome: {:?}",
            outcome
        );
    }
}

#[tokio::test]
async fn refreshed_token_is_used_by_next_request() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/token/verify/")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/token/refresh/")
        .match_body(Matcher::Json(json!({"refresh": "R1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A2"}"#)
        .create_async()
        .await;
    let stale_request = server
        .mock("GET", "/api/todos/")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .expect(0)
        .create_async()
        .await;
    let fresh_request = server
        .mock("GET", "/api/todos/")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let (manager, _store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let response = manager
        .with_auth(|api| api.request(reqwest::Method::GET, "todos/"))
        .await
        .expect("Authorized request failed");

    //* Then
    assert!(response.status().is_success());
    fresh_request.assert_async().await;
    stale_request.assert_async().await;
}

#[tokio::test]
async fn rejected_refresh_expires_session() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/token/verify/")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/token/refresh/")
        .with_status(400)
        .create_async()
        .await;

    let (manager, store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let first = manager.get_valid_access_token().await;
    let second = manager.get_valid_access_token().await;

    //* Then
    assert!(matches!(first, Err(AuthError::SessionExpired)));
    assert!(matches!(second, Err(AuthError::Unauthenticated)));
    assert_eq!(manager.status().await, SessionStatus::Expired);
    assert!(store.is_empty());
}

#[tokio::test]
async fn refresh_without_access_field_expires_session() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/token/verify/")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail": "ok"}"#)
        .create_async()
        .await;

    let (manager, store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let outcome = manager.get_valid_access_token().await;

    //* Then
    assert!(matches!(outcome, Err(AuthError::SessionExpired)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn valid_token_is_returned_without_refresh() {
    //* Given
    let mut server = Server::new_async().await;

    let verify = server
        .mock("GET", "/api/token/verify/")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .expect(0)
        .create_async()
        .await;

    let (manager, _store) = restored_manager(&server, "A1", "R1").await;

    //* When - the second call falls inside the trust window
    let first = manager.get_valid_access_token().await.expect("First call failed");
    let second = manager.get_valid_access_token().await.expect("Second call failed");

    //* Then
    assert_eq!(first, "A1");
    assert_eq!(second, "A1");
    verify.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn zero_trust_window_verifies_every_call() {
    //* Given
    let mut server = Server::new_async().await;

    let verify = server
        .mock("GET", "/api/token/verify/")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let (manager, _store) = restored_manager(&server, "A1", "R1").await;
    let manager = manager.with_trust_window(Duration::ZERO);

    //* When
    manager.get_valid_access_token().await.expect("First call failed");
    manager.get_valid_access_token().await.expect("Second call failed");

    //* Then
    verify.assert_async().await;
}

#[tokio::test]
async fn login_then_token_returns_issued_token() {
    //* Given
    let mut server = Server::new_async().await;

    let login = server
        .mock("POST", "/api/login/")
        .match_body(Matcher::Json(json!({"email": "ada@example.com", "password": "hunter22"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A1", "refresh": "R1"}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/token/verify/")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .create_async()
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::new(api_for(&server), store.clone());

    //* When
    let session = manager
        .login("Ada@Example.com", "hunter22")
        .await
        .expect("Login failed");
    let token = manager.get_valid_access_token().await.expect("Token request failed");

    //* Then
    login.assert_async().await;
    assert_eq!(session.status(), SessionStatus::Authenticated);
    assert_eq!(token, "A1");
    assert_eq!(store.load(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A1"));
    assert_eq!(store.load(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
}

#[tokio::test]
async fn rejected_login_keeps_previous_state() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/api/login/")
        .with_status(401)
        .with_body(r#"{"detail": "No active account found with the given credentials"}"#)
        .create_async()
        .await;

    let (manager, store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let outcome = manager.login("ada@example.com", "wrong").await;

    //* Then
    assert!(matches!(outcome, Err(AuthError::InvalidCredentials)));
    assert_eq!(manager.status().await, SessionStatus::Authenticated);
    assert_eq!(manager.session().await.access_token(), Some("A1"));
    assert_eq!(store.load(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A1"));
}

#[tokio::test]
async fn rejected_login_from_scratch_stays_unauthenticated() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/api/login/")
        .with_status(400)
        .create_async()
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::new(api_for(&server), store.clone());

    //* When
    let outcome = manager.login("ada@example.com", "wrong").await;

    //* Then
    assert!(matches!(outcome, Err(AuthError::InvalidCredentials)));
    assert_eq!(manager.status().await, SessionStatus::Unauthenticated);
    assert!(store.is_empty());
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    //* Given - nothing listens on port 9
    let api = ApiClient::with_base_url("http://127.0.0.1:9/api", Duration::from_secs(2))
        .expect("Failed to build client");
    let manager = SessionManager::new(api, Arc::new(MemoryTokenStore::new()));

    //* When
    let outcome = manager.login("ada@example.com", "hunter22").await;

    //* Then
    assert!(matches!(outcome, Err(AuthError::Network(_))));
    assert_eq!(manager.status().await, SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn logout_clears_storage() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/api/login/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A1", "refresh": "R1"}"#)
        .create_async()
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::new(api_for(&server), store.clone());
    manager.login("ada@example.com", "hunter22").await.expect("Login failed");

    //* When
    manager.logout().await.expect("Logout failed");

    //* Then
    assert!(store.is_empty());
    assert_eq!(manager.status().await, SessionStatus::Unauthenticated);
    assert!(matches!(
        manager.get_valid_access_token().await,
        Err(AuthError::Unauthenticated)
    ));
}

#[tokio::test]
async fn login_after_expiry_authenticates_again() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/token/verify/")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/token/refresh/")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/login/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A3", "refresh": "R3"}"#)
        .create_async()
        .await;

    let (manager, _store) = restored_manager(&server, "A1", "R1").await;
    let _ = manager.get_valid_access_token().await;
    assert_eq!(manager.status().await, SessionStatus::Expired);

    //* When
    manager.login("ada@example.com", "hunter22").await.expect("Login failed");

    //* Then - inside the trust window, no verification needed
    assert_eq!(manager.status().await, SessionStatus::Authenticated);
    assert_eq!(manager.get_valid_access_token().await.unwrap(), "A3");
}

#[tokio::test]
async fn short_password_never_reaches_server() {
    //* Given
    let mut server = Server::new_async().await;

    let register = server
        .mock("POST", "/api/register/")
        .expect(0)
        .create_async()
        .await;

    let manager = SessionManager::new(api_for(&server), Arc::new(MemoryTokenStore::new()));
    let profile = RegistrationProfile {
        email: "ada@example.com".to_string(),
        password: "short12".to_string(),
        password2: "short12".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    };

    //* When
    let outcome = manager.register(&profile).await;

    //* Then
    assert!(matches!(
        outcome,
        Err(AuthError::Validation(ValidationError::PasswordTooShort { min: 8 }))
    ));
    register.assert_async().await;
}

#[tokio::test]
async fn register_sends_exact_body() {
    //* Given
    let mut server = Server::new_async().await;

    let register = server
        .mock("POST", "/api/register/")
        .match_body(Matcher::Json(json!({
            "email": "ada@example.com",
            "password": "analytical",
            "password2": "analytical",
            "first_name": "Ada",
            "last_name": "Lovelace"
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let manager = SessionManager::new(api_for(&server), Arc::new(MemoryTokenStore::new()));
    let profile = RegistrationProfile {
        email: "ADA@example.com".to_string(),
        password: "analytical".to_string(),
        password2: "analytical".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    };

    //* When
    manager.register(&profile).await.expect("Registration failed");

    //* Then
    register.assert_async().await;
    // Registering does not log in
    assert_eq!(manager.status().await, SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn rejected_registration_surfaces_api_error() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/api/register/")
        .with_status(400)
        .with_body(r#"{"email": ["user with this email already exists."]}"#)
        .create_async()
        .await;

    let manager = SessionManager::new(api_for(&server), Arc::new(MemoryTokenStore::new()));
    let profile = RegistrationProfile {
        email: "ada@example.com".to_string(),
        password: "analytical".to_string(),
        password2: "analytical".to_string(),
        first_name: String::new(),
        last_name: String::new(),
    };

    //* When
    let outcome = manager.register(&profile).await;

    //* Then
    match outcome {
        Err(AuthError::Api(ApiError::BadRequest(body))) => assert!(body.contains("already exists")),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn with_auth_surfaces_http_errors_once() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/token/verify/")
        .with_status(200)
        .create_async()
        .await;
    let missing = server
        .mock("DELETE", "/api/todos/99")
        .match_header("authorization", "Bearer A1")
        .with_status(404)
        .with_body(r#"{"detail": "Not found."}"#)
        .expect(1) // No retry
        .create_async()
        .await;
    let forbidden = server
        .mock("GET", "/api/todos/")
        .with_status(401)
        .expect(1) // No silent refresh-and-retry
        .create_async()
        .await;

    let (manager, _store) = restored_manager(&server, "A1", "R1").await;

    //* When
    let not_found = manager
        .with_auth(|api| api.request(reqwest::Method::DELETE, "todos/99"))
        .await;
    let unauthorized = manager
        .with_auth(|api| api.request(reqwest::Method::GET, "todos/"))
        .await;

    //* Then
    assert!(matches!(not_found, Err(AuthError::Api(ApiError::NotFound(_)))));
    assert!(matches!(unauthorized, Err(AuthError::Api(ApiError::Unauthorized))));
    missing.assert_async().await;
    forbidden.assert_async().await;
    assert_eq!(manager.status().await, SessionStatus::Authenticated);
}

#[tokio::test]
async fn unauthorized_request_forces_reverification() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/api/login/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A1", "refresh": "R1"}"#)
        .create_async()
        .await;
    let revoked = server
        .mock("GET", "/api/todos/")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let verify = server
        .mock("GET", "/api/token/verify/")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .match_body(Matcher::Json(json!({"refresh": "R1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "A2"}"#)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::new(api_for(&server), store.clone());
    manager
        .login("ada@example.com", "hunter22")
        .await
        .expect("Login failed");

    //* When
    let rejected = manager
        .with_auth(|api| api.request(reqwest::Method::GET, "todos/"))
        .await;
    let token = manager.get_valid_access_token().await;

    //* Then
    assert!(matches!(rejected, Err(AuthError::Api(ApiError::Unauthorized))));
    assert_eq!(token.expect("Token request failed"), "A2");
    revoked.assert_async().await;
    verify.assert_async().await;
    refresh.assert_async().await;
    assert_eq!(store.load(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A2"));
}
