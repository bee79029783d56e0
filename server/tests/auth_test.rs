//! Integration tests for registration, login, and current-user endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;

use pairchat_server::chat::registry::Registry;
use pairchat_server::db::DbPool;
use pairchat_server::state::AppState;

/// Start the server on a random port and return (base_url, addr, db handle).
async fn start_test_server() -> (String, SocketAddr, DbPool) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = pairchat_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = pairchat_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = AppState {
        db: db.clone(),
        jwt_secret,
        token_ttl_minutes: 30,
        registry: Arc::new(Registry::new()),
    };

    let app = pairchat_server::routes::build_router(state, &[]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr, db)
}

async fn register(base_url: &str, username: &str, password: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/register", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": password,
        }))
        .send()
        .await
        .unwrap()
}

async fn login(base_url: &str, email: &str, password: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/token", base_url))
        .form(&[("username", email), ("password", password)])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn register_login_and_fetch_me() {
    let (base_url, _addr, _db) = start_test_server().await;

    let resp = register(&base_url, "alice", "s3cret-pw").await;
    assert_eq!(resp.status(), 201);

    let resp = login(&base_url, "alice@example.com", "s3cret-pw").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    let token = body["access_token"].as_str().unwrap().to_string();

    let resp = reqwest::Client::new()
        .get(format!("{}/users/me", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let me: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(me["username"], "alice");
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["disabled"], false);
    assert!(me["id"].as_i64().unwrap() > 0);
    assert!(me.get("hashed_password").is_none());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (base_url, _addr, _db) = start_test_server().await;

    assert_eq!(register(&base_url, "alice", "pw-one").await.status(), 201);
    assert_eq!(register(&base_url, "alice", "pw-two").await.status(), 400);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (base_url, _addr, _db) = start_test_server().await;
    register(&base_url, "alice", "right-pw").await;

    let resp = login(&base_url, "alice@example.com", "wrong-pw").await;
    assert_eq!(resp.status(), 401);

    let resp = login(&base_url, "nobody@example.com", "whatever").await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn me_requires_a_valid_token() {
    let (base_url, _addr, _db) = start_test_server().await;

    let resp = reqwest::Client::new()
        .get(format!("{}/users/me", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = reqwest::Client::new()
        .get(format!("{}/users/me", base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn disabled_account_is_refused() {
    let (base_url, _addr, db) = start_test_server().await;
    register(&base_url, "alice", "s3cret-pw").await;

    let body: serde_json::Value = login(&base_url, "alice@example.com", "s3cret-pw")
        .await
        .json()
        .await
        .unwrap();
    let token = body["access_token"].as_str().unwrap().to_string();

    {
        let conn = db.lock().unwrap();
        conn.execute("UPDATE users SET disabled = 1 WHERE username = 'alice'", [])
            .unwrap();
    }

    let resp = reqwest::Client::new()
        .get(format!("{}/users/me", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
