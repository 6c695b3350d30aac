// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use blogd::{
    config::Config,
    db, routes,
    sanitizer::{HtmlSanitizer, Policy},
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port, backed by a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // A single connection that never expires keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    db::init_schema(&pool)
        .await
        .expect("Failed to create schema");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let sanitizer = HtmlSanitizer::new(Policy::default()).expect("Failed to build sanitizer");

    let state = AppState {
        pool: pool.clone(),
        config,
        sanitizer: Arc::new(sanitizer),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Registers a fresh user and returns `(username, token)`.
    pub async fn signup(&self) -> (String, String) {
        let username = format!("u_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": "password123" }))
            .send()
            .await
            .expect("Register failed");
        assert_eq!(response.status().as_u16(), 201);

        let token = self.login(&username).await;
        (username, token)
    }

    pub async fn login(&self, username: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": "password123" }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");

        body["token"].as_str().expect("Token not found").to_string()
    }

    /// Registers a user, promotes it to admin and returns a token carrying the new role.
    pub async fn signup_admin(&self) -> (String, String) {
        let (username, _) = self.signup().await;

        sqlx::query("UPDATE users SET role = 'admin' WHERE username = ?")
            .bind(&username)
            .execute(&self.pool)
            .await
            .expect("Failed to promote admin");

        let token = self.login(&username).await;
        (username, token)
    }

    pub async fn create_post(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/posts"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a published post and returns its JSON.
    pub async fn publish(&self, token: &str, title: &str, content: &str) -> Value {
        let response = self
            .create_post(
                token,
                json!({ "title": title, "content": content, "status": "published" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("Failed to parse post json")
    }
}
