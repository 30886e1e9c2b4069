//! Integration tests for the public, unauthenticated routes

use std::net::TcpListener;
use std::sync::Arc;

use biodata_server::auth::{AuthService, RefreshTokenLedger, TokenCodec};
use biodata_server::configuration::JwtSettings;
use biodata_server::database::{InMemoryLedgerStore, InMemoryUserStore};
use biodata_server::startup::run;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let jwt = JwtSettings {
        secret: "integration-test-secret-with-enough-bytes".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "test".to_string(),
    };
    let service = AuthService::new(
        Arc::new(InMemoryUserStore::default()),
        RefreshTokenLedger::new(Arc::new(InMemoryLedgerStore::default())),
        TokenCodec::new(&jwt).expect("Failed to build token codec"),
    );
    let server = run(listener, service)
        .expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn index_says_hello() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&addr)
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "Hello World!");
}
