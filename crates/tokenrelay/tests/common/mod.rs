#![allow(dead_code)]

use std::sync::{Arc, LazyLock};

use axum::Router;
use tokenrelay::idp::{IdentityProvider, IdpConfig, SigningKey, UserDirectory};
use tokenrelay::services;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const AUDIENCE: &str = "api://acme-api";
pub const TEST_USER: &str = "testuser@example.com";
pub const TEST_PASSWORD: &str = "TestPassword123!";
pub const TEST_USER_SUB: &str = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";

/// One RSA key per test binary.
pub static SIGNING_KEY: LazyLock<SigningKey> =
    LazyLock::new(|| SigningKey::generate("it-key-1").expect("key generation"));

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// A router served on an ephemeral loopback port until dropped.
pub struct Running {
    pub base: String,
    shutdown: CancellationToken,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    (listener, base)
}

pub fn spawn(listener: TcpListener, base: String, router: Router) -> Running {
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone().cancelled_owned();
    tokio::spawn(services::serve_listener(listener, router, stop));
    Running { base, shutdown }
}

/// Identity provider emulator whose issuer is its own listen address.
pub struct Emulator {
    pub provider: Arc<IdentityProvider>,
    pub server: Running,
}

impl Emulator {
    pub fn issuer(&self) -> &str {
        &self.server.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.base)
    }
}

pub async fn spawn_emulator() -> Emulator {
    let (listener, base) = bind().await;
    let provider = Arc::new(IdentityProvider::new(
        IdpConfig::new(base.clone(), AUDIENCE),
        SIGNING_KEY.clone(),
        UserDirectory::with_test_users(),
    ));
    let server = spawn(
        listener,
        base,
        services::idp::router(Arc::clone(&provider)),
    );
    Emulator { provider, server }
}

/// HTTP client that leaves redirects to the test.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client")
}
