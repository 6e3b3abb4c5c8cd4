#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

use rest_jwt_api::auth::TokenService;
use rest_jwt_api::config::{AppConfig, SecurityConfig};
use rest_jwt_api::database::InMemoryUserRepository;
use rest_jwt_api::{app, AppState};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_ISSUER: &str = "rest-jwt-api-tests";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub tokens: Arc<TokenService>,
    pub client: reqwest::Client,
}

impl TestServer {
    async fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::from_env();
        config.security = test_security();

        let state = AppState::new(&config, Arc::new(InMemoryUserRepository::new()));
        let tokens = state.tokens.clone();
        let router = app(state, false);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;
        tokio::spawn(async move { axum::serve(listener, router).await });

        Ok(Self {
            port,
            base_url,
            tokens,
            client: reqwest::Client::new(),
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = self.client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a user with a unique email and return (id, email)
    pub async fn create_user(&self, name: &str, password: &str) -> Result<(i64, String)> {
        let email = format!("{}-{}@example.com", name, uuid::Uuid::new_v4().simple());
        let res = self
            .client
            .post(self.url("/users"))
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "create failed: {}", res.status());

        let body = res.json::<Value>().await?;
        let id = body["id"].as_i64().context("created user has no id")?;
        Ok((id, email))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?)
    }

    /// Log in and return the issued token
    pub async fn token_for(&self, email: &str, password: &str) -> Result<String> {
        let res = self.login(email, password).await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());
        let body = res.json::<Value>().await?;
        Ok(body["token"].as_str().context("login response has no token")?.to_string())
    }
}

pub fn test_security() -> SecurityConfig {
    SecurityConfig::new(TEST_SECRET)
        .with_issuer(TEST_ISSUER)
        .with_bcrypt_cost(4)
}

/// Start a fresh server with empty storage for the calling test
pub async fn spawn_server() -> Result<TestServer> {
    let server = TestServer::spawn().await?;
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}
