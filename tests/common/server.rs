//! Test health listener lifecycle
//!
//! Each test gets its own listener on a random port, torn down on drop.

use super::constants::WAIT_TIMEOUT;
use digest_worker::server::{make_app, RequestsLoggingLevel};
use digest_worker::HealthState;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Binds 127.0.0.1:0, serves the health app in a background task and
    /// waits until `/ping` answers.
    pub async fn spawn(health: HealthState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let shutdown = CancellationToken::new();
        let app = make_app(health, RequestsLoggingLevel::None);
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            shutdown,
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        while start.elapsed() < WAIT_TIMEOUT {
            if let Ok(response) = client.get(format!("{}/ping", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Health listener did not become ready within {:?}", WAIT_TIMEOUT);
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        reqwest::get(format!("{}{}", self.base_url, path))
            .await
            .expect("request failed")
            .json()
            .await
            .expect("response was not JSON")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
