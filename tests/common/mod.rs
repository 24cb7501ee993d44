//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use storefront_perimeter::admin::admin_router;
use storefront_perimeter::http::{AppState, HttpServer};
use storefront_perimeter::lifecycle::Shutdown;
use storefront_perimeter::security::otp::OtpDelivery;
use storefront_perimeter::PerimeterConfig;

pub const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
pub const ADMIN_KEY: &str = "test-admin-key";

/// A perimeter running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub config_tx: mpsc::UnboundedSender<PerimeterConfig>,
    shutdown: Shutdown,
}

impl TestServer {
    pub async fn start(config: PerimeterConfig) -> Self {
        Self::serve(HttpServer::new(config).unwrap()).await
    }

    /// Start with OTP codes delivered to `delivery` instead of the log.
    pub async fn start_with_delivery(
        config: PerimeterConfig,
        delivery: Arc<dyn OtpDelivery>,
    ) -> Self {
        Self::serve(HttpServer::new(config).unwrap().with_otp_delivery(delivery)).await
    }

    async fn serve(server: HttpServer) -> Self {
        let state = server.state().clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let (config_tx, config_updates) = mpsc::unbounded_channel();
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, config_updates, server_shutdown).await;
        });

        Self {
            addr,
            state,
            config_tx,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Serve the admin router for this server's state on its own port.
    pub async fn start_admin(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = admin_router(self.state.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Captures delivered OTP codes.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDelivery {
    pub fn last_code(&self, subject: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, _)| s == subject)
            .map(|(_, code)| code.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl OtpDelivery for RecordingDelivery {
    fn deliver(&self, subject: &str, code: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), code.to_string()));
    }
}

/// Test config: admin key set, defaults elsewhere.
pub fn config() -> PerimeterConfig {
    let mut config = PerimeterConfig::default();
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

/// Client that neither follows redirects nor uses a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Headers for a browser at `address`.
pub fn from_address(address: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_str(address).unwrap());
    headers.insert("user-agent", HeaderValue::from_static(BROWSER_UA));
    headers
}

/// Start a simple mock origin that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
