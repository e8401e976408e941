//! Shared utilities for integration testing.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use payment_gateway::config::GatewayConfig;
use payment_gateway::http::HttpServer;
use payment_gateway::lifecycle::Shutdown;
use payment_gateway::payments::{
    ChargeReceipt, PaymentGateway, PaymentProvider, PaymentRequest, ProviderError,
};
use payment_gateway::resilience::MockClock;
use tokio::net::TcpListener;

/// Provider that replays a script of outcomes; once exhausted it repeats
/// `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<bool>>,
    fallback: AtomicBool,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(script: &[bool], fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback: AtomicBool::new(fallback),
            calls: AtomicU32::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn always(success: bool) -> Arc<Self> {
        Self::new(&[], success)
    }

    /// Drop the remaining script and answer `success` from now on.
    #[allow(dead_code)]
    pub fn set_fallback(&self, success: bool) {
        self.script.lock().unwrap().clear();
        self.fallback.store(success, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn charge(&self, request: &PaymentRequest) -> Result<ChargeReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let succeed = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.load(Ordering::SeqCst));
        if succeed {
            Ok(ChargeReceipt::for_request(request))
        } else {
            Err(ProviderError::new("Payment failed due to provider error."))
        }
    }
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<PaymentGateway>,
    pub clock: MockClock,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn pay(&self, amount: f64) -> reqwest::Response {
        self.client
            .post(self.url("/pay"))
            .json(&serde_json::json!({ "amount": amount, "currency": "USD" }))
            .send()
            .await
            .expect("gateway unreachable")
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("gateway unreachable")
            .json()
            .await
            .expect("response is not JSON")
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway on 127.0.0.1:0 backed by `provider` and a mock clock.
pub async fn start_gateway(config: GatewayConfig, provider: Arc<ScriptedProvider>) -> TestGateway {
    let clock = MockClock::new();
    let gateway = Arc::new(PaymentGateway::with_clock(
        &config,
        provider,
        Arc::new(clock.clone()),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, gateway.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        gateway,
        clock,
        client,
        shutdown,
    }
}

/// Config with no backoff delay so retries run instantly.
pub fn fast_config(failure_threshold: u32, max_attempts: u32) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.breaker.failure_threshold = failure_threshold;
    config.retries.max_attempts = max_attempts;
    config.retries.backoff_ms = vec![0];
    config
}
