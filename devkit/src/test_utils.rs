/*!
Test Harness pour le kernel NetDash

Démarre le vrai routeur axum sur 127.0.0.1:0 avec:
- un MemStorage piloté par une ManualClock (heure de départ : 20h, heure de pointe)
- le BroadcastNotifier réel, pour observer les annonces de changement
- un client reqwest et des helpers qui renvoient (statut, JSON)
*/

use anyhow::Result;
use netdash_kernel::clock::ManualClock;
use netdash_kernel::http::{build_router, AppState};
use netdash_kernel::notify::{BroadcastNotifier, ChangeEvent};
use netdash_kernel::storage::MemStorage;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use time::macros::datetime;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Instant de départ de l'horloge du harness
pub const HARNESS_START: OffsetDateTime = datetime!(2024-05-01 20:00 UTC);

/// Réponse HTTP réduite à l'essentiel pour les assertions
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

pub struct TestHarness {
    pub storage: Arc<MemStorage>,
    pub clock: Arc<ManualClock>,
    pub notifier: BroadcastNotifier,
    addr: SocketAddr,
    client: reqwest::Client,
    server: JoinHandle<()>,
}

impl TestHarness {
    pub async fn start() -> Result<Self> {
        Self::start_with_api_key(None).await
    }

    pub async fn start_with_api_key(api_key: Option<&str>) -> Result<Self> {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init()
            .ok();

        let clock = Arc::new(ManualClock::new(HARNESS_START));
        let storage = Arc::new(MemStorage::new(clock.clone()));
        let notifier = BroadcastNotifier::new();

        let state = AppState::new(storage.clone(), notifier.clone()).with_api_key(api_key.map(String::from));
        let app = build_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "test server stopped");
            }
        });
        tracing::info!(%addr, "🚀 test harness listening");

        Ok(Self {
            storage,
            clock,
            notifier,
            addr,
            client: reqwest::Client::new(),
            server,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Abonnement aux annonces, à prendre avant la requête observée
    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    pub async fn get(&self, path: &str) -> Result<Reply> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Reply> {
        let req = self.request(Method::POST, path);
        let req = match body {
            Some(body) => req.json(&body),
            None => req,
        };
        self.send(req).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Reply> {
        self.send(self.request(Method::PATCH, path).json(&body)).await
    }

    /// Envoie un corps brut déclaré comme JSON (pour les cas malformés)
    pub async fn send_raw_json(&self, method: Method, path: &str, raw: &str) -> Result<Reply> {
        let req = self
            .request(method, path)
            .header("content-type", "application/json")
            .body(raw.to_string());
        self.send(req).await
    }

    pub async fn send(&self, req: RequestBuilder) -> Result<Reply> {
        let response = req.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(Reply { status, body })
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdash_kernel::clock::Clock;

    #[tokio::test]
    async fn harness_serves_health() {
        let harness = TestHarness::start().await.unwrap();
        let reply = harness.get("/health").await.unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn harness_starts_empty_at_peak_hour() {
        let harness = TestHarness::start().await.unwrap();
        let reply = harness.get("/api/devices").await.unwrap();

        assert_eq!(reply.body, serde_json::json!([]));
        assert_eq!(harness.clock.now().hour(), 20);
    }
}
